use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{Source, SourceArena, SourceHandle};
use crate::property::{Property, PropertyError, PropertyHolder, PropertyId, PropertyResult};
use crate::task::TaskRegistry;

static NEXT_GROUP_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(u64);

impl GroupId {
    fn next() -> Self {
        Self(NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// Ordered set of source handles plus group-level properties.
///
/// Membership is only edited through a [`GroupView`], which also has access
/// to the arena and can drop the properties that depended on the old
/// membership.
pub struct SourceGroup {
    id: GroupId,
    members: Vec<SourceHandle>,
    holder: PropertyHolder,
    registry: Arc<TaskRegistry>,
    in_flight: Vec<PropertyId>,
}

impl SourceGroup {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self {
            id: GroupId::next(),
            members: Vec::new(),
            holder: PropertyHolder::new(),
            registry,
            in_flight: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> GroupId {
        self.id
    }

    #[inline]
    pub fn members(&self) -> &[SourceHandle] {
        &self.members
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, handle: SourceHandle) -> bool {
        self.members.contains(&handle)
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn cached_property<P: Property>(&self) -> PropertyResult<&P> {
        self.holder.get::<P>(0)
    }

    pub fn cached_property_instance<P: Property>(&self, index: u32) -> PropertyResult<&P> {
        self.holder.get::<P>(index)
    }
}

impl std::fmt::Debug for SourceGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceGroup")
            .field("id", &self.id)
            .field("members", &self.members)
            .field("properties", &self.holder)
            .finish()
    }
}

/// A group together with the arena holding its members.
///
/// Every membership edit drops all group-level properties and every
/// group-scoped property stored on the affected members.
pub struct GroupView<'a> {
    group: &'a mut SourceGroup,
    arena: &'a mut SourceArena,
}

impl<'a> GroupView<'a> {
    pub fn new(group: &'a mut SourceGroup, arena: &'a mut SourceArena) -> Self {
        Self { group, arena }
    }

    #[inline]
    pub fn group(&self) -> &SourceGroup {
        &*self.group
    }

    #[inline]
    pub fn members(&self) -> &[SourceHandle] {
        &self.group.members
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.group.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.group.members.is_empty()
    }

    pub fn source(&self, handle: SourceHandle) -> Option<&Source> {
        if !self.group.contains(handle) {
            return None;
        }
        self.arena.get(handle)
    }

    pub fn source_mut(&mut self, handle: SourceHandle) -> Option<&mut Source> {
        if !self.group.contains(handle) {
            return None;
        }
        self.arena.get_mut(handle)
    }

    /// Members in group order.
    pub fn sources(&self) -> impl Iterator<Item = (SourceHandle, &Source)> + '_ {
        self.group
            .members
            .iter()
            .filter_map(|&handle| self.arena.get(handle).map(|source| (handle, source)))
    }

    // ===== Membership =====

    /// Add a source that already lives in the arena.
    pub fn add_source(&mut self, handle: SourceHandle) {
        if self.group.contains(handle) {
            return;
        }
        self.invalidate();
        if let Some(source) = self.arena.get_mut(handle) {
            source.clear_entangled();
        }
        self.group.members.push(handle);
    }

    /// Move `source` into the arena and the group.
    pub fn insert_source(&mut self, source: Source) -> SourceHandle {
        let handle = self.arena.insert(source);
        self.add_source(handle);
        handle
    }

    /// Remove a member from the group and from the arena.
    pub fn remove_source(&mut self, handle: SourceHandle) -> Option<Source> {
        let position = self.group.members.iter().position(|&h| h == handle)?;
        self.invalidate();
        self.group.members.remove(position);
        let mut source = self.arena.remove(handle)?;
        source.clear_entangled();
        Some(source)
    }

    /// Replace a member by `children`, which take its place in group order.
    pub fn replace_source(
        &mut self,
        handle: SourceHandle,
        children: Vec<Source>,
    ) -> Option<Vec<SourceHandle>> {
        let position = self.group.members.iter().position(|&h| h == handle)?;
        self.invalidate();
        self.arena.remove(handle);
        let handles: Vec<SourceHandle> = children
            .into_iter()
            .map(|child| self.arena.insert(child))
            .collect();
        self.group
            .members
            .splice(position..=position, handles.iter().copied());
        Some(handles)
    }

    /// Absorb every member of `other`, appended in its order.
    pub fn merge(&mut self, other: SourceGroup) {
        self.invalidate();
        for handle in other.members {
            if self.group.contains(handle) {
                continue;
            }
            if let Some(source) = self.arena.get_mut(handle) {
                source.clear_entangled();
            }
            self.group.members.push(handle);
        }
    }

    /// Drop group-level properties and group-scoped member properties.
    pub fn invalidate(&mut self) {
        self.group.holder.clear();
        for &handle in &self.group.members {
            if let Some(source) = self.arena.get_mut(handle) {
                source.clear_entangled();
            }
        }
    }

    // ===== Properties =====

    pub fn property<P: Property>(&mut self) -> PropertyResult<&P> {
        self.property_instance::<P>(0)
    }

    pub fn property_instance<P: Property>(&mut self, index: u32) -> PropertyResult<&P> {
        self.ensure(PropertyId::with_index::<P>(index))?;
        self.group.holder.get::<P>(index)
    }

    pub fn cached_property<P: Property>(&self) -> PropertyResult<&P> {
        self.group.holder.get::<P>(0)
    }

    pub fn set_property<P: Property>(&mut self, value: P) {
        self.group.holder.set(0, value);
    }

    pub fn set_property_instance<P: Property>(&mut self, index: u32, value: P) {
        self.group.holder.set(index, value);
    }

    pub fn ensure(&mut self, id: PropertyId) -> PropertyResult<()> {
        if self.group.holder.is_set(&id) {
            return Ok(());
        }
        self.run_group_task(id)?;
        if self.group.holder.is_set(&id) {
            Ok(())
        } else {
            Err(PropertyError::NotFound(id))
        }
    }

    /// Property of a member. Group-scoped kinds are computed through the
    /// group task that produces them; everything else through the member.
    pub fn member_property<P: Property>(&mut self, handle: SourceHandle) -> PropertyResult<&P> {
        self.member_property_instance::<P>(handle, 0)
    }

    pub fn member_property_instance<P: Property>(
        &mut self,
        handle: SourceHandle,
        index: u32,
    ) -> PropertyResult<&P> {
        let id = PropertyId::with_index::<P>(index);
        self.ensure_member(handle, id)?;
        self.arena
            .get(handle)
            .ok_or(PropertyError::NotFound(id))?
            .cached_property_instance::<P>(index)
    }

    /// Make sure member `handle` has `id` set.
    pub fn ensure_member(&mut self, handle: SourceHandle, id: PropertyId) -> PropertyResult<()> {
        if !self.group.contains(handle) {
            return Err(PropertyError::NotFound(id));
        }
        let is_set = self
            .arena
            .get(handle)
            .is_some_and(|source| source.is_property_set(&id));
        if is_set {
            return Ok(());
        }

        if self.group.registry.is_group_property(&id) {
            self.run_group_task(id)?;
            let is_set = self
                .arena
                .get(handle)
                .is_some_and(|source| source.is_property_set(&id));
            if is_set {
                Ok(())
            } else {
                Err(PropertyError::NotFound(id))
            }
        } else {
            self.arena
                .get_mut(handle)
                .ok_or(PropertyError::NotFound(id))?
                .ensure(id)
        }
    }

    /// Store a group-scoped property on a member.
    pub fn set_member_property<P: Property>(
        &mut self,
        handle: SourceHandle,
        index: u32,
        value: P,
    ) -> bool {
        if !self.group.contains(handle) {
            return false;
        }
        match self.arena.get_mut(handle) {
            Some(source) => {
                source.set_entangled(index, value);
                true
            }
            None => false,
        }
    }

    fn run_group_task(&mut self, id: PropertyId) -> PropertyResult<()> {
        if self.group.in_flight.contains(&id) {
            return Err(PropertyError::Cycle(id));
        }
        let task = self.group.registry.group_task(&id)?;
        self.group.in_flight.push(id);
        let result = task.compute_properties(self);
        self.group.in_flight.pop();
        result.map_err(|err| PropertyError::from_task_failure(id, err))
    }
}
