//! The on-demand computation engine.
//!
//! Every property kind that is not set at birth is produced by a task. Tasks
//! are handed out by [`TaskFactory`] implementations registered in a
//! [`TaskRegistry`] during plugin loading; after loading the registry is
//! shared read-only through an `Arc` and consulted by [`Source::ensure`] and
//! [`GroupView::ensure`] whenever a property is missing.

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::plugin::RegistryError;
use crate::property::{PropertyError, PropertyId, PropertyResult};
use crate::source::{GroupView, Source};

/// Computes one or more properties of a single source.
///
/// Implementations must set the requested property on `source` (and may set
/// byproducts). Other properties are read through `source.property::<P>()`,
/// which recursively computes them.
pub trait SourceTask: Send + Sync {
    fn compute_properties(&self, source: &mut Source) -> anyhow::Result<()>;
}

/// Computes group-level properties; may also set group-scoped properties on
/// members through [`GroupView::set_member_property`].
pub trait GroupTask: Send + Sync {
    fn compute_properties(&self, group: &mut GroupView<'_>) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub enum TaskHandle {
    Source(Arc<dyn SourceTask>),
    Group(Arc<dyn GroupTask>),
}

impl TaskHandle {
    pub fn source<F>(f: F) -> Self
    where
        F: Fn(&mut Source) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        TaskHandle::Source(Arc::new(SourceFnTask(f)))
    }

    pub fn group<F>(f: F) -> Self
    where
        F: Fn(&mut GroupView<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        TaskHandle::Group(Arc::new(GroupFnTask(f)))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            TaskHandle::Source(_) => "source",
            TaskHandle::Group(_) => "group",
        }
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskHandle::{}", self.kind_name())
    }
}

struct SourceFnTask<F>(F);

impl<F> SourceTask for SourceFnTask<F>
where
    F: Fn(&mut Source) -> anyhow::Result<()> + Send + Sync,
{
    fn compute_properties(&self, source: &mut Source) -> anyhow::Result<()> {
        (self.0)(source)
    }
}

struct GroupFnTask<F>(F);

impl<F> GroupTask for GroupFnTask<F>
where
    F: Fn(&mut GroupView<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn compute_properties(&self, group: &mut GroupView<'_>) -> anyhow::Result<()> {
        (self.0)(group)
    }
}

/// Hands out the task responsible for a property id.
///
/// A factory decides whether tasks are shared between ids, cached, or built
/// per request. `None` means the factory does not produce `id` after all.
pub trait TaskFactory: Send + Sync {
    fn task(&self, id: &PropertyId) -> Option<TaskHandle>;
}

/// One task serving every id the factory is registered for.
pub struct SharedTaskFactory {
    task: TaskHandle,
}

impl SharedTaskFactory {
    pub fn new(task: TaskHandle) -> Self {
        Self { task }
    }
}

impl TaskFactory for SharedTaskFactory {
    fn task(&self, _id: &PropertyId) -> Option<TaskHandle> {
        Some(self.task.clone())
    }
}

/// One prebuilt task per property instance, e.g. one per aperture radius.
pub struct InstanceTaskFactory {
    tasks: HashMap<PropertyId, TaskHandle>,
}

impl InstanceTaskFactory {
    pub fn new<I>(tasks: I) -> Self
    where
        I: IntoIterator<Item = (PropertyId, TaskHandle)>,
    {
        Self {
            tasks: tasks.into_iter().collect(),
        }
    }

    /// Ids this factory has a task for, sorted.
    pub fn property_ids(&self) -> Vec<PropertyId> {
        let mut ids: Vec<PropertyId> = self.tasks.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl TaskFactory for InstanceTaskFactory {
    fn task(&self, id: &PropertyId) -> Option<TaskHandle> {
        self.tasks.get(id).cloned()
    }
}

/// PropertyId → factory map, populated once and read-only afterwards.
#[derive(Default)]
pub struct TaskRegistry {
    factories: Vec<Arc<dyn TaskFactory>>,
    property_to_factory: HashMap<PropertyId, usize>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` as the producer of every id in `ids`.
    ///
    /// Fails without registering anything if one of the ids already has a
    /// producer.
    pub fn register_task_factory<I, T>(&mut self, ids: I, factory: T) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = PropertyId>,
        T: TaskFactory + 'static,
    {
        let ids: Vec<PropertyId> = ids.into_iter().collect();
        for (i, id) in ids.iter().enumerate() {
            if self.property_to_factory.contains_key(id) || ids[..i].contains(id) {
                return Err(RegistryError::DuplicateProducer(*id));
            }
        }

        let index = self.factories.len();
        self.factories.push(Arc::new(factory));
        for id in ids {
            self.property_to_factory.insert(id, index);
        }
        Ok(())
    }

    pub fn produces(&self, id: &PropertyId) -> bool {
        self.property_to_factory.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.property_to_factory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.property_to_factory.is_empty()
    }

    /// Registered ids, sorted.
    pub fn property_ids(&self) -> Vec<PropertyId> {
        let mut ids: Vec<PropertyId> = self.property_to_factory.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn task(&self, id: &PropertyId) -> PropertyResult<TaskHandle> {
        self.property_to_factory
            .get(id)
            .and_then(|&index| self.factories[index].task(id))
            .ok_or(PropertyError::NoProducer(*id))
    }

    pub fn source_task(&self, id: &PropertyId) -> PropertyResult<Arc<dyn SourceTask>> {
        match self.task(id)? {
            TaskHandle::Source(task) => Ok(task),
            TaskHandle::Group(_) => Err(PropertyError::WrongTaskKind {
                id: *id,
                registered: "group",
                requested: "source",
            }),
        }
    }

    pub fn group_task(&self, id: &PropertyId) -> PropertyResult<Arc<dyn GroupTask>> {
        match self.task(id)? {
            TaskHandle::Group(task) => Ok(task),
            TaskHandle::Source(_) => Err(PropertyError::WrongTaskKind {
                id: *id,
                registered: "source",
                requested: "group",
            }),
        }
    }

    pub fn is_group_property(&self, id: &PropertyId) -> bool {
        matches!(self.task(id), Ok(TaskHandle::Group(_)))
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("factories", &self.factories.len())
            .field("properties", &self.property_ids())
            .finish()
    }
}
