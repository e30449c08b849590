//! Sources, groups and the per-frame source arena.
//!
//! A [`Source`] owns its footprint and its property holders; properties that
//! are not yet set are produced on demand through the [`TaskRegistry`] the
//! source was created with. Groups never own sources directly: they hold
//! [`SourceHandle`]s into a [`SourceArena`], so merging and splitting groups
//! only edits handle lists.

mod arena;
mod group;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub use arena::{SourceArena, SourceHandle};
pub use group::{GroupId, GroupView, SourceGroup};

use crate::image::DetectionFrame;
use crate::math::{Aabb, PixelCoordinate};
use crate::property::{Property, PropertyError, PropertyHolder, PropertyId, PropertyResult};
use crate::task::TaskRegistry;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique id of a source plus the id of the detection it descends from.
///
/// Sources produced by splitting (partition or deblending) get a fresh `id`
/// and keep the parent's `detection_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId {
    pub id: u64,
    pub detection_id: u64,
}

impl SourceId {
    fn next_detection() -> Self {
        let id = NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id,
            detection_id: id,
        }
    }

    fn child(&self) -> Self {
        Self {
            id: NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed),
            detection_id: self.detection_id,
        }
    }
}

impl Property for SourceId {}

/// Footprint of a source: the pixels it was segmented (or split) from.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelCoordinateList {
    pixels: Arc<[PixelCoordinate]>,
}

impl PixelCoordinateList {
    pub fn new(pixels: Vec<PixelCoordinate>) -> Self {
        Self {
            pixels: pixels.into(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[PixelCoordinate] {
        &self.pixels
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, PixelCoordinate> {
        self.pixels.iter()
    }

    pub fn bounding_box(&self) -> Option<Aabb> {
        Aabb::from_points(self.pixels.iter())
    }
}

impl Property for PixelCoordinateList {}

impl<'a> IntoIterator for &'a PixelCoordinateList {
    type Item = &'a PixelCoordinate;
    type IntoIter = std::slice::Iter<'a, PixelCoordinate>;

    fn into_iter(self) -> Self::IntoIter {
        self.pixels.iter()
    }
}

/// A candidate object: an immutable footprint plus lazily computed properties.
pub struct Source {
    id: SourceId,
    pixels: PixelCoordinateList,
    holder: PropertyHolder,
    /// Properties set by group tasks; cleared when group membership changes.
    entangled: PropertyHolder,
    registry: Arc<TaskRegistry>,
    in_flight: Vec<PropertyId>,
}

impl Source {
    pub fn new(pixels: Vec<PixelCoordinate>, registry: Arc<TaskRegistry>) -> Self {
        Self::with_id(SourceId::next_detection(), pixels, registry)
    }

    fn with_id(id: SourceId, pixels: Vec<PixelCoordinate>, registry: Arc<TaskRegistry>) -> Self {
        let pixels = PixelCoordinateList::new(pixels);
        let mut holder = PropertyHolder::new();
        holder.set(0, pixels.clone());
        holder.set(0, id);
        Self {
            id,
            pixels,
            holder,
            entangled: PropertyHolder::new(),
            registry,
            in_flight: Vec::new(),
        }
    }

    /// Child source over `pixels` that inherits the detection frame and the
    /// detection id of `self`.
    pub fn derive(&self, pixels: Vec<PixelCoordinate>) -> Source {
        let mut child = Source::with_id(self.id.child(), pixels, Arc::clone(&self.registry));
        if let Ok(frame) = self.holder.get::<DetectionFrame>(0) {
            child.holder.set(0, frame.clone());
        }
        child
    }

    #[inline]
    pub fn id(&self) -> SourceId {
        self.id
    }

    #[inline]
    pub fn pixels(&self) -> &PixelCoordinateList {
        &self.pixels
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.pixels.len()
    }

    #[inline]
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn detection_frame(&self) -> PropertyResult<&DetectionFrame> {
        self.cached_property::<DetectionFrame>()
    }

    /// Instance 0 of `P`, computing it first if necessary.
    pub fn property<P: Property>(&mut self) -> PropertyResult<&P> {
        self.property_instance::<P>(0)
    }

    pub fn property_instance<P: Property>(&mut self, index: u32) -> PropertyResult<&P> {
        self.ensure(PropertyId::with_index::<P>(index))?;
        self.cached_property_instance::<P>(index)
    }

    /// Instance 0 of `P` if it is already set; never computes.
    pub fn cached_property<P: Property>(&self) -> PropertyResult<&P> {
        self.cached_property_instance::<P>(0)
    }

    pub fn cached_property_instance<P: Property>(&self, index: u32) -> PropertyResult<&P> {
        self.holder
            .get::<P>(index)
            .or_else(|_| self.entangled.get::<P>(index))
    }

    pub fn set_property<P: Property>(&mut self, value: P) {
        self.set_property_instance(0, value);
    }

    pub fn set_property_instance<P: Property>(&mut self, index: u32, value: P) {
        debug_assert!(
            !PropertyId::with_index::<P>(index).is_kind_of::<PixelCoordinateList>(),
            "the footprint of a source is fixed at creation"
        );
        self.holder.set(index, value);
    }

    pub fn is_property_set(&self, id: &PropertyId) -> bool {
        self.holder.is_set(id) || self.entangled.is_set(id)
    }

    pub(crate) fn set_entangled<P: Property>(&mut self, index: u32, value: P) {
        self.entangled.set(index, value);
    }

    pub(crate) fn clear_entangled(&mut self) {
        self.entangled.clear();
    }

    /// Make sure `id` is set, running its source task if needed.
    pub fn ensure(&mut self, id: PropertyId) -> PropertyResult<()> {
        if self.is_property_set(&id) {
            return Ok(());
        }
        if self.in_flight.contains(&id) {
            return Err(PropertyError::Cycle(id));
        }

        let task = self.registry.source_task(&id)?;
        self.in_flight.push(id);
        let result = task.compute_properties(self);
        self.in_flight.pop();
        result.map_err(|err| PropertyError::from_task_failure(id, err))?;

        if self.is_property_set(&id) {
            Ok(())
        } else {
            Err(PropertyError::NotFound(id))
        }
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.id)
            .field("area", &self.pixels.len())
            .field("properties", &self.holder)
            .finish()
    }
}
