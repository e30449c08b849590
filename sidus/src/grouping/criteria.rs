use crate::plugins::PixelBoundaries;
use crate::property::PropertyResult;
use crate::source::Source;

/// Symmetric pairwise predicate deciding whether two sources belong to the
/// same group.
///
/// `prepare` runs once per incoming source and computes whatever
/// `should_group` reads, so the predicate itself stays a pure read of cached
/// properties.
pub trait GroupingCriteria: Send + Sync {
    fn name(&self) -> &str;

    fn prepare(&self, _source: &mut Source) -> PropertyResult<()> {
        Ok(())
    }

    fn should_group(&self, a: &Source, b: &Source) -> bool;

    /// True when two sources can only match if their rows overlap, which lets
    /// groups lying entirely above the segmentation safe line be closed early.
    fn is_vertically_local(&self) -> bool {
        false
    }
}

/// Groups sources whose pixel bounding boxes overlap.
#[derive(Debug, Default, Clone, Copy)]
pub struct OverlappingBoundariesCriteria;

impl GroupingCriteria for OverlappingBoundariesCriteria {
    fn name(&self) -> &str {
        "overlapping_boundaries"
    }

    fn prepare(&self, source: &mut Source) -> PropertyResult<()> {
        source.property::<PixelBoundaries>().map(|_| ())
    }

    fn should_group(&self, a: &Source, b: &Source) -> bool {
        match (
            a.cached_property::<PixelBoundaries>(),
            b.cached_property::<PixelBoundaries>(),
        ) {
            (Ok(a), Ok(b)) => a.bbox.overlaps(&b.bbox),
            _ => false,
        }
    }

    fn is_vertically_local(&self) -> bool {
        true
    }
}

/// Groups sources split from the same detection.
#[derive(Debug, Default, Clone, Copy)]
pub struct SplitSourcesCriteria;

impl GroupingCriteria for SplitSourcesCriteria {
    fn name(&self) -> &str {
        "split_sources"
    }

    fn should_group(&self, a: &Source, b: &Source) -> bool {
        a.id().detection_id == b.id().detection_id
    }

    // Siblings of one detection reach grouping before the next safe line.
    fn is_vertically_local(&self) -> bool {
        true
    }
}

/// Every source forms its own group.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGroupingCriteria;

impl GroupingCriteria for NoGroupingCriteria {
    fn name(&self) -> &str {
        "no_grouping"
    }

    fn should_group(&self, _a: &Source, _b: &Source) -> bool {
        false
    }

    fn is_vertically_local(&self) -> bool {
        true
    }
}
