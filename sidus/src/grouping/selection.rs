use std::sync::Arc;

use crate::source::Source;

/// Decides which sources are final, so groups made only of them can close.
pub trait SelectionCriteria: Send + Sync {
    fn must_process(&self, source: &Source) -> bool;
}

/// Selects sources lying entirely above `line`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSelectionCriteria {
    pub line: usize,
}

impl SelectionCriteria for LineSelectionCriteria {
    fn must_process(&self, source: &Source) -> bool {
        source
            .pixels()
            .bounding_box()
            .is_some_and(|bbox| bbox.y_max < self.line)
    }
}

/// Selects everything; used at the end of a frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectAllCriteria;

impl SelectionCriteria for SelectAllCriteria {
    fn must_process(&self, _source: &Source) -> bool {
        true
    }
}

/// Request to close every open group whose members are all selected.
#[derive(Clone)]
pub struct ProcessSources {
    pub selection: Arc<dyn SelectionCriteria>,
}

impl ProcessSources {
    pub fn new<S: SelectionCriteria + 'static>(selection: S) -> Self {
        Self {
            selection: Arc::new(selection),
        }
    }

    pub fn above_line(line: usize) -> Self {
        Self::new(LineSelectionCriteria { line })
    }

    pub fn all() -> Self {
        Self::new(SelectAllCriteria)
    }
}

impl std::fmt::Debug for ProcessSources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProcessSources")
    }
}
