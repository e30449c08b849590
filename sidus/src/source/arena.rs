use hashbrown::HashMap;

use super::Source;

/// Stable handle to a source stored in a [`SourceArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceHandle(u32);

impl SourceHandle {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Owner of every in-flight source of a frame.
///
/// Handles are never reused within an arena, so a handle kept after its source
/// was removed simply resolves to `None`.
#[derive(Debug, Default)]
pub struct SourceArena {
    sources: HashMap<SourceHandle, Source>,
    next_handle: u32,
}

impl SourceArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: Source) -> SourceHandle {
        let handle = SourceHandle(self.next_handle);
        self.next_handle += 1;
        self.sources.insert(handle, source);
        handle
    }

    pub fn remove(&mut self, handle: SourceHandle) -> Option<Source> {
        self.sources.remove(&handle)
    }

    #[inline]
    pub fn get(&self, handle: SourceHandle) -> Option<&Source> {
        self.sources.get(&handle)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: SourceHandle) -> Option<&mut Source> {
        self.sources.get_mut(&handle)
    }

    #[inline]
    pub fn contains(&self, handle: SourceHandle) -> bool {
        self.sources.contains_key(&handle)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Move the sources behind `handles` into a new arena, keeping their
    /// handles. Handles missing from `self` are skipped.
    ///
    /// The detached arena continues the handle sequence of `self`, so sources
    /// inserted later into either arena never collide with detached handles.
    pub fn detach(&mut self, handles: &[SourceHandle]) -> SourceArena {
        let mut detached = SourceArena {
            sources: HashMap::with_capacity(handles.len()),
            next_handle: self.next_handle,
        };
        for &handle in handles {
            if let Some(source) = self.sources.remove(&handle) {
                detached.sources.insert(handle, source);
            }
        }
        detached
    }
}
