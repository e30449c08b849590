//! Property identity and per-entity storage.
//!
//! A [`PropertyId`] names a property kind (its Rust type) plus an instance
//! index, so several instances of the same measurement (e.g. one aperture
//! flux per configured radius) can live side by side. A [`PropertyHolder`]
//! stores at most one value per id and never computes anything itself; lazy
//! computation is layered on top by the task engine.


use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use hashbrown::HashMap;
use thiserror::Error;

/// Marker for values that can be stored in a [`PropertyHolder`].
///
/// The engine never inspects property contents, only their identity.
pub trait Property: Any + Send + Sync {}

/// Identity of a property: its kind plus an instance index.
#[derive(Clone, Copy)]
pub struct PropertyId {
    type_id: TypeId,
    type_name: &'static str,
    index: u32,
}

impl PropertyId {
    /// Id of instance 0 of `P`.
    pub fn of<P: Property>() -> Self {
        Self::with_index::<P>(0)
    }

    pub fn with_index<P: Property>(index: u32) -> Self {
        Self {
            type_id: TypeId::of::<P>(),
            type_name: std::any::type_name::<P>(),
            index,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Same kind, different instance.
    pub fn instance(&self, index: u32) -> Self {
        Self { index, ..*self }
    }

    pub fn is_kind_of<P: Property>(&self) -> bool {
        self.type_id == TypeId::of::<P>()
    }

    pub fn same_kind(&self, other: &PropertyId) -> bool {
        self.type_id == other.type_id
    }

    /// Short kind name without the module path.
    pub fn kind_name(&self) -> &'static str {
        short_type_name(self.type_name)
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    // Generic arguments would contain `::` as well; property kinds are plain structs.
    full.rsplit("::").next().unwrap_or(full)
}

impl PartialEq for PropertyId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.index == other.index
    }
}

impl Eq for PropertyId {}

impl Hash for PropertyId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.index.hash(state);
    }
}

impl Ord for PropertyId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.type_name
            .cmp(other.type_name)
            .then_with(|| self.type_id.cmp(&other.type_id))
            .then_with(|| self.index.cmp(&other.index))
    }
}

impl PartialOrd for PropertyId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind_name(), self.index)
    }
}

impl fmt::Debug for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyId({self})")
    }
}

/// Why a property could not be returned.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PropertyError {
    #[error("property {0} not found")]
    NotFound(PropertyId),
    #[error("no task factory produces property {0}")]
    NoProducer(PropertyId),
    #[error("property {id} is produced by a {registered} task, requested from a {requested}")]
    WrongTaskKind {
        id: PropertyId,
        registered: &'static str,
        requested: &'static str,
    },
    #[error("dependency cycle while computing property {0}")]
    Cycle(PropertyId),
    #[error("task computing property {id} failed: {message}")]
    TaskFailed { id: PropertyId, message: String },
}

impl PropertyError {
    pub fn property_id(&self) -> PropertyId {
        match self {
            PropertyError::NotFound(id)
            | PropertyError::NoProducer(id)
            | PropertyError::Cycle(id) => *id,
            PropertyError::WrongTaskKind { id, .. } | PropertyError::TaskFailed { id, .. } => *id,
        }
    }

    /// Wrap a task failure for `id`. Property errors raised by nested
    /// lookups inside the task are passed through unchanged.
    pub fn from_task_failure(id: PropertyId, err: anyhow::Error) -> Self {
        match err.downcast::<PropertyError>() {
            Ok(inner) => inner,
            Err(err) => PropertyError::TaskFailed {
                id,
                message: format!("{err:#}"),
            },
        }
    }
}

pub type PropertyResult<T> = Result<T, PropertyError>;

/// Map from [`PropertyId`] to an owned property value.
#[derive(Default)]
pub struct PropertyHolder {
    properties: HashMap<PropertyId, Box<dyn Any + Send + Sync>>,
}

impl PropertyHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` as instance `index`, replacing any previous value.
    pub fn set<P: Property>(&mut self, index: u32, value: P) {
        self.properties
            .insert(PropertyId::with_index::<P>(index), Box::new(value));
    }

    pub fn get<P: Property>(&self, index: u32) -> PropertyResult<&P> {
        let id = PropertyId::with_index::<P>(index);
        self.properties
            .get(&id)
            .and_then(|boxed| boxed.downcast_ref::<P>())
            .ok_or(PropertyError::NotFound(id))
    }

    pub fn is_set(&self, id: &PropertyId) -> bool {
        self.properties.contains_key(id)
    }

    pub fn remove(&mut self, id: &PropertyId) -> bool {
        self.properties.remove(id).is_some()
    }

    pub fn clear(&mut self) {
        self.properties.clear();
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Ids currently stored, sorted.
    pub fn property_ids(&self) -> Vec<PropertyId> {
        let mut ids: Vec<PropertyId> = self.properties.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl fmt::Debug for PropertyHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.property_ids()).finish()
    }
}
