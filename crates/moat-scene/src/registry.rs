use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use moat_core::{ConfigError, PreconditionError};

/// Stable index into a [`Registry<T>`]. Resolved once when the scene is
/// built; draws and constant writes go through the index, never a name.
///
/// The index doubles as the entity's fixed slot in per-frame constant
/// buffers.
pub struct Handle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }
}

// Manual impls: derives would require `T: Clone` etc.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.index)
    }
}

/// Append-only, name-addressable store. Entities live until shutdown, so
/// handles never dangle within one registry.
pub struct Registry<T> {
    kind: &'static str,
    items: Vec<T>,
    names: Vec<String>,
    by_name: HashMap<String, Handle<T>>,
}

impl<T> Registry<T> {
    /// `kind` names the entity type in error messages.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            items: Vec::new(),
            names: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, item: T) -> Result<Handle<T>, ConfigError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(ConfigError::DuplicateName {
                kind: self.kind,
                name,
            });
        }
        let handle = Handle::new(self.items.len() as u32);
        self.items.push(item);
        self.names.push(name.clone());
        self.by_name.insert(name, handle);
        Ok(handle)
    }

    /// Name to handle. Meant for scene construction only.
    pub fn resolve(&self, name: &str) -> Result<Handle<T>, ConfigError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownName {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    pub fn get(&self, handle: Handle<T>) -> Result<&T, PreconditionError> {
        let kind = self.kind;
        self.items
            .get(handle.index())
            .ok_or(PreconditionError::StaleHandle {
                kind,
                index: handle.index(),
            })
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Result<&mut T, PreconditionError> {
        let kind = self.kind;
        self.items
            .get_mut(handle.index())
            .ok_or(PreconditionError::StaleHandle {
                kind,
                index: handle.index(),
            })
    }

    pub fn name(&self, handle: Handle<T>) -> Option<&str> {
        self.names.get(handle.index()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (Handle::new(i as u32), item))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
