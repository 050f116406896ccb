//! Specialized collection types
//!
//! [`TypeInterner`] hands out dense [`TypeKey`]s for asset type names, and
//! [`CacheArena`] stores one lazily computed value per key. Both are shared
//! behind `&self` so analyzers can be queried from several threads.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Interned asset type name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(u32);

impl TypeKey {
    /// Dense index of this key
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Default)]
struct InternerInner {
    lookup: HashMap<String, TypeKey>,
    names: Vec<Arc<str>>,
}

/// String interner for asset type names
#[derive(Default)]
pub struct TypeInterner {
    inner: RwLock<InternerInner>,
}

impl TypeInterner {
    /// Create an empty interner
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a name, returning the existing key when already known
    pub fn intern(&self, name: &str) -> TypeKey {
        if let Some(key) = self.get(name) {
            return key;
        }
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        // Another writer may have won the race between the read and write locks
        if let Some(&key) = inner.lookup.get(name) {
            return key;
        }
        let key = TypeKey(inner.names.len() as u32);
        inner.names.push(Arc::from(name));
        inner.lookup.insert(name.to_string(), key);
        key
    }

    /// Look up a name without interning it
    pub fn get(&self, name: &str) -> Option<TypeKey> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.lookup.get(name).copied()
    }

    /// Resolve a key back to its name
    pub fn resolve(&self, key: TypeKey) -> Option<Arc<str>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.names.get(key.index()).cloned()
    }

    /// Number of interned names
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).names.len()
    }

    /// Whether nothing has been interned yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Write-once-per-key cache indexed by [`TypeKey`]
///
/// A slot holds `Some(Arc<T>)` once computed. Concurrent first computations
/// of the same key may both run; the last write wins, so `T` must be a pure
/// function of its input.
pub struct CacheArena<T> {
    slots: RwLock<Vec<Option<Arc<T>>>>,
}

impl<T> Default for CacheArena<T> {
    fn default() -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
        }
    }
}

impl<T> CacheArena<T> {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for a key
    pub fn get(&self, key: TypeKey) -> Option<Arc<T>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(key.index()).and_then(Clone::clone)
    }

    /// Store a value, returning the shared handle
    pub fn insert(&self, key: TypeKey, value: T) -> Arc<T> {
        let value = Arc::new(value);
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.len() <= key.index() {
            slots.resize_with(key.index() + 1, || None);
        }
        slots[key.index()] = Some(Arc::clone(&value));
        value
    }

    /// Return the cached value or compute and store it
    ///
    /// `compute` runs without holding the lock.
    pub fn get_or_insert_with(&self, key: TypeKey, compute: impl FnOnce() -> T) -> Arc<T> {
        if let Some(value) = self.get(key) {
            return value;
        }
        self.insert(key, compute())
    }

    /// Number of populated slots
    pub fn len(&self) -> usize {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether no slot is populated
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached value
    pub fn clear(&self) {
        self.slots.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
