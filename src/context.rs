//! Ambient context carrier
//!
//! A [`Context`] is an immutable chain of typed entries threaded explicitly through a call
//! chain. Adding an entry produces a new `Context` that shares its parent's chain, so
//! branches forked from the same value never observe each other's additions.
//!
//! Entries are addressed by a [`ContextKey`], which carries a process-unique id. Keys are
//! compared by id, never by name, so two libraries that happen to pick the same name cannot
//! read each other's values.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);
static TYPE_KEY_IDS: OnceLock<Mutex<HashMap<TypeId, u64>>> = OnceLock::new();

/// Typed, identity-compared key for a [`Context`] entry.
pub struct ContextKey<T> {
    id: u64,
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> ContextKey<T> {
    /// Allocate a fresh key. The name is only used for debug output.
    pub fn new(name: &'static str) -> Self {
        Self {
            id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed),
            name,
            _marker: PhantomData,
        }
    }

    /// The process-wide key for values of type `T`.
    ///
    /// Every call for the same `T` returns a key with the same id, so independent components
    /// storing and reading a `T` meet in the same slot. The id is still opaque: it does not
    /// collide with any key made by [`ContextKey::new`].
    pub fn for_type(name: &'static str) -> Self {
        let mut ids = TYPE_KEY_IDS
            .get_or_init(Default::default)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let id = *ids
            .entry(TypeId::of::<T>())
            .or_insert_with(|| NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            id,
            name,
            _marker: PhantomData,
        }
    }
}

impl<T> ContextKey<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name,
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for ContextKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for ContextKey<T> {}

impl<T> fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextKey")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

struct Entry {
    key_id: u64,
    key_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<Entry>>,
}

/// Immutable, append-only carrier of ambient values.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Entry>>,
}

impl Context {
    /// An empty context, the root of every call chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a child context with `value` stored under `key`.
    ///
    /// `self` is left untouched. A later entry shadows an earlier one under the same key.
    pub fn with_value<T: Send + Sync + 'static>(&self, key: &ContextKey<T>, value: T) -> Self {
        self.with_shared(key, Arc::new(value))
    }

    /// Like [`Context::with_value`] for a value that is already reference counted.
    pub fn with_shared<T: Send + Sync + 'static>(
        &self,
        key: &ContextKey<T>,
        value: Arc<T>,
    ) -> Self {
        self.push(key.id, key.name, value)
    }

    fn push(&self, key_id: u64, key_name: &'static str, value: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            head: Some(Arc::new(Entry {
                key_id,
                key_name,
                value,
                parent: self.head.clone(),
            })),
        }
    }

    /// Look up the newest entry stored under `key`.
    pub fn value<T: Send + Sync + 'static>(&self, key: &ContextKey<T>) -> Option<Arc<T>> {
        let entry = self.find(key.id)?;
        match Arc::clone(&entry.value).downcast::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!(
                    "context entry '{}' does not hold the expected type; treating it as absent",
                    key.name
                );
                None
            }
        }
    }

    /// Whether an entry is stored under `key`, regardless of whether it is well typed.
    pub fn contains<T>(&self, key: &ContextKey<T>) -> bool {
        self.find(key.id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    fn find(&self, key_id: u64) -> Option<&Entry> {
        let mut cursor = self.head.as_deref();
        while let Some(entry) = cursor {
            if entry.key_id == key_id {
                return Some(entry);
            }
            cursor = entry.parent.as_deref();
        }
        None
    }

    fn key_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let mut cursor = self.head.as_deref();
        while let Some(entry) = cursor {
            names.push(entry.key_name);
            cursor = entry.parent.as_deref();
        }
        names
    }

    /// Store an arbitrary value under `key`'s id, bypassing the type tie. Only tests need this,
    /// to model a malformed entry.
    #[cfg(test)]
    pub(crate) fn with_untyped<T, V: Send + Sync + 'static>(
        &self,
        key: &ContextKey<T>,
        value: V,
    ) -> Self {
        self.push(key.id, key.name, Arc::new(value))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("keys", &self.key_names())
            .finish()
    }
}
