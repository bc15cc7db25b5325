//! Volatile in-process backend.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use super::Backend;
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Inner {
    values: RefCell<BTreeMap<String, String>>,
    available: Cell<bool>,
    fail_writes: Cell<bool>,
}

/// In-memory backend.
///
/// Clones share the same map, so a test can keep a handle after moving the
/// store into a chain. Availability and write failures can be toggled to
/// exercise degradation paths.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    name: &'static str,
    inner: Rc<Inner>,
}

impl MemoryStore {
    /// Create an empty, available store.
    pub fn new(name: &'static str) -> Self {
        let inner = Inner { available: Cell::new(true), ..Inner::default() };
        Self { name, inner: Rc::new(inner) }
    }

    /// Mark the store present or absent.
    pub fn set_available(&self, available: bool) {
        self.inner.available.set(available);
    }

    /// Make every `set` and `remove` fail as if the quota were exhausted.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.set(fail);
    }

    /// Store a raw value without validation.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.inner.values.borrow_mut().insert(key.to_string(), value.to_string());
    }

    /// Peek at a raw value regardless of availability.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner.values.borrow().get(key).cloned()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.inner.values.borrow().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.values.borrow().is_empty()
    }

    fn check_available(&self) -> Result<()> {
        if self.inner.available.get() {
            Ok(())
        } else {
            Err(Error::BackendUnavailable { backend: self.name })
        }
    }

    fn check_writable(&self) -> Result<()> {
        self.check_available()?;
        if self.inner.fail_writes.get() {
            return Err(Error::backend(self.name, "write rejected"));
        }
        Ok(())
    }
}

impl Backend for MemoryStore {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_available(&self) -> bool {
        self.inner.available.get()
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        Ok(self.raw(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        self.insert_raw(key, value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        self.inner.values.borrow_mut().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.check_available()?;
        Ok(self.inner.values.borrow().keys().cloned().collect())
    }
}
