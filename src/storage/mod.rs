//! Key-value storage backends.
//!
//! Two durable backends exist: [`LocalStore`], a file-backed string map in
//! the spirit of browser local storage, and [`CookieStore`], a cookie jar
//! with max-age expiry that mirrors the small records. [`MemoryStore`] is a
//! volatile stand-in used for ephemeral sessions and fault injection.
//!
//! [`BackendChain`] orders backends by priority. Writes go to every backend
//! that accepts the key, each inside its own failure boundary; reads return
//! the first valid value.

mod cookie;
mod local;
mod memory;

pub use cookie::{Cookie, CookieStore, MAX_COOKIE_BYTES};
pub use local::{DEFAULT_LOCAL_QUOTA_BYTES, LocalStore};
pub use memory::MemoryStore;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Fixed storage key namespace, stable across versions.
pub mod keys {
    /// Current preference record.
    pub const PREFERENCE: &str = "langpref.preference";
    /// Detection history log.
    pub const HISTORY: &str = "langpref.detection_history";
    /// Explicit user override.
    pub const OVERRIDE: &str = "langpref.user_override";
    /// Prefix of each backup snapshot key.
    pub const BACKUP_PREFIX: &str = "langpref.backup.";

    /// Keys the cookie backend mirrors.
    pub const COOKIE_MIRRORED: &[&str] = &[PREFERENCE, OVERRIDE];

    /// Storage key for a backup snapshot id.
    pub fn backup(id: &str) -> String {
        format!("{BACKUP_PREFIX}{id}")
    }
}

/// A string key-value store.
///
/// Methods take `&self`; implementations use interior mutability or go to
/// disk on every call. Failures are reported, never panicked.
pub trait Backend {
    /// Short stable name used in logs and status output.
    fn name(&self) -> &'static str;

    /// Whether the backend exists in this environment at all.
    fn is_available(&self) -> bool;

    /// Whether this backend stores `key`.
    fn accepts(&self, _key: &str) -> bool {
        true
    }

    /// Read a raw value.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a raw value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value. Deleting a missing key succeeds.
    fn remove(&self, key: &str) -> Result<()>;

    /// Keys currently stored.
    fn keys(&self) -> Result<Vec<String>>;
}

/// Result of one backend's part in a chained write.
#[derive(Debug)]
pub struct BackendOutcome {
    /// Backend name.
    pub backend: &'static str,
    /// What happened.
    pub result: Result<()>,
}

/// Per-backend outcomes of a chained write or delete.
#[derive(Debug, Default)]
pub struct WriteReport {
    /// One entry per backend that was attempted.
    pub outcomes: Vec<BackendOutcome>,
}

impl WriteReport {
    /// True when at least one backend stored the value.
    pub fn any_succeeded(&self) -> bool {
        self.outcomes.iter().any(|o| o.result.is_ok())
    }

    /// True when every attempted backend succeeded (vacuously true if none were).
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Number of backends attempted.
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    /// Backends that failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&'static str, &Error)> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err().map(|e| (o.backend, e)))
    }

    /// Collapse into a `Result`: `Ok` if anything succeeded, otherwise the
    /// first failure (or `BackendUnavailable` when nothing was attempted).
    pub fn into_result(self, key: &str) -> Result<()> {
        if self.any_succeeded() {
            return Ok(());
        }
        match self.outcomes.into_iter().find_map(|o| o.result.err()) {
            Some(err) => Err(err),
            None => {
                debug!(key, "no backend accepted write");
                Err(Error::BackendUnavailable { backend: "all" })
            },
        }
    }
}

/// Outcome of a chained read.
#[derive(Debug)]
pub enum ChainRead<T> {
    /// A backend returned a value that parsed and validated.
    Found {
        /// The parsed value.
        value: T,
        /// Backend that supplied it.
        backend: &'static str,
    },
    /// No backend held a valid value and at least one held garbage.
    Corrupt(Error),
    /// No backend held the key.
    Missing,
}

impl<T> ChainRead<T> {
    /// The value, if one was found.
    pub fn found(self) -> Option<T> {
        match self {
            ChainRead::Found { value, .. } => Some(value),
            ChainRead::Corrupt(_) | ChainRead::Missing => None,
        }
    }
}

/// Availability of one backend.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BackendStatus {
    /// Backend name.
    pub name: &'static str,
    /// Whether the backend exists.
    pub available: bool,
    /// Priority position, 0 = primary.
    pub priority: usize,
}

/// Priority-ordered set of backends.
pub struct BackendChain {
    backends: Vec<Box<dyn Backend>>,
}

impl BackendChain {
    /// Create a chain; the first backend is the primary.
    pub fn new(backends: Vec<Box<dyn Backend>>) -> Self {
        Self { backends }
    }

    /// Number of backends in the chain.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// True when the chain has no backends.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Availability of every backend, in priority order.
    pub fn status(&self) -> Vec<BackendStatus> {
        self.backends
            .iter()
            .enumerate()
            .map(|(priority, b)| BackendStatus {
                name: b.name(),
                available: b.is_available(),
                priority,
            })
            .collect()
    }

    /// True if any backend is available.
    pub fn any_available(&self) -> bool {
        self.backends.iter().any(|b| b.is_available())
    }

    /// Write `value` to every backend that accepts `key`.
    ///
    /// Each backend is attempted independently; a failure is logged and
    /// recorded in the report but never stops the others.
    pub fn write(&self, key: &str, value: &str) -> WriteReport {
        self.for_each_accepting(key, |backend| backend.set(key, value), "write")
    }

    /// Delete `key` from every backend that accepts it.
    pub fn remove(&self, key: &str) -> WriteReport {
        self.for_each_accepting(key, |backend| backend.remove(key), "remove")
    }

    fn for_each_accepting(
        &self,
        key: &str,
        op: impl Fn(&dyn Backend) -> Result<()>,
        verb: &'static str,
    ) -> WriteReport {
        let mut report = WriteReport::default();
        for backend in self.backends.iter().filter(|b| b.accepts(key)) {
            let result = if backend.is_available() {
                op(backend.as_ref())
            } else {
                Err(Error::BackendUnavailable { backend: backend.name() })
            };
            match &result {
                Ok(()) => debug!(backend = backend.name(), key, verb, "storage op ok"),
                Err(Error::BackendUnavailable { .. }) => {
                    debug!(backend = backend.name(), key, verb, "backend unavailable, skipped");
                },
                Err(e) => warn!(backend = backend.name(), key, verb, error = %e, "storage op failed"),
            }
            report.outcomes.push(BackendOutcome { backend: backend.name(), result });
        }
        report
    }

    /// Read `key` from the first backend holding a value that `parse` accepts.
    ///
    /// Unavailable backends and backend errors count as misses. Values that
    /// fail `parse` are logged and skipped so the next backend gets a chance.
    pub fn read<T>(&self, key: &str, parse: impl Fn(&str) -> Result<T>) -> ChainRead<T> {
        let mut corrupt = None;
        for backend in self.backends.iter().filter(|b| b.accepts(key) && b.is_available()) {
            let raw = match backend.get(key) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!(backend = backend.name(), key, error = %e, "storage read failed");
                    if e.is_absent_like() && corrupt.is_none() {
                        corrupt = Some(e);
                    }
                    continue;
                },
            };
            match parse(&raw) {
                Ok(value) => return ChainRead::Found { value, backend: backend.name() },
                Err(e) => {
                    warn!(backend = backend.name(), key, error = %e, "discarding invalid stored value");
                    if corrupt.is_none() {
                        corrupt = Some(e);
                    }
                },
            }
        }
        match corrupt {
            Some(Error::BackendUnavailable { .. }) | None => ChainRead::Missing,
            Some(e) => ChainRead::Corrupt(e),
        }
    }

    /// Read the raw value from the named backend only.
    pub fn read_raw_from(&self, backend: &str, key: &str) -> Result<Option<String>> {
        let target = self
            .backends
            .iter()
            .find(|b| b.name() == backend)
            .ok_or_else(|| Error::invalid_input(format!("unknown backend '{backend}'")))?;
        if !target.is_available() {
            return Err(Error::BackendUnavailable { backend: target.name() });
        }
        target.get(key)
    }

    /// Union of keys with the given prefix across available backends.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for backend in self.backends.iter().filter(|b| b.is_available()) {
            match backend.keys() {
                Ok(keys) => {
                    for key in keys.into_iter().filter(|k| k.starts_with(prefix)) {
                        if !out.contains(&key) {
                            out.push(key);
                        }
                    }
                },
                Err(e) => warn!(backend = backend.name(), error = %e, "listing keys failed"),
            }
        }
        out.sort();
        out
    }
}

impl std::fmt::Debug for BackendChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendChain")
            .field("backends", &self.backends.iter().map(|b| b.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse_number(raw: &str) -> Result<u32> {
        raw.parse().map_err(|_| Error::corrupt("n", "not a number"))
    }

    #[test]
    fn test_write_reaches_every_backend() {
        let primary = MemoryStore::new("primary");
        let secondary = MemoryStore::new("secondary");
        let chain = BackendChain::new(vec![Box::new(primary.clone()), Box::new(secondary.clone())]);

        let report = chain.write("k", "1");
        assert_eq!(report.attempted(), 2);
        assert!(report.all_succeeded());
        assert_eq!(primary.raw("k").as_deref(), Some("1"));
        assert_eq!(secondary.raw("k").as_deref(), Some("1"));
    }

    #[test]
    fn test_one_failure_does_not_block_other() {
        let primary = MemoryStore::new("primary");
        primary.fail_writes(true);
        let secondary = MemoryStore::new("secondary");
        let chain = BackendChain::new(vec![Box::new(primary.clone()), Box::new(secondary.clone())]);

        let report = chain.write("k", "1");
        assert!(report.any_succeeded());
        assert!(!report.all_succeeded());
        assert_eq!(report.failures().count(), 1);
        assert_eq!(secondary.raw("k").as_deref(), Some("1"));
        assert!(report.into_result("k").is_ok());
    }

    #[test]
    fn test_all_failures_surface() {
        let primary = MemoryStore::new("primary");
        primary.set_available(false);
        let secondary = MemoryStore::new("secondary");
        secondary.fail_writes(true);
        let chain = BackendChain::new(vec![Box::new(primary), Box::new(secondary)]);

        let err = chain.write("k", "1").into_result("k").unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable { .. } | Error::Backend { .. }));
    }

    #[test]
    fn test_read_falls_back_past_corrupt_primary() {
        let primary = MemoryStore::new("primary");
        primary.insert_raw("n", "garbage");
        let secondary = MemoryStore::new("secondary");
        secondary.insert_raw("n", "7");
        let chain = BackendChain::new(vec![Box::new(primary), Box::new(secondary)]);

        match chain.read("n", parse_number) {
            ChainRead::Found { value, backend } => {
                assert_eq!(value, 7);
                assert_eq!(backend, "secondary");
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_read_reports_corrupt_and_missing() {
        let only = MemoryStore::new("only");
        let chain = BackendChain::new(vec![Box::new(only.clone())]);
        assert!(matches!(chain.read("n", parse_number), ChainRead::Missing));

        only.insert_raw("n", "garbage");
        assert!(matches!(chain.read("n", parse_number), ChainRead::Corrupt(_)));
    }

    #[test]
    fn test_status_reports_priority() {
        let secondary = MemoryStore::new("secondary");
        secondary.set_available(false);
        let chain = BackendChain::new(vec![Box::new(MemoryStore::new("primary")), Box::new(secondary)]);
        let status = chain.status();
        assert_eq!(status[0], BackendStatus { name: "primary", available: true, priority: 0 });
        assert!(!status[1].available);
        assert!(chain.any_available());
    }

    #[test]
    fn test_keys_with_prefix_merges() {
        let a = MemoryStore::new("a");
        a.insert_raw("langpref.backup.1", "x");
        let b = MemoryStore::new("b");
        b.insert_raw("langpref.backup.1", "x");
        b.insert_raw("langpref.backup.2", "y");
        b.insert_raw("other", "z");
        let chain = BackendChain::new(vec![Box::new(a), Box::new(b)]);
        assert_eq!(
            chain.keys_with_prefix(keys::BACKUP_PREFIX),
            vec!["langpref.backup.1".to_string(), "langpref.backup.2".to_string()]
        );
    }
}
