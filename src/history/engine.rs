//! Append and read paths of the history engine.

use std::rc::Rc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use super::{DetectionHistory, DetectionRecord, HistoryQuery, HistoryStats, compute_stats};
use crate::cache::{CacheStatus, StorageCache};
use crate::clock::Clock;
use crate::detection::DetectionSource;
use crate::error::{Error, Result};
use crate::events::{EventBus, LocaleEvent};
use crate::locale::Locale;
use crate::storage::{BackendChain, ChainRead, keys};

/// Default history cap.
pub const DEFAULT_MAX_RECORDS: usize = 50;

/// Result of [`HistoryEngine::add_record`].
#[derive(Debug, Clone, PartialEq)]
pub struct AddedRecord {
    /// The stored record (confidence clamped, timestamp stamped).
    pub record: DetectionRecord,
    /// History length after the append.
    pub history_len: usize,
    /// Records evicted to honour the cap.
    pub evicted: usize,
    /// Wall time spent, including persistence.
    pub elapsed: Duration,
}

/// Owns the detection log, its cache and its persistence.
///
/// Mutations run read-modify-truncate-persist-cache in sequence; the engine
/// is single-threaded, so they cannot interleave within one process.
pub struct HistoryEngine {
    pub(super) chain: Rc<BackendChain>,
    pub(super) cache: StorageCache,
    pub(super) bus: Rc<EventBus>,
    pub(super) clock: Rc<dyn Clock>,
    pub(super) max_records: usize,
}

impl HistoryEngine {
    /// Create an engine over a shared chain.
    pub fn new(
        chain: Rc<BackendChain>,
        cache: StorageCache,
        bus: Rc<EventBus>,
        clock: Rc<dyn Clock>,
        max_records: usize,
    ) -> Self {
        Self { chain, cache, bus, clock, max_records: max_records.max(1) }
    }

    /// The history cap.
    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Current time from the engine's clock.
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Append a detection.
    ///
    /// Confidence is clamped to `[0, 1]`, the record is stamped with the
    /// current time and prepended, the log is truncated to the cap, persisted,
    /// cached and announced with a `record-added` event. Fails only when no
    /// backend could store the result; the cache is left untouched then.
    pub fn add_record(
        &self,
        locale: Locale,
        source: DetectionSource,
        confidence: f64,
        metadata: Option<Map<String, Value>>,
    ) -> Result<AddedRecord> {
        let started = Instant::now();
        let now = self.clock.now_ms();
        let record = DetectionRecord::new(locale, source, confidence, now, metadata.unwrap_or_default());

        let mut history = self.current_for_write();
        history.records.insert(0, record.clone());
        history.total_count += 1;
        history.last_updated = now;
        let evicted = history.truncate_to(self.max_records);

        self.persist("history.add_record", &history)?;

        let history_len = history.records.len();
        self.bus.emit_event(&LocaleEvent::RecordAdded {
            record: record.clone(),
            history_len,
            timestamp: now,
        });
        let elapsed = started.elapsed();
        debug!(%locale, %source, history_len, evicted, elapsed_us = elapsed.as_micros() as u64, "record added");
        Ok(AddedRecord { record, history_len, evicted, elapsed })
    }

    /// The current history.
    ///
    /// Cache first, then the backends. A missing history is created empty
    /// and persisted. A corrupt one is reported through an `error` event and
    /// read as empty without overwriting it; use [`Self::load_history`] to
    /// get the typed failure instead.
    pub fn get_history(&self) -> DetectionHistory {
        if let Some(history) = self.cache.get_cached_history() {
            return history;
        }
        match self.chain.read(keys::HISTORY, DetectionHistory::parse) {
            ChainRead::Found { value, backend } => {
                debug!(backend, records = value.records.len(), "history loaded");
                let value = self.fit_to_cap(value);
                self.cache.update_cache(&value);
                value
            },
            ChainRead::Missing => {
                let empty = DetectionHistory::empty(self.clock.now_ms());
                if self.persist("history.bootstrap", &empty).is_err() {
                    debug!("history bootstrap not persisted");
                }
                empty
            },
            ChainRead::Corrupt(e) => {
                warn!(error = %e, "stored history is corrupt, reading as empty");
                self.emit_error("history.get", &e);
                DetectionHistory::empty(self.clock.now_ms())
            },
        }
    }

    /// Read the history from the backends, bypassing the cache, and fail
    /// with [`Error::CorruptData`] instead of substituting an empty log.
    pub fn load_history(&self) -> Result<Option<DetectionHistory>> {
        match self.chain.read(keys::HISTORY, DetectionHistory::parse) {
            ChainRead::Found { value, .. } => Ok(Some(value)),
            ChainRead::Missing => Ok(None),
            ChainRead::Corrupt(e) => Err(e),
        }
    }

    /// Records matching `query`, newest first.
    pub fn query(&self, query: &HistoryQuery) -> Result<Vec<DetectionRecord>> {
        query.validate()?;
        Ok(query.apply(&self.get_history().records))
    }

    /// Records whose locale, source or metadata contain `text`.
    pub fn search(&self, text: &str) -> Vec<DetectionRecord> {
        super::search_records(&self.get_history().records, text)
    }

    /// Aggregate statistics over the current history.
    pub fn statistics(&self) -> HistoryStats {
        compute_stats(&self.get_history().records)
    }

    /// State of the history cache.
    pub fn cache_status(&self) -> CacheStatus {
        self.cache.get_cache_status()
    }

    /// Drop the cached copy; the next read goes to the backends.
    pub fn clear_cache(&self) {
        self.cache.clear_cache();
    }

    /// History to mutate: cached or stored if readable, else a fresh one.
    pub(super) fn current_for_write(&self) -> DetectionHistory {
        if let Some(history) = self.cache.get_cached_history() {
            return history;
        }
        match self.chain.read(keys::HISTORY, DetectionHistory::parse) {
            ChainRead::Found { value, .. } => self.fit_to_cap(value),
            ChainRead::Corrupt(e) => {
                warn!(error = %e, "replacing corrupt history on write");
                DetectionHistory::empty(self.clock.now_ms())
            },
            ChainRead::Missing => DetectionHistory::empty(self.clock.now_ms()),
        }
    }

    /// Persist to every backend and refresh the cache on success.
    pub(super) fn persist(&self, operation: &str, history: &DetectionHistory) -> Result<()> {
        let json = serde_json::to_string(history)?;
        let report = self.chain.write(keys::HISTORY, &json);
        for (backend, err) in report.failures() {
            if !matches!(err, Error::BackendUnavailable { .. }) {
                self.bus.emit_event(&LocaleEvent::error(
                    operation,
                    format!("{backend}: {err}"),
                    self.clock.now_ms(),
                ));
            }
        }
        match report.into_result(keys::HISTORY) {
            Ok(()) => {
                self.cache.update_cache(history);
                Ok(())
            },
            Err(e) => {
                error!(operation, error = %e, "history not persisted to any backend");
                Err(e)
            },
        }
    }

    pub(super) fn emit_error(&self, operation: &str, err: &Error) {
        self.bus.emit_event(&LocaleEvent::error(operation, err.to_string(), self.clock.now_ms()));
    }

    /// A stored history longer than the cap (cap lowered since) is trimmed on read.
    fn fit_to_cap(&self, mut history: DetectionHistory) -> DetectionHistory {
        let dropped = history.truncate_to(self.max_records);
        if dropped > 0 {
            debug!(dropped, cap = self.max_records, "trimmed stored history to cap");
        }
        history
    }
}

impl std::fmt::Debug for HistoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryEngine")
            .field("chain", &self.chain)
            .field("cache", &self.cache)
            .field("max_records", &self.max_records)
            .finish()
    }
}
