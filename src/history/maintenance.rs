//! Lifecycle maintenance: expiry, dedupe, capping, export/import, backups.
//!
//! Every mutation persists through the same path as appends and announces
//! itself on the event bus. Imports validate the whole bundle before any
//! data is touched.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{DetectionHistory, DetectionRecord, HistoryEngine};
use crate::bundle::{ExportBundle, checksum};
use crate::cache::CacheStatus;
use crate::error::{Error, ImportError, Result};
use crate::events::{CleanupReason, LocaleEvent};
use crate::storage::{ChainRead, keys};

/// Longest accepted backup name.
pub const MAX_BACKUP_NAME_LEN: usize = 64;

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Why records were removed.
    pub reason: CleanupReason,
    /// Records removed.
    pub removed: usize,
    /// Records left.
    pub remaining: usize,
}

/// Outcome of an import or restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Records now in history.
    pub record_count: usize,
    /// Records the previous history held.
    pub replaced: usize,
    /// Records dropped to fit the cap.
    pub truncated: usize,
    /// Bundle version or backup id.
    pub origin: String,
}

/// A stored backup snapshot, without its contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    /// Unique id, `<name>-<created_at>`.
    pub id: String,
    /// User-supplied name.
    pub name: String,
    /// Creation time, epoch ms.
    pub created_at: i64,
    /// Records in the snapshot.
    pub record_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupSnapshot {
    #[serde(flatten)]
    info: BackupInfo,
    bundle: ExportBundle,
}

/// Result of a strict read of the stored history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryHealth {
    /// A history is stored on some backend.
    pub stored: bool,
    /// Records held.
    pub record_count: usize,
    /// Records ever appended.
    pub total_count: u64,
    /// Last modification, epoch ms.
    pub last_updated: Option<i64>,
    /// Engine cap.
    pub max_records: usize,
    /// Stored length is within the cap.
    pub within_cap: bool,
    /// Checksum of the stored payload.
    pub checksum: Option<String>,
    /// Cache state.
    pub cache: CacheStatus,
}

fn validate_backup_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.len() <= MAX_BACKUP_NAME_LEN
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if ok {
        Ok(())
    } else {
        Err(Error::invalid_input(format!(
            "backup name must be 1-{MAX_BACKUP_NAME_LEN} characters of [A-Za-z0-9_-]"
        )))
    }
}

fn validate_backup_id(id: &str) -> Result<()> {
    // name, dash, millisecond timestamp
    let ok = !id.is_empty()
        && id.len() <= MAX_BACKUP_NAME_LEN + 21
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if ok { Ok(()) } else { Err(Error::invalid_input(format!("malformed backup id '{id}'"))) }
}

impl HistoryEngine {
    /// Drop records older than `max_age_ms`.
    pub fn cleanup_expired(&self, max_age_ms: i64) -> Result<CleanupReport> {
        if max_age_ms < 0 {
            return Err(Error::invalid_input("maximum age must not be negative"));
        }
        let cutoff = self.now_ms().saturating_sub(max_age_ms);
        self.retain_where(CleanupReason::Expired, "history.cleanup_expired", |records| {
            records.retain(|r| r.timestamp >= cutoff);
        })
    }

    /// Collapse repeats: a record is dropped when the next older one has the
    /// same locale and source and lies within `window_ms` of it.
    pub fn deduplicate(&self, window_ms: i64) -> Result<CleanupReport> {
        if window_ms < 0 {
            return Err(Error::invalid_input("dedupe window must not be negative"));
        }
        self.retain_where(CleanupReason::Deduplicate, "history.deduplicate", |records| {
            let keep: Vec<bool> = (0..records.len())
                .map(|i| {
                    records.get(i + 1).is_none_or(|older| {
                        let newer = &records[i];
                        newer.locale != older.locale
                            || newer.source != older.source
                            || newer.timestamp - older.timestamp > window_ms
                    })
                })
                .collect();
            let mut flags = keep.into_iter();
            records.retain(|_| flags.next().unwrap_or(true));
        })
    }

    /// Truncate to the newest `max` records.
    pub fn enforce_limit(&self, max: usize) -> Result<CleanupReport> {
        self.retain_where(CleanupReason::Limit, "history.enforce_limit", |records| {
            records.truncate(max);
        })
    }

    /// Reset to an empty history. Safe to repeat.
    pub fn clear_all(&self) -> Result<CleanupReport> {
        let removed = self.current_for_write().len();
        let empty = DetectionHistory::empty(self.now_ms());
        self.persist("history.clear_all", &empty)?;
        self.announce_cleanup(CleanupReason::Cleared, removed, 0);
        Ok(CleanupReport { reason: CleanupReason::Cleared, removed, remaining: 0 })
    }

    fn retain_where(
        &self,
        reason: CleanupReason,
        operation: &str,
        filter: impl FnOnce(&mut Vec<DetectionRecord>),
    ) -> Result<CleanupReport> {
        let mut history = self.current_for_write();
        let before = history.len();
        filter(&mut history.records);
        let removed = before - history.len();
        let remaining = history.len();
        if removed > 0 {
            history.last_updated = self.now_ms();
            self.persist(operation, &history)?;
            self.announce_cleanup(reason, removed, remaining);
        }
        Ok(CleanupReport { reason, removed, remaining })
    }

    fn announce_cleanup(&self, reason: CleanupReason, removed: usize, remaining: usize) {
        info!(?reason, removed, remaining, "history cleanup");
        self.bus.emit_event(&LocaleEvent::Cleanup {
            reason,
            removed,
            remaining,
            timestamp: self.now_ms(),
        });
    }

    /// The history as it stands, failing on corrupt storage instead of
    /// substituting an empty log.
    pub fn snapshot(&self) -> Result<DetectionHistory> {
        if let Some(history) = self.cache.get_cached_history() {
            return Ok(history);
        }
        Ok(self.load_history()?.unwrap_or_else(|| DetectionHistory::empty(self.now_ms())))
    }

    /// Snapshot the history into a bundle.
    pub fn export_history(&self) -> Result<ExportBundle> {
        let history = self.snapshot().inspect_err(|e| self.emit_error("history.export", e))?;
        let bundle = ExportBundle::for_history(history, self.now_ms())?;
        self.bus.emit_event(&LocaleEvent::Export {
            record_count: bundle.record_count(),
            checksum: bundle.metadata.data_integrity.clone(),
            timestamp: bundle.timestamp,
        });
        Ok(bundle)
    }

    /// Replace the history with the one carried by `bundle`.
    ///
    /// Rejects, without touching stored data, a bundle with a foreign
    /// version, a checksum mismatch, an invalid shape, or no history.
    pub fn import_history(&self, bundle: &ExportBundle) -> Result<ImportReport> {
        let origin = format!("bundle:{}", bundle.version);
        self.replace_from(bundle, origin, "history.import")
    }

    /// Parse, validate and import a serialized bundle.
    pub fn import_history_json(&self, raw: &str) -> Result<ImportReport> {
        let bundle = ExportBundle::from_json(raw).map_err(|e| {
            let err = Error::from(e);
            self.emit_error("history.import", &err);
            err
        })?;
        self.import_history(&bundle)
    }

    fn replace_from(&self, bundle: &ExportBundle, origin: String, operation: &str) -> Result<ImportReport> {
        let checked = bundle
            .validate()
            .and_then(|()| bundle.history.clone().ok_or(ImportError::MissingHistory));
        let mut history = match checked {
            Ok(history) => history,
            Err(e) => {
                let err = Error::from(e);
                self.emit_error(operation, &err);
                return Err(err);
            },
        };

        let replaced = self.get_history().len();
        let truncated = history.truncate_to(self.max_records);
        self.persist(operation, &history)?;

        let record_count = history.len();
        info!(record_count, replaced, truncated, %origin, "history imported");
        self.bus.emit_event(&LocaleEvent::Import {
            record_count,
            origin: origin.clone(),
            timestamp: self.now_ms(),
        });
        Ok(ImportReport { record_count, replaced, truncated, origin })
    }

    /// Store a named snapshot of the current history.
    pub fn create_backup(&self, name: &str) -> Result<BackupInfo> {
        validate_backup_name(name)?;
        let history = self.snapshot()?;
        let created_at = self.now_ms();
        let info = BackupInfo {
            id: format!("{name}-{created_at}"),
            name: name.to_string(),
            created_at,
            record_count: history.len(),
        };
        let snapshot =
            BackupSnapshot { info: info.clone(), bundle: ExportBundle::for_history(history, created_at)? };
        let json = serde_json::to_string(&snapshot)?;
        self.chain.write(&keys::backup(&info.id), &json).into_result(&keys::backup(&info.id))?;
        info!(id = %info.id, records = info.record_count, "backup created");
        Ok(info)
    }

    /// Stored snapshots, newest first. Unreadable snapshots are skipped.
    pub fn list_backups(&self) -> Vec<BackupInfo> {
        let mut backups: Vec<BackupInfo> = self
            .chain
            .keys_with_prefix(keys::BACKUP_PREFIX)
            .iter()
            .filter_map(|key| self.read_snapshot(key).found().map(|s| s.info))
            .collect();
        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        backups
    }

    /// Replace the live history with a snapshot.
    pub fn restore_backup(&self, id: &str) -> Result<ImportReport> {
        validate_backup_id(id)?;
        let snapshot = match self.read_snapshot(&keys::backup(id)) {
            ChainRead::Found { value, .. } => value,
            ChainRead::Missing => return Err(Error::BackupNotFound(id.to_string())),
            ChainRead::Corrupt(e) => return Err(e),
        };
        self.replace_from(&snapshot.bundle, format!("backup:{id}"), "history.restore_backup")
    }

    /// Delete a snapshot.
    pub fn delete_backup(&self, id: &str) -> Result<()> {
        validate_backup_id(id)?;
        let key = keys::backup(id);
        if !self.chain.keys_with_prefix(&key).iter().any(|k| *k == key) {
            return Err(Error::BackupNotFound(id.to_string()));
        }
        self.chain.remove(&key).into_result(&key)?;
        info!(id, "backup deleted");
        Ok(())
    }

    /// Delete all but the newest `keep` snapshots. Returns the deleted ids.
    pub fn cleanup_old_backups(&self, keep: usize) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        for backup in self.list_backups().into_iter().skip(keep) {
            self.delete_backup(&backup.id)?;
            deleted.push(backup.id);
        }
        Ok(deleted)
    }

    fn read_snapshot(&self, key: &str) -> ChainRead<BackupSnapshot> {
        self.chain.read(key, |raw| {
            serde_json::from_str::<BackupSnapshot>(raw).map_err(|e| Error::corrupt(key, e.to_string()))
        })
    }

    /// Strict health check of the stored history.
    pub fn verify(&self) -> Result<HistoryHealth> {
        let stored = self.load_history().inspect_err(|e| self.emit_error("history.verify", e))?;
        let cache = self.cache_status();
        Ok(match stored {
            Some(history) => HistoryHealth {
                stored: true,
                record_count: history.len(),
                total_count: history.total_count,
                last_updated: Some(history.last_updated),
                max_records: self.max_records,
                within_cap: history.len() <= self.max_records,
                checksum: serde_json::to_string(&history).ok().map(|json| checksum(&json)),
                cache,
            },
            None => HistoryHealth {
                stored: false,
                record_count: 0,
                total_count: 0,
                last_updated: None,
                max_records: self.max_records,
                within_cap: true,
                checksum: None,
                cache,
            },
        })
    }
}
