//! Drift detection and repair between session files and the index.

use std::collections::BTreeSet;

use chrono::Utc;
use rayon::prelude::*;
use serde::Serialize;
use sk_core::{Session, SessionId, SessionIndex, SessionMetadata};

use crate::error::StoreError;
use crate::storage::SessionStorage;

/// Result of a read-only scan. The drift lists are disjoint and sorted.
///
/// Corruption takes precedence: a file that fails to parse is listed only
/// under `corrupted_files`, never as an orphaned file, and an index entry
/// pointing at it is not an orphaned entry. `orphaned_files` therefore holds
/// only readable sessions missing from the index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Index entries with no file on disk.
    pub orphaned_entries: Vec<SessionId>,
    /// Valid session files the index does not know about.
    pub orphaned_files: Vec<SessionId>,
    /// Files that fail to parse or validate.
    pub corrupted_files: Vec<SessionId>,
    /// Entries whose message count or tags disagree with their file.
    pub stale_entries: Vec<SessionId>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.orphaned_entries.is_empty()
            && self.orphaned_files.is_empty()
            && self.corrupted_files.is_empty()
            && self.stale_entries.is_empty()
            && self.warnings.is_empty()
    }
}

/// What a repair pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub entries_removed: usize,
    /// Orphaned files that were re-indexed.
    pub orphaned_files_processed: usize,
    pub entries_refreshed: usize,
    /// Every session id whose index entry was added, removed or replaced.
    pub cleaned_sessions: Vec<SessionId>,
    pub warnings: Vec<String>,
}

/// Snapshot of the directory taken once per pass.
struct Scan {
    index: SessionIndex,
    index_unreadable: bool,
    valid: Vec<Session>,
    corrupted: Vec<(SessionId, StoreError)>,
    warnings: Vec<String>,
}

/// Compares session files against the index.
#[derive(Debug, Clone, Copy)]
pub struct SessionValidator<'a> {
    storage: &'a SessionStorage,
}

impl<'a> SessionValidator<'a> {
    pub const fn new(storage: &'a SessionStorage) -> Self {
        Self { storage }
    }

    fn scan(&self) -> Result<Scan, StoreError> {
        let files = self.storage.list_session_files()?;

        let mut warnings = Vec::new();
        let (index, index_unreadable) = match self.storage.get_index() {
            Ok(index) => (index, false),
            Err(err) if err.is_corruption() => {
                tracing::warn!(error = %err, "session index unreadable, treating as empty");
                warnings.push(format!("session index is unreadable and will be rebuilt: {err}"));
                (SessionIndex::default(), true)
            }
            Err(err) => return Err(err),
        };

        let results: Vec<(SessionId, Result<Session, StoreError>)> = files
            .par_iter()
            .map(|id| (id.clone(), self.storage.read_session(id)))
            .collect();

        let mut valid = Vec::new();
        let mut corrupted = Vec::new();
        for (id, result) in results {
            match result {
                Ok(session) => valid.push(session),
                // Deleted between listing and reading.
                Err(StoreError::SessionNotFound(_)) => {}
                Err(err) => corrupted.push((id, err)),
            }
        }

        Ok(Scan {
            index,
            index_unreadable,
            valid,
            corrupted,
            warnings,
        })
    }

    /// Reports drift without changing anything.
    pub fn validate_session_index(&self) -> Result<ValidationReport, StoreError> {
        let scan = self.scan()?;
        let mut report = ValidationReport {
            warnings: scan.warnings,
            ..ValidationReport::default()
        };

        let on_disk: BTreeSet<&SessionId> = scan
            .valid
            .iter()
            .map(|s| &s.id)
            .chain(scan.corrupted.iter().map(|(id, _)| id))
            .collect();

        report.orphaned_entries = scan
            .index
            .sessions
            .keys()
            .filter(|id| !on_disk.contains(id))
            .cloned()
            .collect();

        for session in &scan.valid {
            match scan.index.get(&session.id) {
                None => report.orphaned_files.push(session.id.clone()),
                Some(entry) if !entry.matches_session(session) => {
                    report
                        .warnings
                        .push(format!("index entry for {} is out of date", session.id));
                    report.stale_entries.push(session.id.clone());
                }
                Some(_) => {}
            }
        }

        for (id, err) in &scan.corrupted {
            report
                .warnings
                .push(format!("session file {id} is corrupted: {err}"));
            report.corrupted_files.push(id.clone());
        }

        tracing::debug!(
            orphaned_entries = report.orphaned_entries.len(),
            orphaned_files = report.orphaned_files.len(),
            corrupted = report.corrupted_files.len(),
            stale = report.stale_entries.len(),
            "validated session index"
        );
        Ok(report)
    }

    /// Repairs drift.
    ///
    /// Orphaned entries are dropped, valid orphaned files re-indexed and
    /// stale entries refreshed. Corrupted files are never touched; they only
    /// produce a warning. The index is written once, at the end.
    pub fn cleanup_orphaned_entries(&self) -> Result<CleanupReport, StoreError> {
        let Scan {
            mut index,
            index_unreadable,
            valid,
            corrupted,
            warnings,
        } = self.scan()?;
        let now = Utc::now();
        let mut report = CleanupReport {
            warnings,
            ..CleanupReport::default()
        };
        let mut cleaned = BTreeSet::new();

        let on_disk: BTreeSet<SessionId> = valid
            .iter()
            .map(|s| s.id.clone())
            .chain(corrupted.iter().map(|(id, _)| id.clone()))
            .collect();
        let orphaned: Vec<SessionId> = index
            .sessions
            .keys()
            .filter(|id| !on_disk.contains(*id))
            .cloned()
            .collect();
        for id in orphaned {
            index.remove(&id, now);
            tracing::debug!(session_id = %id, "removed orphaned index entry");
            report.entries_removed += 1;
            cleaned.insert(id);
        }

        for session in &valid {
            match index.get(&session.id) {
                None => {
                    index.upsert(SessionMetadata::from_session(session), now);
                    tracing::info!(session_id = %session.id, "re-indexed orphaned session file");
                    report.orphaned_files_processed += 1;
                    cleaned.insert(session.id.clone());
                }
                Some(entry) if !entry.matches_session(session) => {
                    index.upsert(SessionMetadata::from_session(session), now);
                    tracing::debug!(session_id = %session.id, "refreshed stale index entry");
                    report.entries_refreshed += 1;
                    cleaned.insert(session.id.clone());
                }
                Some(_) => {}
            }
        }

        for (id, err) in &corrupted {
            tracing::warn!(session_id = %id, error = %err, "leaving corrupted session file in place");
            report.warnings.push(format!(
                "session file {id} is corrupted and was left in place; review it manually: {err}"
            ));
        }

        if !cleaned.is_empty() || index_unreadable {
            self.storage.write_index(&index)?;
        }
        report.cleaned_sessions = cleaned.into_iter().collect();
        Ok(report)
    }
}
