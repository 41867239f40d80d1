//! Per-session failure tracking, retry backoff and recovery options.
//!
//! State lives in an explicit [`ErrorRecoverySystem`] value owned by whoever
//! drives session restoration. Nothing is persisted; records live for the
//! lifetime of the process. No operation here returns an error.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::index::SessionMetadata;
use crate::types::SessionId;

/// Cross-session failure count at which a retry is no longer recommended
/// and a new session is.
const NEW_SESSION_THRESHOLD: u32 = 3;

/// Cross-session failure count at which skipping becomes recommended.
const SKIP_THRESHOLD: u32 = 2;

/// Coarse classification of a restore failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    FileNotFound,
    Corrupted,
    PermissionDenied,
    Unknown,
}

impl FailureKind {
    /// Categorizes an error by recognizable substrings of its message.
    pub fn categorize(message: &str) -> Self {
        let message = message.to_lowercase();
        if message.contains("not found") || message.contains("enoent") {
            Self::FileNotFound
        } else if message.contains("permission") || message.contains("eacces") {
            Self::PermissionDenied
        } else if message.contains("corrupt")
            || message.contains("invalid")
            || message.contains("parse")
        {
            Self::Corrupted
        } else {
            Self::Unknown
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FileNotFound => "file-not-found",
            Self::Corrupted => "corrupted",
            Self::PermissionDenied => "permission-denied",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed attempt to load a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureAttempt {
    pub timestamp: DateTime<Utc>,
    pub error: String,
    pub kind: FailureKind,
    /// Whether this failure followed an earlier one, i.e. was itself a retry.
    pub recovery_attempted: bool,
}

/// Aggregate failure history for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFailureRecord {
    pub attempts: Vec<FailureAttempt>,
    pub is_blacklisted: bool,
    pub blacklisted_until: Option<DateTime<Utc>>,
    pub total_failures: u32,
    pub last_failure: DateTime<Utc>,
}

/// Named numeric presets for [`RecoveryConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryPreset {
    Strict,
    #[default]
    Normal,
    Lenient,
}

impl RecoveryPreset {
    #[must_use]
    pub const fn config(self) -> RecoveryConfig {
        match self {
            Self::Strict => RecoveryConfig::strict(),
            Self::Normal => RecoveryConfig::normal(),
            Self::Lenient => RecoveryConfig::lenient(),
        }
    }
}

/// Tuning for retries, blacklisting and record cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub blacklist_duration: Duration,
    pub auto_cleanup: bool,
    pub cleanup_age: Duration,
}

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

impl RecoveryConfig {
    pub const fn strict() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            blacklist_duration: Duration::from_secs(60),
            auto_cleanup: true,
            cleanup_age: DAY,
        }
    }

    pub const fn normal() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            blacklist_duration: Duration::from_secs(5 * 60),
            auto_cleanup: true,
            cleanup_age: DAY,
        }
    }

    pub const fn lenient() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            blacklist_duration: Duration::from_secs(10 * 60),
            auto_cleanup: true,
            cleanup_age: DAY,
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self::normal()
    }
}

/// What executing a [`RecoveryOption`] does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Try loading the same session again after `delay`.
    Retry { session_id: SessionId, delay: Duration },
    /// Give up on this session and continue with the remaining candidates.
    Skip { session_id: SessionId },
    /// Start over with a fresh session.
    NewSession,
    /// Pick one of the listed healthy sessions instead.
    SelectDifferent { candidates: Vec<SessionId> },
}

/// The four kinds of recovery the caller can be offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryOptionKind {
    Retry,
    Skip,
    NewSession,
    SelectDifferent,
}

/// One entry in the recovery menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOption {
    pub label: String,
    pub description: String,
    pub action: RecoveryAction,
    pub is_recommended: bool,
}

impl RecoveryOption {
    pub const fn kind(&self) -> RecoveryOptionKind {
        match self.action {
            RecoveryAction::Retry { .. } => RecoveryOptionKind::Retry,
            RecoveryAction::Skip { .. } => RecoveryOptionKind::Skip,
            RecoveryAction::NewSession => RecoveryOptionKind::NewSession,
            RecoveryAction::SelectDifferent { .. } => RecoveryOptionKind::SelectDifferent,
        }
    }
}

/// The failure a set of recovery options is generated for.
#[derive(Debug, Clone)]
pub struct RecoveryContext {
    pub session_id: SessionId,
    pub error: String,
    /// Sessions the caller could switch to, including the failed one.
    pub available_sessions: Vec<SessionMetadata>,
}

/// Counts across all tracked sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    pub tracked_sessions: usize,
    pub blacklisted_sessions: usize,
    pub total_failures: u32,
}

/// In-memory failure tracker.
#[derive(Debug, Default)]
pub struct ErrorRecoverySystem {
    config: RecoveryConfig,
    records: HashMap<SessionId, SessionFailureRecord>,
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

impl ErrorRecoverySystem {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            records: HashMap::new(),
        }
    }

    pub const fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Records a failed load of `id`.
    pub fn record_failure(&mut self, id: &SessionId, error: &str) {
        self.record_failure_at(id, error, Utc::now());
    }

    pub fn record_failure_at(&mut self, id: &SessionId, error: &str, now: DateTime<Utc>) {
        let kind = FailureKind::categorize(error);
        let max_retries = self.config.max_retries;
        let blacklist_duration = to_delta(self.config.blacklist_duration);

        let record = self
            .records
            .entry(id.clone())
            .or_insert_with(|| SessionFailureRecord {
                attempts: Vec::new(),
                is_blacklisted: false,
                blacklisted_until: None,
                total_failures: 0,
                last_failure: now,
            });

        let recovery_attempted = !record.attempts.is_empty();
        record.attempts.push(FailureAttempt {
            timestamp: now,
            error: error.to_string(),
            kind,
            recovery_attempted,
        });
        record.total_failures = record.total_failures.saturating_add(1);
        record.last_failure = now;

        tracing::debug!(
            session_id = %id,
            kind = %kind,
            total_failures = record.total_failures,
            "recorded session failure"
        );

        if record.total_failures >= max_retries {
            record.is_blacklisted = true;
            record.blacklisted_until = Some(
                now.checked_add_signed(blacklist_duration)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            );
            tracing::warn!(
                session_id = %id,
                until = ?record.blacklisted_until,
                "session blacklisted after repeated failures"
            );
        }

        if self.config.auto_cleanup {
            self.cleanup_old_records_at(now);
        }
    }

    /// Whether `id` should currently be avoided.
    ///
    /// An expired blacklist window is cleared on this check and the session
    /// gets a fresh retry budget.
    pub fn is_session_problematic(&mut self, id: &SessionId) -> bool {
        self.is_session_problematic_at(id, Utc::now())
    }

    pub fn is_session_problematic_at(&mut self, id: &SessionId, now: DateTime<Utc>) -> bool {
        let max_retries = self.config.max_retries;
        let Some(record) = self.records.get_mut(id) else {
            return false;
        };

        if record.is_blacklisted {
            match record.blacklisted_until {
                Some(until) if now < until => return true,
                _ => {
                    record.is_blacklisted = false;
                    record.blacklisted_until = None;
                    record.total_failures = 0;
                    tracing::debug!(session_id = %id, "blacklist window expired");
                }
            }
        }

        record.total_failures >= max_retries
    }

    pub fn should_skip_session(&mut self, id: &SessionId) -> bool {
        self.is_session_problematic(id)
    }

    pub fn should_skip_session_at(&mut self, id: &SessionId, now: DateTime<Utc>) -> bool {
        self.is_session_problematic_at(id, now)
    }

    /// Backoff before the next attempt at `id`.
    ///
    /// `Some(ZERO)` without history, `None` once the retry limit is reached.
    pub fn calculate_retry_delay(&self, id: &SessionId) -> Option<Duration> {
        let Some(record) = self.records.get(id) else {
            return Some(Duration::ZERO);
        };
        let failures = record.total_failures;
        if failures >= self.config.max_retries {
            return None;
        }
        let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
        Some(
            self.config
                .base_delay
                .saturating_mul(factor)
                .min(self.config.max_delay),
        )
    }

    /// Builds the recovery menu for a failure.
    pub fn get_recovery_options(&mut self, context: &RecoveryContext) -> Vec<RecoveryOption> {
        self.get_recovery_options_at(context, Utc::now())
    }

    pub fn get_recovery_options_at(
        &mut self,
        context: &RecoveryContext,
        now: DateTime<Utc>,
    ) -> Vec<RecoveryOption> {
        let id = &context.session_id;
        let attempts = self.records.get(id).map_or(0, |r| r.total_failures);
        let global_failures = self.total_failures();
        let blacklisted = self.records.get(id).is_some_and(|r| {
            r.is_blacklisted && r.blacklisted_until.is_some_and(|until| now < until)
        });

        let others: Vec<SessionId> = context
            .available_sessions
            .iter()
            .filter(|m| &m.id != id)
            .map(|m| m.id.clone())
            .collect();
        let alternatives: Vec<SessionId> = others
            .into_iter()
            .filter(|candidate| !self.is_session_problematic_at(candidate, now))
            .collect();

        let mut options = Vec::with_capacity(4);

        if attempts < self.config.max_retries && !blacklisted {
            let delay = self.calculate_retry_delay(id).unwrap_or(Duration::ZERO);
            options.push(RecoveryOption {
                label: "Retry".to_string(),
                description: format!(
                    "Try loading session {id} again in {}s ({}/{} attempts used)",
                    delay.as_secs(),
                    attempts,
                    self.config.max_retries
                ),
                action: RecoveryAction::Retry {
                    session_id: id.clone(),
                    delay,
                },
                is_recommended: attempts == 1 && global_failures < NEW_SESSION_THRESHOLD,
            });
        }

        options.push(RecoveryOption {
            label: "Select a different session".to_string(),
            description: if alternatives.is_empty() {
                "No other sessions are available".to_string()
            } else {
                format!("Choose one of {} other available sessions", alternatives.len())
            },
            is_recommended: attempts >= 2 && !alternatives.is_empty(),
            action: RecoveryAction::SelectDifferent {
                candidates: alternatives,
            },
        });

        options.push(RecoveryOption {
            label: "Skip".to_string(),
            description: format!("Skip session {id} and continue"),
            action: RecoveryAction::Skip {
                session_id: id.clone(),
            },
            is_recommended: attempts >= self.config.max_retries
                || global_failures >= SKIP_THRESHOLD,
        });

        options.push(RecoveryOption {
            label: "Start a new session".to_string(),
            description: "Leave previous sessions untouched and start fresh".to_string(),
            action: RecoveryAction::NewSession,
            is_recommended: global_failures >= NEW_SESSION_THRESHOLD,
        });

        if !options.iter().any(|o| o.is_recommended) {
            if let Some(first) = options.first_mut() {
                first.is_recommended = true;
            }
        }

        tracing::debug!(
            session_id = %id,
            error = %context.error,
            options = options.len(),
            "generated recovery options"
        );

        options
    }

    /// Drops records whose last failure is older than the cleanup age.
    pub fn cleanup_old_records(&mut self) -> usize {
        self.cleanup_old_records_at(Utc::now())
    }

    pub fn cleanup_old_records_at(&mut self, now: DateTime<Utc>) -> usize {
        let max_age = to_delta(self.config.cleanup_age);
        let before = self.records.len();
        self.records
            .retain(|_, record| now.signed_duration_since(record.last_failure) <= max_age);
        let removed = before - self.records.len();
        if removed > 0 {
            tracing::debug!(removed, "cleaned up old failure records");
        }
        removed
    }

    /// Forgets all failures of `id`.
    pub fn reset_session(&mut self, id: &SessionId) -> bool {
        self.records.remove(id).is_some()
    }

    pub fn failure_record(&self, id: &SessionId) -> Option<&SessionFailureRecord> {
        self.records.get(id)
    }

    /// Sum of failures across every tracked session.
    pub fn total_failures(&self) -> u32 {
        self.records
            .values()
            .fold(0u32, |acc, r| acc.saturating_add(r.total_failures))
    }

    pub fn statistics(&self) -> RecoveryStats {
        RecoveryStats {
            tracked_sessions: self.records.len(),
            blacklisted_sessions: self.records.values().filter(|r| r.is_blacklisted).count(),
            total_failures: self.total_failures(),
        }
    }
}
