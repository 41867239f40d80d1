//! Startup restoration flow.
//!
//! Sequences validation, candidate selection and loading:
//!
//! ```text
//! detecting -> validating -> prompting -> restoring -> complete
//!                                             |
//!                                             v
//!                                           error -> detecting | complete
//! ```
//!
//! Failures never escape the flow. Storage errors become recovery options or
//! a fallback to a fresh session; only calling a method in the wrong state
//! returns an error, and that leaves the state unchanged.

use std::fmt;

use sk_core::{
    ErrorRecoverySystem, RecoveryAction, RecoveryContext, RecoveryOption, Session, SessionId,
    SessionMetadata,
};
use sk_store::SessionValidator;
use thiserror::Error;

use crate::manager::SessionManager;

/// How the flow finished.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    Restored(Session),
    NewSession(Session),
}

impl RestoreOutcome {
    pub const fn session(&self) -> &Session {
        match self {
            Self::Restored(session) | Self::NewSession(session) => session,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RestoreState {
    Detecting,
    Validating { current: usize, total: usize },
    Prompting { candidates: Vec<SessionMetadata> },
    Restoring { session_id: SessionId },
    Complete(RestoreOutcome),
    Error {
        session_id: SessionId,
        message: String,
        options: Vec<RecoveryOption>,
    },
}

impl RestoreState {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Detecting => "detecting",
            Self::Validating { .. } => "validating",
            Self::Prompting { .. } => "prompting",
            Self::Restoring { .. } => "restoring",
            Self::Complete(_) => "complete",
            Self::Error { .. } => "error",
        }
    }
}

impl fmt::Display for RestoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A method was called in a state that does not accept it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} while {state}")]
pub struct InvalidTransition {
    pub action: &'static str,
    pub state: &'static str,
}

/// What a freshly created session looks like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSessionTemplate {
    pub workspace_root: String,
    pub model: String,
    pub provider: String,
}

type ProgressFn<'a> = Box<dyn FnMut(&RestoreState) + 'a>;

/// Drives one restoration attempt.
pub struct RestorationFlow<'a> {
    manager: &'a SessionManager,
    recovery: ErrorRecoverySystem,
    template: NewSessionTemplate,
    state: RestoreState,
    candidates: Vec<SessionMetadata>,
    progress: Option<ProgressFn<'a>>,
}

impl<'a> RestorationFlow<'a> {
    pub fn new(
        manager: &'a SessionManager,
        recovery: ErrorRecoverySystem,
        template: NewSessionTemplate,
    ) -> Self {
        Self {
            manager,
            recovery,
            template,
            state: RestoreState::Detecting,
            candidates: Vec::new(),
            progress: None,
        }
    }

    /// Registers a callback invoked on every state change.
    #[must_use]
    pub fn on_progress(mut self, callback: impl FnMut(&RestoreState) + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub const fn state(&self) -> &RestoreState {
        &self.state
    }

    pub const fn recovery(&self) -> &ErrorRecoverySystem {
        &self.recovery
    }

    /// Consumes the flow, returning the failure tracker for reuse.
    pub fn into_recovery(self) -> ErrorRecoverySystem {
        self.recovery
    }

    fn set_state(&mut self, state: RestoreState) {
        tracing::debug!(from = %self.state, to = %state, "restoration state change");
        self.state = state;
        if let Some(progress) = self.progress.as_mut() {
            progress(&self.state);
        }
    }

    fn reject(&self, action: &'static str) -> InvalidTransition {
        InvalidTransition {
            action,
            state: self.state.name(),
        }
    }

    /// Runs detection and validation from the `detecting` state.
    pub fn start(&mut self) -> Result<&RestoreState, InvalidTransition> {
        if !matches!(self.state, RestoreState::Detecting) {
            return Err(self.reject("start detection"));
        }
        self.detect();
        Ok(&self.state)
    }

    fn detect(&mut self) {
        let validator = SessionValidator::new(self.manager.storage());
        match validator.validate_session_index() {
            Ok(report) if !report.is_clean() => {
                if let Err(err) = validator.cleanup_orphaned_entries() {
                    tracing::warn!(error = %err, "index repair failed during detection");
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "session detection failed, starting fresh");
                self.complete_with_new();
                return;
            }
        }

        let detected = match self.manager.detect_available_sessions() {
            Ok(detected) => detected,
            Err(err) => {
                tracing::warn!(error = %err, "session detection failed, starting fresh");
                self.complete_with_new();
                return;
            }
        };

        if detected.is_empty() {
            self.complete_with_new();
            return;
        }
        self.validate(detected);
    }

    fn validate(&mut self, detected: Vec<SessionMetadata>) {
        let total = detected.len();
        let mut usable = Vec::with_capacity(total);
        for (i, meta) in detected.into_iter().enumerate() {
            self.set_state(RestoreState::Validating {
                current: i + 1,
                total,
            });
            if self.recovery.should_skip_session(&meta.id) {
                tracing::debug!(session_id = %meta.id, "skipping problematic session");
                continue;
            }
            match self.manager.restore_session(&meta.id) {
                Ok(_) => usable.push(meta),
                Err(err) => {
                    tracing::warn!(session_id = %meta.id, error = %err, "session failed validation");
                    self.recovery.record_failure(&meta.id, &err.to_string());
                }
            }
        }
        self.candidates = usable;
        self.prompt_or_new();
    }

    fn prompt_or_new(&mut self) {
        if self.candidates.is_empty() {
            self.complete_with_new();
        } else {
            self.set_state(RestoreState::Prompting {
                candidates: self.candidates.clone(),
            });
        }
    }

    fn complete_with_new(&mut self) {
        let template = &self.template;
        let session = match self.manager.create_session(
            &template.workspace_root,
            &template.model,
            &template.provider,
        ) {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(error = %err, "could not persist new session, continuing unsaved");
                Session::new(
                    template.workspace_root.clone(),
                    template.model.clone(),
                    template.provider.clone(),
                )
            }
        };
        self.set_state(RestoreState::Complete(RestoreOutcome::NewSession(session)));
    }

    /// Loads `id`. Accepted while prompting.
    pub fn select(&mut self, id: &SessionId) -> Result<&RestoreState, InvalidTransition> {
        if !matches!(self.state, RestoreState::Prompting { .. }) {
            return Err(self.reject("select a session"));
        }
        self.restore(id);
        Ok(&self.state)
    }

    fn restore(&mut self, id: &SessionId) {
        self.set_state(RestoreState::Restoring {
            session_id: id.clone(),
        });

        let err = match self.manager.restore_session(id) {
            Ok(session) => {
                self.recovery.reset_session(id);
                tracing::info!(session_id = %id, "restored session");
                self.set_state(RestoreState::Complete(RestoreOutcome::Restored(session)));
                return;
            }
            Err(err) => err,
        };

        let message = err.to_string();
        tracing::warn!(session_id = %id, error = %message, "session restore failed");
        self.recovery.record_failure(id, &message);
        let options = self.recovery.get_recovery_options(&RecoveryContext {
            session_id: id.clone(),
            error: message.clone(),
            available_sessions: self.candidates.clone(),
        });

        let recommended = options
            .iter()
            .find(|o| o.is_recommended)
            .map(|o| o.action.clone());
        match recommended {
            // Never retried automatically.
            Some(RecoveryAction::Retry { .. }) | None => {
                self.set_state(RestoreState::Error {
                    session_id: id.clone(),
                    message,
                    options,
                });
            }
            Some(action) => self.execute(action),
        }
    }

    fn execute(&mut self, action: RecoveryAction) {
        match action {
            RecoveryAction::Retry { session_id, delay } => {
                tracing::debug!(session_id = %session_id, delay_ms = delay.as_millis(), "retrying");
                self.restore(&session_id);
            }
            RecoveryAction::Skip { session_id } => {
                self.candidates.retain(|m| m.id != session_id);
                self.prompt_or_new();
            }
            RecoveryAction::SelectDifferent { candidates } => {
                self.candidates.retain(|m| candidates.contains(&m.id));
                self.prompt_or_new();
            }
            RecoveryAction::NewSession => self.complete_with_new(),
        }
    }

    /// Starts a fresh session instead of restoring one. Accepted while
    /// prompting.
    pub fn new_session(&mut self) -> Result<&RestoreState, InvalidTransition> {
        if !matches!(self.state, RestoreState::Prompting { .. }) {
            return Err(self.reject("start a new session"));
        }
        self.complete_with_new();
        Ok(&self.state)
    }

    /// Executes one of the options offered in the `error` state.
    ///
    /// Retry delays are not waited on here; the caller schedules the call.
    pub fn apply(&mut self, action: RecoveryAction) -> Result<&RestoreState, InvalidTransition> {
        if !matches!(self.state, RestoreState::Error { .. }) {
            return Err(self.reject("apply a recovery action"));
        }
        self.execute(action);
        Ok(&self.state)
    }

    /// Leaves the `error` state by detecting again from scratch.
    pub fn retry_detection(&mut self) -> Result<&RestoreState, InvalidTransition> {
        if !matches!(self.state, RestoreState::Error { .. }) {
            return Err(self.reject("retry detection"));
        }
        self.candidates.clear();
        self.set_state(RestoreState::Detecting);
        self.detect();
        Ok(&self.state)
    }

    /// Leaves the `error` state with a fresh session.
    pub fn continue_with_new(&mut self) -> Result<&RestoreState, InvalidTransition> {
        if !matches!(self.state, RestoreState::Error { .. }) {
            return Err(self.reject("continue with a new session"));
        }
        self.complete_with_new();
        Ok(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;

    use chrono::{TimeDelta, Utc};
    use sk_core::{Message, RecoveryConfig, RecoveryOptionKind, Role};

    use super::*;
    use crate::Config;

    fn manager(dir: &std::path::Path) -> SessionManager {
        SessionManager::open(Config {
            sessions_dir: dir.to_path_buf(),
            ..Config::default()
        })
        .unwrap()
    }

    fn template() -> NewSessionTemplate {
        NewSessionTemplate {
            workspace_root: "/repo".to_string(),
            model: "claude-sonnet".to_string(),
            provider: "anthropic".to_string(),
        }
    }

    fn saved(manager: &SessionManager, name: &str, age_minutes: i64) -> Session {
        let mut session = Session::new_at(
            SessionId::new(name).unwrap(),
            "/repo",
            "claude-sonnet",
            "anthropic",
            Utc::now() - TimeDelta::minutes(age_minutes),
        );
        session.push_message(Message::new(Role::User, "hi", session.created_at));
        manager.save_session(&session).unwrap();
        session
    }

    fn flow(manager: &SessionManager) -> RestorationFlow<'_> {
        RestorationFlow::new(manager, ErrorRecoverySystem::default(), template())
    }

    #[test]
    fn empty_directory_completes_with_new_session() {
        let temp = tempfile::tempdir().unwrap();
        let manager = manager(temp.path());
        let mut flow = flow(&manager);

        let state = flow.start().unwrap();
        let RestoreState::Complete(RestoreOutcome::NewSession(session)) = state else {
            panic!("expected new session, got {state:?}");
        };
        assert_eq!(session.workspace_root, "/repo");
        assert!(manager.storage().session_exists(&session.id).unwrap());
    }

    #[test]
    fn prompts_with_candidates_by_recency_and_restores() {
        let temp = tempfile::tempdir().unwrap();
        let manager = manager(temp.path());
        saved(&manager, "older", 10);
        let newer = saved(&manager, "newer", 1);

        let seen = RefCell::new(Vec::new());
        let mut flow = flow(&manager).on_progress(|state| seen.borrow_mut().push(state.clone()));

        let RestoreState::Prompting { candidates } = flow.start().unwrap().clone() else {
            panic!("expected prompting");
        };
        let ids: Vec<_> = candidates.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["newer", "older"]);

        let state = flow.select(&newer.id).unwrap();
        assert_eq!(
            state,
            &RestoreState::Complete(RestoreOutcome::Restored(newer.clone()))
        );
        drop(flow);

        let names: Vec<_> = seen.borrow().iter().map(RestoreState::name).collect();
        assert_eq!(
            names,
            vec![
                "validating",
                "validating",
                "prompting",
                "restoring",
                "complete"
            ]
        );
        assert_eq!(
            seen.borrow()[1],
            RestoreState::Validating {
                current: 2,
                total: 2
            }
        );
    }

    #[test]
    fn corrupted_candidates_are_dropped_during_validation() {
        let temp = tempfile::tempdir().unwrap();
        let manager = manager(temp.path());
        let good = saved(&manager, "good", 5);
        let bad = saved(&manager, "bad", 1);
        fs::write(manager.storage().session_path(&bad.id), b"{ nope").unwrap();

        let mut flow = flow(&manager);
        let RestoreState::Prompting { candidates } = flow.start().unwrap() else {
            panic!("expected prompting");
        };
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, good.id);
        assert_eq!(flow.recovery().failure_record(&bad.id).unwrap().total_failures, 1);
    }

    #[test]
    fn first_restore_failure_stops_in_error_with_retry() {
        let temp = tempfile::tempdir().unwrap();
        let manager = manager(temp.path());
        let s1 = saved(&manager, "s1", 1);

        let mut flow = flow(&manager);
        flow.start().unwrap();
        // Vanishes between prompting and selection.
        fs::remove_file(manager.storage().session_path(&s1.id)).unwrap();

        let RestoreState::Error {
            session_id,
            message,
            options,
        } = flow.select(&s1.id).unwrap().clone()
        else {
            panic!("expected error state");
        };
        assert_eq!(session_id, s1.id);
        assert!(message.contains("not found"));
        assert_eq!(options[0].kind(), RecoveryOptionKind::Retry);
        assert!(options[0].is_recommended);

        let state = flow.continue_with_new().unwrap();
        assert!(matches!(
            state,
            RestoreState::Complete(RestoreOutcome::NewSession(_))
        ));
    }

    #[test]
    fn repeated_failure_escalates_to_alternative() {
        let temp = tempfile::tempdir().unwrap();
        let manager = manager(temp.path());
        let good = saved(&manager, "good", 10);
        let flaky = saved(&manager, "flaky", 1);

        let mut flow = flow(&manager);
        flow.start().unwrap();
        fs::write(manager.storage().session_path(&flaky.id), b"garbage").unwrap();

        assert_eq!(flow.select(&flaky.id).unwrap().name(), "error");
        let retry = match flow.state() {
            RestoreState::Error { options, .. } => options[0].action.clone(),
            other => panic!("unexpected {other:?}"),
        };

        // Second failure recommends switching sessions, which drops the
        // failing one and prompts again.
        let state = flow.apply(retry).unwrap();
        let RestoreState::Prompting { candidates } = state else {
            panic!("expected prompting, got {state:?}");
        };
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, good.id);
    }

    #[test]
    fn exhausted_candidates_fall_back_to_new_session() {
        let temp = tempfile::tempdir().unwrap();
        let manager = manager(temp.path());
        let only = saved(&manager, "only", 1);
        let mut recovery_config = RecoveryConfig::strict();
        recovery_config.auto_cleanup = false;

        let mut flow = RestorationFlow::new(
            &manager,
            ErrorRecoverySystem::new(recovery_config),
            template(),
        );
        flow.start().unwrap();
        fs::write(manager.storage().session_path(&only.id), b"garbage").unwrap();

        flow.select(&only.id).unwrap();
        let retry = match flow.state() {
            RestoreState::Error { options, .. } => options[0].action.clone(),
            other => panic!("unexpected {other:?}"),
        };
        let state = flow.apply(retry).unwrap();
        assert!(matches!(
            state,
            RestoreState::Complete(RestoreOutcome::NewSession(_))
        ));
    }

    #[test]
    fn invalid_transitions_leave_state_unchanged() {
        let temp = tempfile::tempdir().unwrap();
        let manager = manager(temp.path());
        let mut flow = flow(&manager);

        let err = flow.select(&SessionId::new("x").unwrap()).unwrap_err();
        assert_eq!(
            err,
            InvalidTransition {
                action: "select a session",
                state: "detecting"
            }
        );
        assert_eq!(flow.state(), &RestoreState::Detecting);
        assert!(flow.continue_with_new().is_err());
        assert!(flow.apply(RecoveryAction::NewSession).is_err());

        flow.start().unwrap();
        assert!(flow.start().is_err());
        assert_eq!(flow.state().name(), "complete");
    }

    #[test]
    fn retry_detection_rescans() {
        let temp = tempfile::tempdir().unwrap();
        let manager = manager(temp.path());
        let s1 = saved(&manager, "s1", 1);

        let mut flow = flow(&manager);
        flow.start().unwrap();
        let original = fs::read(manager.storage().session_path(&s1.id)).unwrap();
        fs::remove_file(manager.storage().session_path(&s1.id)).unwrap();
        assert_eq!(flow.select(&s1.id).unwrap().name(), "error");

        fs::write(manager.storage().session_path(&s1.id), original).unwrap();
        let state = flow.retry_detection().unwrap();
        assert!(matches!(state, RestoreState::Prompting { .. }));
        assert!(matches!(
            flow.new_session().unwrap(),
            RestoreState::Complete(RestoreOutcome::NewSession(_))
        ));
    }

    #[test]
    fn unreadable_directory_falls_back_to_unsaved_session() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("sessions");
        let manager = manager(&dir);
        saved(&manager, "s1", 1);
        fs::remove_dir_all(&dir).unwrap();
        fs::write(&dir, b"not a directory").unwrap();

        let mut flow = flow(&manager);
        let state = flow.start().unwrap();
        let RestoreState::Complete(RestoreOutcome::NewSession(session)) = state else {
            panic!("expected new session, got {state:?}");
        };
        assert_eq!(session.workspace_root, "/repo");
        assert!(session.messages.is_empty());
        assert_eq!(flow.recovery().total_failures(), 0);
    }

    #[test]
    fn unreadable_index_falls_back_to_new_session() {
        let temp = tempfile::tempdir().unwrap();
        let manager = manager(temp.path());
        saved(&manager, "s1", 1);
        let index = manager.storage().index_path();
        fs::remove_file(&index).unwrap();
        fs::create_dir(&index).unwrap();

        let mut progress = Vec::new();
        let mut flow = flow(&manager).on_progress(|state| progress.push(state.name()));
        assert!(matches!(
            flow.start().unwrap(),
            RestoreState::Complete(RestoreOutcome::NewSession(_))
        ));
        drop(flow);
        assert_eq!(progress, vec!["complete"]);
    }
}
