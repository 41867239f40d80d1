//! Session-level operations consumed by the agent loop.

use chrono::{DateTime, TimeDelta, Utc};
use sk_core::{ExportOptions, SensitiveDataFilter, Session, SessionExport, SessionId, SessionMetadata};
use sk_store::{SessionStorage, StoreError};

use crate::Config;

/// Thin orchestration over storage, export filtering and retention.
pub struct SessionManager {
    storage: SessionStorage,
    config: Config,
    filter: SensitiveDataFilter,
}

impl SessionManager {
    /// Opens the configured sessions directory.
    pub fn open(config: Config) -> Result<Self, StoreError> {
        let storage = SessionStorage::open(config.sessions_dir(), config.storage_options())?;
        Ok(Self::with_storage(storage, config))
    }

    pub fn with_storage(storage: SessionStorage, config: Config) -> Self {
        let filter = SensitiveDataFilter::new(config.filter.clone());
        Self {
            storage,
            config,
            filter,
        }
    }

    pub const fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Creates and persists an empty session, then enforces `max_sessions`.
    pub fn create_session(
        &self,
        workspace_root: &str,
        model: &str,
        provider: &str,
    ) -> Result<Session, StoreError> {
        let session = Session::new(workspace_root, model, provider);
        self.storage.write_session(&session)?;
        tracing::info!(session_id = %session.id, workspace = workspace_root, "created session");

        let pruned = self.enforce_max_sessions(&session.id)?;
        if !pruned.is_empty() {
            tracing::info!(count = pruned.len(), "pruned old sessions");
        }
        Ok(session)
    }

    pub fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        self.storage.write_session(session)
    }

    /// Whether the agent loop should save now.
    ///
    /// Unsaved sessions are always due. Otherwise the session must have
    /// changed since `last_saved` and the auto-save interval must have passed.
    pub fn autosave_due(
        &self,
        session: &Session,
        last_saved: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(last_saved) = last_saved else {
            return true;
        };
        let interval = TimeDelta::from_std(self.config.session.auto_save_interval())
            .unwrap_or(TimeDelta::MAX);
        session.last_modified > last_saved && now.signed_duration_since(last_saved) >= interval
    }

    /// Reads a session and produces a sanitized export of it.
    pub fn export_session(
        &self,
        id: &SessionId,
        options: ExportOptions,
    ) -> Result<SessionExport, StoreError> {
        let session = self.storage.read_session(id)?;
        Ok(self.filter.export_session(&session, options))
    }

    /// The most recently modified sessions, up to `max_candidates`.
    pub fn detect_available_sessions(&self) -> Result<Vec<SessionMetadata>, StoreError> {
        let mut sessions = self.storage.list_sessions()?;
        sessions.truncate(self.config.session.max_candidates);
        Ok(sessions)
    }

    pub fn restore_session(&self, id: &SessionId) -> Result<Session, StoreError> {
        self.storage.read_session(id)
    }

    /// Deletes the least recently modified sessions beyond `max_sessions`,
    /// never touching `keep`. Returns the deleted ids.
    fn enforce_max_sessions(&self, keep: &SessionId) -> Result<Vec<SessionId>, StoreError> {
        let max = self.config.session.max_sessions;
        let sessions = self.storage.list_sessions()?;
        if sessions.len() <= max {
            return Ok(Vec::new());
        }

        let excess = sessions.len() - max;
        let victims: Vec<SessionId> = sessions
            .into_iter()
            .rev()
            .filter(|m| &m.id != keep)
            .take(excess)
            .map(|m| m.id)
            .collect();

        for id in &victims {
            match self.storage.delete_session(id) {
                Ok(_) => tracing::debug!(session_id = %id, "deleted session over limit"),
                // Index entry without a file; validation will prune it.
                Err(StoreError::SessionNotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(victims)
    }
}

#[cfg(test)]
mod tests {
    use sk_core::{Message, Role};

    use super::*;

    fn manager(dir: &std::path::Path, max_sessions: usize) -> SessionManager {
        let mut config = Config {
            sessions_dir: dir.join("sessions"),
            ..Config::default()
        };
        config.session.max_sessions = max_sessions;
        SessionManager::open(config).unwrap()
    }

    #[test]
    fn create_session_persists_and_indexes() {
        let temp = tempfile::tempdir().unwrap();
        let manager = manager(temp.path(), 10);
        let session = manager.create_session("/repo", "model", "provider").unwrap();

        assert!(manager.storage().session_exists(&session.id).unwrap());
        assert_eq!(manager.restore_session(&session.id).unwrap(), session);
        assert_eq!(manager.detect_available_sessions().unwrap().len(), 1);
    }

    #[test]
    fn create_session_prunes_oldest_beyond_limit() {
        let temp = tempfile::tempdir().unwrap();
        let manager = manager(temp.path(), 2);

        let mut ids = Vec::new();
        for minutes in 0..2 {
            let mut session = Session::new("/repo", "m", "p");
            session.last_modified = Utc::now() - TimeDelta::minutes(10 - minutes);
            manager.save_session(&session).unwrap();
            ids.push(session.id);
        }

        let newest = manager.create_session("/repo", "m", "p").unwrap();
        let remaining: Vec<_> = manager
            .storage()
            .list_sessions()
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(remaining, vec![newest.id, ids[1].clone()]);
        // Deleted with a backup.
        assert_eq!(manager.storage().list_backups(&ids[0]).unwrap().len(), 1);
    }

    #[test]
    fn detect_limits_candidates() {
        let temp = tempfile::tempdir().unwrap();
        let mut config = Config {
            sessions_dir: temp.path().to_path_buf(),
            ..Config::default()
        };
        config.session.max_candidates = 2;
        let manager = SessionManager::open(config).unwrap();
        for _ in 0..4 {
            manager.create_session("/repo", "m", "p").unwrap();
        }
        assert_eq!(manager.detect_available_sessions().unwrap().len(), 2);
    }

    #[test]
    fn autosave_waits_for_changes_and_interval() {
        let temp = tempfile::tempdir().unwrap();
        let manager = manager(temp.path(), 10);
        let mut session = Session::new("/repo", "m", "p");
        let saved = session.last_modified;

        assert!(manager.autosave_due(&session, None, saved));
        assert!(!manager.autosave_due(&session, Some(saved), saved + TimeDelta::minutes(5)));

        session.push_message(Message::new(Role::User, "hi", saved + TimeDelta::seconds(1)));
        assert!(!manager.autosave_due(&session, Some(saved), saved + TimeDelta::seconds(10)));
        assert!(manager.autosave_due(&session, Some(saved), saved + TimeDelta::seconds(30)));
    }

    #[test]
    fn export_reads_and_filters() {
        let temp = tempfile::tempdir().unwrap();
        let manager = manager(temp.path(), 10);
        let mut session = manager
            .create_session("/home/alice/proj", "m", "p")
            .unwrap();
        session.push_message(Message::new(Role::User, "mail bob@example.com", Utc::now()));
        manager.save_session(&session).unwrap();

        let export = manager
            .export_session(&session.id, ExportOptions::default())
            .unwrap();
        let rendered = serde_json::to_string(&export).unwrap();
        assert!(!rendered.contains("bob@example.com"));
        assert!(!rendered.contains("/home/alice/proj"));
    }

    #[test]
    fn export_of_missing_session_fails() {
        let temp = tempfile::tempdir().unwrap();
        let manager = manager(temp.path(), 10);
        let err = manager
            .export_session(&SessionId::new("ghost").unwrap(), ExportOptions::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound(_)));
    }
}
