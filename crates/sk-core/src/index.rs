//! Session metadata and the session index.
//!
//! [`SessionMetadata::from_session`] is the only way metadata is derived.
//! Storage and the validator both go through it, so an entry recreated for an
//! orphaned file is identical to the one a normal write would have produced.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{Session, Tags, TokenUsage};
use crate::types::SessionId;

/// Current on-disk format version for the index document.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Maximum length of the last-message preview, in characters.
pub const PREVIEW_LENGTH: usize = 100;

/// Lightweight projection of a [`Session`] kept in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub model: String,
    pub provider: String,
    pub token_usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub workspace_root: String,
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_preview: Option<String>,
    #[serde(default)]
    pub context_files: Vec<String>,
    #[serde(default)]
    pub tags: Tags,
}

impl SessionMetadata {
    /// Derives index metadata from a full session.
    pub fn from_session(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            created_at: session.created_at,
            last_modified: session.last_modified,
            model: session.model.clone(),
            provider: session.provider.clone(),
            token_usage: session.token_usage,
            title: session.title.clone(),
            workspace_root: session.workspace_root.clone(),
            message_count: session.messages.len(),
            last_message_preview: session
                .last_message()
                .map(|m| preview(&m.text()))
                .filter(|p| !p.is_empty()),
            context_files: session.context_files.clone(),
            tags: session.tags.clone(),
        }
    }

    /// Whether this entry still agrees with the file it describes.
    ///
    /// Only the fields other components rely on are compared.
    pub fn matches_session(&self, session: &Session) -> bool {
        self.id == session.id
            && self.message_count == session.messages.len()
            && self.tags == session.tags
    }
}

/// Collapses whitespace and truncates to [`PREVIEW_LENGTH`] characters.
pub fn preview(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= PREVIEW_LENGTH {
        return collapsed;
    }
    let truncated: String = collapsed.chars().take(PREVIEW_LENGTH).collect();
    format!("{truncated}...")
}

/// The directory of known sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIndex {
    pub version: u32,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub sessions: BTreeMap<SessionId, SessionMetadata>,
}

impl Default for SessionIndex {
    fn default() -> Self {
        Self::empty_at(Utc::now())
    }
}

impl SessionIndex {
    /// An index with no entries, stamped at `now`.
    pub const fn empty_at(now: DateTime<Utc>) -> Self {
        Self {
            version: INDEX_FORMAT_VERSION,
            last_updated: now,
            sessions: BTreeMap::new(),
        }
    }

    /// Inserts or replaces the entry for `metadata.id`.
    pub fn upsert(&mut self, metadata: SessionMetadata, now: DateTime<Utc>) {
        self.sessions.insert(metadata.id.clone(), metadata);
        self.last_updated = now;
    }

    /// Removes an entry, returning it if present.
    pub fn remove(&mut self, id: &SessionId, now: DateTime<Utc>) -> Option<SessionMetadata> {
        let removed = self.sessions.remove(id);
        if removed.is_some() {
            self.last_updated = now;
        }
        removed
    }

    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<&SessionMetadata> {
        self.sessions.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Entries ordered most recently modified first, ties broken by id.
    pub fn by_recency(&self) -> Vec<&SessionMetadata> {
        let mut entries: Vec<_> = self.sessions.values().collect();
        entries.sort_by(|a, b| {
            b.last_modified
                .cmp(&a.last_modified)
                .then_with(|| a.id.cmp(&b.id))
        });
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Message, Role};

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn session(id: &str, modified: &str) -> Session {
        let mut session = Session::new_at(
            SessionId::new(id).unwrap(),
            "/repo",
            "claude-sonnet",
            "anthropic",
            ts("2025-01-01T00:00:00Z"),
        );
        session.last_modified = ts(modified);
        session
    }

    #[test]
    fn metadata_projects_counts_and_tags() {
        let mut s = session("s1", "2025-01-01T00:00:00Z");
        s.push_message(Message::new(Role::User, "hello there", ts("2025-01-01T00:01:00Z")));
        s.tags.insert("demo");
        s.context_files.push("src/main.rs".to_string());

        let meta = SessionMetadata::from_session(&s);
        assert_eq!(meta.message_count, 1);
        assert_eq!(meta.tags.as_slice(), ["demo".to_string()]);
        assert_eq!(meta.last_message_preview.as_deref(), Some("hello there"));
        assert_eq!(meta.context_files, vec!["src/main.rs".to_string()]);
        assert!(meta.matches_session(&s));
    }

    #[test]
    fn metadata_preview_absent_for_empty_session() {
        let meta = SessionMetadata::from_session(&session("s1", "2025-01-01T00:00:00Z"));
        assert_eq!(meta.message_count, 0);
        assert!(meta.last_message_preview.is_none());
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(150);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), PREVIEW_LENGTH + 3);
    }

    #[test]
    fn preview_collapses_whitespace() {
        assert_eq!(preview("a\n\n  b\tc"), "a b c");
    }

    #[test]
    fn stale_metadata_detected() {
        let mut s = session("s1", "2025-01-01T00:00:00Z");
        let meta = SessionMetadata::from_session(&s);
        s.push_message(Message::new(Role::User, "more", ts("2025-01-01T00:02:00Z")));
        assert!(!meta.matches_session(&s));
    }

    #[test]
    fn by_recency_orders_newest_first() {
        let mut index = SessionIndex::empty_at(ts("2025-01-01T00:00:00Z"));
        let now = ts("2025-01-02T00:00:00Z");
        for (id, modified) in [
            ("a", "2025-01-01T01:00:00Z"),
            ("b", "2025-01-01T03:00:00Z"),
            ("c", "2025-01-01T02:00:00Z"),
        ] {
            index.upsert(SessionMetadata::from_session(&session(id, modified)), now);
        }
        let order: Vec<_> = index.by_recency().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        assert_eq!(index.last_updated, now);
    }

    #[test]
    fn remove_only_touches_timestamp_when_present() {
        let created = ts("2025-01-01T00:00:00Z");
        let mut index = SessionIndex::empty_at(created);
        let missing = SessionId::new("missing").unwrap();
        assert!(index.remove(&missing, ts("2025-01-03T00:00:00Z")).is_none());
        assert_eq!(index.last_updated, created);
    }
}
