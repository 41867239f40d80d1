//! The persisted conversation model.
//!
//! A [`Session`] is owned by its file on disk; values in memory are transient
//! views. Everything here round-trips through `serde_json` losslessly so that
//! a write followed by a read yields an equal value.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{MessageId, SessionId};

/// Current on-disk format version for session documents.
pub const SESSION_FORMAT_VERSION: u32 = 1;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed block inside structured message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    Image {
        media_type: String,
        data: String,
    },
}

/// Message content can be a string or an array of content blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// A tool invocation requested by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// The outcome of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub call_id: String,
    pub output: String,
    #[serde(default)]
    pub is_error: bool,
}

/// One turn in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
}

impl Message {
    /// Creates a message with a fresh id stamped at `timestamp`.
    pub fn new(role: Role, content: impl Into<MessageContent>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::generate(),
            role,
            content: content.into(),
            timestamp,
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    /// Flattens the content to plain text.
    ///
    /// Text blocks are joined with newlines; tool and image blocks are skipped.
    #[must_use]
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Cumulative token counts for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub total: u64,
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    /// Accumulates one exchange worth of tokens.
    pub const fn add(&mut self, input: u64, output: u64) {
        self.input = self.input.saturating_add(input);
        self.output = self.output.saturating_add(output);
        self.total = self.input.saturating_add(self.output);
    }
}

/// A de-duplicated tag list.
///
/// Insertion order is kept for display but ignored by equality.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Tags(Vec<String>);

impl Tags {
    /// Adds a tag. Returns `false` if it was already present.
    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if self.0.contains(&tag) {
            return false;
        }
        self.0.push(tag);
        true
    }

    /// Removes a tag. Returns `false` if it was absent.
    pub fn remove(&mut self, tag: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|t| t != tag);
        self.0.len() != before
    }

    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl PartialEq for Tags {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().all(|tag| other.contains(tag))
    }
}

impl Eq for Tags {}

impl From<Vec<String>> for Tags {
    fn from(values: Vec<String>) -> Self {
        let mut tags = Self::default();
        for value in values {
            tags.insert(value);
        }
        tags
    }
}

impl From<Tags> for Vec<String> {
    fn from(tags: Tags) -> Self {
        tags.0
    }
}

impl<S: Into<String>> FromIterator<S> for Tags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut tags = Self::default();
        for tag in iter {
            tags.insert(tag);
        }
        tags
    }
}

/// One persisted multi-turn conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub model: String,
    pub provider: String,
    pub workspace_root: String,
    #[serde(default)]
    pub token_usage: TokenUsage,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub context_files: Vec<String>,
    #[serde(default)]
    pub accessed_files: Vec<String>,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Session {
    /// Creates an empty session with a fresh id.
    pub fn new(
        workspace_root: impl Into<String>,
        model: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self::new_at(SessionId::generate(), workspace_root, model, provider, Utc::now())
    }

    /// Creates an empty session with an explicit id and creation time.
    pub fn new_at(
        id: SessionId,
        workspace_root: impl Into<String>,
        model: impl Into<String>,
        provider: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            version: SESSION_FORMAT_VERSION,
            created_at: now,
            last_modified: now,
            model: model.into(),
            provider: provider.into(),
            workspace_root: workspace_root.into(),
            token_usage: TokenUsage::default(),
            messages: Vec::new(),
            context_files: Vec::new(),
            accessed_files: Vec::new(),
            tags: Tags::default(),
            title: None,
            notes: None,
        }
    }

    /// Appends a message and advances `last_modified` to its timestamp.
    pub fn push_message(&mut self, message: Message) {
        if message.timestamp > self.last_modified {
            self.last_modified = message.timestamp;
        }
        self.messages.push(message);
    }

    /// Marks the session as modified at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_modified = now;
    }

    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn tags_ignore_order_for_equality() {
        let a: Tags = ["demo", "rust"].into_iter().collect();
        let b: Tags = ["rust", "demo"].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.as_slice(), ["demo".to_string(), "rust".to_string()]);
    }

    #[test]
    fn tags_deduplicate_on_deserialize() {
        let tags: Tags = serde_json::from_str(r#"["a","b","a"]"#).unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(serde_json::to_string(&tags).unwrap(), r#"["a","b"]"#);
    }

    #[test]
    fn message_text_flattens_blocks() {
        let mut message = Message::new(Role::Assistant, "", ts("2025-01-01T00:00:00Z"));
        message.content = MessageContent::Blocks(vec![
            ContentBlock::Text {
                text: "first".to_string(),
            },
            ContentBlock::ToolUse {
                id: "t1".to_string(),
                name: "read_file".to_string(),
                input: serde_json::json!({"path": "src/lib.rs"}),
            },
            ContentBlock::Text {
                text: "second".to_string(),
            },
        ]);
        assert_eq!(message.text(), "first\nsecond");
    }

    #[test]
    fn content_accepts_string_or_blocks() {
        let text: MessageContent = serde_json::from_str(r#""hello""#).unwrap();
        assert_eq!(text, MessageContent::Text("hello".to_string()));

        let blocks: MessageContent =
            serde_json::from_str(r#"[{"type":"text","text":"hi"}]"#).unwrap();
        assert!(matches!(blocks, MessageContent::Blocks(ref b) if b.len() == 1));
    }

    #[test]
    fn push_message_advances_last_modified() {
        let created = ts("2025-01-01T00:00:00Z");
        let mut session = Session::new_at(
            SessionId::new("s1").unwrap(),
            "/repo",
            "claude-sonnet",
            "anthropic",
            created,
        );
        session.push_message(Message::new(Role::User, "hi", ts("2025-01-01T00:05:00Z")));
        assert_eq!(session.last_modified, ts("2025-01-01T00:05:00Z"));
        assert_eq!(session.created_at, created);
    }

    #[test]
    fn token_usage_accumulates() {
        let mut usage = TokenUsage::default();
        usage.add(100, 20);
        usage.add(50, 5);
        assert_eq!(
            usage,
            TokenUsage {
                total: 175,
                input: 150,
                output: 25
            }
        );
    }

    #[test]
    fn session_serializes_camel_case() {
        let session = Session::new_at(
            SessionId::new("s1").unwrap(),
            "/repo",
            "m",
            "p",
            ts("2025-01-01T00:00:00Z"),
        );
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["workspaceRoot"], "/repo");
        assert_eq!(value["version"], 1);
        assert!(value.get("title").is_none());
    }
}
