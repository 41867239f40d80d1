//! Redaction of secrets before a session leaves the machine.
//!
//! Detection is regex based and therefore heuristic. The pattern set below is
//! the contract; deployments extend it with custom patterns rather than
//! expecting every secret shape to be caught.
//!
//! Matches from every enabled category are collected against the original
//! text. Overlaps resolve to the earliest start, then the longest match, then
//! the category listed first in [`PatternCategory::ALL`]. Custom patterns rank
//! after all built-in categories. A match that starts inside a redaction but
//! ends past it widens that redaction.

use std::collections::BTreeSet;
use std::path::{Component, Path};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::index::SessionMetadata;
use crate::session::{ContentBlock, MessageContent, Session};

/// Replaces every detected secret.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Replaces the workspace root when paths are not preserved.
pub const WORKSPACE_PLACEHOLDER: &str = "[Workspace path removed]";

/// Replaces context and accessed file paths when paths are not preserved.
pub const PATH_PLACEHOLDER: &str = "[Path removed]";

/// Prefix for workspace-relative paths in exports.
pub const RELATIVE_PREFIX: &str = "...";

/// Current format version for export documents.
pub const EXPORT_FORMAT_VERSION: u32 = 1;

static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:sk-(?:ant-)?[A-Za-z0-9_-]{20,}|AIza[0-9A-Za-z_-]{35}|gh[pousr]_[A-Za-z0-9]{36,}|xox[abprs]-[A-Za-z0-9-]{10,}|AKIA[0-9A-Z]{16})|\bBearer\s+[A-Za-z0-9._~+/-]{20,}=*",
    )
    .unwrap()
});

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});

static CREDENTIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(?:password|passwd|pwd|secret|token|api[_-]?key|access[_-]?key|auth[_-]?token|client[_-]?secret)\s*[:=]\s*(?:"[^"]*"|'[^']*'|[^\s,;]+)"#,
    )
    .unwrap()
});

static FILE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"/(?:home|Users|root|var|tmp|etc|opt|private|mnt)(?:/[^\s"'`<>|:;,()\[\]{}]+)+|\b[A-Za-z]:\\[^\s"'`<>|]+"#,
    )
    .unwrap()
});

static URL_CREDENTIALS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z][A-Za-z0-9+.-]*://[^\s/:@]+:[^\s/@]+@[^\s/]+").unwrap()
});

static ENV_VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\$\{[A-Za-z_][A-Za-z0-9_]*\}|\$[A-Z_][A-Z0-9_]{2,}\b|%[A-Z_][A-Z0-9_]*%|process\.env\.[A-Za-z_][A-Za-z0-9_]*",
    )
    .unwrap()
});

/// Built-in secret shapes, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    ApiKeys,
    Emails,
    Credentials,
    FilePaths,
    UrlsWithCredentials,
    EnvVars,
}

impl PatternCategory {
    pub const ALL: [Self; 6] = [
        Self::ApiKeys,
        Self::Emails,
        Self::Credentials,
        Self::FilePaths,
        Self::UrlsWithCredentials,
        Self::EnvVars,
    ];

    /// Name reported in [`FilterResult::data_types`].
    #[must_use]
    pub const fn data_type(self) -> &'static str {
        match self {
            Self::ApiKeys => "api_key",
            Self::Emails => "email",
            Self::Credentials => "credential",
            Self::FilePaths => "file_path",
            Self::UrlsWithCredentials => "url_credentials",
            Self::EnvVars => "env_var",
        }
    }

    fn regex(self) -> &'static Regex {
        match self {
            Self::ApiKeys => &API_KEY_RE,
            Self::Emails => &EMAIL_RE,
            Self::Credentials => &CREDENTIAL_RE,
            Self::FilePaths => &FILE_PATH_RE,
            Self::UrlsWithCredentials => &URL_CREDENTIALS_RE,
            Self::EnvVars => &ENV_VAR_RE,
        }
    }
}

/// What to redact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitiveDataConfig {
    pub categories: Vec<PatternCategory>,
    pub custom_patterns: Vec<String>,
    pub preserve_workspace_paths: bool,
}

impl Default for SensitiveDataConfig {
    fn default() -> Self {
        Self {
            categories: PatternCategory::ALL.to_vec(),
            custom_patterns: Vec::new(),
            preserve_workspace_paths: false,
        }
    }
}

/// Summary of one filtering pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterResult {
    pub filtered: bool,
    pub match_count: usize,
    pub data_types: BTreeSet<String>,
    pub warnings: Vec<String>,
}

impl FilterResult {
    fn record(&mut self, data_type: &str, count: usize) {
        if count == 0 {
            return;
        }
        self.match_count += count;
        self.filtered = true;
        self.data_types.insert(data_type.to_string());
    }
}

/// Export shape switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportOptions {
    /// Export only the metadata projection instead of the full session.
    pub metadata_only: bool,
}

/// What an export carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportPayload {
    Full { session: Box<Session> },
    Metadata { metadata: SessionMetadata },
}

/// A sanitized, shareable session document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExport {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: ExportPayload,
    pub filter: FilterResult,
}

/// One match resolved against the original text.
struct Span {
    start: usize,
    end: usize,
    rank: usize,
    data_type: &'static str,
}

/// Redacts secrets from sessions and their metadata.
#[derive(Debug)]
pub struct SensitiveDataFilter {
    config: SensitiveDataConfig,
    custom: Vec<Regex>,
    warnings: Vec<String>,
}

impl Default for SensitiveDataFilter {
    fn default() -> Self {
        Self::new(SensitiveDataConfig::default())
    }
}

impl SensitiveDataFilter {
    /// Builds a filter. Custom patterns that fail to compile are skipped and
    /// reported as warnings on every result.
    pub fn new(config: SensitiveDataConfig) -> Self {
        let mut custom = Vec::new();
        let mut warnings = Vec::new();
        for pattern in &config.custom_patterns {
            match Regex::new(pattern) {
                Ok(re) => custom.push(re),
                Err(err) => {
                    tracing::warn!(pattern, error = %err, "ignoring invalid custom pattern");
                    warnings.push(format!("invalid custom pattern '{pattern}': {err}"));
                }
            }
        }
        Self {
            config,
            custom,
            warnings,
        }
    }

    pub const fn config(&self) -> &SensitiveDataConfig {
        &self.config
    }

    fn new_result(&self) -> FilterResult {
        FilterResult {
            warnings: self.warnings.clone(),
            ..FilterResult::default()
        }
    }

    /// Redacts one string, accumulating counts into `result`.
    ///
    /// `workspace_root` only matters when paths are preserved: file paths
    /// under it are then left alone.
    pub fn filter_text(
        &self,
        text: &str,
        workspace_root: Option<&str>,
        result: &mut FilterResult,
    ) -> String {
        if text.is_empty() {
            return String::new();
        }

        let preserved_root = workspace_root
            .filter(|root| self.config.preserve_workspace_paths && !root.is_empty());

        let mut spans = Vec::new();
        for (rank, category) in PatternCategory::ALL.iter().enumerate() {
            if !self.config.categories.contains(category) {
                continue;
            }
            for m in category.regex().find_iter(text) {
                if *category == PatternCategory::FilePaths
                    && preserved_root.is_some_and(|root| Path::new(m.as_str()).starts_with(root))
                {
                    continue;
                }
                spans.push(Span {
                    start: m.start(),
                    end: m.end(),
                    rank,
                    data_type: category.data_type(),
                });
            }
        }
        for (offset, re) in self.custom.iter().enumerate() {
            for m in re.find_iter(text).filter(|m| !m.as_str().is_empty()) {
                spans.push(Span {
                    start: m.start(),
                    end: m.end(),
                    rank: PatternCategory::ALL.len() + offset,
                    data_type: "custom",
                });
            }
        }

        if spans.is_empty() {
            return text.to_string();
        }

        spans.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then_with(|| b.end.cmp(&a.end))
                .then_with(|| a.rank.cmp(&b.rank))
        });

        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for span in spans {
            if span.end <= cursor {
                continue;
            }
            if span.start < cursor {
                // Tail sticks out of the previous redaction; widen it.
                cursor = span.end;
                result.data_types.insert(span.data_type.to_string());
                continue;
            }
            out.push_str(&text[cursor..span.start]);
            out.push_str(REDACTION_MARKER);
            cursor = span.end;
            result.record(span.data_type, 1);
        }
        out.push_str(&text[cursor..]);
        out
    }

    fn filter_value(&self, value: &mut Value, root: Option<&str>, result: &mut FilterResult) {
        match value {
            Value::String(s) => *s = self.filter_text(s, root, result),
            Value::Array(items) => {
                for item in items {
                    self.filter_value(item, root, result);
                }
            }
            Value::Object(map) => {
                for item in map.values_mut() {
                    self.filter_value(item, root, result);
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }

    fn filter_opt(&self, text: &mut Option<String>, root: Option<&str>, result: &mut FilterResult) {
        if let Some(value) = text.as_mut() {
            *value = self.filter_text(value, root, result);
        }
    }

    fn strip_workspace(&self, root: &mut String, result: &mut FilterResult) {
        if self.config.preserve_workspace_paths || root.is_empty() {
            return;
        }
        *root = WORKSPACE_PLACEHOLDER.to_string();
        result.record("workspace_path", 1);
    }

    fn strip_paths(&self, paths: &mut [String], result: &mut FilterResult) {
        if self.config.preserve_workspace_paths {
            return;
        }
        for path in paths.iter_mut().filter(|p| !p.is_empty()) {
            *path = PATH_PLACEHOLDER.to_string();
            result.record("workspace_path", 1);
        }
    }

    /// Returns a redacted deep copy of `session`.
    pub fn filter_session(&self, session: &Session) -> (Session, FilterResult) {
        let mut result = self.new_result();
        let mut out = session.clone();
        let root = session.workspace_root.as_str();
        let root = (!root.is_empty()).then_some(root);

        for message in &mut out.messages {
            match &mut message.content {
                MessageContent::Text(text) => *text = self.filter_text(text, root, &mut result),
                MessageContent::Blocks(blocks) => {
                    for block in blocks {
                        match block {
                            ContentBlock::Text { text } => {
                                *text = self.filter_text(text, root, &mut result);
                            }
                            ContentBlock::ToolUse { input, .. } => {
                                self.filter_value(input, root, &mut result);
                            }
                            ContentBlock::ToolResult { content, .. } => {
                                self.filter_value(content, root, &mut result);
                            }
                            ContentBlock::Image { .. } => {}
                        }
                    }
                }
            }
            for call in &mut message.tool_calls {
                self.filter_value(&mut call.arguments, root, &mut result);
            }
            for tool_result in &mut message.tool_results {
                tool_result.output = self.filter_text(&tool_result.output, root, &mut result);
            }
        }

        self.filter_opt(&mut out.title, root, &mut result);
        self.filter_opt(&mut out.notes, root, &mut result);
        self.strip_workspace(&mut out.workspace_root, &mut result);
        self.strip_paths(&mut out.context_files, &mut result);
        self.strip_paths(&mut out.accessed_files, &mut result);

        if result.filtered {
            tracing::debug!(
                session_id = %session.id,
                matches = result.match_count,
                "redacted sensitive data from session"
            );
        }
        (out, result)
    }

    /// Returns a redacted copy of index metadata.
    pub fn filter_session_metadata(
        &self,
        metadata: &SessionMetadata,
    ) -> (SessionMetadata, FilterResult) {
        let mut result = self.new_result();
        let mut out = metadata.clone();
        let root = metadata.workspace_root.as_str();
        let root = (!root.is_empty()).then_some(root);

        self.filter_opt(&mut out.title, root, &mut result);
        self.filter_opt(&mut out.last_message_preview, root, &mut result);
        self.strip_workspace(&mut out.workspace_root, &mut result);
        self.strip_paths(&mut out.context_files, &mut result);

        (out, result)
    }

    /// Produces a shareable export of `session`.
    pub fn export_session(&self, session: &Session, options: ExportOptions) -> SessionExport {
        self.export_session_at(session, options, Utc::now())
    }

    pub fn export_session_at(
        &self,
        session: &Session,
        options: ExportOptions,
        now: DateTime<Utc>,
    ) -> SessionExport {
        let relative = |paths: &[String]| -> Vec<String> {
            paths
                .iter()
                .map(|p| relative_display(p, &session.workspace_root))
                .collect()
        };

        let (payload, filter) = if options.metadata_only {
            let (mut metadata, filter) =
                self.filter_session_metadata(&SessionMetadata::from_session(session));
            if !self.config.preserve_workspace_paths {
                metadata.context_files = relative(&session.context_files);
            }
            (ExportPayload::Metadata { metadata }, filter)
        } else {
            let (mut filtered, filter) = self.filter_session(session);
            if !self.config.preserve_workspace_paths {
                filtered.context_files = relative(&session.context_files);
                filtered.accessed_files = relative(&session.accessed_files);
            }
            (
                ExportPayload::Full {
                    session: Box::new(filtered),
                },
                filter,
            )
        };

        tracing::info!(
            session_id = %session.id,
            metadata_only = options.metadata_only,
            redactions = filter.match_count,
            "exported session"
        );

        SessionExport {
            version: EXPORT_FORMAT_VERSION,
            exported_at: now,
            payload,
            filter,
        }
    }
}

/// Rewrites `path` to a `...`-prefixed form that keeps structure below the
/// workspace root but never the absolute location.
fn relative_display(path: &str, workspace_root: &str) -> String {
    let p = Path::new(path);
    if !p.is_absolute() {
        return join_relative(p);
    }
    if !workspace_root.is_empty() {
        if let Ok(stripped) = p.strip_prefix(workspace_root) {
            return join_relative(stripped);
        }
    }
    let name = p
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{RELATIVE_PREFIX}/{name}")
}

fn join_relative(path: &Path) -> String {
    let parts: Vec<_> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    format!("{RELATIVE_PREFIX}/{}", parts.join("/"))
}
