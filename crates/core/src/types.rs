// crates/core/src/types.rs
use serde::{Deserialize, Serialize};

/// A single session's persisted metadata. Mirrors the `sessions` table
/// row-for-row; the Store never stores a field this type doesn't have.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub file_path: String,
    pub filename: String,
    pub project: String,
    pub cwd: Option<String>,
    pub message_count: i64,
    pub file_size: i64,
    pub last_modified: i64,
    pub created: i64,
    pub indexed_at: i64,
    pub tokens_total: i64,
    pub tokens_input: i64,
    pub tokens_output: i64,
    pub primary_model: Option<String>,
    pub is_subagent: bool,
    pub parent_id: Option<String>,
}

/// Token aggregates for a single session, assistant lines only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: i64,
    pub output: i64,
}

impl TokenUsage {
    pub fn total(&self) -> i64 {
        self.input + self.output
    }
}

/// A tally of `message.model` occurrences across a session, with the
/// most frequent (first-seen on ties) surfaced as `primary`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub primary: Option<String>,
    pub counts: Vec<(String, u32)>,
}

impl ModelInfo {
    pub fn record(&mut self, model: &str) {
        if let Some(entry) = self.counts.iter_mut().find(|(name, _)| name == model) {
            entry.1 += 1;
        } else {
            self.counts.push((model.to_string(), 1));
        }
        self.primary = self
            .counts
            .iter()
            .fold(None::<&(String, u32)>, |best, cur| match best {
                Some(b) if b.1 >= cur.1 => Some(b),
                _ => Some(cur),
            })
            .map(|(name, _)| name.clone());
    }
}

/// Per-tool call counts for a single session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolUsageSummary {
    pub total: u32,
    pub per_name: Vec<(String, u32)>,
}

impl ToolUsageSummary {
    pub fn record(&mut self, name: &str) {
        self.total += 1;
        if let Some(entry) = self.per_name.iter_mut().find(|(n, _)| n == name) {
            entry.1 += 1;
        } else {
            self.per_name.push((name.to_string(), 1));
        }
    }
}

/// A content block within `message.content`. Unknown block shapes fall
/// through to `Other` rather than failing parsing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: Option<String>,
        #[serde(default)]
        content: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

/// `message.content` as observed on the wire: a bare string, a single
/// block, or an array of blocks.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Block(Box<ContentBlock>),
    Blocks(Vec<ContentBlock>),
}

/// The result of a single streaming pass over one log file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub message_count: i64,
    pub token_usage: TokenUsage,
    pub model_info: ModelInfo,
    pub tool_usage: ToolUsageSummary,
    pub searchable_text: String,
    pub cwd: Option<String>,
}

/// Whitelisted columns `Store::list_sessions` may sort by. Anything else
/// must be normalized to `LastModified` — this type exists so "anything
/// else" is unrepresentable past the parsing boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortBy {
    LastModified,
    Created,
    TokensTotal,
    MessageCount,
    FileSize,
}

impl SortBy {
    pub fn parse(s: &str) -> Self {
        match s {
            "created" => Self::Created,
            "tokens_total" => Self::TokensTotal,
            "message_count" => Self::MessageCount,
            "file_size" => Self::FileSize,
            _ => Self::LastModified,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::LastModified => "last_modified",
            Self::Created => "created",
            Self::TokensTotal => "tokens_total",
            Self::MessageCount => "message_count",
            Self::FileSize => "file_size",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Self::Asc,
            _ => Self::Desc,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}
