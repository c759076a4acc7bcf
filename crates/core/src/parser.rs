// crates/core/src/parser.rs
//! Single-pass streaming extraction of metadata and searchable text from
//! one JSONL session log. Never buffers the whole file: lines are read
//! lazily and discarded as soon as they've contributed to the running
//! aggregates.

use std::path::Path;

use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::error::ParseError;
use crate::types::{ContentBlock, MessageContent, ParseResult};

/// Each message's contribution to the searchable-text buffer is capped
/// so one verbose message can't starve the rest of the file.
const PER_MESSAGE_TEXT_CAP: usize = 2_000;
/// Total searchable text is capped across the whole file.
const TOTAL_TEXT_CAP: usize = 100_000;
/// Malformed-line warnings are bounded so a fully garbled file doesn't
/// flood the log.
const MAX_MALFORMED_WARNINGS: usize = 3;

/// Stream `path` once and extract everything spec'd in `ParseResult`.
/// Only unrecoverable I/O (open, read) surfaces as an `Err`; every
/// content-level problem is absorbed and logged.
pub async fn parse_session(path: &Path) -> Result<ParseResult, ParseError> {
    let file = File::open(path)
        .await
        .map_err(|e| ParseError::io(path, e))?;
    let mut lines = BufReader::new(file).lines();

    let mut result = ParseResult::default();
    let mut text_total = 0usize;
    let mut malformed_warnings = 0usize;

    loop {
        let line = match lines
            .next_line()
            .await
            .map_err(|e| ParseError::io(path, e))?
        {
            Some(line) => line,
            None => break,
        };

        let trimmed = line.trim_end_matches('\r');
        if trimmed.trim().is_empty() {
            continue;
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                if malformed_warnings < MAX_MALFORMED_WARNINGS {
                    warn!(path = %path.display(), error = %e, "malformed JSON line, skipping");
                    malformed_warnings += 1;
                }
                continue;
            }
        };

        if result.cwd.is_none() {
            if let Some(cwd) = find_cwd(&value) {
                result.cwd = Some(cwd);
            }
        }

        let Some(entry_type) = value.get("type").and_then(Value::as_str) else {
            continue;
        };
        if entry_type != "user" && entry_type != "assistant" {
            continue;
        }
        let Some(message) = value.get("message") else {
            continue;
        };

        result.message_count += 1;

        if entry_type == "assistant" {
            if let Some(usage) = message.get("usage") {
                result.token_usage.input += usage
                    .get("input_tokens")
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                result.token_usage.output += usage
                    .get("output_tokens")
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
            }
            if let Some(model) = message.get("model").and_then(Value::as_str) {
                result.model_info.record(model);
            }
            for tool_name in tool_use_names(message.get("content")) {
                result.tool_usage.record(&tool_name);
            }
        }

        if text_total < TOTAL_TEXT_CAP {
            let extracted = extract_text(message.get("content"));
            let capped: String = extracted.chars().take(PER_MESSAGE_TEXT_CAP).collect();
            let remaining = TOTAL_TEXT_CAP - text_total;
            let to_append: String = capped.chars().take(remaining).collect();
            text_total += to_append.chars().count();
            if !to_append.is_empty() {
                if !result.searchable_text.is_empty() {
                    result.searchable_text.push('\n');
                }
                result.searchable_text.push_str(&to_append);
            }
        }
    }

    Ok(result)
}

/// Look for a `cwd` field at the top level first, then under `message`.
fn find_cwd(value: &Value) -> Option<String> {
    value
        .get("cwd")
        .and_then(Value::as_str)
        .or_else(|| value.get("message").and_then(|m| m.get("cwd")).and_then(Value::as_str))
        .map(|s| s.to_string())
}

/// Walk `message.content`, which may be a bare string, a single block,
/// or an array of blocks, and collect the names of every `tool_use`
/// block with a non-empty name.
fn tool_use_names(content: Option<&Value>) -> Vec<String> {
    let Some(content) = content else {
        return Vec::new();
    };
    let Ok(parsed) = serde_json::from_value::<MessageContent>(content.clone()) else {
        return Vec::new();
    };
    let blocks: Vec<ContentBlock> = match parsed {
        MessageContent::Text(_) => Vec::new(),
        MessageContent::Block(b) => vec![*b],
        MessageContent::Blocks(bs) => bs,
    };
    blocks
        .into_iter()
        .filter_map(|b| match b {
            ContentBlock::ToolUse { name, .. } if !name.is_empty() => Some(name),
            _ => None,
        })
        .collect()
}

/// Extract the user-visible text from `message.content`: verbatim if a
/// string, the concatenation of `text` blocks (newline-separated) if an
/// array, a single block's text if it is itself a text block, otherwise
/// empty.
fn extract_text(content: Option<&Value>) -> String {
    let Some(content) = content else {
        return String::new();
    };
    let Ok(parsed) = serde_json::from_value::<MessageContent>(content.clone()) else {
        return String::new();
    };
    match parsed {
        MessageContent::Text(s) => s,
        MessageContent::Block(b) => match *b {
            ContentBlock::Text { text } => text,
            _ => String::new(),
        },
        MessageContent::Blocks(blocks) => blocks
            .into_iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn write_jsonl(lines: &[&str]) -> tempfile::NamedTempFile {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut file = tokio::fs::File::create(tmp.path()).await.unwrap();
        for line in lines {
            file.write_all(line.as_bytes()).await.unwrap();
            file.write_all(b"\n").await.unwrap();
        }
        tmp
    }

    #[tokio::test]
    async fn simple_session_counts_messages_and_resolves_model() {
        let tmp = write_jsonl(&[
            r#"{"type":"user","cwd":"/home/u/proj/my-awesome-project","message":{"content":"hi"}}"#,
            r#"{"type":"assistant","message":{"content":"hello","model":"claude-sonnet-4-20250514","usage":{"input_tokens":10,"output_tokens":5}}}"#,
            r#"{"type":"user","message":{"content":"more"}}"#,
            r#"{"type":"assistant","message":{"content":"ok","model":"claude-sonnet-4-20250514","usage":{"input_tokens":3,"output_tokens":2}}}"#,
            r#"{"type":"user","message":{"content":"last"}}"#,
            r#"{"type":"assistant","message":{"content":"done","model":"claude-sonnet-4-20250514","usage":{"input_tokens":1,"output_tokens":1}}}"#,
        ])
        .await;

        let result = parse_session(tmp.path()).await.unwrap();
        assert_eq!(result.message_count, 6);
        assert_eq!(result.cwd.as_deref(), Some("/home/u/proj/my-awesome-project"));
        assert_eq!(result.model_info.primary.as_deref(), Some("claude-sonnet-4-20250514"));
        assert_eq!(result.token_usage.input, 14);
        assert_eq!(result.token_usage.output, 8);
    }

    #[tokio::test]
    async fn tool_use_blocks_are_counted_per_name() {
        let tmp = write_jsonl(&[
            r#"{"type":"assistant","message":{"content":[
                {"type":"text","text":"doing work"},
                {"type":"tool_use","name":"Read","input":{}},
                {"type":"tool_use","name":"Read","input":{}},
                {"type":"tool_use","name":"Write","input":{}}
            ]}}"#,
        ])
        .await;

        let result = parse_session(tmp.path()).await.unwrap();
        assert_eq!(result.tool_usage.total, 3);
        let read = result.tool_usage.per_name.iter().find(|(n, _)| n == "Read").unwrap();
        assert_eq!(read.1, 2);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped_not_fatal() {
        let tmp = write_jsonl(&[
            "not json",
            r#"{"type":"user","message":{"content":"hello"}}"#,
            r#"{"type":"assistant","message":{"content":"hi"}}"#,
        ])
        .await;

        let result = parse_session(tmp.path()).await.unwrap();
        assert_eq!(result.message_count, 2);
    }

    #[tokio::test]
    async fn fully_malformed_file_yields_empty_result_not_error() {
        let tmp = write_jsonl(&["garbage one", "garbage two {", "]not json["]).await;
        let result = parse_session(tmp.path()).await.unwrap();
        assert_eq!(result.message_count, 0);
        assert_eq!(result.token_usage.total(), 0);
        assert!(result.searchable_text.is_empty());
    }

    #[tokio::test]
    async fn blank_lines_and_crlf_are_tolerated() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut file = tokio::fs::File::create(tmp.path()).await.unwrap();
        file.write_all(b"\r\n{\"type\":\"user\",\"message\":{\"content\":\"hi\"}}\r\n\r\n")
            .await
            .unwrap();

        let result = parse_session(tmp.path()).await.unwrap();
        assert_eq!(result.message_count, 1);
    }

    #[tokio::test]
    async fn searchable_text_truncates_per_message_and_total() {
        let long_line = "x".repeat(5_000);
        let lines: Vec<String> = (0..60)
            .map(|_| format!(r#"{{"type":"user","message":{{"content":"{long_line}"}}}}"#))
            .collect();
        let line_refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
        let tmp = write_jsonl(&line_refs).await;

        let result = parse_session(tmp.path()).await.unwrap();
        assert!(result.searchable_text.len() <= TOTAL_TEXT_CAP + 60);
    }

    #[tokio::test]
    async fn file_not_found_is_an_error() {
        let err = parse_session(Path::new("/nonexistent/path/file.jsonl"))
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::NotFound { .. }));
    }
}
