//! Copilot event log parser
//!
//! Each session directory carries an `events.jsonl` append log. One JSON
//! object per line with a `type` discriminator; unknown types and
//! unparseable lines are skipped so one bad append never poisons the
//! whole export.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use hub_core::model::{ContentType, HistoryMessage, MessageRole};
use hub_core::text::{strip_ansi, truncate_chars};
use hub_core::time::to_milliseconds;

use crate::error::Result;

/// Longest tool-result preview carried into the history
const RESULT_PREVIEW_CHARS: usize = 200;

/// Decode a session's event log into the normalized message list
pub(crate) fn parse_events_file(path: &Path, session_id: &str) -> Result<Vec<HistoryMessage>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut messages = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                debug!("Unreadable line {} in {:?}: {}", index, path, e);
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let event: Value = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                debug!("Skipping malformed event line {} in {:?}: {}", index, path, e);
                continue;
            }
        };

        if let Some(message) = event_to_message(&event, session_id, index) {
            messages.push(message);
        }
    }

    Ok(messages)
}

fn event_to_message(event: &Value, session_id: &str, index: usize) -> Option<HistoryMessage> {
    let event_type = event.get("type")?.as_str()?;
    let data = event.get("data").unwrap_or(event);

    let (role, content_type, content) = match event_type {
        "user.message" => (MessageRole::User, ContentType::Text, event_text(data)?),
        "assistant.message" => (MessageRole::Assistant, ContentType::Text, event_text(data)?),
        "tool.execution_start" => (
            MessageRole::Assistant,
            ContentType::ToolUse,
            format!("Tool started: {}", tool_name(data)),
        ),
        "tool.execution_end" => {
            let mut content = format!("Tool completed: {}", tool_name(data));
            if let Some(result) = tool_result(data) {
                content.push('\n');
                content.push_str(&truncate_chars(&result, RESULT_PREVIEW_CHARS));
            }
            (MessageRole::Assistant, ContentType::Tool, content)
        }
        other => {
            debug!("Skipping event type {}", other);
            return None;
        }
    };

    let message_id = event
        .get("id")
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap_or_else(|| format!("{}-{}", session_id, index));

    Some(HistoryMessage {
        message_id: Some(message_id),
        role,
        content_type,
        content,
        timestamp: event.get("timestamp").and_then(to_milliseconds),
        part_id: None,
        call_id: None,
    })
}

fn event_text(data: &Value) -> Option<String> {
    let raw = data
        .get("content")
        .or_else(|| data.get("text"))?
        .as_str()?;
    Some(strip_ansi(raw).trim().to_string())
}

fn tool_name(data: &Value) -> String {
    for key in ["toolName", "tool", "name"] {
        if let Some(name) = data.get(key).and_then(|v| v.as_str()) {
            return name.to_string();
        }
    }
    "unknown".to_string()
}

fn tool_result(data: &Value) -> Option<String> {
    let result = data.get("result")?;
    if let Some(text) = result.as_str() {
        return Some(text.to_string());
    }
    for key in ["output", "content"] {
        if let Some(text) = result.get(key).and_then(|v| v.as_str()) {
            return Some(text.to_string());
        }
    }
    None
}

/// First user message text, used as the session title source
pub(crate) fn first_user_text(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let reader = BufReader::new(file);

    for line in reader.lines().map_while(|l| l.ok()) {
        let Ok(event) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        if event.get("type").and_then(|v| v.as_str()) == Some("user.message") {
            let data = event.get("data").unwrap_or(&event);
            if let Some(text) = event_text(data).filter(|t| !t.is_empty()) {
                return Some(text);
            }
        }
    }

    None
}
