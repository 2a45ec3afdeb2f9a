//! Cursor conversation store
//!
//! Reads the CLI's `conversations_v2` table: one row per conversation with
//! the working directory in `root_path` and the whole transcript as a JSON
//! blob in `data`. The blob's `history` array holds exchange objects, each
//! with an optional `user` turn and an optional `assistant` turn.

use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde_json::Value;
use tracing::debug;

use hub_core::model::{session_title, ContentType, HistoryMessage, MessageRole, SessionInfo};
use hub_core::text::truncate_chars;
use hub_core::time::{format_display_timestamp, to_milliseconds};

use crate::error::{AdapterError, Result};

/// Longest stringified tool-argument value carried into the history
const ARG_PREVIEW_CHARS: usize = 200;

fn open(db: &Path) -> Result<Connection> {
    Ok(Connection::open_with_flags(
        db,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?)
}

/// Does this conversation exist under this working directory?
pub(crate) fn conversation_exists(db: &Path, session_id: &str, working_dir: &Path) -> Result<bool> {
    let conn = open(db)?;
    let found = conn
        .query_row(
            "SELECT 1 FROM conversations_v2 WHERE id = ?1 AND root_path = ?2",
            params![session_id, working_dir.to_string_lossy()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// List conversations rooted at one working directory, newest first
pub(crate) fn list_sessions(db: &Path, working_dir: &Path) -> Result<Vec<SessionInfo>> {
    let conn = open(db)?;

    let mut stmt = conn.prepare(
        "SELECT id, data, updated_at FROM conversations_v2
         WHERE root_path = ?1
         ORDER BY updated_at DESC",
    )?;

    let rows = stmt.query_map(params![working_dir.to_string_lossy()], |row| {
        let id: String = row.get(0)?;
        let data: Option<String> = row.get(1)?;
        let updated: Option<i64> = row.get(2)?;
        Ok((id, data, updated))
    })?;

    let mut sessions = Vec::new();
    for row in rows {
        let (id, data, updated) = match row {
            Ok(row) => row,
            Err(e) => {
                debug!("Skipping unreadable conversation row: {}", e);
                continue;
            }
        };

        let first_user = data
            .as_deref()
            .and_then(|blob| serde_json::from_str::<Value>(blob).ok())
            .and_then(|blob| first_user_text(&blob));

        sessions.push(SessionInfo {
            session_id: id,
            title: session_title(first_user.as_deref()),
            updated: format_display_timestamp(&updated.map(Value::from).unwrap_or(Value::Null)),
        });
    }

    Ok(sessions)
}

/// Decode one conversation blob into the normalized message list
pub(crate) fn export_session(db: &Path, session_id: &str) -> Result<Vec<HistoryMessage>> {
    let conn = open(db)?;

    let data: Option<Option<String>> = conn
        .query_row(
            "SELECT data FROM conversations_v2 WHERE id = ?1",
            params![session_id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(data) = data else {
        return Err(AdapterError::session_not_found(session_id));
    };

    let blob: Value = match data.as_deref() {
        Some(blob) => serde_json::from_str(blob)
            .map_err(|e| AdapterError::other(format!("Corrupt conversation data: {}", e)))?,
        None => return Ok(Vec::new()),
    };

    Ok(parse_history(&blob, session_id))
}

/// Walk the `history` array, emitting user text, tool-use summaries, and
/// assistant text as separate messages. An assistant turn carrying both
/// tool calls and trailing content yields two messages with the same
/// timestamp, tool use first.
pub(crate) fn parse_history(blob: &Value, session_id: &str) -> Vec<HistoryMessage> {
    let Some(history) = blob.get("history").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    let mut messages = Vec::new();
    for (index, exchange) in history.iter().enumerate() {
        if let Some(user) = exchange.get("user") {
            if let Some(text) = turn_text(user) {
                messages.push(HistoryMessage {
                    message_id: Some(format!("{}-{}-user", session_id, index)),
                    role: MessageRole::User,
                    content_type: ContentType::Text,
                    content: text,
                    timestamp: user.get("timestamp").and_then(to_milliseconds),
                    part_id: None,
                    call_id: None,
                });
            }
        }

        let Some(assistant) = exchange.get("assistant") else {
            continue;
        };

        let timestamp = exchange
            .get("request_metadata")
            .and_then(|m| m.get("stream_end_timestamp_ms"))
            .and_then(to_milliseconds);

        let tool_uses = assistant
            .get("tool_uses")
            .and_then(|v| v.as_array())
            .map(|v| v.as_slice())
            .unwrap_or(&[]);
        if !tool_uses.is_empty() {
            messages.push(HistoryMessage {
                message_id: Some(format!("{}-{}-tools", session_id, index)),
                role: MessageRole::Assistant,
                content_type: ContentType::ToolUse,
                content: summarize_tool_uses(tool_uses),
                timestamp,
                part_id: None,
                call_id: None,
            });
        }

        if let Some(text) = turn_text(assistant) {
            messages.push(HistoryMessage {
                message_id: Some(format!("{}-{}-assistant", session_id, index)),
                role: MessageRole::Assistant,
                content_type: ContentType::Text,
                content: text,
                timestamp,
                part_id: None,
                call_id: None,
            });
        }
    }

    messages
}

fn turn_text(turn: &Value) -> Option<String> {
    let raw = turn
        .get("text")
        .or_else(|| turn.get("content"))?
        .as_str()?
        .trim();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

fn first_user_text(blob: &Value) -> Option<String> {
    let history = blob.get("history")?.as_array()?;
    history
        .iter()
        .filter_map(|exchange| exchange.get("user"))
        .find_map(turn_text)
}

fn summarize_tool_uses(tool_uses: &[Value]) -> String {
    let mut lines = Vec::new();
    for tool_use in tool_uses {
        let name = tool_use
            .get("name")
            .or_else(|| tool_use.get("tool"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        lines.push(format!("Tool: {}", name));

        if let Some(args) = tool_use
            .get("args")
            .or_else(|| tool_use.get("input"))
            .and_then(|v| v.as_object())
        {
            for (key, value) in args {
                let rendered = match value.as_str() {
                    Some(text) => text.to_string(),
                    None => value.to_string(),
                };
                lines.push(format!("  {}: {}", key, truncate_chars(&rendered, ARG_PREVIEW_CHARS)));
            }
        }
    }
    lines.join("\n")
}
