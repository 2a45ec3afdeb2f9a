//! OpenCode session store
//!
//! Reads the CLI's private SQLite database: a `session` table keyed by
//! working directory, a `message` table, and a `part` table holding the
//! per-message fragments. Connections are opened read-only per call and
//! closed before returning. The `time_*` columns have no fixed epoch
//! scale, so values go through the magnitude heuristic.

use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde_json::Value;
use tracing::debug;

use hub_core::model::{
    session_title, ContentType, HistoryMessage, MessageRole, SessionInfo,
};
use hub_core::time::{format_display_timestamp, normalize_epoch};

use crate::error::{AdapterError, Result};

/// Sessions returned per listing call
const SESSION_LIMIT: usize = 50;

fn open(db: &Path) -> Result<Connection> {
    Ok(Connection::open_with_flags(
        db,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?)
}

fn epoch_value(raw: Option<f64>) -> Value {
    raw.map(Value::from).unwrap_or(Value::Null)
}

fn role_from(raw: &str) -> MessageRole {
    if raw.eq_ignore_ascii_case("user") {
        MessageRole::User
    } else {
        MessageRole::Assistant
    }
}

/// Does this session exist under this working directory?
pub(crate) fn session_in_directory(db: &Path, session_id: &str, working_dir: &Path) -> Result<bool> {
    let conn = open(db)?;
    let found = conn
        .query_row(
            "SELECT 1 FROM session WHERE id = ?1 AND directory = ?2",
            params![session_id, working_dir.to_string_lossy()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// List sessions scoped to one working directory, newest first
pub(crate) fn list_sessions(db: &Path, working_dir: &Path) -> Result<Vec<SessionInfo>> {
    let conn = open(db)?;

    let mut stmt = conn.prepare(
        "SELECT id, time_updated FROM session
         WHERE directory = ?1
         ORDER BY time_updated DESC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(
        params![working_dir.to_string_lossy(), SESSION_LIMIT as i64],
        |row| {
            let id: String = row.get(0)?;
            let updated: Option<f64> = row.get(1)?;
            Ok((id, updated))
        },
    )?;

    let mut sessions = Vec::new();
    for row in rows {
        let (id, updated) = match row {
            Ok(row) => row,
            Err(e) => {
                debug!("Skipping unreadable session row: {}", e);
                continue;
            }
        };

        // A broken title source degrades one row, never the whole listing
        let first_user = match first_user_text(&conn, &id) {
            Ok(first_user) => first_user,
            Err(e) => {
                debug!("Title lookup failed for session {}: {}", id, e);
                None
            }
        };
        sessions.push(SessionInfo {
            session_id: id,
            title: session_title(first_user.as_deref()),
            updated: format_display_timestamp(&epoch_value(updated)),
        });
    }

    Ok(sessions)
}

fn first_user_text(conn: &Connection, session_id: &str) -> Result<Option<String>> {
    let from_parts: Option<String> = conn
        .query_row(
            "SELECT p.text FROM message m
             JOIN part p ON p.message_id = m.id
             WHERE m.session_id = ?1
               AND m.role = 'user'
               AND p.type IN ('text', 'reasoning')
               AND p.text IS NOT NULL AND p.text != ''
             ORDER BY m.time_created ASC, p.time_created ASC
             LIMIT 1",
            params![session_id],
            |row| row.get(0),
        )
        .optional()?;

    if from_parts.is_some() {
        return Ok(from_parts);
    }

    // Legacy rows carried the content inline on the message
    let from_message: Option<Option<String>> = conn
        .query_row(
            "SELECT content FROM message
             WHERE session_id = ?1 AND role = 'user'
             ORDER BY time_created ASC
             LIMIT 1",
            params![session_id],
            |row| row.get(0),
        )
        .optional()?;

    Ok(from_message.flatten())
}

/// Decode one session into the normalized message list.
///
/// `text` and `reasoning` parts each become their own text message, never
/// merged or dropped; `tool` parts become separate `tool_use` messages;
/// `step-start`/`step-finish` are metadata and contribute nothing. A
/// message with no parts at all falls back to its own `content` column,
/// kept even when empty so malformed legacy rows stay visible.
pub(crate) fn export_session(db: &Path, session_id: &str) -> Result<Vec<HistoryMessage>> {
    let conn = open(db)?;

    let exists = conn
        .query_row(
            "SELECT 1 FROM session WHERE id = ?1",
            params![session_id],
            |_| Ok(()),
        )
        .optional()?;
    if exists.is_none() {
        return Err(AdapterError::session_not_found(session_id));
    }

    let mut message_stmt = conn.prepare(
        "SELECT id, role, content, time_created FROM message
         WHERE session_id = ?1
         ORDER BY time_created ASC, id ASC",
    )?;
    let message_rows: Vec<(String, String, Option<String>, Option<f64>)> = message_stmt
        .query_map(params![session_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .filter_map(|row| row.ok())
        .collect();

    let mut part_stmt = conn.prepare(
        "SELECT id, type, text, tool, call_id, time_created FROM part
         WHERE message_id = ?1
         ORDER BY time_created ASC, id ASC",
    )?;

    let mut messages = Vec::new();
    for (message_id, role_raw, content, message_time) in message_rows {
        let role = role_from(&role_raw);
        let message_ts = normalize_epoch(&epoch_value(message_time));

        let parts: Vec<(String, String, Option<String>, Option<String>, Option<String>, Option<f64>)> =
            part_stmt
                .query_map(params![message_id], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })?
                .filter_map(|row| row.ok())
                .collect();

        if parts.is_empty() {
            messages.push(HistoryMessage {
                message_id: Some(message_id.clone()),
                role,
                content_type: ContentType::Text,
                content: content.unwrap_or_default(),
                timestamp: message_ts,
                part_id: None,
                call_id: None,
            });
            continue;
        }

        for (part_id, part_type, text, tool, call_id, part_time) in parts {
            let timestamp = normalize_epoch(&epoch_value(part_time)).or(message_ts);

            let (content_type, content) = match part_type.as_str() {
                // reasoning is ordinary narrative content, same as text
                "text" | "reasoning" => (ContentType::Text, text.unwrap_or_default()),
                "tool" => (
                    ContentType::ToolUse,
                    format!("Tool: {}", tool.as_deref().unwrap_or("unknown")),
                ),
                "step-start" | "step-finish" => continue,
                other => {
                    // Schema-drift fallback: probe text, then tool
                    if let Some(text) = text.filter(|t| !t.is_empty()) {
                        (ContentType::Text, text)
                    } else if let Some(tool) = tool {
                        (ContentType::ToolUse, format!("Tool: {}", tool))
                    } else {
                        debug!("Skipping part {} with unhandled type {}", part_id, other);
                        continue;
                    }
                }
            };

            messages.push(HistoryMessage {
                message_id: Some(message_id.clone()),
                role,
                content_type,
                content,
                timestamp,
                part_id: Some(part_id),
                call_id,
            });
        }
    }

    Ok(messages)
}
