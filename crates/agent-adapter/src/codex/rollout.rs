//! Codex rollout store
//!
//! Sessions are append-only JSONL files under a date-partitioned tree:
//! `sessions/YYYY/MM/DD/rollout-<id>.jsonl`. The first line is a
//! `session_meta` event carrying the working directory; files without one
//! are skipped entirely. Directory scoping is ancestor-tolerant in both
//! directions because the CLI records whichever of the two it was started
//! from.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use hub_core::model::{session_title, ContentType, HistoryMessage, MessageRole, SessionInfo};
use hub_core::text::truncate_chars;
use hub_core::time::{format_display_timestamp, to_milliseconds};

use crate::error::{AdapterError, Result};

/// Longest tool argument or output preview carried into the history
const PREVIEW_CHARS: usize = 200;

const ROLLOUT_PREFIX: &str = "rollout-";
const ROLLOUT_SUFFIX: &str = ".jsonl";

/// Identity read from a rollout file's `session_meta` head line
#[derive(Debug, Clone)]
struct RolloutHead {
    session_id: String,
    cwd: PathBuf,
    timestamp_ms: Option<i64>,
}

/// Walk the year/month/day partitions for rollout files
fn collect_rollout_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let Ok(years) = fs::read_dir(root) else {
        return files;
    };
    for year in years.flatten().map(|e| e.path()).filter(|p| p.is_dir()) {
        let Ok(months) = fs::read_dir(&year) else {
            continue;
        };
        for month in months.flatten().map(|e| e.path()).filter(|p| p.is_dir()) {
            let Ok(days) = fs::read_dir(&month) else {
                continue;
            };
            for day in days.flatten().map(|e| e.path()).filter(|p| p.is_dir()) {
                let Ok(entries) = fs::read_dir(&day) else {
                    continue;
                };
                for path in entries.flatten().map(|e| e.path()) {
                    let is_rollout = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| n.starts_with(ROLLOUT_PREFIX) && n.ends_with(ROLLOUT_SUFFIX))
                        .unwrap_or(false);
                    if is_rollout && path.is_file() {
                        files.push(path);
                    }
                }
            }
        }
    }

    files
}

fn session_id_from_path(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())?
        .strip_prefix(ROLLOUT_PREFIX)?
        .strip_suffix(ROLLOUT_SUFFIX)
        .map(String::from)
}

fn read_head(path: &Path) -> Option<RolloutHead> {
    let file = File::open(path).ok()?;
    let reader = BufReader::new(file);

    for line in reader.lines().map_while(|l| l.ok()) {
        let Ok(event) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        if event.get("type").and_then(|v| v.as_str()) != Some("session_meta") {
            continue;
        }

        let payload = event.get("payload").unwrap_or(&event);
        let cwd = payload.get("cwd").and_then(|v| v.as_str())?;
        let cwd = PathBuf::from(cwd);
        let cwd = cwd.canonicalize().unwrap_or(cwd);

        let session_id = payload
            .get("id")
            .and_then(|v| v.as_str())
            .map(String::from)
            .or_else(|| session_id_from_path(path))?;

        let timestamp_ms = event
            .get("timestamp")
            .or_else(|| payload.get("timestamp"))
            .and_then(to_milliseconds);

        return Some(RolloutHead {
            session_id,
            cwd,
            timestamp_ms,
        });
    }

    debug!("No session_meta in {:?}, skipping", path);
    None
}

/// The recorded cwd matches when either path contains the other
fn dirs_related(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

pub(crate) fn session_in_directory(root: &Path, session_id: &str, working_dir: &Path) -> bool {
    find_session_file(root, session_id)
        .and_then(|path| read_head(&path))
        .map(|head| dirs_related(&head.cwd, working_dir))
        .unwrap_or(false)
}

pub(crate) fn find_session_file(root: &Path, session_id: &str) -> Option<PathBuf> {
    let wanted = format!("{}{}{}", ROLLOUT_PREFIX, session_id, ROLLOUT_SUFFIX);
    collect_rollout_files(root)
        .into_iter()
        .find(|path| path.file_name().and_then(|n| n.to_str()) == Some(wanted.as_str()))
}

/// List sessions whose recorded cwd relates to the working directory,
/// newest first
pub(crate) fn list_sessions(root: &Path, working_dir: &Path) -> Result<Vec<SessionInfo>> {
    if !root.is_dir() {
        return Err(AdapterError::store_unavailable(
            "Codex sessions directory not found",
        ));
    }

    let mut heads: Vec<(RolloutHead, PathBuf)> = collect_rollout_files(root)
        .into_iter()
        .filter_map(|path| read_head(&path).map(|head| (head, path)))
        .filter(|(head, _)| dirs_related(&head.cwd, working_dir))
        .collect();

    heads.sort_by(|a, b| b.0.timestamp_ms.cmp(&a.0.timestamp_ms));

    Ok(heads
        .into_iter()
        .map(|(head, path)| SessionInfo {
            session_id: head.session_id,
            title: session_title(first_user_text(&path).as_deref()),
            updated: format_display_timestamp(
                &head.timestamp_ms.map(Value::from).unwrap_or(Value::Null),
            ),
        })
        .collect())
}

fn first_user_text(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let reader = BufReader::new(file);

    for line in reader.lines().map_while(|l| l.ok()) {
        let Ok(event) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let Some(payload) = response_item_payload(&event) else {
            continue;
        };
        if payload.get("type").and_then(|v| v.as_str()) == Some("message")
            && payload.get("role").and_then(|v| v.as_str()) == Some("user")
        {
            let text = message_text(payload);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    None
}

fn response_item_payload(event: &Value) -> Option<&Value> {
    if event.get("type").and_then(|v| v.as_str()) != Some("response_item") {
        return None;
    }
    Some(event.get("payload").unwrap_or(event))
}

/// Join the textual items of a message payload's content array
fn message_text(payload: &Value) -> String {
    let Some(content) = payload.get("content").and_then(|v| v.as_array()) else {
        return payload
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
    };

    content
        .iter()
        .filter_map(|item| {
            item.get("text")
                .or_else(|| item.get("content"))
                .and_then(|v| v.as_str())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode one rollout file into the normalized message list
pub(crate) fn export_session(root: &Path, session_id: &str) -> Result<Vec<HistoryMessage>> {
    if !root.is_dir() {
        return Err(AdapterError::store_unavailable(
            "Codex sessions directory not found",
        ));
    }

    let Some(path) = find_session_file(root, session_id) else {
        return Err(AdapterError::session_not_found(session_id));
    };

    let file = File::open(&path)?;
    let reader = BufReader::new(file);

    let mut messages = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let Ok(line) = line else {
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }

        let event: Value = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                debug!("Skipping malformed rollout line {} in {:?}: {}", index, path, e);
                continue;
            }
        };

        let Some(payload) = response_item_payload(&event) else {
            continue;
        };

        let timestamp = event.get("timestamp").and_then(to_milliseconds);
        if let Some(mut message) = payload_to_message(payload) {
            message.message_id = Some(format!("{}-{}", session_id, index));
            message.timestamp = timestamp;
            messages.push(message);
        }
    }

    Ok(messages)
}

fn payload_to_message(payload: &Value) -> Option<HistoryMessage> {
    let call_id = payload
        .get("call_id")
        .and_then(|v| v.as_str())
        .map(String::from);

    match payload.get("type").and_then(|v| v.as_str()) {
        Some("message") => {
            let role = match payload.get("role").and_then(|v| v.as_str()) {
                Some("user") => MessageRole::User,
                _ => MessageRole::Assistant,
            };
            let text = message_text(payload);
            if text.is_empty() {
                return None;
            }
            Some(HistoryMessage::text(role, text))
        }
        Some("function_call") => {
            let name = payload
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            let mut content = format!("Tool: {}", name);
            if let Some(args) = payload.get("arguments").and_then(|v| v.as_str()) {
                content.push('\n');
                content.push_str(&truncate_chars(args, PREVIEW_CHARS));
            }
            let mut message =
                HistoryMessage::with_type(MessageRole::Assistant, ContentType::ToolUse, content);
            message.call_id = call_id;
            Some(message)
        }
        Some("function_call_output") => {
            let output = payload
                .get("output")
                .map(|v| match v.as_str() {
                    Some(text) => text.to_string(),
                    None => v.to_string(),
                })
                .unwrap_or_default();
            let mut message = HistoryMessage::with_type(
                MessageRole::Assistant,
                ContentType::Tool,
                truncate_chars(&output, PREVIEW_CHARS),
            );
            message.call_id = call_id;
            Some(message)
        }
        other => {
            // Schema-drift fallback: anything with readable text survives,
            // then anything naming a tool
            let text = payload
                .get("text")
                .or_else(|| payload.get("content"))
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if !text.is_empty() {
                return Some(HistoryMessage::text(MessageRole::Assistant, text));
            }
            if let Some(tool) = payload.get("tool").and_then(|v| v.as_str()) {
                let mut message = HistoryMessage::with_type(
                    MessageRole::Assistant,
                    ContentType::ToolUse,
                    format!("Tool: {}", tool),
                );
                message.call_id = call_id;
                return Some(message);
            }
            debug!("Skipping rollout payload with type {:?}", other);
            None
        }
    }
}
