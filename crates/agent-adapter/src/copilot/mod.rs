//! Copilot adapter
//!
//! This backend emits decorated terminal text, not JSON, so the live
//! response is the whole cleaned stdout capture as a single final part.
//! Session identity is directory-less: a session "belongs" to a working
//! directory iff a directory named after it exists under the sessions
//! root. There is no stored cwd metadata, so this is a weaker guarantee
//! than the database-backed adapters give; accepted precision gap.

mod events;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use hub_core::model::{
    session_title, AgentInfo, AgentListResult, ExportResult, ResponsePart, RunResult, SessionInfo,
    SessionListResult,
};
use hub_core::text::clean_response_text;
use hub_core::time::format_display_timestamp;

use crate::adapter::{canonicalize_dir, failure_message, synthesize_session_id, AgentAdapter, RunRequest};
use crate::error::{AdapterError, Result};
use crate::process::{run_cancellable, CommandSpec};

const CLI_NAME: &str = "copilot";

/// Env override for the sessions root, read per call
const STATE_DIR_ENV: &str = "COPILOT_STATE_DIR";

/// Adapter for the Copilot CLI (terminal-text output, per-session event logs)
#[derive(Debug, Clone, Default)]
pub struct CopilotAdapter {
    command: Option<String>,
    state_dir: Option<PathBuf>,
}

impl CopilotAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the executable name (used by tests and custom installs)
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Override the sessions root, bypassing env and defaults
    pub fn with_state_dir(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(state_dir.into());
        self
    }

    fn command(&self) -> &str {
        self.command.as_deref().unwrap_or(CLI_NAME)
    }

    fn resolve_state_dir(&self) -> Result<PathBuf> {
        let path = if let Some(path) = &self.state_dir {
            path.clone()
        } else if let Some(path) = std::env::var_os(STATE_DIR_ENV)
            .map(PathBuf::from)
            .filter(|p| p.exists())
        {
            path
        } else {
            dirs::home_dir()
                .map(|home| home.join(".copilot/history-session-state"))
                .ok_or_else(|| AdapterError::store_unavailable("Home directory not found"))?
        };

        if path.is_dir() {
            Ok(path)
        } else {
            Err(AdapterError::store_unavailable(
                "Copilot session directory not found",
            ))
        }
    }

    fn session_dir_exists(&self, session_id: &str) -> bool {
        self.resolve_state_dir()
            .map(|root| root.join(session_id).is_dir())
            .unwrap_or(false)
    }
}

#[async_trait]
impl AgentAdapter for CopilotAdapter {
    fn cli_name(&self) -> &str {
        CLI_NAME
    }

    async fn run(&self, request: RunRequest) -> RunResult {
        let working_dir = canonicalize_dir(&request.working_dir);
        let cancel = request.cancel.unwrap_or_default();

        let resume_id = request
            .session_id
            .filter(|sid| self.session_dir_exists(sid));

        let mut spec = CommandSpec::new(self.command(), &working_dir)
            .args(["--allow-all-tools"])
            .stdin_payload(&request.message);
        if let Some(model) = &request.model {
            spec = spec.args(["--model", model.as_str()]);
        }
        if let Some(session_id) = &resume_id {
            spec = spec.args(["--resume", session_id.as_str()]);
        }

        let output = match run_cancellable(spec, &cancel, request.on_spawn).await {
            Ok(output) => output,
            Err(e) => return RunResult::err(failure_message(self, &e)),
        };

        if !output.success() {
            let detail = if output.stderr.trim().is_empty() {
                clean_response_text(&output.stdout)
            } else {
                output.stderr.trim().to_string()
            };
            let err = AdapterError::process_failed(CLI_NAME, output.exit_code, detail);
            return RunResult::err(failure_message(self, &err));
        }

        let cleaned = clean_response_text(&output.stdout);
        let response_parts = if cleaned.is_empty() {
            Vec::new()
        } else {
            let mut part = ResponsePart::final_text(cleaned);
            part.timestamp = Some(Utc::now().timestamp_millis());
            vec![part]
        };

        // The CLI does not announce the session id; the freshest directory
        // under the sessions root is the one it just wrote.
        let session_id = resume_id
            .or_else(|| self.newest_session_dir())
            .unwrap_or_else(|| synthesize_session_id(CLI_NAME));

        RunResult::ok(session_id, response_parts)
    }

    async fn export_session(&self, session_id: &str, _working_dir: Option<&Path>) -> ExportResult {
        let root = match self.resolve_state_dir() {
            Ok(root) => root,
            Err(e) => return ExportResult::err(session_id, failure_message(self, &e)),
        };

        let session_dir = root.join(session_id);
        if !session_dir.is_dir() {
            let err = AdapterError::session_not_found(session_id);
            return ExportResult::err(session_id, failure_message(self, &err));
        }

        let events_path = session_dir.join("events.jsonl");
        if !events_path.is_file() {
            return ExportResult::ok(session_id, Vec::new());
        }

        match events::parse_events_file(&events_path, session_id) {
            Ok(messages) => ExportResult::ok(session_id, messages),
            Err(e) => ExportResult::err(session_id, failure_message(self, &e)),
        }
    }

    async fn list_sessions(&self, _working_dir: Option<&Path>) -> SessionListResult {
        let root = match self.resolve_state_dir() {
            Ok(root) => root,
            Err(e) => return SessionListResult::err(failure_message(self, &e)),
        };

        let entries = match fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(e) => return SessionListResult::err(format!("IO error: {}", e)),
        };

        let mut sessions: Vec<(i64, SessionInfo)> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(session_id) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let modified_ms = dir_modified_millis(&path);
            let first_user = events::first_user_text(&path.join("events.jsonl"));

            sessions.push((
                modified_ms.unwrap_or(0),
                SessionInfo {
                    session_id: session_id.to_string(),
                    title: session_title(first_user.as_deref()),
                    updated: format_display_timestamp(
                        &modified_ms.map(Value::from).unwrap_or(Value::Null),
                    ),
                },
            ));
        }

        sessions.sort_by(|a, b| b.0.cmp(&a.0));
        SessionListResult::ok(sessions.into_iter().map(|(_, info)| info).collect())
    }

    async fn list_agents(&self) -> AgentListResult {
        // This backend has no agent-listing concept; intentional, not a stub
        AgentListResult::ok(vec![AgentInfo::new(CLI_NAME, "Built-in")
            .with_details(vec!["Default Copilot coding agent".to_string()])])
    }
}

impl CopilotAdapter {
    fn newest_session_dir(&self) -> Option<String> {
        let root = self.resolve_state_dir().ok()?;
        let entries = fs::read_dir(&root).ok()?;

        let mut newest: Option<(i64, String)> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let modified = dir_modified_millis(&path).unwrap_or(0);
            if newest.as_ref().map(|(ts, _)| modified > *ts).unwrap_or(true) {
                newest = Some((modified, name.to_string()));
            }
        }

        newest.map(|(_, name)| name)
    }
}

fn dir_modified_millis(path: &Path) -> Option<i64> {
    let metadata = fs::metadata(path).ok()?;
    let modified = metadata.modified().ok()?;
    match modified.duration_since(UNIX_EPOCH) {
        Ok(duration) => Some(duration.as_millis() as i64),
        Err(e) => {
            debug!("Modification time before epoch for {:?}: {}", path, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CancelFlag;
    use std::fs;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn write_fake_cli(temp: &TempDir, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = temp.path().join("fake-copilot");
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn session_with_events(root: &Path, session_id: &str, lines: &[&str]) {
        let dir = root.join(session_id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("events.jsonl"), lines.join("\n")).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_wraps_cleaned_output_as_final_part() {
        let temp = TempDir::new().unwrap();
        let state = temp.path().join("state");
        fs::create_dir_all(&state).unwrap();
        let cli = write_fake_cli(
            &temp,
            "#!/bin/sh\ncat > /dev/null\nprintf '\\033[36m> Hello from Copilot\\033[0m\\n'\n",
        );

        let adapter = CopilotAdapter::new()
            .with_command(cli.to_string_lossy())
            .with_state_dir(&state);
        let result = adapter.run(RunRequest::new("hi", temp.path())).await;

        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(result.response_parts.len(), 1);
        assert_eq!(result.response_parts[0].text, "Hello from Copilot");

        // Empty state dir, so the id is synthesized
        let session_id = result.session_id.unwrap();
        assert!(session_id.starts_with("copilot-"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_empty_output_yields_no_parts() {
        let temp = TempDir::new().unwrap();
        let state = temp.path().join("state");
        fs::create_dir_all(&state).unwrap();
        let cli = write_fake_cli(&temp, "#!/bin/sh\ncat > /dev/null\n");

        let adapter = CopilotAdapter::new()
            .with_command(cli.to_string_lossy())
            .with_state_dir(&state);
        let result = adapter.run(RunRequest::new("hi", temp.path())).await;

        assert!(result.success);
        assert!(result.response_parts.is_empty());
    }

    #[tokio::test]
    async fn test_run_pre_cancelled() {
        let cancel = CancelFlag::new();
        cancel.cancel();

        let adapter = CopilotAdapter::new().with_command("not-a-real-binary-xyz");
        let request = RunRequest::new("hi", std::env::temp_dir()).with_cancel(cancel);
        let result = adapter.run(request).await;
        assert_eq!(result.error_message.as_deref(), Some("Agent request cancelled."));
    }

    #[tokio::test]
    async fn test_missing_command_names_cli() {
        let adapter = CopilotAdapter::new().with_command("not-a-real-binary-xyz");
        let result = adapter.run(RunRequest::new("hi", std::env::temp_dir())).await;
        let message = result.error_message.unwrap();
        assert!(message.contains("copilot"));
        assert!(message.contains("command not found"));
    }

    #[tokio::test]
    async fn test_list_sessions_reads_titles() {
        let temp = TempDir::new().unwrap();
        session_with_events(
            temp.path(),
            "session-a",
            &[r#"{"type":"user.message","data":{"content":"Refactor the parser"}}"#],
        );
        session_with_events(temp.path(), "session-b", &[]);

        let adapter = CopilotAdapter::new().with_state_dir(temp.path());
        let listing = adapter.list_sessions(None).await;
        assert!(listing.success);
        assert_eq!(listing.sessions.len(), 2);

        let a = listing
            .sessions
            .iter()
            .find(|s| s.session_id == "session-a")
            .unwrap();
        assert_eq!(a.title, "Refactor the parser");
        let b = listing
            .sessions
            .iter()
            .find(|s| s.session_id == "session-b")
            .unwrap();
        assert_eq!(b.title, "Untitled session");
    }

    #[tokio::test]
    async fn test_export_unknown_session() {
        let temp = TempDir::new().unwrap();
        let adapter = CopilotAdapter::new().with_state_dir(temp.path());
        let export = adapter.export_session("missing", None).await;
        assert!(!export.success);
        assert!(export.error_message.unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn test_export_session_without_log_is_empty() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("bare")).unwrap();
        let adapter = CopilotAdapter::new().with_state_dir(temp.path());
        let export = adapter.export_session("bare", None).await;
        assert!(export.success);
        assert!(export.messages.is_empty());
    }

    #[tokio::test]
    async fn test_missing_state_dir_is_reported() {
        let temp = TempDir::new().unwrap();
        let adapter = CopilotAdapter::new().with_state_dir(temp.path().join("nope"));
        let listing = adapter.list_sessions(None).await;
        assert!(!listing.success);
        assert!(listing
            .error_message
            .unwrap()
            .contains("session directory not found"));
    }
}
