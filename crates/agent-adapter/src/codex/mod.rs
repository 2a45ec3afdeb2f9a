//! Codex adapter
//!
//! Drives `codex exec --json`, which emits one JSON event per stdout line.
//! `thread.started` announces the session id (last one wins on restarts)
//! and `item.completed` carries the reply fragments. Durable history lives
//! in per-day rollout files under the Codex home.

mod rollout;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use hub_core::model::{
    AgentInfo, AgentListResult, ExportResult, PartKind, ResponsePart, RunResult, SessionListResult,
};
use hub_core::time::to_milliseconds;

use crate::adapter::{canonicalize_dir, failure_message, synthesize_session_id, AgentAdapter, RunRequest};
use crate::error::{AdapterError, Result};
use crate::process::{run_cancellable, CommandSpec};

const CLI_NAME: &str = "codex";

/// Env override for the Codex home, read per call
const HOME_ENV: &str = "CODEX_HOME";

/// Adapter for the Codex CLI (JSON event stream, rollout-file store)
#[derive(Debug, Clone, Default)]
pub struct CodexAdapter {
    command: Option<String>,
    codex_home: Option<PathBuf>,
}

impl CodexAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the executable name (used by tests and custom installs)
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Override the Codex home, bypassing env and defaults
    pub fn with_codex_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.codex_home = Some(home.into());
        self
    }

    fn command(&self) -> &str {
        self.command.as_deref().unwrap_or(CLI_NAME)
    }

    fn resolve_sessions_root(&self) -> Result<PathBuf> {
        let home = if let Some(home) = &self.codex_home {
            home.clone()
        } else if let Some(home) = std::env::var_os(HOME_ENV)
            .map(PathBuf::from)
            .filter(|p| p.exists())
        {
            home
        } else {
            dirs::home_dir()
                .map(|home| home.join(".codex"))
                .ok_or_else(|| AdapterError::store_unavailable("Home directory not found"))?
        };

        Ok(home.join("sessions"))
    }

    fn confirmed_resume(&self, session_id: Option<&str>, working_dir: &Path) -> Option<String> {
        let session_id = session_id?;
        let root = self.resolve_sessions_root().ok()?;
        if rollout::session_in_directory(&root, session_id, working_dir) {
            Some(session_id.to_string())
        } else {
            None
        }
    }
}

#[async_trait]
impl AgentAdapter for CodexAdapter {
    fn cli_name(&self) -> &str {
        CLI_NAME
    }

    async fn run(&self, request: RunRequest) -> RunResult {
        let working_dir = canonicalize_dir(&request.working_dir);
        let cancel = request.cancel.unwrap_or_default();

        let resume_id = self.confirmed_resume(request.session_id.as_deref(), &working_dir);

        let mut spec = CommandSpec::new(self.command(), &working_dir).arg("exec");
        if let Some(session_id) = &resume_id {
            spec = spec.args(["resume", session_id.as_str()]);
        }
        if let Some(model) = &request.model {
            spec = spec.args(["--model", model.as_str()]);
        }
        // Trailing "-" makes the CLI read the prompt from stdin
        spec = spec
            .args(["--json", "--full-auto", "-"])
            .stdin_payload(&request.message);

        let output = match run_cancellable(spec, &cancel, request.on_spawn).await {
            Ok(output) => output,
            Err(e) => return RunResult::err(failure_message(self, &e)),
        };

        if !output.success() {
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            let err = AdapterError::process_failed(CLI_NAME, output.exit_code, detail);
            return RunResult::err(failure_message(self, &err));
        }

        let (thread_id, response_parts) = parse_event_stream(&output.stdout);
        let session_id = thread_id
            .or(resume_id)
            .unwrap_or_else(|| synthesize_session_id(CLI_NAME));

        RunResult::ok(session_id, response_parts)
    }

    async fn export_session(&self, session_id: &str, _working_dir: Option<&Path>) -> ExportResult {
        let root = match self.resolve_sessions_root() {
            Ok(root) => root,
            Err(e) => return ExportResult::err(session_id, failure_message(self, &e)),
        };

        match rollout::export_session(&root, session_id) {
            Ok(messages) => ExportResult::ok(session_id, messages),
            Err(e) => ExportResult::err(session_id, failure_message(self, &e)),
        }
    }

    async fn list_sessions(&self, working_dir: Option<&Path>) -> SessionListResult {
        let root = match self.resolve_sessions_root() {
            Ok(root) => root,
            Err(e) => return SessionListResult::err(failure_message(self, &e)),
        };

        let scope = working_dir
            .map(canonicalize_dir)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        match rollout::list_sessions(&root, &scope) {
            Ok(sessions) => SessionListResult::ok(sessions),
            Err(e) => SessionListResult::err(failure_message(self, &e)),
        }
    }

    async fn list_agents(&self) -> AgentListResult {
        // This backend has no agent-listing concept; intentional, not a stub
        AgentListResult::ok(vec![AgentInfo::new(CLI_NAME, "Built-in")
            .with_details(vec!["Default Codex coding agent".to_string()])])
    }
}

/// Decode the per-line event stream into the announced thread id and the
/// reply parts. Malformed lines and unknown event types are skipped.
fn parse_event_stream(stdout: &str) -> (Option<String>, Vec<ResponsePart>) {
    let mut thread_id = None;
    let mut parts = Vec::new();

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            debug!("Skipping non-JSON event line");
            continue;
        };

        match event.get("type").and_then(|v| v.as_str()) {
            Some("thread.started") => {
                // Last announcement wins
                if let Some(id) = event.get("thread_id").and_then(|v| v.as_str()) {
                    thread_id = Some(id.to_string());
                }
            }
            Some("item.completed") => {
                let Some(item) = event.get("item") else {
                    continue;
                };
                if let Some(part) = item_to_part(item, &event) {
                    parts.push(part);
                }
            }
            _ => {}
        }
    }

    (thread_id, parts)
}

fn item_to_part(item: &Value, event: &Value) -> Option<ResponsePart> {
    let timestamp = event.get("timestamp").and_then(to_milliseconds);
    let item_id = item.get("id").and_then(|v| v.as_str()).map(String::from);

    let mut part = match item.get("item_type").or_else(|| item.get("type")).and_then(|v| v.as_str()) {
        // reasoning is ordinary narrative content, same as an agent message
        Some("agent_message") | Some("message") | Some("reasoning") => {
            ResponsePart::final_text(item_text(item)?)
        }
        Some("command_execution") | Some("function_call") | Some("tool_call") => {
            let name = item
                .get("command")
                .or_else(|| item.get("name"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            ResponsePart::new(PartKind::Tool, format!("Tool: {}", name))
        }
        _ => ResponsePart::final_text(item_text(item)?),
    };

    part.timestamp = timestamp;
    part.part_id = item_id;
    part.call_id = item
        .get("call_id")
        .and_then(|v| v.as_str())
        .map(String::from);
    Some(part)
}

fn item_text(item: &Value) -> Option<String> {
    let text = item
        .get("text")
        .or_else(|| item.get("content"))?
        .as_str()?
        .trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CancelFlag;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_event_stream_collects_parts() {
        let stdout = r#"
{"type":"thread.started","thread_id":"t-1"}
{"type":"item.completed","item":{"id":"i-1","item_type":"reasoning","text":"Thinking it over"}}
not json
{"type":"item.completed","item":{"id":"i-2","item_type":"command_execution","command":"cargo tree"}}
{"type":"item.completed","item":{"id":"i-3","item_type":"agent_message","text":"All done"}}
{"type":"turn.completed"}
"#;
        let (thread_id, parts) = parse_event_stream(stdout);
        assert_eq!(thread_id.as_deref(), Some("t-1"));
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].kind, PartKind::Final);
        assert_eq!(parts[0].text, "Thinking it over");
        assert_eq!(parts[1].kind, PartKind::Tool);
        assert_eq!(parts[1].text, "Tool: cargo tree");
        assert_eq!(parts[2].text, "All done");
    }

    #[test]
    fn test_last_thread_id_wins() {
        let stdout = r#"{"type":"thread.started","thread_id":"first"}
{"type":"thread.started","thread_id":"second"}"#;
        let (thread_id, _) = parse_event_stream(stdout);
        assert_eq!(thread_id.as_deref(), Some("second"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_without_announcement_synthesizes_id() {
        let adapter = CodexAdapter::new().with_command("true");
        let result = adapter.run(RunRequest::new("hi", std::env::temp_dir())).await;
        assert!(result.success);
        let id = result.session_id.unwrap();
        let suffix = id.strip_prefix("codex-").unwrap();
        assert!(suffix.parse::<i64>().is_ok());
    }

    #[tokio::test]
    async fn test_run_pre_cancelled() {
        let cancel = CancelFlag::new();
        cancel.cancel();

        let adapter = CodexAdapter::new().with_command("not-a-real-binary-xyz");
        let request = RunRequest::new("hi", std::env::temp_dir()).with_cancel(cancel);
        let result = adapter.run(request).await;
        assert_eq!(result.error_message.as_deref(), Some("Agent request cancelled."));
    }

    #[tokio::test]
    async fn test_missing_command_names_cli() {
        let adapter = CodexAdapter::new().with_command("not-a-real-binary-xyz");
        let result = adapter.run(RunRequest::new("hi", std::env::temp_dir())).await;
        let message = result.error_message.unwrap();
        assert!(message.contains("codex"));
        assert!(message.contains("command not found"));
    }

    #[tokio::test]
    async fn test_export_against_fixture_home() {
        let temp = TempDir::new().unwrap();
        let day = temp.path().join("sessions/2026/08/25");
        fs::create_dir_all(&day).unwrap();
        fs::write(
            day.join("rollout-fff.jsonl"),
            [
                format!(
                    r#"{{"type":"session_meta","payload":{{"id":"fff","cwd":"{}"}}}}"#,
                    temp.path().display()
                ),
                r#"{"type":"response_item","payload":{"type":"message","role":"assistant","content":[{"type":"output_text","text":"hello"}]}}"#.to_string(),
            ]
            .join("\n"),
        )
        .unwrap();

        let adapter = CodexAdapter::new().with_codex_home(temp.path());
        let export = adapter.export_session("fff", None).await;
        assert!(export.success, "{:?}", export.error_message);
        assert_eq!(export.messages.len(), 1);
        assert_eq!(export.messages[0].content, "hello");
    }

    #[tokio::test]
    async fn test_missing_store_is_reported() {
        let temp = TempDir::new().unwrap();
        let adapter = CodexAdapter::new().with_codex_home(temp.path().join("nope"));
        let listing = adapter.list_sessions(None).await;
        assert!(!listing.error_message.unwrap_or_default().is_empty());
        assert!(!listing.success);
    }
}
