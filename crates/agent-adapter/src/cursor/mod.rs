//! Cursor adapter
//!
//! Drives the `cursor-agent` CLI. Unlike the stdin-fed backends, this one
//! takes the prompt as a trailing positional argument. Conversations live
//! in a single SQLite database keyed by `root_path`, so resume and listing
//! are directory-scoped the same way the OpenCode store is.

mod store;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use hub_core::model::{
    AgentInfo, AgentListResult, ExportResult, RunResult, SessionListResult,
};

use crate::adapter::{canonicalize_dir, failure_message, synthesize_session_id, AgentAdapter, RunRequest};
use crate::error::{AdapterError, Result};
use crate::process::{run_cancellable, run_to_completion, CommandSpec};

const CLI_NAME: &str = "cursor-agent";

/// Env override for the conversation database, read per call
const DB_PATH_ENV: &str = "CURSOR_AGENT_DB_PATH";

/// Adapter for the Cursor CLI (SQLite conversation store, JSON transcripts)
#[derive(Debug, Clone, Default)]
pub struct CursorAdapter {
    command: Option<String>,
    db_path: Option<PathBuf>,
}

impl CursorAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the executable name (used by tests and custom installs)
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Override the database location, bypassing env and defaults
    pub fn with_db_path(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(db_path.into());
        self
    }

    fn command(&self) -> &str {
        self.command.as_deref().unwrap_or(CLI_NAME)
    }

    fn resolve_db_path(&self) -> Result<PathBuf> {
        let path = if let Some(path) = &self.db_path {
            path.clone()
        } else if let Some(path) = std::env::var_os(DB_PATH_ENV)
            .map(PathBuf::from)
            .filter(|p| p.exists())
        {
            path
        } else {
            dirs::home_dir()
                .map(|home| home.join(".cursor/cli.db"))
                .ok_or_else(|| AdapterError::store_unavailable("Home directory not found"))?
        };

        if path.is_file() {
            Ok(path)
        } else {
            Err(AdapterError::store_unavailable(
                "Cursor conversation database not found",
            ))
        }
    }

    fn confirmed_resume(&self, session_id: Option<&str>, working_dir: &Path) -> Option<String> {
        let session_id = session_id?;
        let db = self.resolve_db_path().ok()?;
        match store::conversation_exists(&db, session_id, working_dir) {
            Ok(true) => Some(session_id.to_string()),
            Ok(false) => None,
            Err(e) => {
                warn!("Resume check failed, starting fresh: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl AgentAdapter for CursorAdapter {
    fn cli_name(&self) -> &str {
        CLI_NAME
    }

    async fn run(&self, request: RunRequest) -> RunResult {
        let working_dir = canonicalize_dir(&request.working_dir);
        let cancel = request.cancel.unwrap_or_default();

        let resume_id = self.confirmed_resume(request.session_id.as_deref(), &working_dir);

        let mut spec = CommandSpec::new(self.command(), &working_dir).args(["--print", "--force"]);
        if let Some(agent) = &request.agent {
            spec = spec.args(["--agent", agent.as_str()]);
        }
        if let Some(model) = &request.model {
            spec = spec.args(["--model", model.as_str()]);
        }
        if let Some(session_id) = &resume_id {
            spec = spec.args(["--resume", session_id.as_str()]);
        }
        // Prompt travels as the trailing argument, not stdin
        spec = spec.arg(&request.message);

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

        // Content comes from the store afterwards; the run reports identity only
        let session_id = resume_id.unwrap_or_else(|| synthesize_session_id(CLI_NAME));
        RunResult::ok(session_id, Vec::new())
    }

    async fn export_session(&self, session_id: &str, _working_dir: Option<&Path>) -> ExportResult {
        let db = match self.resolve_db_path() {
            Ok(db) => db,
            Err(e) => return ExportResult::err(session_id, failure_message(self, &e)),
        };

        match store::export_session(&db, session_id) {
            Ok(messages) => ExportResult::ok(session_id, messages),
            Err(e) => ExportResult::err(session_id, failure_message(self, &e)),
        }
    }

    async fn list_sessions(&self, working_dir: Option<&Path>) -> SessionListResult {
        let db = match self.resolve_db_path() {
            Ok(db) => db,
            Err(e) => return SessionListResult::err(failure_message(self, &e)),
        };

        let scope = working_dir
            .map(canonicalize_dir)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        match store::list_sessions(&db, &scope) {
            Ok(sessions) => SessionListResult::ok(sessions),
            Err(e) => SessionListResult::err(failure_message(self, &e)),
        }
    }

    async fn list_agents(&self) -> AgentListResult {
        let spec = CommandSpec::new(self.command(), std::env::temp_dir()).args(["agents", "list"]);

        let output = match run_to_completion(spec).await {
            Ok(output) if output.success() => output,
            Ok(output) => {
                warn!(
                    "Agent listing exited with {}, using built-in fallback",
                    output.exit_code
                );
                return AgentListResult::ok(vec![built_in_agent()]);
            }
            Err(e) => {
                warn!("Agent listing failed, using built-in fallback: {}", e);
                return AgentListResult::ok(vec![built_in_agent()]);
            }
        };

        let agents = parse_agent_listing(&output.stdout);
        if agents.is_empty() {
            AgentListResult::ok(vec![built_in_agent()])
        } else {
            AgentListResult::ok(agents)
        }
    }
}

fn built_in_agent() -> AgentInfo {
    AgentInfo::new(CLI_NAME, "Built-in")
}

/// One agent per non-empty line; a "(active)" marker anywhere on the line
/// flags the current selection.
fn parse_agent_listing(stdout: &str) -> Vec<AgentInfo> {
    let mut agents = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let active = line.contains("(active)");
        let name = line
            .replace("(active)", "")
            .trim()
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        if name.is_empty() {
            continue;
        }

        let kind = if active { "Active" } else { "Unknown" };
        agents.push(AgentInfo::new(name, kind));
    }
    agents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CancelFlag;
    use hub_core::model::ContentType;
    use rusqlite::{params, Connection};
    use serde_json::json;
    use tempfile::TempDir;

    fn fixture_db(temp: &TempDir) -> PathBuf {
        let path = temp.path().join("cli.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE conversations_v2 (
                 id TEXT PRIMARY KEY,
                 root_path TEXT,
                 data TEXT,
                 updated_at INTEGER
             );",
        )
        .unwrap();
        path
    }

    fn insert_conversation(db: &Path, id: &str, root: &str, data: &serde_json::Value, updated: i64) {
        let conn = Connection::open(db).unwrap();
        conn.execute(
            "INSERT INTO conversations_v2 (id, root_path, data, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, root, data.to_string(), updated],
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_list_sessions_is_directory_scoped() {
        let temp = TempDir::new().unwrap();
        let db = fixture_db(&temp);
        let here = temp.path().canonicalize().unwrap();
        let blob = json!({"history": [{"user": {"text": "tidy the tests"}}]});

        insert_conversation(&db, "c-here", &here.to_string_lossy(), &blob, 200);
        insert_conversation(&db, "c-elsewhere", "/somewhere/else", &blob, 300);

        let adapter = CursorAdapter::new().with_db_path(&db);
        let listing = adapter.list_sessions(Some(&here)).await;
        assert!(listing.success);
        assert_eq!(listing.sessions.len(), 1);
        assert_eq!(listing.sessions[0].session_id, "c-here");
        assert_eq!(listing.sessions[0].title, "tidy the tests");
    }

    #[tokio::test]
    async fn test_export_splits_tools_from_text() {
        let temp = TempDir::new().unwrap();
        let db = fixture_db(&temp);
        let blob = json!({
            "history": [{
                "user": {"text": "go"},
                "assistant": {
                    "text": "Done",
                    "tool_uses": [{"name": "edit", "args": {"path": "src/lib.rs"}}]
                }
            }]
        });
        insert_conversation(&db, "c1", "/w", &blob, 100);

        let adapter = CursorAdapter::new().with_db_path(&db);
        let export = adapter.export_session("c1", None).await;
        assert!(export.success);
        assert_eq!(export.messages.len(), 3);
        assert_eq!(export.messages[1].content_type, ContentType::ToolUse);
        assert_eq!(export.messages[2].content, "Done");
    }

    #[tokio::test]
    async fn test_export_unknown_session() {
        let temp = TempDir::new().unwrap();
        let db = fixture_db(&temp);
        let adapter = CursorAdapter::new().with_db_path(&db);
        let export = adapter.export_session("nope", None).await;
        assert!(!export.success);
        assert_eq!(
            export.error_message.as_deref(),
            Some("Session not found: nope")
        );
    }

    #[tokio::test]
    async fn test_run_pre_cancelled() {
        let cancel = CancelFlag::new();
        cancel.cancel();

        let adapter = CursorAdapter::new().with_command("not-a-real-binary-xyz");
        let request = RunRequest::new("hi", std::env::temp_dir()).with_cancel(cancel);
        let result = adapter.run(request).await;
        assert_eq!(result.error_message.as_deref(), Some("Agent request cancelled."));
    }

    #[tokio::test]
    async fn test_missing_command_names_cli() {
        let adapter = CursorAdapter::new().with_command("not-a-real-binary-xyz");
        let result = adapter.run(RunRequest::new("hi", std::env::temp_dir())).await;
        let message = result.error_message.unwrap();
        assert!(message.contains("cursor-agent"));
        assert!(message.contains("command not found"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_synthesizes_id_without_resume() {
        let adapter = CursorAdapter::new().with_command("true");
        let result = adapter.run(RunRequest::new("hi", std::env::temp_dir())).await;
        assert!(result.success);
        let id = result.session_id.unwrap();
        let suffix = id.strip_prefix("cursor-agent-").unwrap();
        assert!(suffix.parse::<i64>().is_ok());
    }

    #[test]
    fn test_parse_agent_listing_marks_active() {
        let agents = parse_agent_listing("default (active)\nreviewer\n\n");
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].name, "default");
        assert_eq!(agents[0].agent_type, "Active");
        assert_eq!(agents[1].name, "reviewer");
        assert_eq!(agents[1].agent_type, "Unknown");
    }
}
