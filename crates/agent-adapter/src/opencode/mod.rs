//! OpenCode adapter
//!
//! Drives the `opencode` CLI with the prompt on stdin and structured JSON
//! line output. The live stream is scanned only for a session identifier;
//! response content is deferred to `export_session` against the CLI's
//! SQLite database, which is the durable source of truth. The live part
//! parser still exists (and must agree with export on treating `reasoning`
//! parts as ordinary text) for callers that consume the stream directly.

mod store;

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
use crate::process::{run_cancellable, run_to_completion, CommandSpec};

const CLI_NAME: &str = "opencode";

/// Env override for the database path, read per call
const DB_PATH_ENV: &str = "OPENCODE_DB_PATH";

/// Agents shipped with the CLI itself
const BUILT_IN_AGENTS: &[&str] = &["build", "plan", "general"];

/// Adapter for the OpenCode CLI (database-backed sessions)
#[derive(Debug, Clone, Default)]
pub struct OpenCodeAdapter {
    command: Option<String>,
    db_path: Option<PathBuf>,
}

impl OpenCodeAdapter {
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
                .map(|home| home.join(".local/share/opencode/opencode.db"))
                .ok_or_else(|| AdapterError::store_unavailable("Home directory not found"))?
        };

        if path.is_file() {
            Ok(path)
        } else {
            Err(AdapterError::store_unavailable("OpenCode database not found"))
        }
    }

    /// Confirm a resume candidate belongs to the working directory
    fn confirmed_resume(&self, session_id: Option<&str>, working_dir: &Path) -> Option<String> {
        let session_id = session_id?;
        let db = self.resolve_db_path().ok()?;
        match store::session_in_directory(&db, session_id, working_dir) {
            Ok(true) => Some(session_id.to_string()),
            Ok(false) | Err(_) => None,
        }
    }
}

#[async_trait]
impl AgentAdapter for OpenCodeAdapter {
    fn cli_name(&self) -> &str {
        CLI_NAME
    }

    async fn run(&self, request: RunRequest) -> RunResult {
        let working_dir = canonicalize_dir(&request.working_dir);
        let cancel = request.cancel.unwrap_or_default();
        let resume_id = self.confirmed_resume(request.session_id.as_deref(), &working_dir);

        let mut spec = CommandSpec::new(self.command(), &working_dir)
            .args(["run", "--format", "json", "--auto-approve"])
            .stdin_payload(&request.message);
        if let Some(agent) = &request.agent {
            spec = spec.args(["--agent", agent.as_str()]);
        }
        if let Some(model) = &request.model {
            spec = spec.args(["--model", model.as_str()]);
        }
        if let Some(session_id) = &resume_id {
            spec = spec.args(["--session", session_id.as_str()]);
        }

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

        let session_id = last_session_id(&output.stdout)
            .or(resume_id)
            .unwrap_or_else(|| synthesize_session_id(CLI_NAME));

        // Content intentionally omitted; export reads the database
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
        let working_dir = match working_dir {
            Some(dir) => canonicalize_dir(dir),
            None => match std::env::current_dir() {
                Ok(dir) => dir,
                Err(e) => return SessionListResult::err(format!("IO error: {}", e)),
            },
        };

        let db = match self.resolve_db_path() {
            Ok(db) => db,
            Err(e) => return SessionListResult::err(failure_message(self, &e)),
        };

        match store::list_sessions(&db, &working_dir) {
            Ok(sessions) => SessionListResult::ok(sessions),
            Err(e) => SessionListResult::err(failure_message(self, &e)),
        }
    }

    async fn list_agents(&self) -> AgentListResult {
        let cwd = std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir());
        let spec = CommandSpec::new(self.command(), cwd).args(["agent", "list"]);

        let output = match run_to_completion(spec).await {
            Ok(output) => output,
            Err(e) => return AgentListResult::err(failure_message(self, &e)),
        };

        if !output.success() {
            let err = AdapterError::process_failed(
                CLI_NAME,
                output.exit_code,
                output.stderr.trim().to_string(),
            );
            return AgentListResult::err(failure_message(self, &err));
        }

        AgentListResult::ok(parse_agent_listing(&output.stdout))
    }
}

/// Scan JSON output lines for the session identifier; the last one wins
fn last_session_id(stdout: &str) -> Option<String> {
    let mut found = None;
    for line in stdout.lines() {
        if let Some(id) = session_id_from_line(line) {
            found = Some(id);
        }
    }
    found
}

fn session_id_from_line(line: &str) -> Option<String> {
    let value: Value = serde_json::from_str(line.trim()).ok()?;
    session_id_from_value(&value).or_else(|| {
        // Some event shapes nest the id one level down
        ["part", "info", "session"]
            .iter()
            .find_map(|key| value.get(key).and_then(session_id_from_value))
    })
}

fn session_id_from_value(value: &Value) -> Option<String> {
    ["sessionID", "session_id", "sessionId"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Parse live-stream part events.
///
/// `reasoning` is narrative content exactly like `text`; dropping or
/// reclassifying it here would make the live view disagree with export.
pub fn live_parts(stdout: &str) -> Vec<ResponsePart> {
    let mut parts = Vec::new();

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                debug!("Skipping undecodable output line: {}", e);
                continue;
            }
        };

        let event = value.get("part").unwrap_or(&value);
        let kind = event.get("type").and_then(Value::as_str).unwrap_or("");
        let mut part = match kind {
            "text" | "reasoning" => {
                let Some(text) = event.get("text").and_then(Value::as_str) else {
                    continue;
                };
                ResponsePart::final_text(text)
            }
            "tool" => {
                let name = event
                    .get("tool")
                    .or_else(|| event.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                ResponsePart::new(PartKind::Tool, format!("Tool: {}", name))
            }
            // Forward-compatibility: unknown events still surface their text
            _ => match event.get("text").and_then(Value::as_str) {
                Some(text) => ResponsePart::final_text(text),
                None => continue,
            },
        };

        part.part_id = event
            .get("id")
            .or_else(|| event.get("partID"))
            .and_then(Value::as_str)
            .map(str::to_string);
        part.call_id = event
            .get("callID")
            .and_then(Value::as_str)
            .map(str::to_string);
        part.timestamp = event.get("time").and_then(|t| to_milliseconds(t));
        parts.push(part);
    }

    parts
}

fn parse_agent_listing(stdout: &str) -> Vec<AgentInfo> {
    let mut agents = Vec::new();

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        let agent_type = if BUILT_IN_AGENTS.contains(&name) {
            "Built-in"
        } else {
            "Custom"
        };

        let mut info = AgentInfo::new(name, agent_type);
        if !rest.is_empty() {
            info = info.with_details(vec![rest.to_string()]);
        }
        agents.push(info);
    }

    agents
}
