//! Adapter contract
//!
//! One trait, four implementations, one per backend. Public methods never
//! return an error: every failure path is caught and folded into a
//! `success=false` result with a human-readable message.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;

use hub_core::model::{AgentListResult, ExportResult, RunResult, SessionListResult};

use crate::error::AdapterError;
use crate::process::{CancelFlag, SpawnObserver};

/// A single prompt execution request
pub struct RunRequest {
    /// The prompt text
    pub message: String,
    /// Session to resume, honored only after directory confirmation
    pub session_id: Option<String>,
    /// Backend-specific agent selector
    pub agent: Option<String>,
    /// Backend-specific model selector
    pub model: Option<String>,
    /// Directory the agent operates in
    pub working_dir: PathBuf,
    /// Cooperative cancellation flag shared with the caller
    pub cancel: Option<CancelFlag>,
    /// Invoked with the child's pid so the caller can record it
    pub on_spawn: Option<SpawnObserver>,
}

impl RunRequest {
    pub fn new(message: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            message: message.into(),
            session_id: None,
            agent: None,
            model: None,
            working_dir: working_dir.into(),
            cancel: None,
            on_spawn: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

impl fmt::Debug for RunRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunRequest")
            .field("message", &self.message)
            .field("session_id", &self.session_id)
            .field("agent", &self.agent)
            .field("model", &self.model)
            .field("working_dir", &self.working_dir)
            .field("on_spawn", &self.on_spawn.as_ref().map(|_| "<observer>"))
            .finish()
    }
}

/// Uniform interface over the backend CLIs
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Stable identifier used in error messages
    fn cli_name(&self) -> &str;

    /// Fixed template for an absent backend executable
    fn missing_command_error(&self) -> String {
        format!(
            "Error: '{}' command not found. Please ensure it is installed and in PATH.",
            self.cli_name()
        )
    }

    /// Execute one prompt, optionally resuming a confirmed session
    async fn run(&self, request: RunRequest) -> RunResult;

    /// Decode one persisted session into the normalized message list
    async fn export_session(&self, session_id: &str, working_dir: Option<&Path>) -> ExportResult;

    /// Discover sessions visible from a working directory, newest first
    async fn list_sessions(&self, working_dir: Option<&Path>) -> SessionListResult;

    /// Enumerate selectable agents for this backend
    async fn list_agents(&self) -> AgentListResult;
}

/// Convert an internal error into the user-visible failure message.
///
/// CommandNotFound is rewritten through the fixed template so the message
/// always names the backend's cli name, not whatever override the process
/// was actually spawned under.
pub(crate) fn failure_message(adapter: &dyn AgentAdapter, err: &AdapterError) -> String {
    match err {
        AdapterError::CommandNotFound { .. } => adapter.missing_command_error(),
        _ => err.to_string(),
    }
}

/// Session id used when a backend never reports one
pub(crate) fn synthesize_session_id(cli_name: &str) -> String {
    format!("{}-{}", cli_name, Utc::now().timestamp())
}

/// Resolve to an absolute, symlink-free path where possible
pub(crate) fn canonicalize_dir(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesized_id_pattern() {
        let id = synthesize_session_id("codex");
        let suffix = id.strip_prefix("codex-").unwrap();
        assert!(suffix.parse::<i64>().is_ok());
    }

    #[test]
    fn test_run_request_builder() {
        let request = RunRequest::new("do it", "/tmp").with_session("s1");
        assert_eq!(request.session_id.as_deref(), Some("s1"));
        assert!(request.cancel.is_none());
    }
}
