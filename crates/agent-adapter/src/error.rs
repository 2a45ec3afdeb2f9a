//! Error types for the adapter layer
//!
//! Nothing here escapes an adapter's public methods: every variant is
//! converted to a `success=false` result at the trait boundary. The enum
//! exists so internal helpers can use `?` and so failure kinds stay
//! distinguishable (command missing vs. failed run vs. cancellation).

use thiserror::Error;

/// Result type alias for adapter-internal operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Failure kinds produced while driving a backend
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The backend executable is absent from PATH
    #[error("Error: '{cli}' command not found. Please ensure it is installed and in PATH.")]
    CommandNotFound { cli: String },

    /// Expected database file or session root is missing
    #[error("{0}")]
    StoreUnavailable(String),

    /// Requested session has no matching record
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// Caller-initiated abort of a running process
    #[error("Agent request cancelled.")]
    Cancelled,

    /// The backend ran but exited non-zero
    #[error("'{cli}' exited with code {code}: {detail}")]
    ProcessFailed {
        cli: String,
        code: i32,
        detail: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Anything else, caught at the adapter boundary
    #[error("{0}")]
    Other(String),
}

impl AdapterError {
    /// Create a CommandNotFound error
    pub fn command_not_found(cli: impl Into<String>) -> Self {
        Self::CommandNotFound { cli: cli.into() }
    }

    /// Create a StoreUnavailable error
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable(message.into())
    }

    /// Create a SessionNotFound error
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound {
            session_id: session_id.into(),
        }
    }

    /// Create a ProcessFailed error
    pub fn process_failed(cli: impl Into<String>, code: i32, detail: impl Into<String>) -> Self {
        Self::ProcessFailed {
            cli: cli.into(),
            code,
            detail: detail.into(),
        }
    }

    /// Create a catch-all error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_not_found_template() {
        let err = AdapterError::command_not_found("opencode");
        assert_eq!(
            err.to_string(),
            "Error: 'opencode' command not found. Please ensure it is installed and in PATH."
        );
    }

    #[test]
    fn test_cancelled_message_is_fixed() {
        assert_eq!(AdapterError::Cancelled.to_string(), "Agent request cancelled.");
    }
}
