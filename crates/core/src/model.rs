//! Normalized result model
//!
//! Every adapter call returns exactly one of the result types below. The
//! types are value objects: adapters construct them once and hand them to
//! the API layer, which maps them onto wire responses. Nothing in here is
//! shared across calls.

use serde::{Deserialize, Serialize};

/// Maximum length of a derived session title before truncation.
const TITLE_MAX_CHARS: usize = 50;

/// Title used when a session has no user message to derive one from.
const TITLE_PLACEHOLDER: &str = "Untitled session";

/// Kind of a live response fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartKind {
    Thinking,
    Tool,
    Final,
}

/// One fragment of an agent's live reply.
///
/// Created transiently while parsing a single `run` call's output; never
/// persisted by this layer (export against durable storage is the source
/// of truth).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePart {
    pub text: String,

    /// Epoch milliseconds, when the source carried one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    pub kind: PartKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl ResponsePart {
    /// Create a part with no source identifiers
    pub fn new(kind: PartKind, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: None,
            kind,
            part_id: None,
            call_id: None,
        }
    }

    /// Create a final-kind part
    pub fn final_text(text: impl Into<String>) -> Self {
        Self::new(PartKind::Final, text)
    }
}

/// Outcome of one agent invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub success: bool,

    /// Absent only on total failure before any ID is known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default)]
    pub response_parts: Vec<ResponsePart>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl RunResult {
    /// Successful run
    pub fn ok(session_id: impl Into<String>, response_parts: Vec<ResponsePart>) -> Self {
        Self {
            success: true,
            session_id: Some(session_id.into()),
            response_parts,
            error_message: None,
        }
    }

    /// Failed run; the message is required to be non-empty
    pub fn err(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            session_id: None,
            response_parts: Vec::new(),
            error_message: Some(if message.is_empty() {
                "Unknown error".to_string()
            } else {
                message
            }),
        }
    }
}

/// Role of a persisted message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Content type of a persisted message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Tool,
    ToolUse,
}

/// One normalized turn or sub-turn from a persisted conversation.
///
/// Tool invocation and tool result are always separate messages; adapters
/// never merge them. Content is already ANSI-cleaned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    /// Synthesized when the source record lacks one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    pub role: MessageRole,

    pub content_type: ContentType,

    pub content: String,

    /// Epoch milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl HistoryMessage {
    /// Create a text message
    pub fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            message_id: None,
            role,
            content_type: ContentType::Text,
            content: content.into(),
            timestamp: None,
            part_id: None,
            call_id: None,
        }
    }

    /// Create a message with an explicit content type
    pub fn with_type(role: MessageRole, content_type: ContentType, content: impl Into<String>) -> Self {
        Self {
            content_type,
            ..Self::text(role, content)
        }
    }
}

/// Outcome of one history export
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub success: bool,

    /// Echo of the requested session id
    pub session_id: String,

    #[serde(default)]
    pub messages: Vec<HistoryMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExportResult {
    pub fn ok(session_id: impl Into<String>, messages: Vec<HistoryMessage>) -> Self {
        Self {
            success: true,
            session_id: session_id.into(),
            messages,
            error_message: None,
        }
    }

    pub fn err(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            session_id: session_id.into(),
            messages: Vec::new(),
            error_message: Some(if message.is_empty() {
                "Unknown error".to_string()
            } else {
                message
            }),
        }
    }
}

/// One discoverable session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,

    /// Derived from the first user message, truncated
    pub title: String,

    /// Human-readable local timestamp, or "Unknown"
    pub updated: String,
}

/// Outcome of a session listing, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListResult {
    pub success: bool,

    #[serde(default)]
    pub sessions: Vec<SessionInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SessionListResult {
    pub fn ok(sessions: Vec<SessionInfo>) -> Self {
        Self {
            success: true,
            sessions,
            error_message: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            sessions: Vec::new(),
            error_message: Some(if message.is_empty() {
                "Unknown error".to_string()
            } else {
                message
            }),
        }
    }
}

/// One selectable agent exposed by a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub name: String,

    /// Free-form label such as "Built-in", "Custom", "Active", "Unknown"
    pub agent_type: String,

    /// Auxiliary description lines
    #[serde(default)]
    pub details: Vec<String>,
}

impl AgentInfo {
    pub fn new(name: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent_type: agent_type.into(),
            details: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }
}

/// Outcome of an agent listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentListResult {
    pub success: bool,

    #[serde(default)]
    pub agents: Vec<AgentInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AgentListResult {
    pub fn ok(agents: Vec<AgentInfo>) -> Self {
        Self {
            success: true,
            agents,
            error_message: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            agents: Vec::new(),
            error_message: Some(if message.is_empty() {
                "Unknown error".to_string()
            } else {
                message
            }),
        }
    }
}

/// Derive a session title from the first user message.
///
/// Truncated to 50 characters plus an ellipsis; a placeholder is used when
/// no user message exists or it is blank.
pub fn session_title(first_user_message: Option<&str>) -> String {
    let text = first_user_message.map(str::trim).unwrap_or("");
    if text.is_empty() {
        return TITLE_PLACEHOLDER.to_string();
    }
    if text.chars().count() > TITLE_MAX_CHARS {
        let truncated: String = text.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_result_err_never_empty() {
        let result = RunResult::err("");
        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("Unknown error"));
    }

    #[test]
    fn test_run_result_ok_has_no_error() {
        let result = RunResult::ok("abc", vec![ResponsePart::final_text("hi")]);
        assert!(result.success);
        assert!(result.error_message.is_none());
        assert_eq!(result.session_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_session_title_truncation() {
        let long = "a".repeat(80);
        let title = session_title(Some(&long));
        assert_eq!(title.chars().count(), 53);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_session_title_short_passthrough() {
        assert_eq!(session_title(Some("Fix the build")), "Fix the build");
    }

    #[test]
    fn test_session_title_placeholder() {
        assert_eq!(session_title(None), "Untitled session");
        assert_eq!(session_title(Some("   ")), "Untitled session");
    }

    #[test]
    fn test_response_part_serializes_camel_case() {
        let part = ResponsePart {
            text: "x".to_string(),
            timestamp: Some(1),
            kind: PartKind::Final,
            part_id: Some("p1".to_string()),
            call_id: None,
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["partId"], "p1");
        assert_eq!(json["kind"], "final");
        assert!(json.get("callId").is_none());
    }
}
