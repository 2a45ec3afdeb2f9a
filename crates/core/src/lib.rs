//! Core library for Agent Hub
//!
//! This crate contains the pieces shared by every agent adapter:
//! - The normalized result model returned to the API layer
//! - Timestamp and terminal-text normalizers
//! - The settings reader that selects the active adapter

pub mod config;
pub mod model;
pub mod text;
pub mod time;

pub use config::Settings;
pub use model::{
    AgentInfo, AgentListResult, ContentType, ExportResult, HistoryMessage, MessageRole, PartKind,
    ResponsePart, RunResult, SessionInfo, SessionListResult,
};
