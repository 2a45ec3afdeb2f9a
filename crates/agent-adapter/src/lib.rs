//! Uniform adapter layer over local CLI coding agents.
//!
//! Four backends behind one trait: each adapter knows how to invoke its
//! CLI, how to read its private session store, and how to normalize both
//! into the shared result model from `hub_core`. Callers pick an adapter
//! through [`select_adapter`] and never see backend-specific errors; every
//! failure surfaces as a `success=false` result with a readable message.

pub mod adapter;
pub mod codex;
pub mod copilot;
pub mod cursor;
pub mod error;
pub mod opencode;
pub mod process;
pub mod selector;

pub use adapter::{AgentAdapter, RunRequest};
pub use codex::CodexAdapter;
pub use copilot::CopilotAdapter;
pub use cursor::CursorAdapter;
pub use error::{AdapterError, Result};
pub use opencode::OpenCodeAdapter;
pub use process::{CancelFlag, CommandOutput, CommandSpec, SpawnObserver};
pub use selector::{adapter_from_settings, select_adapter};
