//! Backend selection
//!
//! Maps a free-form agent name onto one of the four adapters. Unknown and
//! absent names fall back to the default backend rather than failing, so a
//! stale settings file never blocks a run.

use hub_core::config::Settings;
use tracing::debug;

use crate::adapter::AgentAdapter;
use crate::codex::CodexAdapter;
use crate::copilot::CopilotAdapter;
use crate::cursor::CursorAdapter;
use crate::opencode::OpenCodeAdapter;

/// Resolve an agent name to its adapter
pub fn select_adapter(agent: Option<&str>) -> Box<dyn AgentAdapter> {
    let name = agent.map(str::trim).unwrap_or("").to_ascii_lowercase();
    match name.as_str() {
        "copilot" => Box::new(CopilotAdapter::new()),
        "cursor" | "cursor-agent" => Box::new(CursorAdapter::new()),
        "codex" => Box::new(CodexAdapter::new()),
        "opencode" | "" => Box::new(OpenCodeAdapter::new()),
        other => {
            debug!("Unknown agent {:?}, falling back to opencode", other);
            Box::new(OpenCodeAdapter::new())
        }
    }
}

/// Resolve the adapter named by the user's settings
pub fn adapter_from_settings(settings: &Settings) -> Box<dyn AgentAdapter> {
    select_adapter(Some(settings.configured_agent()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_names_resolve() {
        assert_eq!(select_adapter(Some("copilot")).cli_name(), "copilot");
        assert_eq!(select_adapter(Some("cursor")).cli_name(), "cursor-agent");
        assert_eq!(select_adapter(Some("cursor-agent")).cli_name(), "cursor-agent");
        assert_eq!(select_adapter(Some("codex")).cli_name(), "codex");
        assert_eq!(select_adapter(Some("opencode")).cli_name(), "opencode");
    }

    #[test]
    fn test_name_matching_is_forgiving() {
        assert_eq!(select_adapter(Some("  Codex ")).cli_name(), "codex");
        assert_eq!(select_adapter(Some("COPILOT")).cli_name(), "copilot");
    }

    #[test]
    fn test_unknown_and_absent_fall_back() {
        assert_eq!(select_adapter(None).cli_name(), "opencode");
        assert_eq!(select_adapter(Some("")).cli_name(), "opencode");
        assert_eq!(select_adapter(Some("mystery")).cli_name(), "opencode");
    }

    #[test]
    fn test_settings_default_resolves() {
        let settings = Settings::default();
        assert_eq!(adapter_from_settings(&settings).cli_name(), "opencode");
    }
}
