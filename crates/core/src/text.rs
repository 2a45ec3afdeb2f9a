//! Terminal text normalization
//!
//! Some backends write decorated terminal output rather than structured
//! events: ANSI color codes, `"> "` prompt markers, and `"(Assistant) "`
//! style role labels. Cleanup here is idempotent so already-clean text
//! passes through untouched.

use once_cell::sync::Lazy;
use regex::Regex;

/// ANSI CSI color/style sequences: ESC [ ... m
static ANSI_CSI: Lazy<Regex> =
    Lazy::new(|| Regex::new("\u{1b}\\[[0-9;]*m").expect("valid ANSI pattern"));

/// Leading parenthesized role label, e.g. "(Assistant) "
static ROLE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\([A-Za-z][A-Za-z0-9 _-]*\)\s+").expect("valid role pattern"));

/// Remove ANSI CSI color/style escape sequences.
pub fn strip_ansi(text: &str) -> String {
    ANSI_CSI.replace_all(text, "").into_owned()
}

/// Clean raw CLI reply text for display.
///
/// Strips ANSI sequences, then removes leading `"> "` prompt markers and
/// leading parenthesized role labels from each line, then trims the
/// surrounding whitespace.
pub fn clean_response_text(text: &str) -> String {
    let stripped = strip_ansi(text);

    let cleaned: Vec<String> = stripped.lines().map(clean_line).collect();
    cleaned.join("\n").trim().to_string()
}

fn clean_line(line: &str) -> String {
    let mut current = line.to_string();
    // Strip to a fixpoint so reapplying the cleaner is a no-op
    loop {
        let mut next = current.clone();
        while let Some(rest) = next.strip_prefix("> ") {
            next = rest.to_string();
        }
        next = ROLE_LABEL.replace(&next, "").into_owned();
        if next == current {
            return next;
        }
        current = next;
    }
}

/// Truncate to at most `max` characters.
///
/// Used for tool argument values and tool result previews, which backends
/// can make arbitrarily large.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
