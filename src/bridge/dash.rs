//! Dash shortcut grammar.
//!
//! Operators can type compact shortcuts like `mc -b hello -s Alpha` instead
//! of the full command form. This module rewrites them into canonical
//! command text; it has no side effects and is total over
//! `{Matched, Invalid, Unknown}`.

use fancy_regex::Regex;
use std::sync::OnceLock;

use crate::common::text::non_empty;

/// Canonical command names the shortcuts expand into.
pub mod canonical {
    pub const STATUS: &str = "bridge.status";
    pub const RECONNECT: &str = "bridge.reconnect";
    pub const BROADCAST: &str = "bridge.broadcast";
    pub const TITLE: &str = "bridge.title";
    pub const SUBTITLE: &str = "bridge.subtitle";
    pub const ACTIONBAR: &str = "bridge.actionbar";
    pub const PRIVATE: &str = "bridge.private";
    pub const RCON: &str = "bridge.rcon";
}

/// Outcome of parsing a dash shortcut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashCommand {
    /// Recognized and rewritten into canonical command text.
    Matched(String),
    /// Recognized shortcut with malformed arguments.
    Invalid,
    /// Not a shortcut this grammar handles; defer to other handlers.
    Unknown,
}

struct Patterns {
    status: Regex,
    status_loose: Regex,
    reconnect: Regex,
    reconnect_loose: Regex,
    private: Regex,
    private_loose: Regex,
    action: Regex,
    action_loose: Regex,
    split_server: Regex,
}

fn patterns() -> &'static Patterns {
    static CELL: OnceLock<Patterns> = OnceLock::new();
    CELL.get_or_init(|| {
        let compile = |p: &str| Regex::new(p).expect("valid shortcut pattern");
        Patterns {
            status: compile(r"(?i)^-q(?:\s+-s\s+(\S+))?$"),
            status_loose: compile(r"(?i)^-q(?:\s|$)"),
            reconnect: compile(r"(?i)^-r(?:\s+-s\s+(\S+))?$"),
            reconnect_loose: compile(r"(?i)^-r(?:\s|$)"),
            private: compile(r"(?i)^-p\s+(\S+)\s+([\s\S]+)$"),
            private_loose: compile(r"(?i)^-p(?:\s|$)"),
            action: compile(r"(?i)^-([btuac])\s+([\s\S]+)$"),
            action_loose: compile(r"(?i)^-([btuac])(?:\s|$)"),
            // Anchored at end of string, so only the last `-s` counts.
            // The selector may also be the entire body, leaving it empty.
            split_server: compile(r"(?i)^([\s\S]*?)(?:(?:^|\s+)-s\s+(\S+))?$"),
        }
    })
}

/// The shortcut body after the configured prefix; empty when the text does
/// not start with the prefix.
pub fn body_after_prefix<'a>(prefix: &str, content: &'a str) -> &'a str {
    let Some(prefix) = non_empty(prefix) else {
        return "";
    };
    content
        .trim()
        .strip_prefix(prefix)
        .map(str::trim)
        .unwrap_or("")
}

/// Whether the text is a dash shortcut for the given prefix.
pub fn is_shortcut(prefix: &str, content: &str) -> bool {
    body_after_prefix(prefix, content).starts_with('-')
}

/// Split a trailing `-s <server>` selector off an argument text.
fn split_server(input: &str) -> (String, String) {
    let text = input.trim();
    if let Ok(Some(caps)) = patterns().split_server.captures(text) {
        let body = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let server = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        (body.to_string(), server.to_string())
    } else {
        (text.to_string(), String::new())
    }
}

/// ` --server <name>` suffix for a canonical command, or empty.
fn server_part(server_name: &str) -> String {
    match non_empty(server_name) {
        Some(name) => format!(" --server {name}"),
        None => String::new(),
    }
}

/// Rewrite a shortcut body into a canonical command.
pub fn parse_shortcut(input: &str) -> DashCommand {
    let text = input.trim();
    let patterns = patterns();

    if let Ok(Some(caps)) = patterns.status.captures(text) {
        let server = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        return DashCommand::Matched(format!("{}{}", canonical::STATUS, server_part(server)));
    }
    if matches!(patterns.status_loose.is_match(text), Ok(true)) {
        return DashCommand::Invalid;
    }

    if let Ok(Some(caps)) = patterns.reconnect.captures(text) {
        let server = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        return DashCommand::Matched(format!("{}{}", canonical::RECONNECT, server_part(server)));
    }
    if matches!(patterns.reconnect_loose.is_match(text), Ok(true)) {
        return DashCommand::Invalid;
    }

    if let Ok(Some(caps)) = patterns.private.captures(text) {
        let player = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let (body, server) = split_server(caps.get(2).map(|m| m.as_str()).unwrap_or(""));
        if body.is_empty() {
            return DashCommand::Invalid;
        }
        return DashCommand::Matched(format!(
            "{} {player} {body}{}",
            canonical::PRIVATE,
            server_part(&server)
        ));
    }
    if matches!(patterns.private_loose.is_match(text), Ok(true)) {
        return DashCommand::Invalid;
    }

    let Ok(Some(caps)) = patterns.action.captures(text) else {
        if matches!(patterns.action_loose.is_match(text), Ok(true)) {
            return DashCommand::Invalid;
        }
        return DashCommand::Unknown;
    };

    let letter = caps
        .get(1)
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_default();
    let (body, server) = split_server(caps.get(2).map(|m| m.as_str()).unwrap_or(""));
    if body.is_empty() {
        return DashCommand::Invalid;
    }

    let command = match letter.as_str() {
        "b" => canonical::BROADCAST,
        "t" => canonical::TITLE,
        "u" => canonical::SUBTITLE,
        "a" => canonical::ACTIONBAR,
        "c" => canonical::RCON,
        _ => return DashCommand::Unknown,
    };
    DashCommand::Matched(format!("{command} {body}{}", server_part(&server)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_after_prefix() {
        assert_eq!(body_after_prefix("mc", "mc -q"), "-q");
        assert_eq!(body_after_prefix("mc", "  mc -q  "), "-q");
        assert_eq!(body_after_prefix("mc", "other"), "");
        assert_eq!(body_after_prefix("", "mc -q"), "");
    }

    #[test]
    fn test_is_shortcut_matches_body_dash() {
        assert!(is_shortcut("mc", "mc -q"));
        assert!(!is_shortcut("mc", "mc status"));
        assert!(!is_shortcut("mc", "hello"));
    }

    #[test]
    fn test_status_and_reconnect() {
        assert_eq!(
            parse_shortcut("-q"),
            DashCommand::Matched("bridge.status".to_string())
        );
        assert_eq!(
            parse_shortcut("-q -s Alpha"),
            DashCommand::Matched("bridge.status --server Alpha".to_string())
        );
        assert_eq!(
            parse_shortcut("-r -s Alpha"),
            DashCommand::Matched("bridge.reconnect --server Alpha".to_string())
        );
        // Trailing junk on a no-argument shortcut is malformed
        assert_eq!(parse_shortcut("-q what"), DashCommand::Invalid);
    }

    #[test]
    fn test_broadcast_round_trip() {
        assert_eq!(
            parse_shortcut("-b hello -s Alpha"),
            DashCommand::Matched("bridge.broadcast hello --server Alpha".to_string())
        );
        assert_eq!(parse_shortcut("-b -s Alpha"), DashCommand::Invalid);
    }

    #[test]
    fn test_text_actions() {
        assert_eq!(
            parse_shortcut("-t big news"),
            DashCommand::Matched("bridge.title big news".to_string())
        );
        assert_eq!(
            parse_shortcut("-u below"),
            DashCommand::Matched("bridge.subtitle below".to_string())
        );
        assert_eq!(
            parse_shortcut("-a look up"),
            DashCommand::Matched("bridge.actionbar look up".to_string())
        );
        assert_eq!(
            parse_shortcut("-c time set day -s Alpha"),
            DashCommand::Matched("bridge.rcon time set day --server Alpha".to_string())
        );
        assert_eq!(parse_shortcut("-t"), DashCommand::Invalid);
        assert_eq!(parse_shortcut("-t   "), DashCommand::Invalid);
        // A selector with no body leaves nothing to send
        assert_eq!(parse_shortcut("-t -s Alpha"), DashCommand::Invalid);
    }

    #[test]
    fn test_private_message() {
        assert_eq!(
            parse_shortcut("-p Steve hello there -s Alpha"),
            DashCommand::Matched("bridge.private Steve hello there --server Alpha".to_string())
        );
        assert_eq!(parse_shortcut("-p Steve"), DashCommand::Invalid);
        // Text that is only the selector leaves an empty body
        assert_eq!(parse_shortcut("-p Steve -s Alpha"), DashCommand::Invalid);
    }

    #[test]
    fn test_only_last_selector_counts() {
        assert_eq!(
            parse_shortcut("-b keep -s One -s Two"),
            DashCommand::Matched("bridge.broadcast keep -s One --server Two".to_string())
        );
    }

    #[test]
    fn test_unknown_letters_pass_through() {
        assert_eq!(parse_shortcut("-x whatever"), DashCommand::Unknown);
        assert_eq!(parse_shortcut("plain text"), DashCommand::Unknown);
        assert_eq!(parse_shortcut(""), DashCommand::Unknown);
    }

    #[test]
    fn test_case_insensitive_letters() {
        assert_eq!(
            parse_shortcut("-Q"),
            DashCommand::Matched("bridge.status".to_string())
        );
        assert_eq!(
            parse_shortcut("-B shout"),
            DashCommand::Matched("bridge.broadcast shout".to_string())
        );
    }

    #[test]
    fn test_canonical_output_never_rematches() {
        // Idempotence: feeding canonical output back in is not a shortcut
        for input in ["-q", "-b hello", "-p Steve hi -s Alpha"] {
            if let DashCommand::Matched(text) = parse_shortcut(input) {
                assert_eq!(parse_shortcut(&text), DashCommand::Unknown);
            } else {
                panic!("expected a match for {input}");
            }
        }
    }
}
