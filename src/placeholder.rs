// src/placeholder.rs
//! Detection of placeholder channel labels ("TBA", "Sky Sports TBC", ...)
//! and other non-broadcast labels that must never enter the pipeline.
//!
//! Every ingestion point runs channel name strings through these predicates
//! before they reach matching, the registry, or the mapper.

use once_cell::sync::OnceCell;
use regex::Regex;

/// Minimum length for a channel name to be considered a real broadcaster.
/// Schedules occasionally carry one- or two-letter junk ("A", "BT" alone).
const MIN_USABLE_NAME_LEN: usize = 3;

fn placeholder_exact_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?:tba|tbc|tbd|n/?a|none|null|unknown|unannounced|to be announced|to be confirmed|not available|no channel(?:s)?(?: available)?|no broadcaster(?:s)?(?: available)?|channel(?:s)?\s+(?:tba|tbc|tbd)|-+)$",
        )
        .expect("placeholder exact regex")
    })
}

fn placeholder_suffix_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)^.+\s+(?:tba|tbc|tbd)$").expect("placeholder suffix regex"))
}

fn non_broadcast_word_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(app|website|web\s*site|youtube|radio)\b").expect("non-broadcast regex")
    })
}

fn domain_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b[a-z0-9][a-z0-9.-]{0,251}\.(com|net|org|io|tv|co|app|gg|me|fm|uk|us|au|de|fr)\b",
        )
        .expect("domain regex")
    })
}

/// Collapse internal whitespace and trim. Applied before any comparison.
pub fn normalize_channel_name(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when the label means "broadcaster not yet assigned".
/// Pure predicate; no side effects.
pub fn is_placeholder(value: &str) -> bool {
    let cleaned = normalize_channel_name(value);
    if cleaned.is_empty() {
        return false;
    }

    let probe = cleaned.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\r' | '\n' | ',' | ';' | '|' | '.'));
    placeholder_exact_re().is_match(probe) || placeholder_suffix_re().is_match(probe)
}

/// True when the name can act as a scan target or mapper key: not a
/// placeholder, not an app/website/radio label, not a bare domain, and
/// long enough to be a real channel name.
pub fn is_usable_channel_name(value: &str) -> bool {
    let cleaned = normalize_channel_name(value);
    if cleaned.chars().count() < MIN_USABLE_NAME_LEN {
        return false;
    }
    if is_placeholder(&cleaned) {
        return false;
    }
    if non_broadcast_word_re().is_match(&cleaned) {
        return false;
    }
    if domain_re().is_match(&cleaned) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_set_is_case_insensitive() {
        for name in [
            "TBA",
            "tbc",
            "TbD",
            "N/A",
            "NA",
            "None",
            "null",
            "Unknown",
            "Unannounced",
            "To Be Announced",
            "to be confirmed",
            "Not Available",
            "No Channels",
            "No Channel",
            "No Broadcasters Available",
            "Channels TBA",
            "-",
            "---",
        ] {
            assert!(is_placeholder(name), "expected placeholder: {name}");
        }
    }

    #[test]
    fn suffix_placeholders_are_detected() {
        assert!(is_placeholder("Sky Sports TBC"));
        assert!(is_placeholder("Main Event TBA"));
        assert!(is_placeholder("beIN Sports tbd"));
    }

    #[test]
    fn plausible_channel_names_pass() {
        for name in ["Sky Sports Main Event", "ESPN", "TNT Sports 1", "DAZN", "Canal+ Sport"] {
            assert!(!is_placeholder(name), "false positive: {name}");
        }
    }

    #[test]
    fn trailing_punctuation_does_not_hide_placeholders() {
        assert!(is_placeholder("TBA,"));
        assert!(is_placeholder(" tbc; "));
    }

    #[test]
    fn usable_name_guards() {
        assert!(is_usable_channel_name("Sky Sports Main Event"));
        assert!(!is_usable_channel_name("A"));
        assert!(!is_usable_channel_name("BT"));
        assert!(!is_usable_channel_name("TBA"));
        assert!(!is_usable_channel_name("Club Website"));
        assert!(!is_usable_channel_name("Radio 5 Live"));
        assert!(!is_usable_channel_name("stream.example.com"));
    }
}
