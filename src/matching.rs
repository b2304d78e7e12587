// src/matching.rs
//! Boundary-aware channel name matching, shared by the playlist scanner and
//! the event-channel mapper so both apply the same discipline.
//!
//! Raw playlist names are noisy: "AF - CANAL+ SPORT FHD", "UK: SKY SPORTS
//! MAIN EVENT UHD", "Sky Sports Main Event HD Backup 2". Matching works on
//! token sequences, never bare substrings, so "Sky Sports 1" cannot claim
//! "Sky Sports 10" and "Sport 24" cannot claim "Sky Sport 24". A raw name
//! matches a target only when, after stripping decorations (quality tags,
//! junk tags, leading country prefixes), its tokens equal the target's.

use std::collections::HashMap;

use once_cell::sync::OnceCell;
use regex::Regex;

/// Quality tier tokens carried by playlist names but not by schedules.
const QUALITY_TOKENS: &[&str] = &[
    "4k", "uhd", "fhd", "hd", "sd", "2160p", "1080p", "720p", "480p", "360p", "2160", "1080",
    "720", "480", "360", "hevc", "h264", "h265",
];

/// Provider junk tags. A pure-numeric token directly after one of these is
/// part of the decoration ("Backup 2"), unlike a bare numeric suffix which
/// distinguishes sibling channels ("RTL 7").
const JUNK_TOKENS: &[&str] = &[
    "vip", "server", "backup", "link", "premium", "multi", "test", "raw", "direct", "dn",
];

fn country_prefix_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    // "UK:", "AF - ", "NL|", optionally repeated.
    RE.get_or_init(|| Regex::new(r"(?i)^[a-z]{2,3}\s*[:\-|]+\s*").expect("country prefix regex"))
}

fn token_split_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    // '+' stays inside tokens so "canal+" survives as one word.
    RE.get_or_init(|| Regex::new(r"[^a-z0-9+]+").expect("token split regex"))
}

fn is_quality(token: &str) -> bool {
    QUALITY_TOKENS.contains(&token)
}

fn is_junk(token: &str) -> bool {
    JUNK_TOKENS.contains(&token)
}

fn is_numeric(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit())
}

/// Split a name into lowercase word tokens, dropping decorations.
pub fn canonical_tokens(name: &str) -> Vec<String> {
    let lowered = name.to_lowercase();
    let mut stripped: &str = lowered.trim();
    // Peel leading geo prefixes ("UK: ", "AF - "); at most a couple occur.
    for _ in 0..2 {
        match country_prefix_re().find(stripped) {
            Some(m) => stripped = &stripped[m.end()..],
            None => break,
        }
    }

    let mut out = Vec::new();
    let mut absorb_number = false;
    for token in token_split_re().split(stripped) {
        if token.is_empty() {
            continue;
        }
        if is_quality(token) {
            absorb_number = false;
            continue;
        }
        if is_junk(token) {
            absorb_number = true;
            continue;
        }
        if absorb_number && is_numeric(token) {
            absorb_number = false;
            continue;
        }
        absorb_number = false;
        out.push(token.to_string());
    }
    out
}

/// Canonical lookup key: decoration-stripped tokens joined by single spaces.
pub fn canonical_key(name: &str) -> String {
    canonical_tokens(name).join(" ")
}

/// Similarity between two canonical keys, 0.0..=1.0.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&canonical_key(a), &canonical_key(b))
}

/// Matches raw channel names against a fixed target set.
///
/// Targets keep their original display casing; lookups are keyed by
/// canonical token sequence.
#[derive(Debug, Clone, Default)]
pub struct TargetMatcher {
    by_key: HashMap<String, String>,
}

impl TargetMatcher {
    pub fn new<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut by_key = HashMap::new();
        for target in targets {
            let display = target.as_ref().trim();
            if display.is_empty() {
                continue;
            }
            let key = canonical_key(display);
            if key.is_empty() {
                continue;
            }
            // First occurrence wins so display casing stays stable.
            by_key.entry(key).or_insert_with(|| display.to_string());
        }
        Self { by_key }
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Boundary-aware match: the decoration-stripped raw name must cover a
    /// target exactly. Returns the target's display name.
    pub fn find_match(&self, raw_name: &str) -> Option<&str> {
        let key = canonical_key(raw_name);
        if key.is_empty() {
            return None;
        }
        self.by_key.get(&key).map(String::as_str)
    }

    /// Last-chance lookup for typo'd schedule names: accept the closest
    /// target above `threshold` similarity. Skipped entirely when either
    /// side carries a standalone numeric token, so "Sky Sports 1" can never
    /// drift onto "Sky Sports 10".
    pub fn find_similar(&self, raw_name: &str, threshold: f64) -> Option<&str> {
        let raw_tokens = canonical_tokens(raw_name);
        if raw_tokens.is_empty() || raw_tokens.iter().any(|t| is_numeric(t)) {
            return None;
        }
        let raw_key = raw_tokens.join(" ");

        let mut best: Option<(&str, f64)> = None;
        for (key, display) in &self.by_key {
            if key.split(' ').any(is_numeric) {
                continue;
            }
            let score = strsim::normalized_levenshtein(&raw_key, key);
            if score >= threshold && best.map_or(true, |(_, b)| score > b) {
                best = Some((display.as_str(), score));
            }
        }
        best.map(|(display, _)| display)
    }

    pub fn display_names(&self) -> impl Iterator<Item = &str> {
        self.by_key.values().map(String::as_str)
    }
}
