// src/geo.rs
//! Geographic channel classification and per-event quota selection.
//!
//! Events should not end up with five Sky Sports variants; the quota keeps a
//! balanced mix of UK, US, and rest-of-world channels, with a preference tier
//! inside "other" for broadcasters the audience actually asks for.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::MappingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeoBucket {
    Uk,
    Us,
    Other,
}

/// Exact names and substring keywords that place a channel in a bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketRules {
    pub exact: Vec<String>,
    pub keywords: Vec<String>,
}

impl BucketRules {
    fn matches(&self, name: &str) -> bool {
        let key = normalize_key(name);
        if key.is_empty() {
            return false;
        }
        if self.exact.iter().any(|e| normalize_key(e) == key) {
            return true;
        }
        // Keywords match as plain substrings of the space-padded key;
        // normalize_key collapses any leading space in " usa"-style entries.
        let padded = format!(" {key} ");
        self.keywords.iter().any(|k| {
            let token = normalize_key(k);
            !token.is_empty() && padded.contains(&token)
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoRules {
    pub uk: BucketRules,
    pub us: BucketRules,
    pub preferred_other: BucketRules,
    pub uk_countries: Vec<String>,
    pub us_countries: Vec<String>,
    pub preferred_other_countries: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Default for GeoRules {
    fn default() -> Self {
        Self {
            uk: BucketRules {
                exact: strings(&[
                    "Sky Sports Main Event",
                    "Sky Sports Premier League",
                    "Sky Sports Football",
                    "TNT Sports",
                    "Sky Go UK",
                    "BBC iPlayer",
                    "ITVX",
                    "Premier Sports 1",
                    "Premier Sports 2",
                    "DAZN UK",
                ]),
                keywords: strings(&[
                    "sky sports",
                    "tnt sports",
                    "bt sport",
                    "bbc",
                    "itv",
                    "premier sports",
                    "sky go uk",
                    "dazn uk",
                ]),
            },
            us: BucketRules {
                exact: strings(&[
                    "Fanatiz USA",
                    "DAZN USA",
                    "beIN SPORTS CONNECT U.S.A.",
                    "Peacock",
                    "Paramount+",
                    "ESPN Deportes USA",
                ]),
                keywords: strings(&[
                    " usa",
                    "u.s.a",
                    "united states",
                    "espn deportes usa",
                    "fox deportes",
                    "cbs sports",
                    "nbc sports",
                    "peacock",
                    "paramount+",
                    "dazn usa",
                    "fanatiz usa",
                ]),
            },
            preferred_other: BucketRules {
                exact: strings(&["DStv Now", "GOtv", "MBC Shahid", "MBC Action"]),
                keywords: strings(&[
                    "supersport", "dstv", "gotv", "sabc", "saudi", "ksa", "ssc", "mbc", "shahid",
                    "arabia",
                ]),
            },
            uk_countries: strings(&[
                "United Kingdom",
                "UK",
                "England",
                "Scotland",
                "Wales",
                "Northern Ireland",
                "Great Britain",
            ]),
            us_countries: strings(&[
                "United States",
                "United States of America",
                "USA",
                "U.S.A.",
            ]),
            preferred_other_countries: strings(&["South Africa", "Saudi Arabia"]),
        }
    }
}

fn normalize_key(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl GeoRules {
    /// Load overrides from a JSON file; a missing or malformed file falls
    /// back to the built-in rules so a bad edit never breaks the run.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(rules) => rules,
                Err(err) => {
                    warn!(path = %path.display(), %err, "malformed geo rules, using defaults");
                    Self::default()
                }
            },
            Err(err) => {
                warn!(path = %path.display(), %err, "unreadable geo rules, using defaults");
                Self::default()
            }
        }
    }

    /// Country metadata wins over name keywords; ambiguous metadata falls
    /// through to Other.
    pub fn classify(&self, name: &str, country_hint: Option<&str>) -> GeoBucket {
        if let Some(country) = country_hint.map(normalize_key).filter(|c| !c.is_empty()) {
            let in_uk = self.uk_countries.iter().any(|c| normalize_key(c) == country);
            let in_us = self.us_countries.iter().any(|c| normalize_key(c) == country);
            match (in_uk, in_us) {
                (true, false) => return GeoBucket::Uk,
                (false, true) => return GeoBucket::Us,
                (true, true) => return GeoBucket::Other,
                (false, false) => {}
            }
        }
        if self.uk.matches(name) {
            GeoBucket::Uk
        } else if self.us.matches(name) {
            GeoBucket::Us
        } else {
            GeoBucket::Other
        }
    }

    pub fn is_preferred_other(&self, name: &str, country_hint: Option<&str>) -> bool {
        if let Some(country) = country_hint.map(normalize_key).filter(|c| !c.is_empty()) {
            if self
                .preferred_other_countries
                .iter()
                .any(|c| normalize_key(c) == country)
            {
                return true;
            }
        }
        self.preferred_other.matches(name)
    }
}

/// One channel under consideration for an event.
#[derive(Debug, Clone, Copy)]
pub struct GeoCandidate<'a> {
    pub name: &'a str,
    pub country_hint: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SelectionStats {
    pub candidates: usize,
    pub selected_total: usize,
    pub selected_uk: usize,
    pub selected_us: usize,
    pub selected_other: usize,
    pub selected_other_preferred: usize,
}

/// Pick channels for one event under the geo quota, preserving discovery
/// order inside each bucket. Returns indices into `candidates` plus stats.
///
/// Fill order: UK up to its cap, US up to its cap, then preferred-other,
/// then remaining others until the total cap.
pub fn select_event_channels(
    candidates: &[GeoCandidate<'_>],
    rules: &GeoRules,
    cfg: &MappingConfig,
) -> (Vec<usize>, SelectionStats) {
    let max_total = cfg.max_event_channels.max(1);

    let mut uk = Vec::new();
    let mut us = Vec::new();
    let mut other_pref = Vec::new();
    let mut other = Vec::new();

    for (idx, cand) in candidates.iter().enumerate() {
        match rules.classify(cand.name, cand.country_hint) {
            GeoBucket::Uk => uk.push(idx),
            GeoBucket::Us => us.push(idx),
            GeoBucket::Other => {
                if rules.is_preferred_other(cand.name, cand.country_hint) {
                    other_pref.push(idx);
                } else {
                    other.push(idx);
                }
            }
        }
    }

    let mut selected = Vec::new();
    selected.extend(uk.iter().take(cfg.max_uk).copied());
    let uk_taken = selected.len();
    selected.extend(us.iter().take(cfg.max_us).copied());
    let us_taken = selected.len() - uk_taken;

    let mut pref_taken = 0usize;
    for idx in &other_pref {
        if selected.len() >= max_total {
            break;
        }
        selected.push(*idx);
        pref_taken += 1;
    }
    for idx in &other {
        if selected.len() >= max_total {
            break;
        }
        selected.push(*idx);
    }
    selected.truncate(max_total);

    let stats = SelectionStats {
        candidates: candidates.len(),
        selected_total: selected.len(),
        selected_uk: uk_taken.min(selected.len()),
        selected_us: us_taken,
        selected_other: selected.len().saturating_sub(uk_taken + us_taken),
        selected_other_preferred: pref_taken,
    };
    (selected, stats)
}
