// src/scan/m3u.rs
//! Line-oriented M3U playlist parsing.
//!
//! Real-world playlists are sloppy: attributes in any order, missing
//! `#EXTM3U` headers, blank lines between the `#EXTINF` and its URL. The
//! parser keeps whatever it can pair up and drops the rest.

use once_cell::sync::OnceCell;
use regex::Regex;

/// One playlist entry: an `#EXTINF` line paired with the URL that follows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawEntry {
    pub name: String,
    pub group_title: Option<String>,
    pub logo: Option<String>,
    pub url: String,
}

fn attr_re(attr: &'static str, cell: &'static OnceCell<Regex>) -> &'static Regex {
    cell.get_or_init(|| Regex::new(&format!(r#"{attr}="([^"]*)""#)).expect("attr regex"))
}

fn group_title_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    attr_re("group-title", &RE)
}

fn logo_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    attr_re("tvg-logo", &RE)
}

fn display_name_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    // Display name is everything after the last comma on the EXTINF line.
    RE.get_or_init(|| Regex::new(r",([^,]*)$").expect("display name regex"))
}

fn capture(re: &Regex, line: &str) -> Option<String> {
    re.captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse playlist text into entries. Never fails; unpaired lines are
/// skipped.
pub fn parse_m3u(text: &str) -> Vec<RawEntry> {
    let mut entries = Vec::new();
    let mut pending: Option<RawEntry> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("#EXTINF:") {
            let name = match capture(display_name_re(), line) {
                Some(name) => name,
                None => {
                    pending = None;
                    continue;
                }
            };
            pending = Some(RawEntry {
                name,
                group_title: capture(group_title_re(), line),
                logo: capture(logo_re(), line),
                url: String::new(),
            });
        } else if !line.starts_with('#') {
            if let Some(mut entry) = pending.take() {
                entry.url = line.to_string();
                entries.push(entry);
            }
        }
    }
    entries
}
