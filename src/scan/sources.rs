// src/scan/sources.rs
//! Playlist source discovery: a hand-maintained "Name|URL" text file plus a
//! featured-content JSON feed. Hand-maintained sources scan first; featured
//! sources follow, largest playlists first.

use std::path::Path;

use reqwest::Url;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Plain M3U playlist fetched as text.
    Direct,
    /// Xtream Codes panel queried through player_api.php.
    XtreamApi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOrigin {
    External,
    Featured,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistSource {
    pub name: String,
    pub url: String,
    pub kind: SourceKind,
    pub stream_count: u64,
    pub origin: SourceOrigin,
}

/// Decide how to scan a URL. Anything that is not unambiguously an Xtream
/// panel is treated as a direct playlist.
pub fn infer_source_kind(url: &Url, declared: Option<&str>) -> SourceKind {
    let path = url.path().to_lowercase();
    if path.ends_with(".m3u") || path.ends_with(".m3u8") {
        return SourceKind::Direct;
    }
    let query_type = url
        .query_pairs()
        .find(|(k, _)| k == "type")
        .map(|(_, v)| v.to_lowercase());
    if matches!(query_type.as_deref(), Some("m3u" | "m3u8" | "m3u_plus")) {
        return SourceKind::Direct;
    }
    if matches!(
        declared.map(str::trim).map(str::to_lowercase).as_deref(),
        Some("direct" | "m3u" | "m3u8" | "playlist")
    ) {
        return SourceKind::Direct;
    }
    if url
        .host_str()
        .is_some_and(|h| h.to_lowercase().contains("githubusercontent.com"))
    {
        return SourceKind::Direct;
    }
    let mut has_user = false;
    let mut has_pass = false;
    for (k, _) in url.query_pairs() {
        has_user |= k == "username";
        has_pass |= k == "password";
    }
    if has_user && has_pass {
        return SourceKind::XtreamApi;
    }
    SourceKind::Direct
}

/// Load the "Name|URL" (or bare URL) source list. Missing file means no
/// external sources, not an error.
pub fn load_external_sources(path: &Path) -> Vec<PlaylistSource> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => {
            info!(path = %path.display(), "no external playlist file, skipping");
            return Vec::new();
        }
    };

    let mut sources = Vec::new();
    for (line_no, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (name, url_text) = match line.split_once('|') {
            Some((name, url)) => (name.trim().to_string(), url.trim()),
            None => (String::new(), line),
        };
        let url = match Url::parse(url_text) {
            Ok(url) if url.has_host() => url,
            _ => {
                warn!(line = line_no + 1, "skipping invalid playlist line");
                continue;
            }
        };
        let name = if name.is_empty() {
            format!("External Playlist {}", sources.len() + 1)
        } else {
            name
        };
        sources.push(PlaylistSource {
            kind: infer_source_kind(&url, None),
            name,
            url: url.to_string(),
            stream_count: 0,
            origin: SourceOrigin::External,
        });
    }
    info!(count = sources.len(), path = %path.display(), "loaded external playlist sources");
    sources
}

#[derive(Debug, Deserialize)]
struct FeaturedFile {
    #[serde(default)]
    featured_content: Vec<FeaturedItem>,
}

#[derive(Debug, Deserialize)]
struct FeaturedItem {
    #[serde(default)]
    name: Option<String>,
    url: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    channel_count: Option<u64>,
    #[serde(default)]
    stream_count: Option<u64>,
    #[serde(default)]
    streams: Option<u64>,
}

/// Load featured-content sources, sorted by declared stream count so the
/// biggest playlists scan first. A missing or malformed file yields none.
pub fn load_featured_sources(path: &Path) -> Vec<PlaylistSource> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => {
            info!(path = %path.display(), "no featured content file, skipping");
            return Vec::new();
        }
    };
    let parsed: FeaturedFile = match serde_json::from_str(&content) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(path = %path.display(), %err, "malformed featured content file, skipping");
            return Vec::new();
        }
    };

    let mut sources = Vec::new();
    for item in parsed.featured_content {
        let url = match item.url.as_deref().map(Url::parse) {
            Some(Ok(url)) if url.has_host() => url,
            _ => continue,
        };
        sources.push(PlaylistSource {
            kind: infer_source_kind(&url, item.kind.as_deref()),
            name: item.name.unwrap_or_else(|| "Unknown".to_string()),
            url: url.to_string(),
            stream_count: item
                .channel_count
                .or(item.stream_count)
                .or(item.streams)
                .unwrap_or(0),
            origin: SourceOrigin::Featured,
        });
    }
    sources.sort_by(|a, b| b.stream_count.cmp(&a.stream_count));
    info!(count = sources.len(), path = %path.display(), "loaded featured playlist sources");
    sources
}

/// Final scan order: external sources in file order, then featured sources,
/// deduplicated by URL (case-insensitive, first wins).
pub fn load_scan_sources(external_path: &Path, featured_path: &Path) -> Vec<PlaylistSource> {
    let mut seen = std::collections::HashSet::new();
    let mut sources = Vec::new();
    for source in load_external_sources(external_path)
        .into_iter()
        .chain(load_featured_sources(featured_path))
    {
        if seen.insert(source.url.to_lowercase()) {
            sources.push(source);
        }
    }
    sources
}
