// src/scan/mod.rs
//! Playlist scanning: walk every configured source, keep only live sports
//! entries whose names match a target channel, and emit stream candidates
//! for the prober.

pub mod m3u;
pub mod sources;
pub mod xtream;

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::matching::TargetMatcher;
use crate::placeholder;

pub use m3u::{parse_m3u, RawEntry};
pub use sources::{load_scan_sources, PlaylistSource, SourceKind, SourceOrigin};
pub use xtream::XtreamApi;

/// How long a playlist or panel fetch may take. Stream probing has its own
/// much tighter budget.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// A stream URL that claims to carry a target channel. Probing decides
/// whether the claim holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCandidate {
    /// Target channel display name this stream matched.
    pub target_name: String,
    /// Name as it appeared in the playlist.
    pub raw_name: String,
    pub url: String,
    pub country_hint: Option<String>,
    pub source_name: String,
}

fn vod_group_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(vod|movies?|series|films?)\b").expect("vod group regex"))
}

fn vod_url_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)/(movies?|series)/").expect("vod url regex"))
}

fn vod_name_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    // "(2004)" release years and "S01E03" episode markers.
    RE.get_or_init(|| {
        Regex::new(r"(?i)\((?:19|20)\d{2}\)|\bS\d{1,2}\s*E\d{1,3}\b").expect("vod name regex")
    })
}

fn country_prefix_hint_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)^([a-z]{2,3})\s*[:\-|]").expect("country hint regex"))
}

/// True when an M3U entry is video-on-demand rather than a live channel.
///
/// The group title is authoritative when present: a VOD-ish group rejects
/// the entry, any other group clears it. Name heuristics only apply when
/// the playlist did not bother with groups.
pub fn is_non_live_entry(group_title: Option<&str>, name: &str, url: &str) -> bool {
    if vod_url_re().is_match(url) {
        return true;
    }
    match group_title.map(str::trim).filter(|g| !g.is_empty()) {
        Some(group) => vod_group_re().is_match(group),
        None => vod_name_re().is_match(name),
    }
}

/// URL-only guard for streams that arrive without playlist context.
pub fn is_probable_live_stream_url(url: &str) -> bool {
    !vod_url_re().is_match(url)
}

/// Map a leading playlist country tag ("UK:", "ZA -") onto the country
/// names the geo rules understand.
pub fn country_hint_from_name(raw_name: &str) -> Option<String> {
    let code = country_prefix_hint_re()
        .captures(raw_name.trim())?
        .get(1)?
        .as_str()
        .to_lowercase();
    let country = match code.as_str() {
        "uk" | "gb" => "United Kingdom",
        "us" | "usa" => "United States",
        "za" => "South Africa",
        "sa" | "ksa" => "Saudi Arabia",
        _ => return None,
    };
    Some(country.to_string())
}

/// Why a source contributed nothing this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSkip {
    pub source: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub sources_scanned: usize,
    pub sources_failed: usize,
    pub candidates: usize,
    /// One entry per failed source, so the run summary can say what broke.
    pub skipped: Vec<SourceSkip>,
}

/// Walks playlist sources and collects matching stream candidates.
pub struct Scanner {
    client: reqwest::Client,
    matcher: TargetMatcher,
}

impl Scanner {
    pub fn new(matcher: TargetMatcher, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("building scan HTTP client")?;
        Ok(Self { client, matcher })
    }

    /// Scan one source. Errors here mean the source is unreachable or
    /// unparseable; the caller decides whether that sinks the run.
    pub async fn scan_source(&self, source: &PlaylistSource) -> Result<Vec<ChannelCandidate>> {
        match source.kind {
            SourceKind::Direct => self.scan_direct(source).await,
            SourceKind::XtreamApi => self.scan_xtream(source).await,
        }
    }

    async fn scan_direct(&self, source: &PlaylistSource) -> Result<Vec<ChannelCandidate>> {
        let text = self
            .client
            .get(&source.url)
            .send()
            .await
            .with_context(|| format!("fetching playlist {}", source.name))?
            .error_for_status()
            .with_context(|| format!("playlist {} rejected the request", source.name))?
            .text()
            .await
            .with_context(|| format!("reading playlist {}", source.name))?;

        let entries = parse_m3u(&text);
        debug!(source = %source.name, streams = entries.len(), "parsed direct playlist");
        let candidates = entries
            .iter()
            .filter_map(|entry| {
                if is_non_live_entry(entry.group_title.as_deref(), &entry.name, &entry.url) {
                    return None;
                }
                self.candidate(&entry.name, &entry.url, source)
            })
            .collect();
        Ok(candidates)
    }

    async fn scan_xtream(&self, source: &PlaylistSource) -> Result<Vec<ChannelCandidate>> {
        let api = XtreamApi::from_url(&source.url)?;
        let streams = api.get_live_streams(&self.client).await?;
        debug!(source = %source.name, streams = streams.len(), "fetched panel stream list");
        let candidates = streams
            .iter()
            .filter_map(|stream| {
                let id = stream.stream_id()?;
                self.candidate(&stream.name, &api.stream_url(id), source)
            })
            .collect();
        Ok(candidates)
    }

    fn candidate(
        &self,
        raw_name: &str,
        url: &str,
        source: &PlaylistSource,
    ) -> Option<ChannelCandidate> {
        let raw_name = placeholder::normalize_channel_name(raw_name);
        if !placeholder::is_usable_channel_name(&raw_name) {
            return None;
        }
        if !is_probable_live_stream_url(url) {
            return None;
        }
        if !matches!(reqwest::Url::parse(url), Ok(u) if u.has_host()) {
            return None;
        }
        let target = self.matcher.find_match(&raw_name)?;
        Some(ChannelCandidate {
            target_name: target.to_string(),
            country_hint: country_hint_from_name(&raw_name),
            raw_name,
            url: url.to_string(),
            source_name: source.name.clone(),
        })
    }

    /// Scan every source, tolerating individual failures. Candidates are
    /// deduplicated by (target, URL), first source wins.
    pub async fn scan_all(
        &self,
        sources: &[PlaylistSource],
    ) -> (Vec<ChannelCandidate>, ScanReport) {
        let mut report = ScanReport::default();
        let mut seen = HashSet::new();
        let mut all = Vec::new();

        for source in sources {
            match self.scan_source(source).await {
                Ok(candidates) => {
                    report.sources_scanned += 1;
                    for cand in candidates {
                        let key = (cand.target_name.to_lowercase(), cand.url.to_lowercase());
                        if seen.insert(key) {
                            all.push(cand);
                        }
                    }
                    info!(source = %source.name, total = all.len(), "source scanned");
                }
                Err(err) => {
                    let reason = format!("{err:#}");
                    warn!(source = %source.name, error = %reason, "source skipped");
                    report.sources_failed += 1;
                    report.skipped.push(SourceSkip {
                        source: source.name.clone(),
                        reason,
                    });
                }
            }
        }
        report.candidates = all.len();
        (all, report)
    }
}
