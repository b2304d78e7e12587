// src/pipeline.rs
//! End-to-end run: schedule -> scan -> probe -> registry merge -> mapping.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ResolverConfig;
use crate::geo::GeoRules;
use crate::mapper::{map_schedule, MapStats};
use crate::matching::TargetMatcher;
use crate::probe::{Liveness, LivenessTester};
use crate::registry::{target_set, ChannelRegistry, MergeStats};
use crate::scan::{load_scan_sources, ScanReport, Scanner};
use crate::schedule::Schedule;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub events: usize,
    pub duplicate_events_dropped: usize,
    pub target_channels: usize,
    pub sources: usize,
    pub scan: ScanReport,
    pub urls_probed: usize,
    pub urls_live: usize,
    pub urls_dead: usize,
    pub urls_ambiguous: usize,
    pub merge: MergeStats,
    pub mapping: MapStats,
    pub registry_channels: usize,
    pub registry_urls: usize,
}

/// Run the whole resolution pass once.
///
/// Stage failures that only narrow the result (an unreachable playlist, an
/// empty panel) are logged and tolerated; losing the schedule or the
/// registry aborts the run.
pub async fn run_pipeline(cfg: &ResolverConfig) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    // Schedule and target set.
    let mut schedule = Schedule::load(&cfg.schedule_file)?;
    summary.duplicate_events_dropped = schedule.dedupe_events();
    summary.events = schedule.event_count();
    let targets = schedule.target_channels();
    summary.target_channels = targets.len();
    info!(
        events = summary.events,
        targets = summary.target_channels,
        "schedule loaded"
    );
    if targets.is_empty() {
        warn!("schedule names no usable channels; run will only prune the registry");
    }

    // Registry loads early so a corrupt file aborts before any network work.
    let mut registry = ChannelRegistry::load(&cfg.registry_file)?;

    // Scan playlist sources for candidate streams.
    let sources = load_scan_sources(&cfg.playlists_file, &cfg.featured_file);
    summary.sources = sources.len();
    let scanner = Scanner::new(TargetMatcher::new(&targets), &cfg.probe.user_agent)?;
    let (candidates, scan_report) = scanner.scan_all(&sources).await;
    summary.scan = scan_report;

    // Probe every unique URL: fresh candidates plus registry carry-overs,
    // so stale registry entries get re-verified in the same pass.
    let mut urls: HashSet<String> = candidates.iter().map(|c| c.url.clone()).collect();
    for entry in registry.channels.values() {
        urls.extend(entry.stream_urls.iter().map(|r| r.url.clone()));
    }
    summary.urls_probed = urls.len();

    let tester = LivenessTester::with_ffmpeg(cfg.probe.clone());
    let outcomes = tester.classify_all(urls.into_iter().collect()).await;
    let liveness: HashMap<String, Liveness> = outcomes
        .into_iter()
        .map(|(url, outcome)| (url, outcome.liveness))
        .collect();
    summary.urls_live = liveness.values().filter(|l| **l == Liveness::Live).count();
    summary.urls_dead = liveness.values().filter(|l| **l == Liveness::Dead).count();
    summary.urls_ambiguous = summary.urls_probed - summary.urls_live - summary.urls_dead;

    // Fold results into the registry and persist before mapping; a mapping
    // bug must not cost the verified URLs.
    let now = Utc::now();
    summary.merge = registry.merge(
        &candidates,
        &liveness,
        &target_set(&targets),
        &cfg.merge,
        now,
    );
    registry.save(&cfg.registry_file)?;
    summary.registry_channels = registry.channels.len();
    summary.registry_urls = registry.url_count();

    // Map events and write the output document.
    let rules = GeoRules::load_or_default(&cfg.geo_rules_file);
    let (mapped, map_stats) = map_schedule(&schedule, &registry, &rules, &cfg.mapping, now);
    summary.mapping = map_stats;

    if let Some(parent) = cfg.output_file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(&mapped).context("serializing mapped schedule")?;
    std::fs::write(&cfg.output_file, json)
        .with_context(|| format!("writing mapped schedule to {}", cfg.output_file.display()))?;

    info!(
        live = summary.urls_live,
        dead = summary.urls_dead,
        ambiguous = summary.urls_ambiguous,
        registry_channels = summary.registry_channels,
        mapped_events = summary.mapping.events_with_channels,
        output = %cfg.output_file.display(),
        "pipeline run complete"
    );
    Ok(summary)
}
