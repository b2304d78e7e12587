// src/mapper.rs
//! Event-to-stream mapping: the final pipeline stage that rewrites the
//! schedule with playable stream URLs from the registry.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::MappingConfig;
use crate::geo::{select_event_channels, GeoBucket, GeoCandidate, GeoRules};
use crate::matching::TargetMatcher;
use crate::placeholder;
use crate::registry::ChannelRegistry;
use crate::schedule::{Event, Schedule};

/// A claimed channel resolved to a concrete, recently verified stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedChannel {
    pub channel_name: String,
    pub stream_url: String,
    pub country_bucket: GeoBucket,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappedEvent {
    #[serde(default)]
    pub id: String,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub sport: String,
    #[serde(default)]
    pub participants: Vec<String>,
    /// May be empty; consumers render those events without a watch link.
    #[serde(default)]
    pub channels: Vec<ResolvedChannel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappedDay {
    pub date: String,
    pub events: Vec<MappedEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappedSchedule {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub schedule: Vec<MappedDay>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MapStats {
    pub events_total: usize,
    pub events_with_channels: usize,
    pub channels_claimed: usize,
    pub channels_resolved: usize,
}

/// Resolve every event's claimed channels against the registry.
///
/// Lookup is boundary-aware first, typo-tolerant second; each resolved
/// channel gets that channel's most recently verified URL. With the geo cap
/// enabled the per-event list is balanced across UK/US/other buckets.
pub fn map_schedule(
    schedule: &Schedule,
    registry: &ChannelRegistry,
    rules: &GeoRules,
    cfg: &MappingConfig,
    now: chrono::DateTime<chrono::Utc>,
) -> (MappedSchedule, MapStats) {
    let matcher = TargetMatcher::new(registry.channels.keys());
    let mut stats = MapStats::default();

    let days = schedule
        .schedule
        .iter()
        .map(|day| MappedDay {
            date: day.date.clone(),
            events: day
                .events
                .iter()
                .map(|event| map_event(event, registry, &matcher, rules, cfg, &mut stats))
                .collect(),
        })
        .collect();

    info!(
        events = stats.events_total,
        with_channels = stats.events_with_channels,
        resolved = stats.channels_resolved,
        claimed = stats.channels_claimed,
        "schedule mapped"
    );
    (
        MappedSchedule {
            generated_at: now,
            schedule: days,
        },
        stats,
    )
}

fn map_event(
    event: &Event,
    registry: &ChannelRegistry,
    matcher: &TargetMatcher,
    rules: &GeoRules,
    cfg: &MappingConfig,
    stats: &mut MapStats,
) -> MappedEvent {
    stats.events_total += 1;

    let mut resolved: Vec<ResolvedChannel> = Vec::new();
    let mut hints: Vec<Option<String>> = Vec::new();
    for claimed in &event.channels {
        let claimed = placeholder::normalize_channel_name(claimed);
        if !placeholder::is_usable_channel_name(&claimed) {
            continue;
        }
        stats.channels_claimed += 1;

        let registry_name = match matcher
            .find_match(&claimed)
            .or_else(|| matcher.find_similar(&claimed, cfg.fuzzy_threshold))
        {
            Some(name) => name,
            None => {
                debug!(channel = %claimed, "no live stream known");
                continue;
            }
        };
        if resolved
            .iter()
            .any(|r| r.channel_name.eq_ignore_ascii_case(registry_name))
        {
            continue;
        }
        // Records are kept most recently verified first.
        let record = registry
            .channels
            .get(registry_name)
            .and_then(|entry| entry.stream_urls.first());
        let record = match record {
            Some(record) => record,
            None => continue,
        };
        resolved.push(ResolvedChannel {
            channel_name: registry_name.to_string(),
            stream_url: record.url.clone(),
            country_bucket: rules.classify(registry_name, record.country_hint.as_deref()),
        });
        hints.push(record.country_hint.clone());
        stats.channels_resolved += 1;
    }

    if cfg.enforce_geo_cap && !resolved.is_empty() {
        let candidates: Vec<GeoCandidate<'_>> = resolved
            .iter()
            .zip(&hints)
            .map(|(r, hint)| GeoCandidate {
                name: &r.channel_name,
                country_hint: hint.as_deref(),
            })
            .collect();
        let (selected, _) = select_event_channels(&candidates, rules, cfg);
        let mut keep = vec![false; resolved.len()];
        for idx in selected {
            keep[idx] = true;
        }
        let mut it = keep.iter();
        resolved.retain(|_| *it.next().unwrap_or(&false));
    }

    if !resolved.is_empty() {
        stats.events_with_channels += 1;
    }
    MappedEvent {
        id: event.id.clone(),
        start_time: event.start_time,
        sport: event.sport.clone(),
        participants: event.participants.clone(),
        channels: resolved,
    }
}
