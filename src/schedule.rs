// src/schedule.rs
//! Composed schedule model. Upstream scrapers (out of scope here) each emit
//! normalized event records; this module loads the composed document, dedupes
//! events across sources by identity, and derives the target channel set the
//! scanner works from.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::placeholder;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub sport: String,
    #[serde(default)]
    pub participants: Vec<String>,
    /// Channel names claimed by the schedule sites, placeholder-filtered at
    /// composition time but re-checked on every ingestion path.
    #[serde(default)]
    pub channels: Vec<String>,
}

impl Event {
    /// Cross-source identity: two scrapes describe the same event iff the
    /// participants, kickoff time, and sport agree exactly.
    pub fn identity_key(&self) -> String {
        let mut participants = self
            .participants
            .iter()
            .map(|p| p.trim().to_lowercase())
            .collect::<Vec<_>>();
        participants.sort();
        format!(
            "{}|{}|{}",
            participants.join("+"),
            self.start_time.timestamp(),
            self.sport.trim().to_lowercase()
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScheduleDay {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Schedule {
    #[serde(default)]
    pub schedule: Vec<ScheduleDay>,
}

impl Schedule {
    /// Read the composed schedule. Structural failure here is fatal to the
    /// run; there is nothing to resolve without a schedule.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading schedule from {}", path.display()))?;
        let schedule: Schedule = serde_json::from_str(&content)
            .with_context(|| format!("parsing schedule {}", path.display()))?;
        Ok(schedule)
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.schedule.iter().flat_map(|day| day.events.iter())
    }

    pub fn event_count(&self) -> usize {
        self.schedule.iter().map(|day| day.events.len()).sum()
    }

    /// Drop duplicate events that arrived from more than one scraper,
    /// keeping the first occurrence (its channel list has already been
    /// merged at composition time).
    pub fn dedupe_events(&mut self) -> usize {
        let mut seen = HashSet::new();
        let mut dropped = 0usize;
        for day in &mut self.schedule {
            day.events.retain(|event| {
                if seen.insert(event.identity_key()) {
                    true
                } else {
                    dropped += 1;
                    false
                }
            });
        }
        dropped
    }

    /// Unique usable channel names claimed anywhere in the schedule. This is
    /// the scanner's target set and the merger's relevance scope.
    pub fn target_channels(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for event in self.events() {
            for raw in &event.channels {
                let cleaned = placeholder::normalize_channel_name(raw);
                if !placeholder::is_usable_channel_name(&cleaned) {
                    continue;
                }
                if seen.insert(cleaned.to_lowercase()) {
                    targets.push(cleaned);
                }
            }
        }
        targets
    }
}
