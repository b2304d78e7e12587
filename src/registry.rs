// src/registry.rs
//! Persistent channel registry: for each target channel, the stream URLs
//! known to work and when each was last verified live.
//!
//! The registry is the pipeline's only durable state. A corrupt file is a
//! hard error rather than a silent reset; wiping hours of verified URLs
//! because of a truncated write would be far worse than a failed run.

use std::collections::{HashMap, HashSet};
use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::MergeConfig;
use crate::probe::Liveness;
use crate::scan::ChannelCandidate;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("reading registry {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// Fail closed: never overwrite a registry we could not parse.
    #[error("registry {path} is corrupt; refusing to continue")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("writing registry {path}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// One stream URL with its verification history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub url: String,
    pub last_verified_live_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Most recently verified first. The tail is what eviction removes.
    #[serde(default)]
    pub stream_urls: Vec<StreamRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryMetadata {
    pub updated_at: Option<DateTime<Utc>>,
    pub channel_count: usize,
    pub url_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelRegistry {
    #[serde(default)]
    pub metadata: RegistryMetadata,
    /// Keyed by target channel display name.
    #[serde(default)]
    pub channels: BTreeMap<String, RegistryEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub urls_added: usize,
    pub urls_malformed: usize,
    pub urls_refreshed: usize,
    pub urls_removed_dead: usize,
    pub urls_expired: usize,
    pub urls_evicted: usize,
    pub channels_pruned: usize,
}

impl ChannelRegistry {
    /// Missing file means first run and yields an empty registry; an
    /// unparseable file is fatal.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        if !path.exists() {
            debug!(path = %path.display(), "no registry yet, starting empty");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| RegistryError::Corrupt {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        let write = |source| RegistryError::Write {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(write)?;
            }
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| RegistryError::Corrupt {
            path: path.display().to_string(),
            source: source.into(),
        })?;
        // Write-then-rename so a crash mid-write cannot corrupt the registry.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(write)?;
        std::fs::rename(&tmp, path).map_err(write)?;
        Ok(())
    }

    pub fn url_count(&self) -> usize {
        self.channels.values().map(|e| e.stream_urls.len()).sum()
    }

    /// Fold this run's scan and probe results into the registry.
    ///
    /// * URLs verified live this run move to the front with a fresh
    ///   timestamp.
    /// * URLs probed dead this run are removed. Ambiguous outcomes leave the
    ///   record untouched; a transient provider wobble is not evidence.
    /// * Carry-over records older than `stale_after_hours` expire.
    /// * Channels are capped at `max_urls_per_channel`, evicting the least
    ///   recently verified records.
    /// * Channels outside the current target set, and channels left with no
    ///   records, are pruned.
    ///
    /// `now` is passed in rather than read from the clock so that replaying
    /// the same inputs yields the same registry.
    pub fn merge(
        &mut self,
        candidates: &[ChannelCandidate],
        outcomes: &HashMap<String, Liveness>,
        targets: &HashSet<String>,
        cfg: &MergeConfig,
        now: DateTime<Utc>,
    ) -> MergeStats {
        let mut stats = MergeStats::default();
        let stale_cutoff = now - Duration::hours(cfg.stale_after_hours.max(0));

        // Pass 1: update existing records from this run's probe outcomes.
        for entry in self.channels.values_mut() {
            entry.stream_urls.retain_mut(|record| {
                match outcomes.get(&record.url) {
                    Some(Liveness::Live) => {
                        record.last_verified_live_at = now;
                        stats.urls_refreshed += 1;
                        true
                    }
                    Some(Liveness::Dead) => {
                        stats.urls_removed_dead += 1;
                        false
                    }
                    Some(Liveness::Ambiguous) | None => {
                        if record.last_verified_live_at < stale_cutoff {
                            stats.urls_expired += 1;
                            false
                        } else {
                            true
                        }
                    }
                }
            });
        }

        // Pass 2: insert newly discovered live URLs. A malformed candidate
        // only costs itself, never its siblings.
        for cand in candidates {
            if outcomes.get(&cand.url) != Some(&Liveness::Live) {
                continue;
            }
            match reqwest::Url::parse(&cand.url) {
                Ok(url) if url.has_host() => {}
                _ => {
                    stats.urls_malformed += 1;
                    debug!(url = %cand.url, channel = %cand.target_name, "malformed candidate URL dropped");
                    continue;
                }
            }
            let entry = self.channels.entry(cand.target_name.clone()).or_default();
            if let Some(existing) = entry.stream_urls.iter_mut().find(|r| r.url == cand.url) {
                existing.last_verified_live_at = now;
                if existing.country_hint.is_none() {
                    existing.country_hint = cand.country_hint.clone();
                }
            } else {
                entry.stream_urls.push(StreamRecord {
                    url: cand.url.clone(),
                    last_verified_live_at: now,
                    country_hint: cand.country_hint.clone(),
                    source_name: Some(cand.source_name.clone()),
                });
                stats.urls_added += 1;
            }
        }

        // Pass 3: order, cap, and prune.
        let max_urls = cfg.max_urls_per_channel.max(1);
        self.channels.retain(|name, entry| {
            entry
                .stream_urls
                .sort_by(|a, b| b.last_verified_live_at.cmp(&a.last_verified_live_at));
            if entry.stream_urls.len() > max_urls {
                stats.urls_evicted += entry.stream_urls.len() - max_urls;
                entry.stream_urls.truncate(max_urls);
            }
            let in_scope = targets.contains(&name.to_lowercase());
            if !in_scope || entry.stream_urls.is_empty() {
                stats.channels_pruned += 1;
                return false;
            }
            true
        });

        self.metadata = RegistryMetadata {
            updated_at: Some(now),
            channel_count: self.channels.len(),
            url_count: self.url_count(),
        };
        info!(
            added = stats.urls_added,
            refreshed = stats.urls_refreshed,
            removed_dead = stats.urls_removed_dead,
            expired = stats.urls_expired,
            evicted = stats.urls_evicted,
            pruned = stats.channels_pruned,
            channels = self.metadata.channel_count,
            "registry merged"
        );
        stats
    }
}

/// Lowercased target-name set in the shape `merge` expects.
pub fn target_set<I, S>(targets: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    targets
        .into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candidate(target: &str, url: &str) -> ChannelCandidate {
        ChannelCandidate {
            target_name: target.to_string(),
            raw_name: target.to_string(),
            url: url.to_string(),
            country_hint: None,
            source_name: "test-source".to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 26, 12, 0, 0).unwrap()
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reg = ChannelRegistry::load(&dir.path().join("nope.json")).unwrap();
        assert!(reg.channels.is_empty());
    }

    #[test]
    fn corrupt_file_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = ChannelRegistry::load(&path).unwrap_err();
        assert!(matches!(err, RegistryError::Corrupt { .. }));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let mut reg = ChannelRegistry::default();
        let mut outcomes = HashMap::new();
        outcomes.insert("http://a/1.ts".to_string(), Liveness::Live);
        reg.merge(
            &[candidate("ESPN", "http://a/1.ts")],
            &outcomes,
            &target_set(["ESPN"]),
            &MergeConfig::default(),
            now(),
        );
        reg.save(&path).unwrap();
        let loaded = ChannelRegistry::load(&path).unwrap();
        assert_eq!(loaded.channels.len(), 1);
        assert_eq!(loaded.channels["ESPN"].stream_urls[0].url, "http://a/1.ts");
    }

    #[test]
    fn dead_urls_are_removed_and_live_refreshed() {
        let mut reg = ChannelRegistry::default();
        let earlier = now() - Duration::hours(10);
        reg.channels.insert(
            "ESPN".to_string(),
            RegistryEntry {
                stream_urls: vec![
                    StreamRecord {
                        url: "http://a/live.ts".into(),
                        last_verified_live_at: earlier,
                        country_hint: None,
                        source_name: None,
                    },
                    StreamRecord {
                        url: "http://a/dead.ts".into(),
                        last_verified_live_at: earlier,
                        country_hint: None,
                        source_name: None,
                    },
                ],
            },
        );
        let mut outcomes = HashMap::new();
        outcomes.insert("http://a/live.ts".to_string(), Liveness::Live);
        outcomes.insert("http://a/dead.ts".to_string(), Liveness::Dead);
        let stats = reg.merge(
            &[],
            &outcomes,
            &target_set(["ESPN"]),
            &MergeConfig::default(),
            now(),
        );
        assert_eq!(stats.urls_refreshed, 1);
        assert_eq!(stats.urls_removed_dead, 1);
        let urls = &reg.channels["ESPN"].stream_urls;
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].last_verified_live_at, now());
    }

    #[test]
    fn cap_evicts_least_recently_verified() {
        let mut reg = ChannelRegistry::default();
        let entry = reg.channels.entry("ESPN".to_string()).or_default();
        for i in 0..5 {
            entry.stream_urls.push(StreamRecord {
                url: format!("http://old/{i}.ts"),
                last_verified_live_at: now() - Duration::hours(i as i64 + 1),
                country_hint: None,
                source_name: None,
            });
        }
        let mut outcomes = HashMap::new();
        outcomes.insert("http://new/0.ts".to_string(), Liveness::Live);
        let stats = reg.merge(
            &[candidate("ESPN", "http://new/0.ts")],
            &outcomes,
            &target_set(["ESPN"]),
            &MergeConfig::default(),
            now(),
        );
        assert_eq!(stats.urls_added, 1);
        assert_eq!(stats.urls_evicted, 1);
        let urls = &reg.channels["ESPN"].stream_urls;
        assert_eq!(urls.len(), 5);
        assert_eq!(urls[0].url, "http://new/0.ts");
        // the stalest carry-over was the one dropped
        assert!(!urls.iter().any(|r| r.url == "http://old/4.ts"));
    }

    #[test]
    fn ambiguous_urls_survive_until_stale() {
        let cfg = MergeConfig::default();
        let mut reg = ChannelRegistry::default();
        reg.channels.insert(
            "ESPN".to_string(),
            RegistryEntry {
                stream_urls: vec![
                    StreamRecord {
                        url: "http://a/wobbly.ts".into(),
                        last_verified_live_at: now() - Duration::hours(2),
                        country_hint: None,
                        source_name: None,
                    },
                    StreamRecord {
                        url: "http://a/stale.ts".into(),
                        last_verified_live_at: now() - Duration::hours(cfg.stale_after_hours + 1),
                        country_hint: None,
                        source_name: None,
                    },
                ],
            },
        );
        let mut outcomes = HashMap::new();
        outcomes.insert("http://a/wobbly.ts".to_string(), Liveness::Ambiguous);
        let stats = reg.merge(&[], &outcomes, &target_set(["ESPN"]), &cfg, now());
        assert_eq!(stats.urls_expired, 1);
        let urls = &reg.channels["ESPN"].stream_urls;
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].url, "http://a/wobbly.ts");
    }

    #[test]
    fn out_of_scope_channels_are_pruned() {
        let mut reg = ChannelRegistry::default();
        reg.channels.insert(
            "Old Channel".to_string(),
            RegistryEntry {
                stream_urls: vec![StreamRecord {
                    url: "http://a/old.ts".into(),
                    last_verified_live_at: now() - Duration::hours(1),
                    country_hint: None,
                    source_name: None,
                }],
            },
        );
        let stats = reg.merge(
            &[],
            &HashMap::new(),
            &target_set(["ESPN"]),
            &MergeConfig::default(),
            now(),
        );
        assert_eq!(stats.channels_pruned, 1);
        assert!(reg.channels.is_empty());
    }

    #[test]
    fn malformed_candidate_does_not_block_siblings() {
        let mut reg = ChannelRegistry::default();
        let mut outcomes = HashMap::new();
        outcomes.insert("not a url".to_string(), Liveness::Live);
        outcomes.insert("http://a/ok.ts".to_string(), Liveness::Live);
        let stats = reg.merge(
            &[candidate("ESPN", "not a url"), candidate("ESPN", "http://a/ok.ts")],
            &outcomes,
            &target_set(["ESPN"]),
            &MergeConfig::default(),
            now(),
        );
        assert_eq!(stats.urls_malformed, 1);
        assert_eq!(stats.urls_added, 1);
        assert_eq!(reg.channels["ESPN"].stream_urls[0].url, "http://a/ok.ts");
    }

    #[test]
    fn merge_is_idempotent_for_fixed_now() {
        let mut reg = ChannelRegistry::default();
        let mut outcomes = HashMap::new();
        outcomes.insert("http://a/1.ts".to_string(), Liveness::Live);
        let candidates = vec![candidate("ESPN", "http://a/1.ts")];
        let targets = target_set(["ESPN"]);
        let cfg = MergeConfig::default();

        reg.merge(&candidates, &outcomes, &targets, &cfg, now());
        let snapshot = serde_json::to_string(&reg).unwrap();
        let stats = reg.merge(&candidates, &outcomes, &targets, &cfg, now());
        assert_eq!(stats.urls_added, 0);
        assert_eq!(serde_json::to_string(&reg).unwrap(), snapshot);
    }
}
