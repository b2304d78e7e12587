// src/config.rs
//! Run configuration. Every knob has a default tuned for an unattended
//! scheduled run; a TOML (or JSON) file and CLI flags can override them.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

const ENV_PATH: &str = "RESOLVER_CONFIG_PATH";

/// Probe worker pool and liveness classification knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Concurrent probe workers.
    pub workers: usize,
    /// Per-attempt timeout in seconds.
    pub timeout_secs: u64,
    /// Extra primary-probe attempts after a transient failure.
    pub retry_failed: u32,
    /// Pause between attempts on the same URL.
    pub retry_delay_ms: u64,
    /// Run the decode-based fallback probe when the primary stays transient.
    pub use_fallback: bool,
    /// Abort issuing new probes after this many seconds of wall time.
    /// Zero disables the deadline.
    pub run_deadline_secs: u64,
    /// Log a progress line every N completed probes.
    pub progress_every: usize,
    pub user_agent: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            workers: 20,
            timeout_secs: 8,
            retry_failed: 1,
            retry_delay_ms: 350,
            use_fallback: true,
            run_deadline_secs: 0,
            progress_every: 25,
            user_agent: "VLC/3.0.20 LibVLC/3.0.20".to_string(),
        }
    }
}

/// Registry merge policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Hard cap on stream URLs retained per channel.
    pub max_urls_per_channel: usize,
    /// Unverified carry-over URLs older than this are dropped.
    pub stale_after_hours: i64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_urls_per_channel: 5,
            stale_after_hours: 72,
        }
    }
}

/// Event-to-channel mapping policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Apply the geographic selection caps. When off, events get every
    /// resolved channel.
    pub enforce_geo_cap: bool,
    /// Total channels attached to an event under the cap.
    pub max_event_channels: usize,
    pub max_uk: usize,
    pub max_us: usize,
    /// Similarity floor for the typo-tolerant fallback lookup.
    pub fuzzy_threshold: f64,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            enforce_geo_cap: true,
            max_event_channels: 5,
            max_uk: 2,
            max_us: 2,
            fuzzy_threshold: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Composed schedule document (input).
    pub schedule_file: PathBuf,
    /// Persistent channel registry (input and output).
    pub registry_file: PathBuf,
    /// Mapped schedule document (output).
    pub output_file: PathBuf,
    /// Optional "Name|URL" playlist source list.
    pub playlists_file: PathBuf,
    /// Optional featured-content JSON with embedded playlist sources.
    pub featured_file: PathBuf,
    /// Optional geo classification overrides (JSON). Defaults apply when
    /// missing or malformed.
    pub geo_rules_file: PathBuf,

    pub probe: ProbeConfig,
    pub merge: MergeConfig,
    pub mapping: MappingConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            schedule_file: PathBuf::from("data/daily_schedule.json"),
            registry_file: PathBuf::from("data/channel_registry.json"),
            output_file: PathBuf::from("data/mapped_schedule.json"),
            playlists_file: PathBuf::from("config/playlists.txt"),
            featured_file: PathBuf::from("config/featured_content.json"),
            geo_rules_file: PathBuf::from("config/geo_rules.json"),
            probe: ProbeConfig::default(),
            merge: MergeConfig::default(),
            mapping: MappingConfig::default(),
        }
    }
}

impl ResolverConfig {
    /// Load from an explicit path. Supports TOML or JSON.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing config {}", path.display()))
    }

    /// Load using env var + fallbacks:
    /// 1) $RESOLVER_CONFIG_PATH
    /// 2) config/resolver.toml
    /// 3) config/resolver.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            } else {
                return Err(anyhow!("RESOLVER_CONFIG_PATH points to non-existent path"));
            }
        }
        let toml_p = PathBuf::from("config/resolver.toml");
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        let json_p = PathBuf::from("config/resolver.json");
        if json_p.exists() {
            return Self::load_from(&json_p);
        }
        Ok(Self::default())
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<ResolverConfig> {
    let try_toml = hint_ext == "toml" || !s.trim_start().starts_with('{');
    if try_toml {
        if let Ok(v) = toml::from_str(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = serde_json::from_str(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = toml::from_str(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported config format"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ResolverConfig::default();
        assert_eq!(cfg.probe.workers, 20);
        assert_eq!(cfg.probe.timeout_secs, 8);
        assert_eq!(cfg.merge.max_urls_per_channel, 5);
        assert!(cfg.mapping.enforce_geo_cap);
        assert_eq!(cfg.mapping.max_event_channels, 5);
    }

    #[test]
    fn partial_toml_overrides_merge_with_defaults() {
        let toml = r#"
            schedule_file = "tmp/sched.json"

            [probe]
            workers = 4
            use_fallback = false
        "#;
        let cfg = parse_config(toml, "toml").unwrap();
        assert_eq!(cfg.schedule_file, PathBuf::from("tmp/sched.json"));
        assert_eq!(cfg.probe.workers, 4);
        assert!(!cfg.probe.use_fallback);
        // untouched sections keep defaults
        assert_eq!(cfg.probe.timeout_secs, 8);
        assert_eq!(cfg.merge.max_urls_per_channel, 5);
    }

    #[test]
    fn json_config_is_accepted() {
        let json = r#"{ "merge": { "stale_after_hours": 24 } }"#;
        let cfg = parse_config(json, "json").unwrap();
        assert_eq!(cfg.merge.stale_after_hours, 24);
        assert_eq!(cfg.merge.max_urls_per_channel, 5);
    }
}
