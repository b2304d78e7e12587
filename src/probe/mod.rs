// src/probe/mod.rs
//! Stream liveness classification.
//!
//! Every unique candidate URL is probed through a chain: the primary prober
//! with a bounded number of retries, then one fallback pass. The result is
//! three-valued on purpose. `Dead` is reserved for probes that definitively
//! rejected the stream; a URL that only ever timed out is `Ambiguous` and
//! must not be blacklisted on that evidence.

pub mod ffprobe;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ProbeConfig;

pub use ffprobe::{FfmpegProber, FfprobeProber};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Live,
    Dead,
    Ambiguous,
}

/// Verdict of a single probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Playable,
    /// The prober ran and rejected the stream.
    Unplayable(String),
    /// The prober could not produce evidence either way.
    Transient(String),
}

#[async_trait]
pub trait StreamProber: Send + Sync {
    fn name(&self) -> &'static str;
    async fn probe(&self, url: &str) -> ProbeResult;
}

/// Final classification of one URL after the whole probe chain.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub url: String,
    pub liveness: Liveness,
    /// Which prober settled it, e.g. "ffprobe(attempt=2)" or "ffmpeg-fallback".
    pub method: String,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Runs the probe chain over a worker pool.
pub struct LivenessTester {
    primary: Arc<dyn StreamProber>,
    fallback: Option<Arc<dyn StreamProber>>,
    cfg: ProbeConfig,
}

impl LivenessTester {
    pub fn new(
        primary: Arc<dyn StreamProber>,
        fallback: Option<Arc<dyn StreamProber>>,
        cfg: ProbeConfig,
    ) -> Self {
        let fallback = if cfg.use_fallback { fallback } else { None };
        Self {
            primary,
            fallback,
            cfg,
        }
    }

    /// Stock chain: ffprobe primary, ffmpeg decode fallback.
    pub fn with_ffmpeg(cfg: ProbeConfig) -> Self {
        let timeout = Duration::from_secs(cfg.timeout_secs);
        let primary = Arc::new(FfprobeProber::new(timeout, cfg.user_agent.clone()));
        let fallback = Arc::new(FfmpegProber::new(timeout, cfg.user_agent.clone()));
        Self::new(primary, Some(fallback), cfg)
    }

    /// Classify every URL. Output always contains exactly one outcome per
    /// input URL; when the run deadline cuts probing short, the remainder
    /// comes back `Ambiguous`.
    pub async fn classify_all(&self, urls: Vec<String>) -> HashMap<String, ProbeOutcome> {
        let total = urls.len();
        if total == 0 {
            return HashMap::new();
        }
        info!(
            urls = total,
            workers = self.cfg.workers,
            timeout_secs = self.cfg.timeout_secs,
            "probing streams"
        );

        let started = Instant::now();
        let deadline = (self.cfg.run_deadline_secs > 0)
            .then(|| started + Duration::from_secs(self.cfg.run_deadline_secs));
        let semaphore = Arc::new(Semaphore::new(self.cfg.workers.max(1)));
        let done = Arc::new(AtomicUsize::new(0));

        let mut tasks = JoinSet::new();
        for url in urls {
            let semaphore = Arc::clone(&semaphore);
            let primary = Arc::clone(&self.primary);
            let fallback = self.fallback.clone();
            let cfg = self.cfg.clone();
            let done = Arc::clone(&done);
            tasks.spawn(async move {
                // Closed semaphore is unreachable; treat it as a skip.
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return ProbeOutcome {
                            url,
                            liveness: Liveness::Ambiguous,
                            method: "pool closed".to_string(),
                            attempts: 0,
                            elapsed: Duration::ZERO,
                        }
                    }
                };
                let outcome = if deadline.is_some_and(|d| Instant::now() >= d) {
                    ProbeOutcome {
                        url,
                        liveness: Liveness::Ambiguous,
                        method: "run deadline reached".to_string(),
                        attempts: 0,
                        elapsed: Duration::ZERO,
                    }
                } else {
                    classify_one(primary, fallback, &cfg, url).await
                };

                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                if cfg.progress_every > 0 && finished % cfg.progress_every == 0 {
                    info!(done = finished, total, "probe progress");
                }
                outcome
            });
        }

        let mut outcomes = HashMap::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    outcomes.insert(outcome.url.clone(), outcome);
                }
                Err(err) => warn!(%err, "probe task panicked"),
            }
        }

        let live = outcomes
            .values()
            .filter(|o| o.liveness == Liveness::Live)
            .count();
        let dead = outcomes
            .values()
            .filter(|o| o.liveness == Liveness::Dead)
            .count();
        info!(
            live,
            dead,
            ambiguous = outcomes.len() - live - dead,
            elapsed_secs = started.elapsed().as_secs(),
            "probe pass finished"
        );
        outcomes
    }
}

async fn classify_one(
    primary: Arc<dyn StreamProber>,
    fallback: Option<Arc<dyn StreamProber>>,
    cfg: &ProbeConfig,
    url: String,
) -> ProbeOutcome {
    let started = Instant::now();
    let max_attempts = cfg.retry_failed + 1;
    let mut attempts = 0u32;
    let mut saw_unplayable = false;
    let mut last_reason = String::new();

    for attempt in 1..=max_attempts {
        attempts = attempt;
        match primary.probe(&url).await {
            ProbeResult::Playable => {
                return ProbeOutcome {
                    url,
                    liveness: Liveness::Live,
                    method: format!("{}(attempt={attempt})", primary.name()),
                    attempts,
                    elapsed: started.elapsed(),
                };
            }
            ProbeResult::Unplayable(reason) => {
                saw_unplayable = true;
                last_reason = reason;
            }
            ProbeResult::Transient(reason) => last_reason = reason,
        }
        if attempt < max_attempts && cfg.retry_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(cfg.retry_delay_ms)).await;
        }
    }

    let mut method = primary.name().to_string();
    if let Some(fallback) = fallback {
        attempts += 1;
        method = format!("{}+{}-fallback", primary.name(), fallback.name());
        match fallback.probe(&url).await {
            ProbeResult::Playable => {
                return ProbeOutcome {
                    url,
                    liveness: Liveness::Live,
                    method: format!("{}-fallback", fallback.name()),
                    attempts,
                    elapsed: started.elapsed(),
                };
            }
            ProbeResult::Unplayable(reason) => {
                saw_unplayable = true;
                last_reason = reason;
            }
            ProbeResult::Transient(reason) => last_reason = reason,
        }
    }

    let liveness = if saw_unplayable {
        Liveness::Dead
    } else {
        Liveness::Ambiguous
    };
    debug!(url = %url, ?liveness, reason = %last_reason, "stream not verified");
    ProbeOutcome {
        url,
        liveness,
        method,
        attempts,
        elapsed: started.elapsed(),
    }
}
