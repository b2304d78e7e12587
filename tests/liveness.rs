// tests/liveness.rs
// Worker-pool classification with a scripted prober standing in for ffprobe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use sports_stream_resolver::config::ProbeConfig;
use sports_stream_resolver::probe::{
    Liveness, LivenessTester, ProbeResult, StreamProber,
};

/// Plays back a fixed sequence of results per URL.
struct MockProber {
    name: &'static str,
    scripts: Mutex<HashMap<String, Vec<ProbeResult>>>,
    calls: AtomicUsize,
}

impl MockProber {
    fn new(name: &'static str, scripts: HashMap<String, Vec<ProbeResult>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            scripts: Mutex::new(scripts),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl StreamProber for MockProber {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn probe(&self, url: &str) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(script) if !script.is_empty() => script.remove(0),
            _ => ProbeResult::Unplayable("unexpected probe".to_string()),
        }
    }
}

fn cfg() -> ProbeConfig {
    ProbeConfig {
        workers: 4,
        retry_failed: 1,
        retry_delay_ms: 0,
        ..ProbeConfig::default()
    }
}

fn scripts(entries: &[(&str, Vec<ProbeResult>)]) -> HashMap<String, Vec<ProbeResult>> {
    entries
        .iter()
        .map(|(url, script)| (url.to_string(), script.clone()))
        .collect()
}

#[tokio::test]
async fn every_url_gets_exactly_one_outcome() {
    let primary = MockProber::new(
        "mock",
        scripts(&[
            ("http://a.ts", vec![ProbeResult::Playable]),
            (
                "http://b.ts",
                vec![ProbeResult::Unplayable("404".into()); 2],
            ),
            (
                "http://c.ts",
                vec![
                    ProbeResult::Transient("timeout".into()),
                    ProbeResult::Playable,
                ],
            ),
        ]),
    );
    let tester = LivenessTester::new(primary, None, cfg());
    let urls = vec![
        "http://a.ts".to_string(),
        "http://b.ts".to_string(),
        "http://c.ts".to_string(),
    ];
    let outcomes = tester.classify_all(urls.clone()).await;

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes["http://a.ts"].liveness, Liveness::Live);
    assert_eq!(outcomes["http://a.ts"].attempts, 1);
    assert_eq!(outcomes["http://b.ts"].liveness, Liveness::Dead);
    assert_eq!(outcomes["http://c.ts"].liveness, Liveness::Live);
    assert_eq!(outcomes["http://c.ts"].attempts, 2);
}

#[tokio::test]
async fn fallback_runs_only_when_primary_fails() {
    let primary = MockProber::new(
        "primary",
        scripts(&[
            ("http://good.ts", vec![ProbeResult::Playable]),
            (
                "http://shy.ts",
                vec![ProbeResult::Transient("timeout".into()); 2],
            ),
        ]),
    );
    let fallback = MockProber::new(
        "fallback",
        scripts(&[("http://shy.ts", vec![ProbeResult::Playable])]),
    );
    let tester = LivenessTester::new(primary, Some(fallback.clone()), cfg());
    let outcomes = tester
        .classify_all(vec!["http://good.ts".to_string(), "http://shy.ts".to_string()])
        .await;

    assert_eq!(outcomes["http://good.ts"].liveness, Liveness::Live);
    assert_eq!(outcomes["http://shy.ts"].liveness, Liveness::Live);
    assert_eq!(outcomes["http://shy.ts"].method, "fallback-fallback");
    // the healthy URL never reached the fallback
    assert_eq!(fallback.calls.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn disabling_fallback_in_config_skips_it() {
    let primary = MockProber::new(
        "primary",
        scripts(&[(
            "http://shy.ts",
            vec![ProbeResult::Transient("timeout".into()); 2],
        )]),
    );
    let fallback = MockProber::new("fallback", HashMap::new());
    let tester = LivenessTester::new(
        primary,
        Some(fallback.clone()),
        ProbeConfig {
            use_fallback: false,
            ..cfg()
        },
    );
    let outcomes = tester.classify_all(vec!["http://shy.ts".to_string()]).await;

    assert_eq!(outcomes["http://shy.ts"].liveness, Liveness::Ambiguous);
    assert_eq!(fallback.calls.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn zero_deadline_means_no_deadline() {
    let primary = MockProber::new("primary", HashMap::new());
    let tester = LivenessTester::new(
        primary.clone(),
        None,
        ProbeConfig {
            workers: 1,
            run_deadline_secs: 0,
            ..cfg()
        },
    );
    let outcomes = tester.classify_all(vec!["http://x.ts".to_string()]).await;
    assert_eq!(outcomes["http://x.ts"].liveness, Liveness::Dead);
    assert_eq!(primary.calls.load(Ordering::Relaxed), 2);
}

/// Succeeds on every probe, but slowly.
struct SlowProber {
    delay: std::time::Duration,
    calls: AtomicUsize,
}

#[async_trait]
impl StreamProber for SlowProber {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn probe(&self, _url: &str) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.delay).await;
        ProbeResult::Playable
    }
}

#[tokio::test]
async fn active_deadline_stops_issuing_probes() {
    // one worker, 600 ms per probe, 1 s deadline: the first URL or two get
    // probed, the rest must come back Ambiguous without a single probe call.
    let primary = Arc::new(SlowProber {
        delay: std::time::Duration::from_millis(600),
        calls: AtomicUsize::new(0),
    });
    let tester = LivenessTester::new(
        primary.clone(),
        None,
        ProbeConfig {
            workers: 1,
            run_deadline_secs: 1,
            ..cfg()
        },
    );
    let urls: Vec<String> = (0..5).map(|i| format!("http://u/{i}.ts")).collect();
    let outcomes = tester.classify_all(urls.clone()).await;

    assert_eq!(outcomes.len(), urls.len());
    let live = outcomes
        .values()
        .filter(|o| o.liveness == Liveness::Live)
        .count();
    let cut_off: Vec<_> = outcomes
        .values()
        .filter(|o| o.liveness == Liveness::Ambiguous)
        .collect();
    assert!(live >= 1, "at least one probe ran before the deadline");
    assert!(!cut_off.is_empty(), "the deadline must cut some URLs off");
    assert_eq!(live + cut_off.len(), urls.len());
    for outcome in &cut_off {
        assert_eq!(outcome.method, "run deadline reached");
        assert_eq!(outcome.attempts, 0);
    }
    // cut-off URLs were never handed to the prober
    assert_eq!(primary.calls.load(Ordering::Relaxed), live);
}
