// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod config;
pub mod geo;
pub mod mapper;
pub mod matching;
pub mod pipeline;
pub mod placeholder;
pub mod registry;
pub mod schedule;

// Playlist scanning (sources, M3U text, Xtream live API)
pub mod scan;

// Stream liveness probing (worker pool + probe chain)
pub mod probe;

// ---- Re-exports for stable public API ----
pub use crate::config::ResolverConfig;
pub use crate::pipeline::{run_pipeline, RunSummary};
pub use crate::probe::{Liveness, ProbeOutcome, StreamProber};
pub use crate::registry::ChannelRegistry;
