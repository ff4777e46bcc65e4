// src/crawl/mod.rs

//! The resumable crawl engine.
//!
//! - `backoff`: rate-limit cooldown computation and failure tracking
//! - `orchestrator`: the state machine driving pagination, per-item
//!   processing, error dispatch, and cancellation

pub mod backoff;
pub mod orchestrator;

pub use backoff::{BackoffPolicy, BackoffState};
pub use orchestrator::{CrawlOptions, CrawlOrchestrator, CrawlState, CrawlSummary, StopHandle};
