// src/models/mod.rs

//! Domain models for the crawler application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod project;

// Re-export all public types
pub use config::{ApiConfig, Config, CrawlConfig, StorageConfig};
pub use project::{Money, Page, ProjectDetails, ProjectSummary, Reward};
