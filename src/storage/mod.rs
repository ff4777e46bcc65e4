// src/storage/mod.rs

//! Durable crawl state and dataset persistence.
//!
//! ## Directory Layout
//!
//! ```text
//! {data_dir}/
//! ├── crawl_state.json      # Pagination cursor + has_more flag
//! ├── session.json          # Marker naming the active export location
//! └── output/
//!     └── YYYY-MM-DD_HH-MM-SS/
//!         └── projects.csv  # Append-only dataset with fixed header
//! ```
//!
//! Both state files are written atomically (temp file + rename); the dataset
//! file is append-only and fsynced after every row.

pub mod cursor;
pub mod exporter;

pub use cursor::{CursorStore, STATE_FILE};
pub use exporter::{DATASET_FILE, SESSION_MARKER_FILE, SessionExporter};
