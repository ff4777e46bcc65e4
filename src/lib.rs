// src/lib.rs

//! fundcrawl Crawler Library

pub mod api;
pub mod crawl;
pub mod error;
pub mod mapping;
pub mod models;
pub mod storage;
