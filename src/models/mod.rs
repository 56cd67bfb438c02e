// src/models/mod.rs

//! Domain models for the ranking crawler.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod entry;
mod shard;
mod trend;

// Re-export all public types
pub use config::{
    ApiConfig, Config, CrawlerConfig, EnrichConfig, LoggingConfig, PathsConfig, RangeConfig,
    ShardConfig,
};
pub use entry::{RankedEntry, TrendRecord};
pub(crate) use entry::value_to_string;
pub use shard::{DateRange, ExitStatus, ShardAssignment, ShardDescriptor};
pub use trend::{TrendCacheEntry, TrendSource, TrendSummary};
