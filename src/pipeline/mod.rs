//! Pipeline orchestration.
//!
//! - `crawl`: list crawl with inline trend enrichment (one instance)
//! - `trend`: trend-only lookups over a keyword list (one instance)
//! - `partition` + `orchestrator`: sharding and backoff across instances
//! - `keywords`: keyword file extraction

pub mod crawl;
pub mod frontier;
pub mod keywords;
pub mod orchestrator;
pub mod partition;
pub mod trend;

use std::path::{Path, PathBuf};

use crate::models::{Config, ShardDescriptor};

pub use crawl::run_list_instance;
pub use frontier::{Completion, Frontier};
pub use keywords::{extract_keywords, read_keywords, write_keywords};
pub use orchestrator::{
    Launcher, Orchestrator, ProcessLauncher, RunReport, Sleeper, TokioSleeper,
};
pub use partition::{
    log_plan, partition_dates, partition_keywords, plan_list_shards, plan_trend_shards,
};
pub use trend::run_trend_instance;

/// Files owned by a single pipeline instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancePaths {
    pub output: PathBuf,
    pub cache: PathBuf,
    pub ledger: PathBuf,
    pub state_dir: PathBuf,
}

impl InstancePaths {
    /// Configured paths for a standalone list instance.
    pub fn list(config: &Config) -> Self {
        Self {
            output: config.paths.output.clone(),
            cache: config.paths.trend_cache.clone(),
            ledger: config.paths.failed_urls.clone(),
            state_dir: config.paths.state_dir.clone(),
        }
    }

    /// Configured paths for a standalone trend-only instance.
    ///
    /// Shares the cache with list instances but keeps its own ledger and
    /// state so the two never resume each other's work.
    pub fn trend(config: &Config) -> Self {
        Self {
            output: config.paths.trend_output.clone(),
            cache: config.paths.trend_cache.clone(),
            ledger: with_suffix(&config.paths.failed_urls, "_trend"),
            state_dir: with_suffix(&config.paths.state_dir, "_trend"),
        }
    }
}

impl From<&ShardDescriptor> for InstancePaths {
    fn from(shard: &ShardDescriptor) -> Self {
        Self {
            output: shard.output.clone(),
            cache: shard.cache.clone(),
            ledger: shard.ledger.clone(),
            state_dir: shard.state_dir.clone(),
        }
    }
}

/// `dir/name.ext` → `dir/name{suffix}.ext`
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_paths_are_separate() {
        let config = Config::default();
        let list = InstancePaths::list(&config);
        let trend = InstancePaths::trend(&config);

        assert_eq!(trend.cache, list.cache);
        assert_eq!(trend.ledger, PathBuf::from("output/failed_urls_trend.txt"));
        assert_eq!(trend.state_dir, PathBuf::from("jobdir_trend"));
        assert_eq!(trend.output, PathBuf::from("output/trend.jsonl"));
    }
}
