//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::TrendSource;

/// Root application configuration.
///
/// Built once at process start and passed by reference (or `Arc`) into every
/// component. Nothing below the CLI reads the environment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Remote API endpoints and request identity
    #[serde(default)]
    pub api: ApiConfig,

    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Trend enrichment settings
    #[serde(default)]
    pub enrich: EnrichConfig,

    /// Date span to harvest
    #[serde(default)]
    pub range: RangeConfig,

    /// Single-instance file locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Parallel execution and backoff
    #[serde(default)]
    pub shards: ShardConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Like [`Config::load`], but a missing file is `Ok(None)`.
    ///
    /// Unreadable or malformed files are still errors.
    pub fn load_if_present(path: impl AsRef<Path>) -> Result<Option<Self>> {
        match Self::load(path) {
            Ok(config) => Ok(Some(config)),
            Err(AppError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.api.user_agent.trim().is_empty() {
            return Err(AppError::validation("api.user_agent is empty"));
        }
        if self.api.aes_key.len() != 32 {
            return Err(AppError::validation("api.aes_key must be exactly 32 bytes"));
        }
        url::Url::parse(&self.api.base_url)
            .map_err(|e| AppError::validation(format!("api.base_url is invalid: {e}")))?;
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.enrich.timeout_secs == 0 {
            return Err(AppError::validation("enrich.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.crawler.max_per_host == 0 {
            return Err(AppError::validation("crawler.max_per_host must be > 0"));
        }
        if self.crawler.page_size == 0 {
            return Err(AppError::validation("crawler.page_size must be > 0"));
        }
        if self.crawler.date_step_days == 0 {
            return Err(AppError::validation("crawler.date_step_days must be > 0"));
        }
        if self.range.start_date > self.range.end_date {
            return Err(AppError::validation(
                "range.start_date must be <= range.end_date",
            ));
        }
        if self.shards.count == 0 {
            return Err(AppError::validation("shards.count must be > 0"));
        }
        Ok(())
    }
}

/// Remote API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL all endpoint paths are appended to
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// 32-byte ASCII key used to decrypt response bodies
    #[serde(default = "defaults::aes_key")]
    pub aes_key: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Origin/Referer site the API expects requests from
    #[serde(default = "defaults::origin")]
    pub origin: String,

    /// Accept-Language header
    #[serde(default = "defaults::accept_language")]
    pub accept_language: String,

    /// Session cookie (may also come from `HOTRANK_COOKIE`)
    #[serde(default)]
    pub cookie: String,

    /// Platform selector sent as `type`
    #[serde(default = "defaults::feed_type")]
    pub feed_type: u32,

    /// Board selector sent as `radioType`
    #[serde(default = "defaults::radio_type")]
    pub radio_type: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            aes_key: defaults::aes_key(),
            user_agent: defaults::user_agent(),
            origin: defaults::origin(),
            accept_language: defaults::accept_language(),
            cookie: String::new(),
            feed_type: defaults::feed_type(),
            radio_type: defaults::radio_type(),
        }
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Request timeout for list pages in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between request dispatches in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Maximum requests in flight per instance
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Maximum requests in flight per remote host
    #[serde(default = "defaults::max_per_host")]
    pub max_per_host: usize,

    /// Rows requested per list page
    #[serde(default = "defaults::page_size")]
    pub page_size: u32,

    /// Length of each paginated date chunk in days
    #[serde(default = "defaults::date_step_days")]
    pub date_step_days: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_concurrent: defaults::max_concurrent(),
            max_per_host: defaults::max_per_host(),
            page_size: defaults::page_size(),
            date_step_days: defaults::date_step_days(),
        }
    }
}

/// Trend enrichment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichConfig {
    /// Fetch lifecycle data for every ranked entry
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Which lookup endpoint answers trend requests
    #[serde(default)]
    pub source: TrendSource,

    /// Request timeout for lookups in seconds
    #[serde(default = "defaults::trend_timeout")]
    pub timeout_secs: u64,

    /// Trend-only mode: skip keywords whose cache row is already complete
    #[serde(default = "defaults::enabled")]
    pub skip_resolved: bool,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            source: TrendSource::default(),
            timeout_secs: defaults::trend_timeout(),
            skip_resolved: defaults::enabled(),
        }
    }
}

/// Inclusive date span to harvest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeConfig {
    #[serde(default = "defaults::start_date")]
    pub start_date: NaiveDate,

    #[serde(default = "defaults::end_date")]
    pub end_date: NaiveDate,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            start_date: defaults::start_date(),
            end_date: defaults::end_date(),
        }
    }
}

/// File locations used by a single (unsharded) instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Ranked entry output (JSON Lines)
    #[serde(default = "defaults::output")]
    pub output: PathBuf,

    /// Trend-only output (JSON Lines)
    #[serde(default = "defaults::trend_output")]
    pub trend_output: PathBuf,

    /// SQLite trend cache
    #[serde(default = "defaults::trend_cache")]
    pub trend_cache: PathBuf,

    /// Failure ledger
    #[serde(default = "defaults::failed_urls")]
    pub failed_urls: PathBuf,

    /// Directory holding the progress/state file
    #[serde(default = "defaults::state_dir")]
    pub state_dir: PathBuf,

    /// Keyword list consumed by the trend-only pipeline
    #[serde(default = "defaults::keywords")]
    pub keywords: PathBuf,

    /// Truncate output files instead of appending
    #[serde(default)]
    pub overwrite_output: bool,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output: defaults::output(),
            trend_output: defaults::trend_output(),
            trend_cache: defaults::trend_cache(),
            failed_urls: defaults::failed_urls(),
            state_dir: defaults::state_dir(),
            keywords: defaults::keywords(),
            overwrite_output: false,
        }
    }
}

/// Parallel execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardConfig {
    /// Number of pipeline instances to launch
    #[serde(default = "defaults::shard_count")]
    pub count: usize,

    /// Directory receiving per-shard outputs, ledgers and keyword files
    #[serde(default = "defaults::output_dir")]
    pub output_dir: PathBuf,

    /// Directory receiving per-shard caches and state directories
    #[serde(default = "defaults::work_dir")]
    pub work_dir: PathBuf,

    /// Seconds to wait before each relaunch; its length bounds the attempts
    #[serde(default = "defaults::backoff_secs")]
    pub backoff_secs: Vec<u64>,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            count: defaults::shard_count(),
            output_dir: defaults::output_dir(),
            work_dir: defaults::work_dir(),
            backoff_secs: defaults::backoff_secs(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use chrono::NaiveDate;

    // Api defaults
    pub fn base_url() -> String {
        "https://hotengineapi.zhaoyizhe.com/hotEngineApi".into()
    }
    pub fn aes_key() -> String {
        "cce1d5a8d58249048623eb26b8b0ea53".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
            .into()
    }
    pub fn origin() -> String {
        "https://weibo.zhaoyizhe.com".into()
    }
    pub fn accept_language() -> String {
        "zh-CN,zh;q=0.9,en;q=0.8".into()
    }
    pub fn feed_type() -> u32 {
        1
    }
    pub fn radio_type() -> u32 {
        1
    }

    // Crawler defaults
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        800
    }
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn max_per_host() -> usize {
        2
    }
    pub fn page_size() -> u32 {
        100
    }
    pub fn date_step_days() -> u32 {
        1
    }

    // Enrichment defaults
    pub fn enabled() -> bool {
        true
    }
    pub fn trend_timeout() -> u64 {
        60
    }

    // Range defaults
    pub fn start_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 10, 25).unwrap_or_default()
    }
    pub fn end_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 31).unwrap_or_default()
    }

    // Path defaults
    pub fn output() -> PathBuf {
        "output/weibo_total.jsonl".into()
    }
    pub fn trend_output() -> PathBuf {
        "output/trend.jsonl".into()
    }
    pub fn trend_cache() -> PathBuf {
        "trend_cache.sqlite".into()
    }
    pub fn failed_urls() -> PathBuf {
        "output/failed_urls.txt".into()
    }
    pub fn state_dir() -> PathBuf {
        "jobdir".into()
    }
    pub fn keywords() -> PathBuf {
        "output/keywords.txt".into()
    }

    // Shard defaults
    pub fn shard_count() -> usize {
        5
    }
    pub fn output_dir() -> PathBuf {
        "output".into()
    }
    pub fn work_dir() -> PathBuf {
        ".".into()
    }
    pub fn backoff_secs() -> Vec<u64> {
        vec![15 * 60, 30 * 60]
    }

    pub fn log_level() -> String {
        "info".into()
    }
}
