//! hotrank CLI
//!
//! Single instances (`crawl`, `trend`) and their sharded, backoff-driven
//! counterparts (`run`, `run-trend`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use hotrank::{
    error::{AppError, Result},
    models::{Config, DateRange, ExitStatus},
    pipeline::{self, InstancePaths, Orchestrator, ProcessLauncher, TokioSleeper},
    services::Fetcher,
    utils::http::{self, HttpFetcher},
};

const DEFAULT_CONFIG: &str = "hotrank.toml";
const COOKIE_ENV: &str = "HOTRANK_COOKIE";

/// hotrank - hot-search ranking harvester
#[derive(Parser, Debug)]
#[command(
    name = "hotrank",
    version,
    about = "Harvests the hot-search ranking feed and resolves topic trend lifecycles"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl the ranking list for a date range, enriching each topic
    Crawl {
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,

        #[command(flatten)]
        files: InstanceFiles,
    },

    /// Resolve trend lifecycles for every keyword in a file
    Trend {
        /// Keyword file, one per line
        #[arg(long)]
        keywords: Option<PathBuf>,

        #[command(flatten)]
        files: InstanceFiles,
    },

    /// Split the date range into shards and crawl them in parallel
    Run {
        /// Number of shards
        #[arg(long)]
        shards: Option<usize>,

        #[arg(long)]
        start: Option<NaiveDate>,

        #[arg(long)]
        end: Option<NaiveDate>,

        /// Print the shard plan without launching anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Split the keyword file into shards and resolve them in parallel
    RunTrend {
        #[arg(long)]
        keywords: Option<PathBuf>,

        #[arg(long)]
        shards: Option<usize>,

        #[arg(long)]
        dry_run: bool,
    },

    /// Extract unique keywords from a list output file
    Keywords {
        /// List JSONL file (default: paths.output)
        #[arg(long)]
        list: Option<PathBuf>,

        /// Keyword file to write (default: paths.keywords)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Validate the configuration file
    Validate,
}

/// Per-instance file overrides.
#[derive(Args, Debug, Default)]
struct InstanceFiles {
    /// Output JSONL file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Trend cache SQLite file
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Failure ledger file
    #[arg(long)]
    ledger: Option<PathBuf>,

    /// State directory
    #[arg(long)]
    state: Option<PathBuf>,
}

impl InstanceFiles {
    fn apply(self, mut paths: InstancePaths) -> InstancePaths {
        if let Some(output) = self.output {
            paths.output = output;
        }
        if let Some(cache) = self.cache {
            paths.cache = cache;
        }
        if let Some(ledger) = self.ledger {
            paths.ledger = ledger;
        }
        if let Some(state) = self.state {
            paths.state_dir = state;
        }
        paths
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    // Only an absent default file falls back to built-in defaults.
    let loaded = match &cli.config {
        Some(path) => Config::load(path).map(Some),
        None => Config::load_if_present(&config_path),
    };
    let mut config = match &loaded {
        Ok(Some(config)) => config.clone(),
        _ => Config::default(),
    };
    init_logging(cli.verbose, &config.logging.level);

    match loaded {
        Ok(Some(_)) => log::debug!("Loaded configuration from {}", config_path.display()),
        Ok(None) => log::debug!("No config at {}; using defaults", config_path.display()),
        Err(e) => {
            log::error!("Failed to load {}: {}", config_path.display(), e);
            return ExitCode::FAILURE;
        }
    }

    if config.api.cookie.is_empty() {
        if let Ok(cookie) = std::env::var(COOKIE_ENV) {
            config.api.cookie = cookie;
        }
    }

    match run(cli, config).await {
        Ok(status) => ExitCode::from(u8::try_from(status.exit_code()).unwrap_or(1)),
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, mut config: Config) -> Result<ExitStatus> {
    match cli.command {
        Command::Crawl { start, end, files } => {
            let range = resolve_range(&config, start, end)?;
            config.validate()?;
            let paths = files.apply(InstancePaths::list(&config));
            let fetcher = build_fetcher(&config)?;
            pipeline::run_list_instance(&config, fetcher, range, &paths).await
        }

        Command::Trend { keywords, files } => {
            config.validate()?;
            let keywords_path = keywords.unwrap_or_else(|| config.paths.keywords.clone());
            let keywords = pipeline::read_keywords(&keywords_path).await?;
            let paths = files.apply(InstancePaths::trend(&config));
            let fetcher = build_fetcher(&config)?;
            pipeline::run_trend_instance(&config, fetcher, &keywords, &paths).await
        }

        Command::Run {
            shards,
            start,
            end,
            dry_run,
        } => {
            let range = resolve_range(&config, start, end)?;
            if let Some(shards) = shards {
                config.shards.count = shards;
            }
            config.validate()?;

            let plan = pipeline::plan_list_shards(&config.shards, range, config.shards.count);
            log::info!("Sharding {} into {} instances", range, plan.len());
            pipeline::log_plan(&plan);
            if dry_run {
                return Ok(ExitStatus::Completed);
            }
            orchestrate(&cli.config, cli.verbose, &config, &plan).await
        }

        Command::RunTrend {
            keywords,
            shards,
            dry_run,
        } => {
            if let Some(shards) = shards {
                config.shards.count = shards;
            }
            config.validate()?;

            let keywords_path = keywords.unwrap_or_else(|| config.paths.keywords.clone());
            let keywords = pipeline::read_keywords(&keywords_path).await?;
            let plan = pipeline::plan_trend_shards(&config.shards, &keywords, config.shards.count);
            log::info!(
                "Sharding {} keywords into {} instances",
                keywords.len(),
                plan.len()
            );
            pipeline::log_plan(&plan);
            if dry_run {
                return Ok(ExitStatus::Completed);
            }
            orchestrate(&cli.config, cli.verbose, &config, &plan).await
        }

        Command::Keywords { list, out } => {
            let list = list.unwrap_or_else(|| config.paths.output.clone());
            let out = out.unwrap_or_else(|| config.paths.keywords.clone());
            pipeline::extract_keywords(&list, &out).await?;
            Ok(ExitStatus::Completed)
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            if config.api.cookie.is_empty() {
                log::warn!("No cookie configured (api.cookie or {})", COOKIE_ENV);
            }
            log::info!("✓ Config OK");
            Ok(ExitStatus::Completed)
        }
    }
}

fn resolve_range(
    config: &Config,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<DateRange> {
    let range = DateRange::new(
        start.unwrap_or(config.range.start_date),
        end.unwrap_or(config.range.end_date),
    );
    if range.start > range.end {
        return Err(AppError::validation(format!(
            "start date {} is after end date {}",
            range.start, range.end
        )));
    }
    Ok(range)
}

fn build_fetcher(config: &Config) -> Result<Arc<dyn Fetcher>> {
    let client = http::create_client(&config.api, &config.crawler)?;
    Ok(Arc::new(HttpFetcher::new(client)))
}

async fn orchestrate(
    config_path: &Option<PathBuf>,
    verbose: bool,
    config: &Config,
    plan: &[hotrank::models::ShardDescriptor],
) -> Result<ExitStatus> {
    let launcher = ProcessLauncher::current(config_path.clone(), verbose)?;
    let orchestrator = Orchestrator::new(launcher, TokioSleeper, &config.shards.backoff_secs);
    let report = orchestrator.run(plan).await?;

    let status = report.status();
    log::info!(
        "Finished after {} rounds and {} cooldowns: {}",
        report.rounds,
        report.backoffs.len(),
        status
    );
    if !report.unknown.is_empty() {
        log::warn!("Shards without a termination reason: {:?}", report.unknown);
    }
    Ok(status)
}
