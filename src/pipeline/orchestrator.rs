// src/pipeline/orchestrator.rs

//! Parallel shard execution with cooldown and relaunch.
//!
//! Every round launches all shards and waits for all of them. If any shard
//! stopped because the remote throttled or refused it, the orchestrator
//! sleeps for the next step of the backoff schedule and relaunches the whole
//! set. Instances resume from their own ledger and state, so finished work
//! is not repeated. An exhausted schedule ends the run with the condition
//! still unresolved.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::process::Command;

use crate::error::Result;
use crate::models::{ExitStatus, ShardAssignment, ShardDescriptor};
use crate::pipeline::keywords::write_keywords;
use crate::storage::{read_finish_reason, reset_finish_reason};

/// Runs one shard to completion and reports how it ended.
///
/// `None` means no termination reason could be determined; such a shard is
/// not retried.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, shard: &ShardDescriptor) -> Result<Option<ExitStatus>>;
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeping.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Launches shards as child processes of the current executable.
pub struct ProcessLauncher {
    exe: PathBuf,
    config_path: Option<PathBuf>,
    verbose: bool,
}

impl ProcessLauncher {
    pub fn current(config_path: Option<PathBuf>, verbose: bool) -> Result<Self> {
        Ok(Self {
            exe: std::env::current_exe()?,
            config_path,
            verbose,
        })
    }

    /// Command-line arguments that make a child run exactly this shard.
    pub fn args(&self, shard: &ShardDescriptor) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(config) = &self.config_path {
            args.push("--config".into());
            args.push(config.into());
        }
        if self.verbose {
            args.push("--verbose".into());
        }

        match &shard.assignment {
            ShardAssignment::Dates(range) => {
                args.push("crawl".into());
                args.push("--start".into());
                args.push(range.start.to_string().into());
                args.push("--end".into());
                args.push(range.end.to_string().into());
            }
            ShardAssignment::Keywords { file, .. } => {
                args.push("trend".into());
                args.push("--keywords".into());
                args.push(file.into());
            }
        }

        for (flag, path) in [
            ("--output", &shard.output),
            ("--cache", &shard.cache),
            ("--ledger", &shard.ledger),
            ("--state", &shard.state_dir),
        ] {
            args.push(flag.into());
            args.push(path.into());
        }
        args
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, shard: &ShardDescriptor) -> Result<Option<ExitStatus>> {
        if let ShardAssignment::Keywords { file, keywords } = &shard.assignment {
            write_keywords(file, keywords).await?;
        }
        reset_finish_reason(&shard.state_dir).await?;

        let status = Command::new(&self.exe)
            .args(self.args(shard))
            .kill_on_drop(true)
            .status()
            .await?;

        match read_finish_reason(&shard.state_dir).await {
            Ok(Some(reason)) => return Ok(Some(reason)),
            Ok(None) => {}
            Err(e) => log::warn!("Shard {}: unreadable state: {}", shard.index, e),
        }
        Ok(status.code().and_then(ExitStatus::from_exit_code))
    }
}

/// How an orchestrated run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Launch rounds performed
    pub rounds: usize,
    /// Cooldowns slept, in order
    pub backoffs: Vec<Duration>,
    /// Shards still throttled when the schedule ran out
    pub unresolved: Vec<(usize, ExitStatus)>,
    /// Shards that ended without a usable termination reason
    pub unknown: Vec<usize>,
}

impl RunReport {
    /// Status to report for the whole run.
    pub fn status(&self) -> ExitStatus {
        if self
            .unresolved
            .iter()
            .any(|(_, s)| *s == ExitStatus::ConnectionRefused)
        {
            ExitStatus::ConnectionRefused
        } else if !self.unresolved.is_empty() {
            ExitStatus::RateLimited
        } else {
            ExitStatus::Completed
        }
    }
}

pub struct Orchestrator<L, S> {
    launcher: L,
    sleeper: S,
    schedule: Vec<Duration>,
}

impl<L: Launcher, S: Sleeper> Orchestrator<L, S> {
    pub fn new(launcher: L, sleeper: S, schedule_secs: &[u64]) -> Self {
        Self {
            launcher,
            sleeper,
            schedule: schedule_secs.iter().map(|s| Duration::from_secs(*s)).collect(),
        }
    }

    pub async fn run(&self, shards: &[ShardDescriptor]) -> Result<RunReport> {
        let mut report = RunReport {
            rounds: 0,
            backoffs: Vec::new(),
            unresolved: Vec::new(),
            unknown: Vec::new(),
        };

        loop {
            report.rounds += 1;
            log::info!("Launching {} shards (round {})", shards.len(), report.rounds);

            let outcomes = join_all(shards.iter().map(|s| self.launcher.launch(s))).await;

            report.unresolved.clear();
            report.unknown.clear();
            for (shard, outcome) in shards.iter().zip(outcomes) {
                match outcome {
                    Ok(Some(status)) => {
                        log::info!("Shard {} finished: {}", shard.index, status);
                        if status.wants_backoff() {
                            report.unresolved.push((shard.index, status));
                        }
                    }
                    Ok(None) => {
                        log::warn!("Shard {} ended without a termination reason", shard.index);
                        report.unknown.push(shard.index);
                    }
                    Err(e) => {
                        log::error!("Shard {} failed to run: {}", shard.index, e);
                        report.unknown.push(shard.index);
                    }
                }
            }

            if report.unresolved.is_empty() {
                return Ok(report);
            }

            let Some(wait) = self.schedule.get(report.backoffs.len()).copied() else {
                log::warn!(
                    "Backoff schedule exhausted with {} shards still throttled",
                    report.unresolved.len()
                );
                return Ok(report);
            };

            log::warn!(
                "{} shards throttled; sleeping {}s before relaunching all shards",
                report.unresolved.len(),
                wait.as_secs()
            );
            self.sleeper.sleep(wait).await;
            report.backoffs.push(wait);
        }
    }
}
