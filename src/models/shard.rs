//! Shard assignments and instance termination reasons.

use std::fmt;
use std::path::PathBuf;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// Inclusive calendar date interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Number of days covered, counting both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Split into consecutive sub-ranges of at most `step_days` days.
    pub fn chunks(&self, step_days: u32) -> Vec<DateRange> {
        let step = u64::from(step_days.max(1));
        let mut chunks = Vec::new();
        let mut current = self.start;

        while current <= self.end {
            let chunk_end = current
                .checked_add_days(Days::new(step - 1))
                .map_or(self.end, |d| d.min(self.end));
            chunks.push(DateRange::new(current, chunk_end));
            match chunk_end.succ_opt() {
                Some(next) => current = next,
                None => break,
            }
        }
        chunks
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Why a pipeline instance stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    /// Every assigned request was issued and answered
    Completed,
    /// A request timed out; the remote is throttling us
    RateLimited,
    /// The remote refused connections
    ConnectionRefused,
}

impl ExitStatus {
    /// Process exit code reported to the supervisor.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitStatus::Completed => 0,
            ExitStatus::RateLimited => 75,
            ExitStatus::ConnectionRefused => 76,
        }
    }

    pub fn from_exit_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ExitStatus::Completed),
            75 => Some(ExitStatus::RateLimited),
            76 => Some(ExitStatus::ConnectionRefused),
            _ => None,
        }
    }

    /// Whether the supervisor should cool down and relaunch.
    pub fn wants_backoff(&self) -> bool {
        matches!(self, ExitStatus::RateLimited | ExitStatus::ConnectionRefused)
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExitStatus::Completed => "completed",
            ExitStatus::RateLimited => "rate_limited",
            ExitStatus::ConnectionRefused => "connection_refused",
        })
    }
}

/// Work assigned to one shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardAssignment {
    /// Date interval for a list+enrich instance
    Dates(DateRange),
    /// Keyword file for a trend-only instance
    Keywords { file: PathBuf, keywords: Vec<String> },
}

/// One partition plus the files it exclusively owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardDescriptor {
    /// 1-based shard number
    pub index: usize,
    pub assignment: ShardAssignment,
    pub output: PathBuf,
    pub cache: PathBuf,
    pub ledger: PathBuf,
    pub state_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_days_is_inclusive() {
        assert_eq!(DateRange::new(date("2024-01-01"), date("2024-01-01")).days(), 1);
        assert_eq!(DateRange::new(date("2024-02-28"), date("2024-03-01")).days(), 3);
    }

    #[test]
    fn test_chunks_cover_range() {
        let range = DateRange::new(date("2024-01-01"), date("2024-01-10"));
        let chunks = range.chunks(3);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0], DateRange::new(date("2024-01-01"), date("2024-01-03")));
        assert_eq!(chunks[3], DateRange::new(date("2024-01-10"), date("2024-01-10")));
    }

    #[test]
    fn test_single_day_chunks() {
        let range = DateRange::new(date("2024-01-01"), date("2024-01-03"));
        let chunks = range.chunks(1);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.days() == 1));
    }

    #[test]
    fn test_exit_code_round_trip() {
        for status in [
            ExitStatus::Completed,
            ExitStatus::RateLimited,
            ExitStatus::ConnectionRefused,
        ] {
            assert_eq!(ExitStatus::from_exit_code(status.exit_code()), Some(status));
        }
        assert_eq!(ExitStatus::from_exit_code(1), None);
        assert!(!ExitStatus::Completed.wants_backoff());
        assert!(ExitStatus::ConnectionRefused.wants_backoff());
    }
}
