//! Trend lifecycle data structures.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Lookup endpoint answering trend requests.
///
/// The two variants report at different granularity, so the duration count
/// they produce is in different units (minutes vs. days). Caches written by
/// one variant must not be read as if written by the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrendSource {
    /// `data/superInfo`: minute-level points carrying a `value` array
    #[default]
    #[serde(rename = "superInfo", alias = "superinfo", alias = "super_info")]
    SuperInfo,

    /// `data/liftingDiagram`: day-level points carrying a `date` field
    #[serde(
        rename = "liftingDiagram",
        alias = "liftingdiagram",
        alias = "lifting_diagram"
    )]
    LiftingDiagram,
}

impl TrendSource {
    /// Endpoint path segment under `data/`.
    pub fn endpoint(&self) -> &'static str {
        match self {
            TrendSource::SuperInfo => "superInfo",
            TrendSource::LiftingDiagram => "liftingDiagram",
        }
    }

    /// Unit of the duration count this source produces.
    pub fn duration_unit(&self) -> &'static str {
        match self {
            TrendSource::SuperInfo => "minutes",
            TrendSource::LiftingDiagram => "days",
        }
    }

    /// Identify the source from a lookup URL path.
    pub fn from_path(path: &str) -> Option<Self> {
        if path.ends_with("/data/superInfo") {
            Some(TrendSource::SuperInfo)
        } else if path.ends_with("/data/liftingDiagram") {
            Some(TrendSource::LiftingDiagram)
        } else {
            None
        }
    }
}

impl fmt::Display for TrendSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

impl FromStr for TrendSource {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "superinfo" | "super_info" => Ok(TrendSource::SuperInfo),
            "liftingdiagram" | "lifting_diagram" => Ok(TrendSource::LiftingDiagram),
            other => Err(AppError::config(format!("unknown trend source '{other}'"))),
        }
    }
}

/// One resolved lifecycle row from the trend cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendCacheEntry {
    pub topic: String,
    pub first_observed: Option<String>,
    pub last_observed: Option<String>,
    /// Distinct timestamps seen; unit depends on the producing [`TrendSource`]
    pub duration_count: Option<u64>,
    pub point_count: Option<u64>,
    pub updated_at: Option<String>,
}

impl TrendCacheEntry {
    /// Both ends of the lifecycle are known.
    pub fn is_confirmed(&self) -> bool {
        self.first_observed.as_deref().is_some_and(|s| !s.is_empty())
            && self.last_observed.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// The enrichment values this row resolves to.
    pub fn summary(&self) -> TrendSummary {
        TrendSummary {
            first: self.first_observed.clone(),
            last: self.last_observed.clone(),
            duration: self.duration_count,
        }
    }
}

/// Lifecycle values written into ranked entries.
///
/// `TrendSummary::default()` is the unresolved state: every field null.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrendSummary {
    pub first: Option<String>,
    pub last: Option<String>,
    pub duration: Option<u64>,
}

impl TrendSummary {
    /// Worth persisting: both ends present.
    pub fn is_confirmed(&self) -> bool {
        self.first.is_some() && self.last.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_from_str_is_case_insensitive() {
        assert_eq!(
            "LiftingDiagram".parse::<TrendSource>().unwrap(),
            TrendSource::LiftingDiagram
        );
        assert_eq!(
            " superinfo ".parse::<TrendSource>().unwrap(),
            TrendSource::SuperInfo
        );
        assert!("weekly".parse::<TrendSource>().is_err());
    }

    #[test]
    fn test_source_from_path() {
        assert_eq!(
            TrendSource::from_path("/hotEngineApi/data/liftingDiagram"),
            Some(TrendSource::LiftingDiagram)
        );
        assert_eq!(TrendSource::from_path("/hotEngineApi/data/list"), None);
    }

    #[test]
    fn test_cache_entry_confirmation() {
        let mut entry = TrendCacheEntry {
            topic: "x".into(),
            first_observed: Some("2024-01-01".into()),
            last_observed: Some("2024-01-02".into()),
            duration_count: Some(2),
            point_count: Some(2),
            updated_at: None,
        };
        assert!(entry.is_confirmed());

        entry.last_observed = Some(String::new());
        assert!(!entry.is_confirmed());
    }
}
