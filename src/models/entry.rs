//! Ranking feed records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::TrendSummary;

/// One observation of a topic on the ranking feed.
///
/// Field order is the output column order. Raw feed fields are passed through
/// as whatever JSON the API returned; the three `trend_*` fields start out
/// null and are filled by the enricher.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RankedEntry {
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub rank_peak: Value,
    #[serde(default)]
    pub hot_value: Value,
    #[serde(default)]
    pub last_exists_time: Value,
    #[serde(default)]
    pub durations: Value,
    #[serde(default)]
    pub host_name: Value,
    #[serde(default)]
    pub category: Value,
    #[serde(default)]
    pub location: Value,
    #[serde(default)]
    pub icon: Value,
    #[serde(default)]
    pub trend_first_time: Option<String>,
    #[serde(default)]
    pub trend_last_time: Option<String>,
    #[serde(default)]
    pub trend_duration_days: Option<u64>,
}

impl RankedEntry {
    /// Build an entry from one row of a list response page.
    ///
    /// The feed has renamed several columns over time, so a few fields are
    /// taken from the first present of several candidate keys.
    pub fn from_row(row: &Value) -> Self {
        Self {
            keyword: value_to_string(&first_present(row, &["topic", "title", "word", "name"])),
            rank_peak: field(row, "pm"),
            hot_value: first_present(row, &["hotNumber", "hotValue"]),
            last_exists_time: first_present(row, &["updateTime", "date", "createTime"]),
            durations: field(row, "durations"),
            host_name: field(row, "screenName"),
            category: field(row, "fenlei"),
            location: field(row, "location"),
            icon: field(row, "icon"),
            trend_first_time: None,
            trend_last_time: None,
            trend_duration_days: None,
        }
    }

    /// Topic this entry should be enriched under, if any.
    pub fn topic(&self) -> Option<&str> {
        self.keyword.as_deref().filter(|k| !k.is_empty())
    }

    /// Fill the enrichment fields.
    pub fn apply_trend(&mut self, summary: &TrendSummary) {
        self.trend_first_time = summary.first.clone();
        self.trend_last_time = summary.last.clone();
        self.trend_duration_days = summary.duration;
    }
}

/// Output of the trend-only pipeline: one line per keyword.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrendRecord {
    pub keyword: String,
    pub trend_first_time: Option<String>,
    pub trend_last_time: Option<String>,
    pub trend_duration_days: Option<u64>,
}

impl TrendRecord {
    pub fn new(keyword: impl Into<String>, summary: &TrendSummary) -> Self {
        Self {
            keyword: keyword.into(),
            trend_first_time: summary.first.clone(),
            trend_last_time: summary.last.clone(),
            trend_duration_days: summary.duration,
        }
    }
}

fn field(row: &Value, key: &str) -> Value {
    row.get(key).cloned().unwrap_or(Value::Null)
}

/// First candidate key holding a non-empty value.
fn first_present(row: &Value, keys: &[&str]) -> Value {
    keys.iter()
        .filter_map(|key| row.get(*key))
        .find(|v| is_present(v))
        .cloned()
        .unwrap_or(Value::Null)
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Render a scalar as text; structured values have no textual form here.
pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_row_maps_feed_columns() {
        let row = json!({
            "topic": "#topic#",
            "pm": 3,
            "hotNumber": 120000,
            "updateTime": "2024-01-01 12:00",
            "durations": 45,
            "screenName": "host",
            "fenlei": "society",
            "location": "Beijing",
            "icon": "hot"
        });

        let entry = RankedEntry::from_row(&row);
        assert_eq!(entry.keyword.as_deref(), Some("#topic#"));
        assert_eq!(entry.rank_peak, json!(3));
        assert_eq!(entry.hot_value, json!(120000));
        assert_eq!(entry.last_exists_time, json!("2024-01-01 12:00"));
        assert_eq!(entry.host_name, json!("host"));
        assert_eq!(entry.category, json!("society"));
        assert!(entry.trend_first_time.is_none());
    }

    #[test]
    fn test_from_row_falls_back_across_candidates() {
        let row = json!({
            "topic": "",
            "title": "fallback title",
            "hotNumber": 0,
            "hotValue": "987",
            "createTime": "2024-02-02"
        });

        let entry = RankedEntry::from_row(&row);
        assert_eq!(entry.keyword.as_deref(), Some("fallback title"));
        assert_eq!(entry.hot_value, json!("987"));
        assert_eq!(entry.last_exists_time, json!("2024-02-02"));
        assert_eq!(entry.rank_peak, Value::Null);
    }

    #[test]
    fn test_missing_keyword_has_no_topic() {
        let entry = RankedEntry::from_row(&json!({ "pm": 1 }));
        assert!(entry.keyword.is_none());
        assert!(entry.topic().is_none());
    }

    #[test]
    fn test_serializes_absent_enrichment_as_null() {
        let entry = RankedEntry::from_row(&json!({ "topic": "a" }));
        let line = serde_json::to_string(&entry).unwrap();
        assert!(line.starts_with(r#"{"keyword":"a","rank_peak":null"#));
        assert!(line.contains(r#""trend_first_time":null"#));
        assert!(line.ends_with(r#""trend_duration_days":null}"#));
    }

    #[test]
    fn test_apply_trend() {
        let mut entry = RankedEntry::from_row(&json!({ "topic": "a" }));
        entry.apply_trend(&TrendSummary {
            first: Some("2024-01-01".into()),
            last: Some("2024-01-05".into()),
            duration: Some(3),
        });
        assert_eq!(entry.trend_first_time.as_deref(), Some("2024-01-01"));
        assert_eq!(entry.trend_duration_days, Some(3));
    }
}
