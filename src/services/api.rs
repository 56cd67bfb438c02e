// src/services/api.rs

//! Endpoint URLs, response envelopes and the transport seam.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Config, DateRange, TrendSource};

/// Performs one GET and returns the raw (still encrypted) body.
///
/// Implementations must report a timed-out request as [`AppError::Timeout`]
/// and a refused connection as [`AppError::Refused`]; the pipeline treats
/// both as fatal.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String>;
}

/// What a request is for, and so where its response goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// One page of the ranking list for a date sub-range.
    ListPage {
        range: DateRange,
        page_no: u32,
        /// Set when the page belongs to a chunk tracked for resume progress
        tracked: bool,
    },
    /// Trend lookup for one topic.
    Lookup { topic: String, source: TrendSource },
}

/// A request waiting to be dispatched.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub url: String,
    pub kind: RequestKind,
    pub timeout: Duration,
    /// Bypass the per-instance duplicate filter
    pub dont_filter: bool,
}

impl ApiRequest {
    /// Mark as a deliberate retry that must not be filtered.
    pub fn replayed(mut self) -> Self {
        self.dont_filter = true;
        self
    }
}

/// Builds request URLs for the ranking API.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base_url: String,
    feed_type: u32,
    radio_type: u32,
    page_size: u32,
    list_timeout: Duration,
    trend_timeout: Duration,
}

impl Endpoints {
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            feed_type: config.api.feed_type,
            radio_type: config.api.radio_type,
            page_size: config.crawler.page_size,
            list_timeout: Duration::from_secs(config.crawler.timeout_secs),
            trend_timeout: Duration::from_secs(config.enrich.timeout_secs),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Request for one page of the ranking list.
    pub fn list_page(&self, range: DateRange, page_no: u32, tracked: bool) -> Result<ApiRequest> {
        let mut url = Url::parse(&format!("{}/data/list", self.base_url))?;
        url.query_pairs_mut()
            .append_pair("startDate", &range.start.format("%Y-%m-%d").to_string())
            .append_pair("endDate", &range.end.format("%Y-%m-%d").to_string())
            .append_pair("type", &self.feed_type.to_string())
            .append_pair("pageNo", &page_no.to_string())
            .append_pair("pageSize", &self.page_size.to_string())
            .append_pair("keyword", "")
            .append_pair("radioType", &self.radio_type.to_string());

        Ok(ApiRequest {
            url: url.into(),
            kind: RequestKind::ListPage {
                range,
                page_no,
                tracked,
            },
            timeout: self.list_timeout,
            dont_filter: false,
        })
    }

    /// Request for a topic's trend points.
    pub fn lookup(&self, topic: &str, source: TrendSource) -> Result<ApiRequest> {
        let mut url = Url::parse(&format!("{}/data/{}", self.base_url, source.endpoint()))?;
        url.query_pairs_mut().append_pair("keyword", topic);

        Ok(ApiRequest {
            url: url.into(),
            kind: RequestKind::Lookup {
                topic: topic.to_string(),
                source,
            },
            timeout: self.trend_timeout,
            dont_filter: false,
        })
    }

    /// Rebuild a request from a URL read back from the failure ledger.
    pub fn classify(&self, raw: &str) -> Result<ApiRequest> {
        let url = Url::parse(raw)?;
        let param = |name: &str| {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        };

        let kind = if url.path().ends_with("/data/list") {
            let date = |name: &str| -> Result<NaiveDate> {
                let value = param(name)
                    .ok_or_else(|| AppError::validation(format!("{raw}: missing {name}")))?;
                NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                    .map_err(|e| AppError::validation(format!("{raw}: bad {name}: {e}")))
            };
            let page_no = param("pageNo")
                .and_then(|p| p.parse().ok())
                .unwrap_or(1);
            RequestKind::ListPage {
                range: DateRange::new(date("startDate")?, date("endDate")?),
                page_no,
                tracked: false,
            }
        } else if let Some(source) = TrendSource::from_path(url.path()) {
            let topic = param("keyword")
                .filter(|k| !k.is_empty())
                .ok_or_else(|| AppError::validation(format!("{raw}: missing keyword")))?;
            RequestKind::Lookup { topic, source }
        } else {
            return Err(AppError::validation(format!("{raw}: unknown endpoint")));
        };

        let timeout = match kind {
            RequestKind::ListPage { .. } => self.list_timeout,
            RequestKind::Lookup { .. } => self.trend_timeout,
        };

        Ok(ApiRequest {
            url: raw.to_string(),
            kind,
            timeout,
            dont_filter: false,
        })
    }
}

/// Decoded response wrapper shared by every endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub code: Value,
    #[serde(default)]
    pub message: Value,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// `code == 1` signals success.
    pub fn is_success(&self) -> bool {
        self.code.as_i64() == Some(1)
    }

    /// Unwrap the payload, turning a non-success code into [`AppError::Api`].
    pub fn into_data(self, context: &str) -> Result<Value> {
        if self.is_success() {
            Ok(self.data)
        } else {
            let message = match &self.message {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Err(AppError::api(context, &self.code, message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn endpoints() -> Endpoints {
        Endpoints::new(&Config::default())
    }

    #[test]
    fn test_list_page_url() {
        let range = DateRange::new(date("2024-01-01"), date("2024-01-02"));
        let request = endpoints().list_page(range, 3, true).unwrap();
        assert_eq!(
            request.url,
            "https://hotengineapi.zhaoyizhe.com/hotEngineApi/data/list\
             ?startDate=2024-01-01&endDate=2024-01-02&type=1&pageNo=3&pageSize=100\
             &keyword=&radioType=1"
        );
        assert_eq!(request.timeout, Duration::from_secs(30));
        assert!(!request.dont_filter);
    }

    #[test]
    fn test_lookup_url_encodes_topic() {
        let request = endpoints()
            .lookup("#热搜 话题#", TrendSource::LiftingDiagram)
            .unwrap();
        assert!(request.url.contains("/data/liftingDiagram?keyword="));
        assert!(!request.url.contains('#'));
        assert!(!request.url.contains(' '));
        assert_eq!(request.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_classify_round_trips_list_and_lookup() {
        let endpoints = endpoints();
        let range = DateRange::new(date("2024-03-01"), date("2024-03-01"));

        let list = endpoints.list_page(range, 2, true).unwrap();
        let replay = endpoints.classify(&list.url).unwrap();
        assert_eq!(
            replay.kind,
            RequestKind::ListPage {
                range,
                page_no: 2,
                tracked: false
            }
        );
        assert_eq!(replay.url, list.url);

        let lookup = endpoints.lookup("#热搜 话题#", TrendSource::SuperInfo).unwrap();
        let replay = endpoints.classify(&lookup.url).unwrap();
        assert_eq!(
            replay.kind,
            RequestKind::Lookup {
                topic: "#热搜 话题#".into(),
                source: TrendSource::SuperInfo
            }
        );
    }

    #[test]
    fn test_classify_rejects_unknown_endpoint() {
        assert!(endpoints().classify("https://example.com/other").is_err());
        assert!(endpoints().classify("not a url").is_err());
    }

    #[test]
    fn test_envelope_success_and_error() {
        let ok: Envelope = serde_json::from_value(json!({"code": 1, "data": [1, 2]})).unwrap();
        assert_eq!(ok.into_data("test").unwrap(), json!([1, 2]));

        let err: Envelope =
            serde_json::from_value(json!({"code": 0, "message": "too many requests"})).unwrap();
        match err.into_data("test") {
            Err(AppError::Api { code, message, .. }) => {
                assert_eq!(code, "0");
                assert_eq!(message, "too many requests");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }
}
