//! Ranking-list pagination.
//!
//! Each date chunk runs its own pagination: page 1 is issued up front and
//! every decoded page decides whether one more page follows.

use serde_json::Value;

use crate::error::Result;
use crate::models::{DateRange, RankedEntry};
use crate::services::api::{ApiRequest, Endpoints, Envelope};
use crate::services::codec::Codec;

/// One decoded page of the list endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub total: u64,
    /// Page number echoed by the server, when present
    pub page_no: Option<u32>,
    pub rows: Vec<Value>,
}

impl ListPage {
    /// Decrypt and unwrap a list response body.
    pub fn decode(codec: &Codec, body: &str) -> Result<Self> {
        let envelope: Envelope = codec.decode_json(body)?;
        let data = envelope.into_data("list")?;
        Ok(Self::from_data(&data))
    }

    /// Read `data.data.{total, pageNo, data}` out of an envelope payload.
    pub fn from_data(data: &Value) -> Self {
        let inner = data.get("data").unwrap_or(&Value::Null);
        let rows = match inner.get("data") {
            Some(Value::Array(rows)) => rows.clone(),
            _ => Vec::new(),
        };
        Self {
            total: inner.get("total").and_then(as_u64).unwrap_or(0),
            page_no: inner
                .get("pageNo")
                .and_then(as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0),
            rows,
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = RankedEntry> + '_ {
        self.rows.iter().map(RankedEntry::from_row)
    }
}

/// Drives page requests for the list endpoint.
#[derive(Debug, Clone)]
pub struct Paginator {
    endpoints: Endpoints,
}

impl Paginator {
    pub fn new(endpoints: Endpoints) -> Self {
        Self { endpoints }
    }

    pub fn first_page(&self, chunk: DateRange, tracked: bool) -> Result<ApiRequest> {
        self.endpoints.list_page(chunk, 1, tracked)
    }

    /// The follow-up request for a decoded page, or `None` when the chunk
    /// is exhausted.
    pub fn next_page(
        &self,
        chunk: DateRange,
        requested: u32,
        tracked: bool,
        page: &ListPage,
    ) -> Result<Option<ApiRequest>> {
        let current = page.page_no.unwrap_or(requested);
        if current < total_pages(page.total, self.endpoints.page_size()) {
            self.endpoints.list_page(chunk, current + 1, tracked).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// `ceil(total / page_size)`, zero when nothing was reported.
pub fn total_pages(total: u64, page_size: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let pages = total.div_ceil(u64::from(page_size.max(1))).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// The feed reports counts as numbers or numeric strings.
fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Config;
    use crate::services::RequestKind;
    use chrono::NaiveDate;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn paginator() -> Paginator {
        Paginator::new(Endpoints::new(&Config::default()))
    }

    fn page(total: u64, page_no: Option<u32>) -> ListPage {
        ListPage {
            total,
            page_no,
            rows: Vec::new(),
        }
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 100), 0);
        assert_eq!(total_pages(1, 100), 1);
        assert_eq!(total_pages(100, 100), 1);
        assert_eq!(total_pages(250, 100), 3);
    }

    #[test]
    fn test_walks_exactly_ceil_pages() {
        let paginator = paginator();
        let chunk = DateRange::new(date("2024-01-01"), date("2024-01-01"));

        let mut issued = vec![1];
        let mut requested = 1;
        while let Some(next) = paginator
            .next_page(chunk, requested, true, &page(250, Some(requested)))
            .unwrap()
        {
            match next.kind {
                RequestKind::ListPage { page_no, .. } => {
                    issued.push(page_no);
                    requested = page_no;
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(issued, vec![1, 2, 3]);
    }

    #[test]
    fn test_zero_total_stops() {
        let chunk = DateRange::new(date("2024-01-01"), date("2024-01-01"));
        assert!(paginator().next_page(chunk, 1, true, &page(0, None)).unwrap().is_none());
    }

    #[test]
    fn test_missing_page_no_falls_back_to_requested() {
        let chunk = DateRange::new(date("2024-01-01"), date("2024-01-01"));
        let next = paginator()
            .next_page(chunk, 2, false, &page(250, None))
            .unwrap()
            .unwrap();
        assert_eq!(
            next.kind,
            RequestKind::ListPage {
                range: chunk,
                page_no: 3,
                tracked: false
            }
        );
    }

    #[test]
    fn test_from_data_accepts_string_total() {
        let data = json!({"data": {"total": "42", "pageNo": 2, "data": [{"topic": "a"}]}});
        let page = ListPage::from_data(&data);
        assert_eq!(page.total, 42);
        assert_eq!(page.page_no, Some(2));
        assert_eq!(page.entries().next().unwrap().keyword.as_deref(), Some("a"));
    }

    #[test]
    fn test_from_data_tolerates_missing_fields() {
        let page = ListPage::from_data(&json!({}));
        assert_eq!(page, ListPage::default());
    }

    #[test]
    fn test_decode_rejects_error_code() {
        let codec = Codec::new(&Config::default().api.aes_key).unwrap();
        let body = codec.encrypt(r#"{"code":0,"message":"denied","data":null}"#);
        assert!(ListPage::decode(&codec, &body).is_err());

        let body = codec.encrypt(r#"{"code":1,"data":{"data":{"total":1,"data":[{"topic":"x"}]}}}"#);
        let page = ListPage::decode(&codec, &body).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.rows.len(), 1);
    }
}
