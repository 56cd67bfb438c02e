//! In-memory transport and response fixtures for tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::Result;
use crate::services::api::Fetcher;
use crate::services::codec::Codec;

type Responder = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Answers every request through a closure and remembers what was asked.
pub(crate) struct ScriptedFetcher {
    responder: Responder,
    requests: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub(crate) fn new(responder: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn count_matching(&self, needle: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|url| url.contains(needle))
            .count()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<String> {
        self.requests.lock().unwrap().push(url.to_string());
        tokio::task::yield_now().await;
        (self.responder)(url)
    }
}

/// Encrypted list response.
pub(crate) fn list_body(codec: &Codec, total: u64, page_no: u32, rows: Vec<Value>) -> String {
    let payload = json!({
        "code": 1,
        "message": "ok",
        "data": {"data": {"total": total, "pageNo": page_no, "data": rows}}
    });
    codec.encrypt(&payload.to_string())
}

/// Encrypted `superInfo` response with one point per timestamp.
pub(crate) fn trend_body(codec: &Codec, stamps: &[&str]) -> String {
    let points: Vec<Value> = stamps.iter().map(|t| json!({"value": [t, 1]})).collect();
    let payload = json!({"code": 1, "message": "ok", "data": points});
    codec.encrypt(&payload.to_string())
}

/// Value of a query parameter in a request URL.
pub(crate) fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
