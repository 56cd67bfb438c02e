// src/utils/http.rs

//! HTTP client utilities.

use std::error::Error as _;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{self, HeaderMap, HeaderValue};

use crate::error::{AppError, Result};
use crate::models::{ApiConfig, CrawlerConfig};
use crate::services::Fetcher;

/// Create a configured asynchronous HTTP client.
///
/// The API only answers requests that look like they come from its own web
/// front-end, so the browser headers and session cookie are baked in.
pub fn create_client(api: &ApiConfig, crawler: &CrawlerConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&api.user_agent)
        .default_headers(build_headers(api)?)
        .timeout(Duration::from_secs(crawler.timeout_secs))
        .pool_max_idle_per_host(crawler.max_per_host)
        .build()?;
    Ok(client)
}

/// Default headers for every API request.
pub fn build_headers(api: &ApiConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(header::ACCEPT_LANGUAGE, header_value(&api.accept_language)?);
    headers.insert(header::ORIGIN, header_value(&api.origin)?);
    headers.insert(
        header::REFERER,
        header_value(&format!("{}/", api.origin.trim_end_matches('/')))?,
    );

    if api.cookie.is_empty() {
        log::warn!("API cookie is empty; requests may fail.");
    } else {
        headers.insert(header::COOKIE, header_value(&api.cookie)?);
        if let Some(token) = extract_wbrsnew(&api.cookie) {
            headers.insert("wbrsnew", header_value(&token)?);
        }
    }
    Ok(headers)
}

static RE_WBRSNEW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|;\s*)wbrsnew=([^;]+)").expect("wbrsnew pattern"));

/// Pull the `wbrsnew` token out of a cookie string.
pub fn extract_wbrsnew(cookie: &str) -> Option<String> {
    RE_WBRSNEW
        .captures(cookie)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| AppError::config(format!("invalid header value {value:?}: {e}")))
}

/// [`Fetcher`] backed by `reqwest`.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| classify_transport(url, e))
    }
}

/// Map a transport failure onto the crawler's error taxonomy.
fn classify_transport(url: &str, error: reqwest::Error) -> AppError {
    if error.is_timeout() {
        AppError::Timeout {
            url: url.to_string(),
        }
    } else if is_connection_refused(&error) {
        AppError::Refused {
            url: url.to_string(),
        }
    } else {
        AppError::Http(error)
    }
}

fn is_connection_refused(error: &reqwest::Error) -> bool {
    let mut source = error.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        source = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_wbrsnew() {
        assert_eq!(
            extract_wbrsnew("SUB=abc; wbrsnew=tok123; other=1"),
            Some("tok123".to_string())
        );
        assert_eq!(extract_wbrsnew("wbrsnew=first"), Some("first".to_string()));
        assert_eq!(extract_wbrsnew("xwbrsnew=nope"), None);
        assert_eq!(extract_wbrsnew(""), None);
    }

    #[test]
    fn test_build_headers_with_cookie() {
        let api = ApiConfig {
            cookie: "SUB=abc; wbrsnew=tok123".into(),
            ..ApiConfig::default()
        };
        let headers = build_headers(&api).unwrap();
        assert_eq!(headers[header::COOKIE], "SUB=abc; wbrsnew=tok123");
        assert_eq!(headers["wbrsnew"], "tok123");
        assert_eq!(headers[header::REFERER], "https://weibo.zhaoyizhe.com/");
    }

    #[test]
    fn test_build_headers_without_cookie() {
        let headers = build_headers(&ApiConfig::default()).unwrap();
        assert!(headers.get(header::COOKIE).is_none());
        assert!(headers.get("wbrsnew").is_none());
    }

    #[tokio::test]
    async fn test_refused_connection_is_classified() {
        // Bind then drop a listener so the port is known to be closed.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let fetcher = HttpFetcher::new(reqwest::Client::new());
        let url = format!("http://127.0.0.1:{port}/data/list");

        let err = fetcher
            .fetch(&url, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Refused { .. }), "got {err:?}");
    }
}
