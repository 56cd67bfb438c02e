// src/pipeline/frontier.rs

//! Per-instance request scheduling.
//!
//! Requests wait in a FIFO queue and are dispatched as concurrency allows.
//! Completions come back one at a time through [`Frontier::next`], so the
//! caller mutates its state from a single place.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::time::Instant;

use crate::error::Result;
use crate::models::CrawlerConfig;
use crate::services::{ApiRequest, Fetcher};

/// A finished request and its raw outcome.
#[derive(Debug)]
pub struct Completion {
    pub request: ApiRequest,
    pub result: Result<String>,
}

pub struct Frontier {
    fetcher: Arc<dyn Fetcher>,
    queue: VecDeque<ApiRequest>,
    seen: HashSet<String>,
    in_flight: FuturesUnordered<BoxFuture<'static, Completion>>,
    per_host: HashMap<String, usize>,
    max_concurrent: usize,
    max_per_host: usize,
    delay: Duration,
    last_dispatch: Option<Instant>,
    duplicates: usize,
}

impl Frontier {
    pub fn new(fetcher: Arc<dyn Fetcher>, crawler: &CrawlerConfig) -> Self {
        Self {
            fetcher,
            queue: VecDeque::new(),
            seen: HashSet::new(),
            in_flight: FuturesUnordered::new(),
            per_host: HashMap::new(),
            max_concurrent: crawler.max_concurrent.max(1),
            max_per_host: crawler.max_per_host.max(1),
            delay: Duration::from_millis(crawler.request_delay_ms),
            last_dispatch: None,
            duplicates: 0,
        }
    }

    /// Queue a request. Returns false if it was dropped as a duplicate.
    pub fn enqueue(&mut self, request: ApiRequest) -> bool {
        if !request.dont_filter && !self.seen.insert(request.url.clone()) {
            self.duplicates += 1;
            log::debug!("Filtered duplicate request {}", request.url);
            return false;
        }
        self.queue.push_back(request);
        true
    }

    /// Wait for the next completion, dispatching queued work as slots free up.
    ///
    /// Returns `None` once nothing is queued or in flight.
    pub async fn next(&mut self) -> Option<Completion> {
        loop {
            self.dispatch_ready();

            let wake_at = self.next_dispatch_at();
            if self.in_flight.is_empty() {
                match wake_at {
                    Some(at) => {
                        tokio::time::sleep_until(at).await;
                        continue;
                    }
                    None => return None,
                }
            }

            let done = match wake_at {
                Some(at) => tokio::select! {
                    done = self.in_flight.next() => done,
                    _ = tokio::time::sleep_until(at) => continue,
                },
                None => self.in_flight.next().await,
            };

            if let Some(completion) = done {
                self.release(&completion.request.url);
                return Some(completion);
            }
        }
    }

    /// Drop everything queued or in flight. Returns how many requests were
    /// abandoned.
    pub fn abort(&mut self) -> usize {
        let abandoned = self.queue.len() + self.in_flight.len();
        self.queue.clear();
        self.in_flight = FuturesUnordered::new();
        self.per_host.clear();
        abandoned
    }

    /// Requests dropped by the duplicate filter.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    fn dispatch_ready(&mut self) {
        while self.in_flight.len() < self.max_concurrent && self.delay_elapsed() {
            let Some(request) = self.take_dispatchable() else {
                break;
            };
            self.start(request);
        }
    }

    /// When the delay is the only thing holding back a dispatch, the instant
    /// it lifts.
    fn next_dispatch_at(&self) -> Option<Instant> {
        if self.in_flight.len() >= self.max_concurrent || !self.has_dispatchable() {
            return None;
        }
        self.last_dispatch.map(|at| at + self.delay)
    }

    fn delay_elapsed(&self) -> bool {
        self.last_dispatch
            .is_none_or(|at| at.elapsed() >= self.delay)
    }

    fn has_dispatchable(&self) -> bool {
        self.queue.iter().any(|r| self.host_has_room(&r.url))
    }

    fn take_dispatchable(&mut self) -> Option<ApiRequest> {
        let index = self.queue.iter().position(|r| self.host_has_room(&r.url))?;
        self.queue.remove(index)
    }

    fn host_has_room(&self, url: &str) -> bool {
        self.per_host.get(&host_of(url)).copied().unwrap_or(0) < self.max_per_host
    }

    fn start(&mut self, request: ApiRequest) {
        *self.per_host.entry(host_of(&request.url)).or_default() += 1;
        self.last_dispatch = Some(Instant::now());
        log::debug!("GET {}", request.url);

        let fetcher = Arc::clone(&self.fetcher);
        self.in_flight.push(
            async move {
                let result = fetcher.fetch(&request.url, request.timeout).await;
                Completion { request, result }
            }
            .boxed(),
        );
    }

    fn release(&mut self, url: &str) {
        let host = host_of(url);
        if let Some(count) = self.per_host.get_mut(&host) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.per_host.remove(&host);
            }
        }
    }
}

fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_default()
}
