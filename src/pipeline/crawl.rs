// src/pipeline/crawl.rs

//! List crawl with inline trend enrichment.
//!
//! One instance walks a date range chunk by chunk, paginates each chunk,
//! routes every row through the enricher and writes finished entries to
//! its output file. A timed-out or refused request stops the instance.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{Config, DateRange, ExitStatus, TrendSource};
use crate::pipeline::InstancePaths;
use crate::pipeline::frontier::{Completion, Frontier};
use crate::services::{
    Admission, Codec, Endpoints, Fetcher, ListPage, Paginator, Pending, RequestKind, TrendEnricher,
};
use crate::storage::{FailureLedger, ProgressStore, RecordSink, TrendCache};
use crate::utils::report::{self, RunStats};

/// Run one list instance over `range`.
///
/// Returns how the instance ended; I/O failures on its own files are
/// returned as errors.
pub async fn run_list_instance(
    config: &Config,
    fetcher: Arc<dyn Fetcher>,
    range: DateRange,
    paths: &InstancePaths,
) -> Result<ExitStatus> {
    report::header(&format!("Ranking list crawl {range}"));

    let mut run = ListRun::open(config, fetcher, paths).await?;
    run.seed(range).await?;
    let status = run.drive().await?;
    run.close(status).await?;

    Ok(status)
}

/// Open date chunks and what still blocks them from completing.
#[derive(Debug, Default)]
struct ChunkTracker {
    open: HashMap<DateRange, ChunkProgress>,
}

#[derive(Debug, Default, Clone, Copy)]
struct ChunkProgress {
    /// List pages queued or in flight
    pages: usize,
    /// Entries parked behind trend lookups
    parked: usize,
}

impl ChunkTracker {
    fn open(&mut self, chunk: DateRange) {
        self.open.entry(chunk).or_default().pages += 1;
    }

    fn page_done(&mut self, chunk: DateRange) {
        if let Some(progress) = self.open.get_mut(&chunk) {
            progress.pages = progress.pages.saturating_sub(1);
        }
    }

    fn park(&mut self, chunk: DateRange) {
        if let Some(progress) = self.open.get_mut(&chunk) {
            progress.parked += 1;
        }
    }

    fn unpark(&mut self, chunk: DateRange) {
        if let Some(progress) = self.open.get_mut(&chunk) {
            progress.parked = progress.parked.saturating_sub(1);
        }
    }

    /// Remove and return chunks with nothing left outstanding.
    fn take_finished(&mut self) -> Vec<DateRange> {
        let mut finished: Vec<DateRange> = self
            .open
            .iter()
            .filter(|(_, p)| p.pages == 0 && p.parked == 0)
            .map(|(chunk, _)| *chunk)
            .collect();
        finished.sort();
        for chunk in &finished {
            self.open.remove(chunk);
        }
        finished
    }
}

struct ListRun<'a> {
    config: &'a Config,
    codec: Codec,
    endpoints: Endpoints,
    paginator: Paginator,
    enricher: TrendEnricher,
    cache: TrendCache,
    ledger: FailureLedger,
    progress: ProgressStore,
    sink: RecordSink,
    frontier: Frontier,
    chunks: ChunkTracker,
    stats: RunStats,
}

impl<'a> ListRun<'a> {
    async fn open(config: &'a Config, fetcher: Arc<dyn Fetcher>, paths: &InstancePaths) -> Result<Self> {
        let codec = Codec::new(&config.api.aes_key)?;
        let endpoints = Endpoints::new(config);
        let mut progress = ProgressStore::open(&paths.state_dir).await?;
        progress.begin().await?;

        Ok(Self {
            config,
            paginator: Paginator::new(endpoints.clone()),
            enricher: TrendEnricher::new(config, endpoints.clone(), codec.clone()),
            cache: TrendCache::open(&paths.cache, config.enrich.source)?,
            ledger: FailureLedger::new(&paths.ledger),
            sink: RecordSink::open(&paths.output, config.paths.overwrite_output).await?,
            frontier: Frontier::new(fetcher, &config.crawler),
            chunks: ChunkTracker::default(),
            stats: RunStats::default(),
            progress,
            codec,
            endpoints,
        })
    }

    /// Queue ledger replays first, then page 1 of every unfinished chunk.
    async fn seed(&mut self, range: DateRange) -> Result<()> {
        for url in self.ledger.replay().await? {
            let request = match self.endpoints.classify(&url) {
                Ok(request) => request,
                Err(e) => {
                    log::warn!("Skipping unreadable ledger entry: {}", e);
                    continue;
                }
            };
            if let RequestKind::Lookup { topic, .. } = &request.kind {
                if self.cache.has_confirmed_result(topic)? || !self.enricher.claim(topic) {
                    continue;
                }
            }
            self.frontier.enqueue(request.replayed());
            self.stats.replayed += 1;
        }
        if self.stats.replayed > 0 {
            log::info!("Replaying {} failed requests", self.stats.replayed);
        }

        let mut resumed = 0;
        for chunk in range.chunks(self.config.crawler.date_step_days) {
            if self.progress.is_complete(&chunk) {
                resumed += 1;
                continue;
            }
            if self.frontier.enqueue(self.paginator.first_page(chunk, true)?) {
                self.chunks.open(chunk);
            }
        }
        if resumed > 0 {
            log::info!("Skipping {} chunks finished by an earlier run", resumed);
        }
        Ok(())
    }

    async fn drive(&mut self) -> Result<ExitStatus> {
        while let Some(completion) = self.frontier.next().await {
            if let Some(status) = self.handle(completion).await? {
                return Ok(status);
            }
            let finished = self.chunks.take_finished();
            if !finished.is_empty() {
                // Records must be on disk before their chunk is marked done.
                self.sink.flush().await?;
            }
            for chunk in finished {
                log::debug!("Chunk {} complete", chunk);
                self.progress.mark_complete(chunk).await?;
            }
        }

        if self.enricher.parked() > 0 {
            log::warn!("{} entries left without a lookup", self.enricher.parked());
        }
        Ok(ExitStatus::Completed)
    }

    /// Process one completion. Returns a status when the instance must stop.
    async fn handle(&mut self, completion: Completion) -> Result<Option<ExitStatus>> {
        let Completion { request, result } = completion;

        if let Err(e) = &result {
            if let Some(status) = e.exit_status() {
                self.stats.failures += 1;
                log::error!("{}; shutting down", e);
                self.ledger.record(&request.url).await?;
                let abandoned = self.frontier.abort();
                log::warn!(
                    "Abandoned {} requests and {} parked entries",
                    abandoned,
                    self.enricher.parked()
                );
                return Ok(Some(status));
            }
        }

        match request.kind {
            RequestKind::ListPage {
                range: chunk,
                page_no,
                tracked,
            } => {
                self.stats.list_pages += 1;
                let page = result.and_then(|body| ListPage::decode(&self.codec, &body));
                self.handle_page(chunk, page_no, tracked, &request.url, page)
                    .await?;
            }
            RequestKind::Lookup { topic, source } => {
                self.stats.lookups += 1;
                self.settle(&topic, source, result).await?;
            }
        }
        Ok(None)
    }

    /// Release every entry parked on `topic` with the lookup's outcome.
    async fn settle(
        &mut self,
        topic: &str,
        source: TrendSource,
        result: Result<String>,
    ) -> Result<()> {
        let released = self.enricher.complete(topic, source, result, &self.cache);
        for pending in released {
            if let Some(chunk) = pending.chunk {
                self.chunks.unpark(chunk);
            }
            self.write(pending).await?;
        }
        Ok(())
    }

    async fn handle_page(
        &mut self,
        chunk: DateRange,
        page_no: u32,
        tracked: bool,
        url: &str,
        page: Result<ListPage>,
    ) -> Result<()> {
        let tag = tracked.then_some(chunk);

        let page = match page {
            Ok(page) => page,
            Err(e @ (AppError::Decode(_) | AppError::Api { .. })) => {
                log::warn!("Dropping list page {} of {}: {}", page_no, chunk, e);
                self.close_page(tag);
                return Ok(());
            }
            Err(e) => {
                self.stats.failures += 1;
                log::warn!("List request failed, recorded for retry: {}", e);
                self.ledger.record(url).await?;
                self.close_page(tag);
                return Ok(());
            }
        };

        log::debug!(
            "Chunk {} page {}: {} rows of {}",
            chunk,
            page_no,
            page.rows.len(),
            page.total
        );

        for entry in page.entries() {
            match self.enricher.admit(entry, tag, &self.cache)? {
                Admission::Emit(pending) => {
                    if pending.entry.trend_first_time.is_some() {
                        self.stats.cache_hits += 1;
                    }
                    self.write(pending).await?;
                }
                Admission::Buffered => {
                    if let Some(chunk) = tag {
                        self.chunks.park(chunk);
                    }
                }
                Admission::Dispatch(lookup) => {
                    if let Some(chunk) = tag {
                        self.chunks.park(chunk);
                    }
                    let (lookup_url, kind) = (lookup.url.clone(), lookup.kind.clone());
                    if self.frontier.enqueue(lookup) {
                        continue;
                    }
                    if let RequestKind::Lookup { topic, source } = kind {
                        let refused = AppError::validation(format!("{lookup_url}: not scheduled"));
                        self.settle(&topic, source, Err(refused)).await?;
                    }
                }
            }
        }

        let queued = match self.paginator.next_page(chunk, page_no, tracked, &page)? {
            Some(next) => self.frontier.enqueue(next),
            None => false,
        };
        if !queued {
            self.close_page(tag);
        }
        Ok(())
    }

    fn close_page(&mut self, tag: Option<DateRange>) {
        if let Some(chunk) = tag {
            self.chunks.page_done(chunk);
        }
    }

    async fn write(&mut self, pending: Pending) -> Result<()> {
        self.sink.write(&pending.entry).await
    }

    async fn close(&mut self, status: ExitStatus) -> Result<()> {
        self.sink.flush().await?;
        self.progress.finish(status).await?;

        self.stats.records = self.sink.written();
        self.stats.duplicates = self.frontier.duplicates();
        let mut items = self.stats.items();
        items.push(("Cached topics", self.cache.count()?.to_string()));
        items.push(("Output", self.sink.path().display().to_string()));
        items.push(("Finish reason", status.to_string()));
        report::summary("List crawl", &items);
        Ok(())
    }
}
