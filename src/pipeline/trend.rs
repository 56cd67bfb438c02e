// src/pipeline/trend.rs

//! Trend-only resolution over a keyword list.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{Config, ExitStatus, TrendRecord};
use crate::pipeline::InstancePaths;
use crate::pipeline::frontier::{Completion, Frontier};
use crate::services::enricher::{persist, resolve};
use crate::services::{Codec, Endpoints, Fetcher, RequestKind};
use crate::storage::{FailureLedger, ProgressStore, RecordSink, TrendCache};
use crate::utils::report::{self, RunStats};

/// Resolve lifecycle data for every keyword and write one record each.
///
/// Keywords already confirmed in the cache are skipped when
/// `enrich.skip_resolved` is set. Failed lookups produce no record, so a
/// later run picks them up again.
pub async fn run_trend_instance(
    config: &Config,
    fetcher: Arc<dyn Fetcher>,
    keywords: &[String],
    paths: &InstancePaths,
) -> Result<ExitStatus> {
    report::header(&format!("Trend lookup for {} keywords", keywords.len()));

    let source = config.enrich.source;
    let codec = Codec::new(&config.api.aes_key)?;
    let endpoints = Endpoints::new(config);
    let cache = TrendCache::open(&paths.cache, source)?;
    let ledger = FailureLedger::new(&paths.ledger);
    let mut progress = ProgressStore::open(&paths.state_dir).await?;
    progress.begin().await?;
    let mut sink = RecordSink::open(&paths.output, config.paths.overwrite_output).await?;
    let mut frontier = Frontier::new(fetcher, &config.crawler);
    let mut stats = RunStats::default();
    let mut scheduled: HashSet<String> = HashSet::new();
    let mut skipped = 0usize;

    for url in ledger.replay().await? {
        match endpoints.classify(&url) {
            Ok(request) => match &request.kind {
                RequestKind::Lookup { topic, .. } => {
                    if scheduled.insert(topic.clone()) {
                        frontier.enqueue(request.replayed());
                        stats.replayed += 1;
                    }
                }
                RequestKind::ListPage { .. } => {
                    log::debug!("Ignoring list URL in trend ledger: {}", url);
                }
            },
            Err(e) => log::warn!("Skipping unreadable ledger entry: {}", e),
        }
    }

    for keyword in keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
        if config.enrich.skip_resolved && cache.has_confirmed_result(keyword)? {
            skipped += 1;
            continue;
        }
        if scheduled.insert(keyword.to_string()) {
            frontier.enqueue(endpoints.lookup(keyword, source)?);
        }
    }
    log::info!(
        "{} lookups queued, {} keywords already resolved",
        scheduled.len(),
        skipped
    );

    let mut status = ExitStatus::Completed;
    while let Some(Completion { request, result }) = frontier.next().await {
        let RequestKind::Lookup {
            topic,
            source: answered,
        } = request.kind
        else {
            continue;
        };
        stats.lookups += 1;

        match result.and_then(|body| resolve(&codec, answered, &body)) {
            Ok(summary) => {
                if answered != source {
                    log::debug!("Not caching {} answer for {}", answered, topic);
                } else if let Err(e) = persist(&cache, &topic, &summary) {
                    log::error!("Failed to cache trend for {}: {}", topic, e);
                }
                sink.write(&TrendRecord::new(topic, &summary)).await?;
            }
            Err(e) => {
                stats.failures += 1;
                if let Some(fatal) = e.exit_status() {
                    log::error!("{}; shutting down", e);
                    ledger.record(&request.url).await?;
                    let abandoned = frontier.abort();
                    log::warn!("Abandoned {} lookups", abandoned);
                    status = fatal;
                    break;
                }
                log::warn!("Trend lookup failed for {}: {}", topic, e);
            }
        }
    }

    sink.flush().await?;
    progress.finish(status).await?;

    stats.records = sink.written();
    stats.duplicates = frontier.duplicates();
    let mut items = stats.items();
    items.push(("Skipped (cached)", skipped.to_string()));
    items.push(("Cached topics", cache.count()?.to_string()));
    items.push(("Output", sink.path().display().to_string()));
    items.push(("Finish reason", status.to_string()));
    report::summary("Trend lookup", &items);

    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{TrendSource, TrendSummary};
    use crate::services::fake::{ScriptedFetcher, query_param, trend_body};
    use crate::storage::read_finish_reason;
    use tempfile::TempDir;

    fn config() -> Config {
        let mut config = Config::default();
        config.crawler.request_delay_ms = 0;
        config
    }

    fn paths(tmp: &TempDir) -> InstancePaths {
        InstancePaths {
            output: tmp.path().join("output/trend.jsonl"),
            cache: tmp.path().join("cache.sqlite"),
            ledger: tmp.path().join("output/failed_trend.txt"),
            state_dir: tmp.path().join("jobdir_trend"),
        }
    }

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn read_records(paths: &InstancePaths) -> Vec<TrendRecord> {
        std::fs::read_to_string(&paths.output)
            .unwrap_or_default()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_skips_resolved_and_blank_keywords() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(&tmp);
        {
            let cache = TrendCache::open(&paths.cache, TrendSource::SuperInfo).unwrap();
            cache.upsert("done", "a", "b", 1, 1).unwrap();
        }

        let codec = Codec::new(&config().api.aes_key).unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new(move |_| {
            Ok(trend_body(&codec, &["2024-05-01 12:00", "2024-05-01 12:01"]))
        }));

        let status = run_trend_instance(
            &config(),
            fetcher.clone(),
            &keywords(&["done", "", "new", "new", "  "]),
            &paths,
        )
        .await
        .unwrap();

        assert_eq!(status, ExitStatus::Completed);
        assert_eq!(fetcher.requests().len(), 1);
        assert_eq!(
            read_records(&paths),
            vec![TrendRecord::new(
                "new",
                &TrendSummary {
                    first: Some("2024-05-01 12:00".into()),
                    last: Some("2024-05-01 12:01".into()),
                    duration: Some(2),
                }
            )]
        );
    }

    #[tokio::test]
    async fn test_refused_stops_and_records() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(&tmp);
        let mut config = config();
        config.crawler.max_concurrent = 1;

        let fetcher = Arc::new(ScriptedFetcher::new(|url| {
            Err(AppError::Refused {
                url: url.to_string(),
            })
        }));
        let status = run_trend_instance(&config, fetcher.clone(), &keywords(&["a", "b", "c"]), &paths)
            .await
            .unwrap();

        assert_eq!(status, ExitStatus::ConnectionRefused);
        assert_eq!(fetcher.requests().len(), 1);
        assert_eq!(
            read_finish_reason(&paths.state_dir).await.unwrap(),
            Some(ExitStatus::ConnectionRefused)
        );
        let ledger = std::fs::read_to_string(&paths.ledger).unwrap();
        assert_eq!(ledger.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_api_error_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(&tmp);
        let codec = Codec::new(&config().api.aes_key).unwrap();

        let fetcher = Arc::new(ScriptedFetcher::new(move |url| {
            if query_param(url, "keyword").as_deref() == Some("bad") {
                Ok(codec.encrypt(r#"{"code":-1,"message":"nope"}"#))
            } else {
                Ok(trend_body(&codec, &[]))
            }
        }));
        let status = run_trend_instance(&config(), fetcher, &keywords(&["bad", "empty"]), &paths)
            .await
            .unwrap();

        assert_eq!(status, ExitStatus::Completed);
        let records = read_records(&paths);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].keyword, "empty");
        assert_eq!(records[0].trend_duration_days, Some(0));
        assert_eq!(records[0].trend_first_time, None);
    }

    #[tokio::test]
    async fn test_replayed_lookup_resolves_with_its_own_endpoint() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(&tmp);
        let config = config();

        let foreign = Endpoints::new(&config)
            .lookup("daily", TrendSource::LiftingDiagram)
            .unwrap();
        std::fs::create_dir_all(paths.ledger.parent().unwrap()).unwrap();
        std::fs::write(&paths.ledger, format!("{}\n", foreign.url)).unwrap();

        let codec = Codec::new(&config.api.aes_key).unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new(move |_| {
            Ok(codec.encrypt(
                r#"{"code":1,"data":[{"date":"2024-06-02"},{"date":"2024-06-01"}]}"#,
            ))
        }));
        let status = run_trend_instance(&config, fetcher.clone(), &[], &paths)
            .await
            .unwrap();

        assert_eq!(status, ExitStatus::Completed);
        assert_eq!(fetcher.requests(), vec![foreign.url]);
        let records = read_records(&paths);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].trend_first_time.as_deref(), Some("2024-06-01"));
        assert_eq!(records[0].trend_last_time.as_deref(), Some("2024-06-02"));

        let cache = TrendCache::open(&paths.cache, TrendSource::SuperInfo).unwrap();
        assert!(cache.get("daily").unwrap().is_none());
    }
}
