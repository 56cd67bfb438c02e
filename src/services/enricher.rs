//! Trend enrichment with per-topic request coalescing.
//!
//! Entries whose topic is not cached are parked in a pending set keyed by
//! topic. Only the first entry for a topic triggers a lookup; later ones
//! wait on the same answer and are released together, in arrival order.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use crate::error::Result;
use crate::models::{Config, DateRange, RankedEntry, TrendSource, TrendSummary, value_to_string};
use crate::services::api::{ApiRequest, Endpoints, Envelope};
use crate::services::codec::Codec;
use crate::storage::TrendCache;

/// An entry waiting on its topic's lookup, tagged with the list chunk that
/// produced it (none for replayed pages).
#[derive(Debug, Clone, PartialEq)]
pub struct Pending {
    pub entry: RankedEntry,
    pub chunk: Option<DateRange>,
}

/// What to do with an admitted entry.
#[derive(Debug)]
pub enum Admission {
    /// Ready to write now
    Emit(Pending),
    /// Parked behind a lookup already in flight
    Buffered,
    /// Parked; this lookup must be dispatched
    Dispatch(ApiRequest),
}

pub struct TrendEnricher {
    enabled: bool,
    source: TrendSource,
    endpoints: Endpoints,
    codec: Codec,
    pending: HashMap<String, Vec<Pending>>,
}

impl TrendEnricher {
    pub fn new(config: &Config, endpoints: Endpoints, codec: Codec) -> Self {
        Self {
            enabled: config.enrich.enabled,
            source: config.enrich.source,
            endpoints,
            codec,
            pending: HashMap::new(),
        }
    }

    /// Route one freshly parsed entry.
    pub fn admit(
        &mut self,
        mut entry: RankedEntry,
        chunk: Option<DateRange>,
        cache: &TrendCache,
    ) -> Result<Admission> {
        if !self.enabled {
            return Ok(Admission::Emit(Pending { entry, chunk }));
        }
        let Some(topic) = entry.topic().map(str::to_owned) else {
            return Ok(Admission::Emit(Pending { entry, chunk }));
        };

        if let Some(cached) = cache.get(&topic)?.filter(|c| c.is_confirmed()) {
            entry.apply_trend(&cached.summary());
            return Ok(Admission::Emit(Pending { entry, chunk }));
        }

        match self.pending.entry(topic) {
            Entry::Occupied(mut waiting) => {
                waiting.get_mut().push(Pending { entry, chunk });
                Ok(Admission::Buffered)
            }
            Entry::Vacant(slot) => {
                // The pending set already limits a topic to one lookup. A
                // topic left unresolved earlier in the run must be asked again.
                let mut request = self.endpoints.lookup(slot.key(), self.source)?;
                request.dont_filter = true;
                slot.insert(vec![Pending { entry, chunk }]);
                Ok(Admission::Dispatch(request))
            }
        }
    }

    /// Claim the in-flight slot for a lookup that did not come from
    /// [`TrendEnricher::admit`], such as a replayed ledger URL.
    ///
    /// Returns false if a lookup for the topic is already outstanding.
    pub fn claim(&mut self, topic: &str) -> bool {
        match self.pending.entry(topic.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Vec::new());
                true
            }
        }
    }

    /// Resolve a finished lookup and release every entry waiting on it.
    ///
    /// `source` is the endpoint the lookup actually hit, which differs from
    /// the configured one for ledger URLs written under another config. Such
    /// answers fill the entries but are kept out of the cache.
    ///
    /// Any failure (transport, API code, undecodable body) releases the
    /// entries with null trend fields.
    pub fn complete(
        &mut self,
        topic: &str,
        source: TrendSource,
        outcome: Result<String>,
        cache: &TrendCache,
    ) -> Vec<Pending> {
        let summary = match outcome.and_then(|body| resolve(&self.codec, source, &body)) {
            Ok(summary) => {
                if source != self.source {
                    log::debug!("Not caching {} answer for {}", source, topic);
                } else if let Err(e) = persist(cache, topic, &summary) {
                    log::error!("Failed to cache trend for {}: {}", topic, e);
                }
                summary
            }
            Err(e) => {
                log::warn!("Trend lookup failed for {}: {}", topic, e);
                TrendSummary::default()
            }
        };

        let mut released = self.pending.remove(topic).unwrap_or_default();
        for pending in &mut released {
            pending.entry.apply_trend(&summary);
        }
        released
    }

    /// Topics with a lookup outstanding.
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    /// Entries still parked.
    pub fn parked(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }
}

/// Decode a lookup response into lifecycle values.
pub fn resolve(codec: &Codec, source: TrendSource, body: &str) -> Result<TrendSummary> {
    let envelope: Envelope = codec.decode_json(body)?;
    let data = envelope.into_data(source.endpoint())?;
    Ok(summarize(source, &data))
}

/// Store a summary when both ends are known. Returns whether it was stored.
pub fn persist(cache: &TrendCache, topic: &str, summary: &TrendSummary) -> Result<bool> {
    match (&summary.first, &summary.last) {
        (Some(first), Some(last)) => {
            let count = summary.duration.unwrap_or(0);
            cache.upsert(topic, first, last, count, count)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Reduce a list of data points to first/last/distinct-count.
///
/// Timestamps are compared as strings; both sources emit fixed-width,
/// zero-padded forms, so lexicographic order is chronological.
pub fn summarize(source: TrendSource, data: &Value) -> TrendSummary {
    let stamps: BTreeSet<String> = data
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|point| timestamp(source, point))
        .collect();

    TrendSummary {
        first: stamps.first().cloned(),
        last: stamps.last().cloned(),
        duration: Some(stamps.len() as u64),
    }
}

fn timestamp(source: TrendSource, point: &Value) -> Option<String> {
    let point = point.as_object()?;
    match source {
        TrendSource::SuperInfo => point
            .get("value")?
            .as_array()?
            .first()
            .and_then(value_to_string),
        TrendSource::LiftingDiagram => point
            .get("date")
            .and_then(value_to_string)
            .filter(|d| !d.is_empty()),
    }
}
