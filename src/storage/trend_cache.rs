//! SQLite-backed trend cache.
//!
//! One row per topic, overwritten on every successful lookup. The connection
//! runs in autocommit mode, so each upsert is durable once it returns.

use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::Result;
use crate::models::{TrendCacheEntry, TrendSource};

/// Persistent topic → lifecycle mapping.
pub struct TrendCache {
    conn: Connection,
}

impl TrendCache {
    /// Open (creating if needed) the cache file for the given trend source.
    pub fn open(path: impl AsRef<Path>, source: TrendSource) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::init(conn, source)
    }

    /// Open a throwaway cache, mostly for tests.
    pub fn open_in_memory(source: TrendSource) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, source)
    }

    fn init(conn: Connection, source: TrendSource) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS trend_cache (
              topic TEXT PRIMARY KEY,
              first_date TEXT,
              last_date TEXT,
              duration_count INTEGER,
              points INTEGER,
              updated_at TEXT
            );
            ",
        )?;
        let cache = Self { conn };
        cache.check_source(source)?;
        Ok(cache)
    }

    /// Tag the file with the source that fills it; warn on a mismatch.
    ///
    /// Duration counts are minutes for one source and days for the other and
    /// are never converted, so mixing sources in one file is only flagged.
    fn check_source(&self, source: TrendSource) -> Result<()> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'trend_source'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            None => {
                self.conn.execute(
                    "INSERT INTO metadata (key, value) VALUES ('trend_source', ?1)",
                    params![source.endpoint()],
                )?;
            }
            Some(stored) if stored != source.endpoint() => {
                log::warn!(
                    "Trend cache was filled from {} but this run uses {}; \
                     duration units ({}) will be mixed",
                    stored,
                    source,
                    source.duration_unit()
                );
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Point lookup by topic.
    pub fn get(&self, topic: &str) -> Result<Option<TrendCacheEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT topic, first_date, last_date, duration_count, points, updated_at
                 FROM trend_cache WHERE topic = ?1",
                params![topic],
                |row| {
                    Ok(TrendCacheEntry {
                        topic: row.get(0)?,
                        first_observed: row.get(1)?,
                        last_observed: row.get(2)?,
                        duration_count: row.get::<_, Option<i64>>(3)?.and_then(to_count),
                        point_count: row.get::<_, Option<i64>>(4)?.and_then(to_count),
                        updated_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    /// Insert or overwrite the row for `topic`.
    ///
    /// `duration` and `points` must come from the same fetch.
    pub fn upsert(
        &self,
        topic: &str,
        first: &str,
        last: &str,
        duration: u64,
        points: u64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO trend_cache (topic, first_date, last_date, duration_count, points, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(topic) DO UPDATE SET
               first_date = excluded.first_date,
               last_date = excluded.last_date,
               duration_count = excluded.duration_count,
               points = excluded.points,
               updated_at = excluded.updated_at",
            params![
                topic,
                first,
                last,
                to_sql_int(duration),
                to_sql_int(points),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// True only when a previous lookup resolved both ends of the lifecycle.
    pub fn has_confirmed_result(&self, topic: &str) -> Result<bool> {
        Ok(self.get(topic)?.is_some_and(|entry| entry.is_confirmed()))
    }

    /// Number of cached topics.
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM trend_cache", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_count(value: i64) -> Option<u64> {
    u64::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_get_miss() {
        let cache = TrendCache::open_in_memory(TrendSource::SuperInfo).unwrap();
        assert!(cache.get("nothing").unwrap().is_none());
        assert!(!cache.has_confirmed_result("nothing").unwrap());
        assert_eq!(cache.count().unwrap(), 0);
    }

    #[test]
    fn test_upsert_then_get() {
        let cache = TrendCache::open_in_memory(TrendSource::SuperInfo).unwrap();
        cache
            .upsert("topic", "2024-01-01 10:00", "2024-01-03 09:00", 2, 2)
            .unwrap();

        let entry = cache.get("topic").unwrap().unwrap();
        assert_eq!(entry.topic, "topic");
        assert_eq!(entry.first_observed.as_deref(), Some("2024-01-01 10:00"));
        assert_eq!(entry.last_observed.as_deref(), Some("2024-01-03 09:00"));
        assert_eq!(entry.duration_count, Some(2));
        assert_eq!(entry.point_count, Some(2));
        assert!(entry.updated_at.is_some());
        assert!(cache.has_confirmed_result("topic").unwrap());
    }

    #[test]
    fn test_repeated_upsert_is_idempotent() {
        let cache = TrendCache::open_in_memory(TrendSource::SuperInfo).unwrap();
        cache.upsert("t", "a", "b", 5, 5).unwrap();
        let first = cache.get("t").unwrap().unwrap();
        cache.upsert("t", "a", "b", 5, 5).unwrap();
        cache.upsert("t", "a", "b", 5, 5).unwrap();
        let again = cache.get("t").unwrap().unwrap();

        assert_eq!(cache.count().unwrap(), 1);
        assert_eq!(again.summary(), first.summary());
        assert_eq!(again.point_count, first.point_count);
    }

    #[test]
    fn test_upsert_overwrites_instead_of_merging() {
        let cache = TrendCache::open_in_memory(TrendSource::LiftingDiagram).unwrap();
        cache.upsert("t", "2024-01-01", "2024-01-09", 9, 9).unwrap();
        cache.upsert("t", "2024-01-05", "2024-01-06", 2, 2).unwrap();

        let entry = cache.get("t").unwrap().unwrap();
        assert_eq!(entry.first_observed.as_deref(), Some("2024-01-05"));
        assert_eq!(entry.last_observed.as_deref(), Some("2024-01-06"));
        assert_eq!(entry.duration_count, Some(2));
        assert_eq!(cache.count().unwrap(), 1);
    }

    #[test]
    fn test_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/cache.sqlite");
        {
            let cache = TrendCache::open(&path, TrendSource::SuperInfo).unwrap();
            cache.upsert("kept", "x", "y", 1, 1).unwrap();
        }
        let cache = TrendCache::open(&path, TrendSource::SuperInfo).unwrap();
        assert!(cache.has_confirmed_result("kept").unwrap());
    }

    #[test]
    fn test_source_mismatch_is_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.sqlite");
        TrendCache::open(&path, TrendSource::SuperInfo).unwrap();
        assert!(TrendCache::open(&path, TrendSource::LiftingDiagram).is_ok());
    }
}
