// src/pipeline/partition.rs

//! Work splitting for parallel instances.

use std::path::Path;

use chrono::Days;

use crate::models::{DateRange, ShardAssignment, ShardConfig, ShardDescriptor};
use crate::utils::report;

/// Split `range` into at most `shards` contiguous, non-overlapping pieces.
///
/// Leftover days go to the first pieces. With more shards than days, one
/// piece per day is returned.
pub fn partition_dates(range: DateRange, shards: usize) -> Vec<DateRange> {
    let shards = shards.max(1) as u64;
    let total = u64::try_from(range.days()).unwrap_or(0);
    let base = total / shards;
    let remainder = total % shards;

    let mut pieces = Vec::new();
    let mut current = range.start;
    for i in 0..shards {
        let days = base + u64::from(i < remainder);
        if days == 0 {
            break;
        }
        let Some(end) = current.checked_add_days(Days::new(days - 1)) else {
            break;
        };
        pieces.push(DateRange::new(current, end));
        match end.succ_opt() {
            Some(next) => current = next,
            None => break,
        }
    }
    pieces
}

/// Deal keywords round-robin into `shards` lists. Some may be empty.
pub fn partition_keywords(keywords: &[String], shards: usize) -> Vec<Vec<String>> {
    let shards = shards.max(1);
    let mut lists = vec![Vec::new(); shards];
    for (i, keyword) in keywords.iter().enumerate() {
        lists[i % shards].push(keyword.clone());
    }
    lists
}

/// One list shard per date piece, each with its own files.
pub fn plan_list_shards(config: &ShardConfig, range: DateRange, shards: usize) -> Vec<ShardDescriptor> {
    partition_dates(range, shards)
        .into_iter()
        .enumerate()
        .map(|(i, piece)| {
            let index = i + 1;
            ShardDescriptor {
                index,
                assignment: ShardAssignment::Dates(piece),
                output: config.output_dir.join(format!("part{index}.jsonl")),
                cache: config.work_dir.join(format!("trend_cache_part{index}.sqlite")),
                ledger: config.output_dir.join(format!("failed_urls_part{index}.txt")),
                state_dir: config.work_dir.join(format!("jobdir_{index}")),
            }
        })
        .collect()
}

/// One trend shard per non-empty keyword list. Shard numbers keep their
/// round-robin position, so an empty list leaves a gap.
pub fn plan_trend_shards(
    config: &ShardConfig,
    keywords: &[String],
    shards: usize,
) -> Vec<ShardDescriptor> {
    partition_keywords(keywords, shards)
        .into_iter()
        .enumerate()
        .filter(|(_, words)| !words.is_empty())
        .map(|(i, words)| {
            let index = i + 1;
            ShardDescriptor {
                index,
                assignment: ShardAssignment::Keywords {
                    file: config.output_dir.join(format!("keywords_part{index}.txt")),
                    keywords: words,
                },
                output: config.output_dir.join(format!("trend_part{index}.jsonl")),
                cache: config.work_dir.join(format!("trend_cache_part{index}.sqlite")),
                ledger: config
                    .output_dir
                    .join(format!("failed_urls_trend_part{index}.txt")),
                state_dir: config.work_dir.join(format!("jobdir_trend_{index}")),
            }
        })
        .collect()
}

/// Log the shard plan.
pub fn log_plan(shards: &[ShardDescriptor]) {
    for shard in shards {
        let work = match &shard.assignment {
            ShardAssignment::Dates(range) => range.to_string(),
            ShardAssignment::Keywords { file, keywords } => {
                format!("{} keywords in {}", keywords.len(), file.display())
            }
        };
        report::summary(
            &format!("Shard {}", shard.index),
            &[
                ("Work", work),
                ("Output", display(&shard.output)),
                ("Cache", display(&shard.cache)),
                ("Ledger", display(&shard.ledger)),
                ("State", display(&shard.state_dir)),
            ],
        );
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn range(a: &str, b: &str) -> DateRange {
        DateRange::new(date(a), date(b))
    }

    fn assert_covers(range: DateRange, pieces: &[DateRange]) {
        assert_eq!(pieces.first().unwrap().start, range.start);
        assert_eq!(pieces.last().unwrap().end, range.end);
        for pair in pieces.windows(2) {
            assert_eq!(pair[0].end.succ_opt().unwrap(), pair[1].start);
        }
        let days: i64 = pieces.iter().map(DateRange::days).sum();
        assert_eq!(days, range.days());
    }

    #[test]
    fn test_dates_remainder_goes_first() {
        let whole = range("2024-01-01", "2024-01-10");
        let pieces = partition_dates(whole, 3);
        let sizes: Vec<i64> = pieces.iter().map(DateRange::days).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        assert_covers(whole, &pieces);
    }

    #[test]
    fn test_dates_default_span() {
        let whole = range("2019-10-25", "2025-12-31");
        let pieces = partition_dates(whole, 5);
        assert_eq!(pieces.len(), 5);
        assert_covers(whole, &pieces);
    }

    #[test]
    fn test_more_shards_than_days() {
        let whole = range("2024-01-01", "2024-01-03");
        let pieces = partition_dates(whole, 5);
        assert_eq!(pieces.len(), 3);
        assert!(pieces.iter().all(|p| p.days() == 1));
        assert_covers(whole, &pieces);
    }

    #[test]
    fn test_keywords_round_robin() {
        let words: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
        let lists = partition_keywords(&words, 2);
        assert_eq!(lists, vec![vec!["a", "c", "e"], vec!["b", "d"]]);
    }

    #[test]
    fn test_list_plan_paths() {
        let config = ShardConfig::default();
        let plan = plan_list_shards(&config, range("2024-01-01", "2024-01-10"), 2);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[1].index, 2);
        assert_eq!(plan[1].output, PathBuf::from("output/part2.jsonl"));
        assert_eq!(plan[1].cache, PathBuf::from("./trend_cache_part2.sqlite"));
        assert_eq!(plan[1].ledger, PathBuf::from("output/failed_urls_part2.txt"));
        assert_eq!(plan[1].state_dir, PathBuf::from("./jobdir_2"));
    }

    #[test]
    fn test_trend_plan_skips_empty_lists() {
        let config = ShardConfig::default();
        let words = vec!["only".to_string()];
        let plan = plan_trend_shards(&config, &words, 3);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].index, 1);
        assert_eq!(plan[0].output, PathBuf::from("output/trend_part1.jsonl"));
        assert_eq!(plan[0].state_dir, PathBuf::from("./jobdir_trend_1"));
        assert_eq!(
            plan[0].assignment,
            ShardAssignment::Keywords {
                file: PathBuf::from("output/keywords_part1.txt"),
                keywords: words,
            }
        );
    }
}
