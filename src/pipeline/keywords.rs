// src/pipeline/keywords.rs

//! Keyword files: extraction from list output and plain reading/writing.

use std::collections::BTreeSet;
use std::path::Path;

use serde_json::Value;

use crate::error::Result;
use crate::storage::ensure_parent;

/// Collect the unique keywords of a list JSONL file, sorted, into `out`.
///
/// Blank or unparsable lines and rows without a keyword are skipped.
/// Returns the number of keywords written.
pub async fn extract_keywords(list: &Path, out: &Path) -> Result<usize> {
    let text = tokio::fs::read_to_string(list).await?;

    let mut unique = BTreeSet::new();
    let mut unreadable = 0usize;
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<Value>(line) {
            Ok(row) => {
                if let Some(keyword) = row
                    .get("keyword")
                    .and_then(Value::as_str)
                    .filter(|k| !k.is_empty())
                {
                    unique.insert(keyword.to_string());
                }
            }
            Err(_) => unreadable += 1,
        }
    }
    if unreadable > 0 {
        log::warn!("Skipped {} unreadable lines in {}", unreadable, list.display());
    }

    let keywords: Vec<String> = unique.into_iter().collect();
    write_keywords(out, &keywords).await?;
    log::info!("Wrote {} keywords to {}", keywords.len(), out.display());
    Ok(keywords.len())
}

/// Non-empty, trimmed lines of a keyword file.
pub async fn read_keywords(path: &Path) -> Result<Vec<String>> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// Write one keyword per line, replacing the file.
pub async fn write_keywords(path: &Path, keywords: &[String]) -> Result<()> {
    ensure_parent(path).await?;
    let mut text = String::new();
    for keyword in keywords {
        text.push_str(keyword);
        text.push('\n');
    }
    tokio::fs::write(path, text).await?;
    Ok(())
}
