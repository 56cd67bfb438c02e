//! Local persistence for a crawl instance.
//!
//! ## Files per instance
//!
//! ```text
//! {output}                  # JSON Lines records (append-only)
//! {cache}                   # SQLite trend cache
//! {failed_urls}             # failure ledger, one URL per line
//! {state_dir}/state.json    # completed chunks + finish reason
//! ```

pub mod ledger;
pub mod progress;
pub mod sink;
pub mod trend_cache;

use std::path::Path;

use crate::error::Result;

pub use ledger::FailureLedger;
pub use progress::{
    ProgressState, ProgressStore, STATE_FILE_NAME, read_finish_reason, reset_finish_reason,
};
pub use sink::RecordSink;
pub use trend_cache::TrendCache;

/// Ensure the parent directory of `path` exists.
pub(crate) async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}
