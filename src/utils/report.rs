// src/utils/report.rs

//! Banner and summary formatting on top of the `log` facade.

/// Log a header
pub fn header(title: &str) {
    let border = "═".repeat(60);
    log::info!("{}", border);
    log::info!("  {}", title);
    log::info!("{}", border);
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    log::info!("[SUMMARY] {}", title);
    for (key, value) in items {
        log::info!("    {}: {}", key, value);
    }
}

/// Counters kept by a pipeline instance for its closing summary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub list_pages: usize,
    pub lookups: usize,
    pub cache_hits: usize,
    pub records: usize,
    pub failures: usize,
    pub replayed: usize,
    pub duplicates: usize,
}

impl RunStats {
    pub fn items(&self) -> Vec<(&'static str, String)> {
        vec![
            ("List pages", self.list_pages.to_string()),
            ("Trend lookups", self.lookups.to_string()),
            ("Cache hits", self.cache_hits.to_string()),
            ("Records written", self.records.to_string()),
            ("Failed requests", self.failures.to_string()),
            ("Replayed from ledger", self.replayed.to_string()),
            ("Filtered duplicates", self.duplicates.to_string()),
        ]
    }
}
