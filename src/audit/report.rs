// src/audit/report.rs
// =============================================================================
// The final report of a crawl + scan run.
//
// Flat structure, serialized as camelCase JSON. It carries the config it was
// produced with so a report on disk can be read on its own.
// =============================================================================

use super::scan::ScanResults;
use super::summary::summarize;
use super::types::{ScanFailure, ScanSummary, Violation};
use crate::config::CrawlConfig;
use crate::crawl::CrawlOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlReport {
    pub seed_url: String,
    pub config: CrawlConfig,
    /// When the report was put together
    pub timestamp: DateTime<Utc>,
    pub crawl_results: Vec<CrawlOutcome>,
    pub violations: Vec<Violation>,
    pub passes: usize,
    pub incomplete: usize,
    pub inapplicable: usize,
    pub failed_scans: Vec<ScanFailure>,
    pub summary: ScanSummary,
}

impl CrawlReport {
    pub fn build(
        seed_url: &str,
        config: CrawlConfig,
        crawl_results: Vec<CrawlOutcome>,
        scan: ScanResults,
    ) -> Self {
        let summary = summarize(&scan.violations, scan.pages_submitted);
        Self {
            seed_url: seed_url.to_string(),
            config,
            timestamp: Utc::now(),
            crawl_results,
            violations: scan.violations,
            passes: scan.passes,
            incomplete: scan.incomplete,
            inapplicable: scan.inapplicable,
            failed_scans: scan.failures,
            summary,
        }
    }

    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    /// Pages that failed to load or answered with an error status
    pub fn broken_pages(&self) -> impl Iterator<Item = &CrawlOutcome> {
        self.crawl_results.iter().filter(|o| o.is_broken())
    }
}
