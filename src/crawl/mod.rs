// src/crawl/mod.rs
// =============================================================================
// This module handles website crawling.
//
// Pieces, leaves first:
// - filter:       is a URL in scope? (same origin, include/exclude patterns)
// - frontier:     visited set + FIFO queue, dedup, depth and page budget
// - executor:     concurrency cap + dispatch spacing + retry with backoff
// - lifecycle:    periodic / memory-pressure recycling of the render session
// - orchestrator: the batch loop that ties them together
//
// Features:
// - Breadth-first, batch-by-batch: links found in batch n are only known
//   once all of batch n has finished
// - Same-origin only
// - Never visits a page twice and never exceeds the page budget
// =============================================================================

mod executor;
mod filter;
mod frontier;
mod lifecycle;
mod orchestrator;

pub use executor::Executor;
pub use filter::PathPatterns;
pub use frontier::Frontier;
pub use lifecycle::{MemoryProbe, MemorySampler, ProcMemoryProbe, RecycleReason, SessionPool};
pub use orchestrator::{CrawlFailure, Crawler};
#[cfg(test)]
pub use frontier::depth_of;
#[cfg(test)]
pub use lifecycle::MemorySample;

use serde::{Deserialize, Serialize};

/// What happened when we tried to fetch one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlOutcome {
    pub url: String,
    /// HTTP status of the page; 0 when navigation itself failed
    pub http_status: u16,
    /// Absolute outbound links found on the page
    pub linked_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Navigation attempts made (1 + retries)
    pub attempts: u32,
}

impl CrawlOutcome {
    pub fn failed(url: &str, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            url: url.to_string(),
            http_status: 0,
            linked_urls: Vec::new(),
            error_message: Some(message.into()),
            attempts,
        }
    }

    /// Fetched with 200; the only pages that get expanded and audited
    pub fn is_ok(&self) -> bool {
        self.http_status == 200
    }

    /// Navigation failed or the server answered with an error status
    pub fn is_broken(&self) -> bool {
        self.http_status == 0 || self.http_status >= 400
    }
}
