// src/audit/mod.rs
// =============================================================================
// Accessibility auditing of crawled pages.
//
// Submodules:
// - types:   findings as the rule engine reports them (axe-compatible shape)
// - scan:    runs the rule engine over every successfully crawled page
// - summary: folds all findings into counts and a top-5 list
// - report:  the final CrawlReport
// - remote:  an AccessibilityAuditor that talks to a rule engine over HTTP
//
// We never evaluate accessibility rules ourselves. That is the rule
// engine's job; this module only drives it and aggregates what it says.
// =============================================================================

mod remote;
mod report;
mod scan;
mod summary;
mod types;

pub use remote::RemoteAuditor;
pub use report::CrawlReport;
pub use scan::Scanner;
pub use types::AuditResults;
#[cfg(test)]
pub use types::{AffectedNode, Impact, TargetSelector, Violation};

use crate::error::ScanError;
use crate::render::RenderedPage;
use async_trait::async_trait;

/// The external rule engine
#[async_trait]
pub trait AccessibilityAuditor: Send + Sync {
    // Evaluates a rendered page against the rules carrying any of `tags`
    async fn scan(&self, page: &RenderedPage, tags: &[&str]) -> Result<AuditResults, ScanError>;
}
