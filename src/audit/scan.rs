// src/audit/scan.rs
// =============================================================================
// Runs the rule engine over the crawl results.
//
// How it works:
// 1. Keep only outcomes with status 200; everything else is skipped
// 2. Open a rendering session (only if there is something to scan) and
//    start sampling memory, same as the crawl stage
// 3. For each page, one at a time: re-render it, hand it to the rule engine
//    with the tag set for the configured WCAG level, add up what it found.
//    The session is recycled periodically or under memory pressure.
// 4. Stop sampling, close the session
//
// A page that fails to render or to audit is logged and recorded in
// `failures`; the remaining pages still get scanned. Only a renderer that
// can't be opened or recycled stops the stage.
// =============================================================================

use super::types::{AuditResults, ScanFailure, Violation};
use super::AccessibilityAuditor;
use crate::config::{EngineSettings, WcagLevel};
use crate::crawl::{CrawlOutcome, MemoryProbe, MemorySampler, SessionPool};
use crate::error::{CrawlError, RenderError, ScanError};
use crate::progress::{CrawlEvent, Phase, ProgressEmitter, ProgressStatus};
use crate::render::{NavigateOptions, RenderSession, SessionFactory};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Rule tags for a WCAG conformance level. Each level includes the ones below it.
pub fn tags_for(level: WcagLevel) -> &'static [&'static str] {
    match level {
        WcagLevel::A => &["wcag2a"],
        WcagLevel::AA => &["wcag2a", "wcag2aa"],
        WcagLevel::AAA => &["wcag2a", "wcag2aa", "wcag2aaa"],
    }
}

/// Everything the scan stage collected
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResults {
    /// Pages handed to the scan stage (status 200 outcomes)
    pub pages_submitted: usize,
    pub violations: Vec<Violation>,
    pub passes: usize,
    pub incomplete: usize,
    pub inapplicable: usize,
    pub failures: Vec<ScanFailure>,
}

pub struct Scanner {
    factory: Arc<dyn SessionFactory>,
    auditor: Arc<dyn AccessibilityAuditor>,
    probe: Arc<dyn MemoryProbe>,
    options: NavigateOptions,
    recycle_every: usize,
    memory_check_interval: Duration,
    memory_threshold: f64,
}

impl Scanner {
    pub fn new(
        settings: &EngineSettings,
        factory: Arc<dyn SessionFactory>,
        auditor: Arc<dyn AccessibilityAuditor>,
        probe: Arc<dyn MemoryProbe>,
    ) -> Self {
        Self {
            factory,
            auditor,
            probe,
            options: NavigateOptions {
                timeout: settings.navigation_timeout(),
            },
            recycle_every: settings.recycle_every,
            memory_check_interval: settings.memory_check_interval(),
            memory_threshold: settings.memory_threshold,
        }
    }

    pub async fn scan(
        &self,
        outcomes: &[CrawlOutcome],
        level: WcagLevel,
        emitter: &ProgressEmitter,
    ) -> Result<ScanResults, CrawlError> {
        let pages: Vec<&str> = outcomes
            .iter()
            .filter(|o| o.is_ok())
            .map(|o| o.url.as_str())
            .collect();

        let mut results = ScanResults {
            pages_submitted: pages.len(),
            ..ScanResults::default()
        };

        if pages.is_empty() {
            info!("no pages to scan");
            emitter.progress(Phase::Scan, "", 0, 0, ProgressStatus::Completed);
            return Ok(results);
        }

        let tags = tags_for(level);
        info!(pages = pages.len(), ?level, "starting accessibility scan");

        let opened = SessionPool::open(Arc::clone(&self.factory), self.recycle_every).await;
        let mut pool = match opened {
            Ok(pool) => pool,
            Err(e) => {
                emitter.progress(Phase::Scan, "", 0, pages.len(), ProgressStatus::Error);
                return Err(e);
            }
        };

        let sampler = MemorySampler::spawn(
            Arc::clone(&self.probe),
            self.memory_check_interval,
            self.memory_threshold,
            pool.pressure_flag(),
            emitter.clone(),
        );

        let result = self
            .scan_pages(&pages, tags, &mut pool, emitter, &mut results)
            .await;

        sampler.stop();
        if let Err(e) = pool.shutdown().await {
            warn!("failed to close rendering session: {}", e);
        }

        match result {
            Ok(()) => {
                info!(
                    violations = results.violations.len(),
                    failed = results.failures.len(),
                    "scan finished"
                );
                emitter.progress(
                    Phase::Scan,
                    "",
                    pages.len(),
                    pages.len(),
                    ProgressStatus::Completed,
                );
                Ok(results)
            }
            Err(e) => {
                emitter.progress(Phase::Scan, "", 0, pages.len(), ProgressStatus::Error);
                Err(e)
            }
        }
    }

    async fn scan_pages(
        &self,
        pages: &[&str],
        tags: &[&str],
        pool: &mut SessionPool,
        emitter: &ProgressEmitter,
        results: &mut ScanResults,
    ) -> Result<(), CrawlError> {
        for (done, url) in pages.iter().enumerate() {
            if let Some(reason) = pool.maintain().await? {
                emitter.emit(CrawlEvent::Recycled {
                    reason,
                    pages_visited: done,
                });
            }

            let session = pool.session()?;
            match self.scan_page(&session, url, tags).await {
                Ok(found) => {
                    debug!(url, violations = found.violations.len(), "scanned");
                    results.passes += found.passes;
                    results.incomplete += found.incomplete;
                    results.inapplicable += found.inapplicable;
                    results.violations.extend(found.violations);
                }
                Err(e) => {
                    warn!(url, "scan failed, skipping: {}", e);
                    results.failures.push(ScanFailure {
                        url: url.to_string(),
                        message: e.to_string(),
                    });
                }
            }
            pool.record_pages(1);

            emitter.progress(
                Phase::Scan,
                url,
                done + 1,
                pages.len(),
                ProgressStatus::Running,
            );
        }
        Ok(())
    }

    async fn scan_page(
        &self,
        session: &Arc<dyn RenderSession>,
        url: &str,
        tags: &[&str],
    ) -> Result<AuditResults, ScanError> {
        let page = timeout(self.options.timeout, session.navigate(url, &self.options))
            .await
            .map_err(|_| RenderError::Timeout(self.options.timeout))??;
        self.auditor.scan(&page, tags).await
    }
}
