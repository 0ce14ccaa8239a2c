// src/crawl/lifecycle.rs
// =============================================================================
// Keeps the rendering session from growing without bound.
//
// A long-lived browsing context accumulates memory (caches, detached DOM,
// pooled connections). SessionPool tears it down and opens a new one:
// - periodically: once `recycle_every` pages went through the session
// - on memory pressure: when the sampler saw used/total > threshold
//
// Recycling only happens in maintain(), which the orchestrator calls between
// batches. No fetch is in flight at that point, so nothing ever runs on a
// session that is being torn down.
//
// The memory sampler is a separate task. It never touches the session; it
// only raises a flag that maintain() picks up at the next batch boundary.
//
// A failed close or re-open is fatal for the crawl: without a working
// renderer there is nothing left to do.
// =============================================================================

use crate::error::CrawlError;
use crate::progress::{CrawlEvent, MemoryStatus, ProgressEmitter};
use crate::render::{RenderSession, SessionFactory};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Why a session was recycled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecycleReason {
    Periodic,
    MemoryPressure,
}

/// Owns the current rendering session and decides when to replace it
pub struct SessionPool {
    factory: Arc<dyn SessionFactory>,
    session: Option<Arc<dyn RenderSession>>,
    recycle_every: usize,
    pages_since_recycle: usize,
    recycles: usize,
    pressure: Arc<AtomicBool>,
}

impl SessionPool {
    pub async fn open(
        factory: Arc<dyn SessionFactory>,
        recycle_every: usize,
    ) -> Result<Self, CrawlError> {
        let session = factory
            .open()
            .await
            .map_err(|e| CrawlError::RendererInit(e.to_string()))?;

        Ok(Self {
            factory,
            session: Some(session),
            recycle_every: recycle_every.max(1),
            pages_since_recycle: 0,
            recycles: 0,
            pressure: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The live session; an error only after a failed recycle or shutdown
    pub fn session(&self) -> Result<Arc<dyn RenderSession>, CrawlError> {
        self.session
            .clone()
            .ok_or_else(|| CrawlError::Recycle("no rendering session is open".to_string()))
    }

    /// Flag the memory sampler raises
    pub fn pressure_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.pressure)
    }

    pub fn record_pages(&mut self, count: usize) {
        self.pages_since_recycle += count;
    }

    /// How many more pages fit before the next periodic recycle
    pub fn pages_until_recycle(&self) -> usize {
        self.recycle_every.saturating_sub(self.pages_since_recycle)
    }

    pub fn recycles(&self) -> usize {
        self.recycles
    }

    // Recycles if either trigger fired. Call only between batches.
    pub async fn maintain(&mut self) -> Result<Option<RecycleReason>, CrawlError> {
        let reason = if self.pressure.swap(false, Ordering::SeqCst) {
            RecycleReason::MemoryPressure
        } else if self.pages_since_recycle >= self.recycle_every {
            RecycleReason::Periodic
        } else {
            return Ok(None);
        };

        self.recycle(reason).await?;
        Ok(Some(reason))
    }

    pub async fn recycle(&mut self, reason: RecycleReason) -> Result<(), CrawlError> {
        info!(
            ?reason,
            pages = self.pages_since_recycle,
            "recycling rendering session"
        );

        if let Some(old) = self.session.take() {
            old.close()
                .await
                .map_err(|e| CrawlError::Recycle(format!("teardown failed: {}", e)))?;
        }

        let fresh = self
            .factory
            .open()
            .await
            .map_err(|e| CrawlError::Recycle(format!("re-open failed: {}", e)))?;

        self.session = Some(fresh);
        self.pages_since_recycle = 0;
        self.recycles += 1;
        Ok(())
    }

    /// Close the session for good
    pub async fn shutdown(&mut self) -> Result<(), CrawlError> {
        match self.session.take() {
            Some(session) => session
                .close()
                .await
                .map_err(|e| CrawlError::Recycle(format!("teardown failed: {}", e))),
            None => Ok(()),
        }
    }
}

/// One reading of system memory
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySample {
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub process_rss_bytes: Option<u64>,
}

impl MemorySample {
    pub fn ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            self.used_bytes as f64 / self.total_bytes as f64
        }
    }

    pub fn to_status(&self) -> MemoryStatus {
        const MB: u64 = 1024 * 1024;
        MemoryStatus {
            used_mb: self.used_bytes / MB,
            total_mb: self.total_bytes / MB,
            process_rss_mb: self.process_rss_bytes.map(|b| b / MB),
            ratio: self.ratio(),
        }
    }
}

/// Source of memory readings
pub trait MemoryProbe: Send + Sync {
    /// None when the platform can't tell us
    fn sample(&self) -> Option<MemorySample>;
}

/// Reads /proc/meminfo and /proc/self/status (Linux)
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcMemoryProbe;

impl MemoryProbe for ProcMemoryProbe {
    fn sample(&self) -> Option<MemorySample> {
        let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
        let total = kb_field(&meminfo, "MemTotal:")?;
        let available = kb_field(&meminfo, "MemAvailable:")?;

        let rss = std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| kb_field(&status, "VmRSS:"));

        Some(MemorySample {
            used_bytes: total.saturating_sub(available) * 1024,
            total_bytes: total * 1024,
            process_rss_bytes: rss.map(|kb| kb * 1024),
        })
    }
}

// "MemTotal:       16318480 kB" -> 16318480
fn kb_field(content: &str, key: &str) -> Option<u64> {
    content
        .lines()
        .find(|l| l.starts_with(key))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
}

/// Background task that samples memory and raises the pressure flag.
/// Aborted when dropped.
pub struct MemorySampler {
    handle: JoinHandle<()>,
}

impl MemorySampler {
    pub fn spawn(
        probe: Arc<dyn MemoryProbe>,
        every: Duration,
        threshold: f64,
        pressure: Arc<AtomicBool>,
        emitter: ProgressEmitter,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(sample) = probe.sample() else {
                    continue;
                };

                let ratio = sample.ratio();
                debug!(ratio, "memory sample");
                if ratio > threshold {
                    warn!(
                        ratio,
                        threshold, "high memory usage, session will be recycled"
                    );
                    pressure.store(true, Ordering::SeqCst);
                }
                emitter.emit(CrawlEvent::MemoryStatus(sample.to_status()));
            }
        });

        Self { handle }
    }

    pub fn stop(self) {
        // Drop does the work
    }
}

impl Drop for MemorySampler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
