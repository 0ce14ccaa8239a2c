// src/crawl/executor.rs
// =============================================================================
// Runs page fetches under two limits, with retries.
//
// Limits (both must be satisfied before a navigation starts):
// - concurrency: at most `max_concurrent` navigations in flight (Semaphore)
// - spacing: at least `min_interval` between two dispatches
//
// Retry policy:
// - up to `max_retries` retries after the first attempt
// - sleep base * 2^attempt between attempts (1s, 2s, ... by default)
// - InvalidUrl and Tls errors are final on the first attempt
// - the backoff sleep happens *outside* the concurrency slot
//
// A fetch never returns an error. When every attempt fails the result is a
// CrawlOutcome with http_status = 0 and error_message set. Failures are
// data from the orchestrator's point of view.
// =============================================================================

use super::CrawlOutcome;
use crate::config::EngineSettings;
use crate::error::RenderError;
use crate::render::{NavigateOptions, RenderSession, RenderedPage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{AcquireError, Mutex, Semaphore, SemaphorePermit};
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, warn};

/// Concurrency cap plus minimum spacing between admissions
#[derive(Debug)]
pub struct RateLimiter {
    permits: Semaphore,
    min_interval: Duration,
    // Earliest instant the next dispatch may start
    next_dispatch: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(max_concurrent: usize, min_interval: Duration) -> Self {
        Self {
            permits: Semaphore::new(max_concurrent),
            min_interval,
            next_dispatch: Mutex::new(None),
        }
    }

    // Waits for a concurrency slot, then for the spacing window.
    //
    // The spacing lock is held while sleeping, so queued callers are
    // admitted one at a time in lock order.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, AcquireError> {
        let permit = self.permits.acquire().await?;

        let mut next = self.next_dispatch.lock().await;
        if let Some(at) = *next {
            if at > Instant::now() {
                sleep_until(at).await;
            }
        }
        *next = Some(Instant::now() + self.min_interval);

        Ok(permit)
    }

    #[cfg(test)]
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }
}

/// How many times to retry and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (0-based): base * 2^attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Rate-limited, retrying page fetcher
#[derive(Debug)]
pub struct Executor {
    limiter: RateLimiter,
    retry: RetryPolicy,
    options: NavigateOptions,
}

impl Executor {
    pub fn new(limiter: RateLimiter, retry: RetryPolicy, options: NavigateOptions) -> Self {
        Self {
            limiter,
            retry,
            options,
        }
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(
            RateLimiter::new(settings.max_concurrent, settings.min_dispatch_interval()),
            RetryPolicy {
                max_retries: settings.max_retries,
                base_delay: settings.backoff_base(),
            },
            NavigateOptions {
                timeout: settings.navigation_timeout(),
            },
        )
    }

    #[cfg(test)]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    // Fetches one page, retrying transient failures.
    pub async fn fetch(&self, session: &Arc<dyn RenderSession>, url: &str) -> CrawlOutcome {
        let mut attempt = 0;

        loop {
            match self.attempt(session, url).await {
                Ok(page) => {
                    debug!(url, status = page.status, links = page.links.len(), "fetched");
                    return CrawlOutcome {
                        url: url.to_string(),
                        http_status: page.status,
                        linked_urls: page.links,
                        error_message: None,
                        attempts: attempt + 1,
                    };
                }
                Err(err) if err.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        url,
                        attempt = attempt + 1,
                        code = err.code(),
                        delay_ms = delay.as_millis() as u64,
                        "fetch failed, retrying: {}",
                        err
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(url, attempts = attempt + 1, code = err.code(), "giving up: {}", err);
                    return CrawlOutcome::failed(url, err.to_string(), attempt + 1);
                }
            }
        }
    }

    // One navigation: wait for a slot, navigate under the timeout, release.
    async fn attempt(
        &self,
        session: &Arc<dyn RenderSession>,
        url: &str,
    ) -> Result<RenderedPage, RenderError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| RenderError::Transport(format!("executor shut down: {}", e)))?;

        match timeout(self.options.timeout, session.navigate(url, &self.options)).await {
            Ok(result) => result,
            Err(_) => Err(RenderError::Timeout(self.options.timeout)),
        }
    }
}
