// src/crawl/orchestrator.rs
// =============================================================================
// The crawl loop.
//
// How it works:
// 1. Seed the frontier, open a rendering session, start the memory sampler
// 2. While the frontier isn't done:
//    a. let the session pool recycle if it needs to (between batches only)
//    b. take a batch (<= batch_size, <= page budget, <= pages until the
//       next periodic recycle)
//    c. fetch the whole batch in parallel through the executor
//    d. once *all* of them are back, record each outcome in the frontier
//       and report progress
// 3. Whatever happened: stop the sampler, close the session, clear the
//    frontier, emit a final completed/error progress event
//
// Per-page failures are outcomes, not errors. Only renderer problems
// (opening or recycling the session) end the crawl early, and even then
// the outcomes collected so far are handed back.
// =============================================================================

use super::{CrawlOutcome, Executor, Frontier, MemoryProbe, MemorySampler, SessionPool};
use crate::config::{CrawlConfig, EngineSettings};
use crate::error::CrawlError;
use crate::progress::{CrawlEvent, Phase, ProgressEmitter, ProgressStatus};
use crate::render::SessionFactory;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A crawl that ended early, with whatever was fetched before it stopped
#[derive(Debug)]
pub struct CrawlFailure {
    pub error: CrawlError,
    pub partial: Vec<CrawlOutcome>,
}

/// Drives the frontier + executor loop
pub struct Crawler {
    settings: EngineSettings,
    factory: Arc<dyn SessionFactory>,
    probe: Arc<dyn MemoryProbe>,
    executor: Executor,
}

impl Crawler {
    pub fn new(
        settings: EngineSettings,
        factory: Arc<dyn SessionFactory>,
        probe: Arc<dyn MemoryProbe>,
    ) -> Self {
        let executor = Executor::from_settings(&settings);
        Self {
            settings,
            factory,
            probe,
            executor,
        }
    }

    // Crawls from `seed` until the frontier is exhausted or the page budget
    // is spent. Outcomes come back in the order they were recorded.
    pub async fn run(
        &self,
        seed: &str,
        config: &CrawlConfig,
        emitter: &ProgressEmitter,
    ) -> Result<Vec<CrawlOutcome>, CrawlFailure> {
        let mut frontier = match Frontier::new(config) {
            Ok(frontier) => frontier,
            Err(e) => return Err(self.fail(emitter, e.into(), Vec::new(), 0, 0)),
        };
        if let Err(e) = frontier.initialize(seed) {
            return Err(self.fail(emitter, e, Vec::new(), 0, 0));
        }

        info!(
            seed,
            max_depth = config.max_depth,
            max_pages = config.max_pages,
            "starting crawl"
        );

        let opened = SessionPool::open(Arc::clone(&self.factory), self.settings.recycle_every).await;
        let mut pool = match opened {
            Ok(pool) => pool,
            Err(e) => return Err(self.fail(emitter, e, Vec::new(), 0, 1)),
        };

        let sampler = MemorySampler::spawn(
            Arc::clone(&self.probe),
            self.settings.memory_check_interval(),
            self.settings.memory_threshold,
            pool.pressure_flag(),
            emitter.clone(),
        );

        let mut outcomes = Vec::new();
        let result = self
            .drive(&mut frontier, &mut pool, emitter, &mut outcomes)
            .await;

        // Cleanup runs no matter how the loop ended
        sampler.stop();
        if let Err(e) = pool.shutdown().await {
            warn!("failed to close rendering session: {}", e);
        }
        let processed = frontier.visited_len();
        let discovered = frontier.discovered_len();
        frontier.clear();

        match result {
            Ok(()) => {
                info!(pages = processed, recycles = pool.recycles(), "crawl finished");
                emitter.progress(
                    Phase::Crawl,
                    "",
                    processed,
                    discovered,
                    ProgressStatus::Completed,
                );
                Ok(outcomes)
            }
            Err(e) => Err(self.fail(emitter, e, outcomes, processed, discovered)),
        }
    }

    async fn drive(
        &self,
        frontier: &mut Frontier,
        pool: &mut SessionPool,
        emitter: &ProgressEmitter,
        outcomes: &mut Vec<CrawlOutcome>,
    ) -> Result<(), CrawlError> {
        while !frontier.is_done() {
            if let Some(reason) = pool.maintain().await? {
                emitter.emit(CrawlEvent::Recycled {
                    reason,
                    pages_visited: frontier.visited_len(),
                });
            }

            // Never let a batch straddle the recycle boundary
            let size = self.settings.batch_size.min(pool.pages_until_recycle());
            let batch = frontier.take_batch(size);
            if batch.is_empty() {
                debug!(pending = frontier.pending_len(), "nothing dispatchable, stopping");
                break;
            }

            let session = pool.session()?;
            let results = join_all(
                batch
                    .iter()
                    .map(|url| self.executor.fetch(&session, url)),
            )
            .await;
            pool.record_pages(results.len());

            for outcome in results {
                let added = frontier.record_outcome(&outcome);
                debug!(
                    url = %outcome.url,
                    status = outcome.http_status,
                    new_links = added,
                    "recorded"
                );
                emitter.progress(
                    Phase::Crawl,
                    &outcome.url,
                    frontier.visited_len(),
                    frontier.discovered_len(),
                    ProgressStatus::Running,
                );
                outcomes.push(outcome);
            }
        }
        Ok(())
    }

    fn fail(
        &self,
        emitter: &ProgressEmitter,
        error: CrawlError,
        partial: Vec<CrawlOutcome>,
        processed: usize,
        discovered: usize,
    ) -> CrawlFailure {
        warn!(code = error.code(), pages = processed, "crawl failed: {}", error);
        emitter.progress(Phase::Crawl, "", processed, discovered, ProgressStatus::Error);
        CrawlFailure { error, partial }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::{depth_of, RecycleReason};
    use crate::progress::{EventStream, Progress};
    use crate::testing::{FakeProbe, FakeSite};
    use futures::StreamExt;
    use std::collections::HashSet;
    use std::time::Duration;

    fn crawler(site: &FakeSite, settings: EngineSettings) -> Crawler {
        Crawler::new(settings, Arc::new(site.clone()), Arc::new(FakeProbe::new(None)))
    }

    fn config(max_depth: usize, max_pages: usize) -> CrawlConfig {
        CrawlConfig {
            max_depth,
            max_pages,
            ..CrawlConfig::default()
        }
    }

    async fn drain(emitter: ProgressEmitter, events: EventStream) -> Vec<CrawlEvent> {
        drop(emitter);
        events.collect().await
    }

    fn last_progress(events: &[CrawlEvent]) -> Progress {
        events
            .iter()
            .rev()
            .find_map(|e| match e {
                CrawlEvent::Progress(p) => Some(p.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_page_budget_with_pending_left() {
        let links: Vec<String> = (1..=8).map(|i| format!("https://ex.com/p{}", i)).collect();
        let link_refs: Vec<&str> = links.iter().map(|s| s.as_str()).collect();
        let mut site = FakeSite::new().page("https://ex.com/", 200, &link_refs);
        for link in &links {
            site = site.page(link, 200, &[]);
        }

        let (emitter, events) = ProgressEmitter::channel();
        let outcomes = crawler(&site, EngineSettings::default())
            .run("https://ex.com/", &config(1, 5), &emitter)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 5);
        assert_eq!(site.navigations().len(), 5);

        let events = drain(emitter, events).await;
        let last = last_progress(&events);
        assert_eq!(last.status, ProgressStatus::Completed);
        assert_eq!(last.processed_count, 5);
        // 4 links were discovered but never fetched
        assert_eq!(last.total_discovered_count, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_page_is_visited_but_not_expanded() {
        let site = FakeSite::new()
            .page("https://ex.com/", 200, &["https://ex.com/missing"])
            .page("https://ex.com/missing", 404, &["https://ex.com/never"]);

        let outcomes = crawler(&site, EngineSettings::default())
            .run("https://ex.com/", &config(5, 50), &ProgressEmitter::disabled())
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[1].url, "https://ex.com/missing");
        assert_eq!(outcomes[1].http_status, 404);
        assert!(!site
            .navigations()
            .iter()
            .any(|(_, url)| url == "https://ex.com/never"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_visits_each_page_once_within_limits() {
        // Every page links to every other page, plus some deep and external links
        let urls: Vec<String> = (0..30)
            .map(|i| {
                if i == 0 {
                    "https://ex.com/".to_string()
                } else {
                    format!("https://ex.com/s{}/p{}", i % 3, i)
                }
            })
            .collect();
        let mut links: Vec<&str> = urls.iter().map(|s| s.as_str()).collect();
        links.push("https://other.com/x");
        links.push("https://ex.com/a/b/c/d");
        let mut site = FakeSite::new();
        for url in &urls {
            site = site.page(url, 200, &links);
        }

        let cfg = config(2, 20);
        let outcomes = crawler(&site, EngineSettings::default())
            .run("https://ex.com/", &cfg, &ProgressEmitter::disabled())
            .await
            .unwrap();

        let unique: HashSet<&str> = outcomes.iter().map(|o| o.url.as_str()).collect();
        assert_eq!(unique.len(), outcomes.len());
        assert!(outcomes.len() <= cfg.max_pages);
        assert_eq!(outcomes.len(), 20);
        for outcome in &outcomes {
            assert!(depth_of(&outcome.url, "https://ex.com") <= cfg.max_depth);
            assert!(outcome.url.starts_with("https://ex.com/"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recycles_once_between_page_50_and_51() {
        let links: Vec<String> = (1..=50).map(|i| format!("https://ex.com/p{}", i)).collect();
        let link_refs: Vec<&str> = links.iter().map(|s| s.as_str()).collect();
        let mut site = FakeSite::new().page("https://ex.com/", 200, &link_refs);
        for link in &links {
            site = site.page(link, 200, &[]);
        }

        let (emitter, events) = ProgressEmitter::channel();
        let outcomes = crawler(&site, EngineSettings::default())
            .run("https://ex.com/", &config(1, 100), &emitter)
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 51);

        let events = drain(emitter, events).await;
        let recycles: Vec<(RecycleReason, usize)> = events
            .iter()
            .filter_map(|e| match e {
                CrawlEvent::Recycled {
                    reason,
                    pages_visited,
                } => Some((*reason, *pages_visited)),
                _ => None,
            })
            .collect();
        assert_eq!(recycles, vec![(RecycleReason::Periodic, 50)]);

        let navigations = site.navigations();
        assert!(navigations[..50].iter().all(|(generation, _)| *generation == 1));
        assert_eq!(navigations[50].0, 2);
        assert_eq!(site.opens(), 2);
        assert_eq!(site.closes(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_pressure_forces_recycle() {
        let links: Vec<String> = (1..=9).map(|i| format!("https://ex.com/p{}", i)).collect();
        let link_refs: Vec<&str> = links.iter().map(|s| s.as_str()).collect();
        let mut site = FakeSite::new()
            .with_latency(Duration::from_secs(2))
            .page("https://ex.com/", 200, &link_refs);
        for link in &links {
            site = site.page(link, 200, &[]);
        }

        let settings = EngineSettings {
            memory_check_interval_secs: 1,
            ..EngineSettings::default()
        };
        let crawler = Crawler::new(
            settings,
            Arc::new(site.clone()),
            Arc::new(FakeProbe::new(Some(0.95))),
        );

        let (emitter, events) = ProgressEmitter::channel();
        let outcomes = crawler
            .run("https://ex.com/", &config(1, 100), &emitter)
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 10);

        let events = drain(emitter, events).await;
        assert!(events.iter().any(|e| matches!(
            e,
            CrawlEvent::Recycled {
                reason: RecycleReason::MemoryPressure,
                ..
            }
        )));
        assert!(events
            .iter()
            .any(|e| matches!(e, CrawlEvent::MemoryStatus(s) if s.ratio > 0.8)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_renderer_init_failure_is_fatal() {
        let site = FakeSite::new().fail_open_at(1);

        let (emitter, events) = ProgressEmitter::channel();
        let failure = crawler(&site, EngineSettings::default())
            .run("https://ex.com/", &config(1, 5), &emitter)
            .await
            .unwrap_err();

        assert!(matches!(failure.error, CrawlError::RendererInit(_)));
        assert!(failure.partial.is_empty());
        let events = drain(emitter, events).await;
        assert_eq!(last_progress(&events).status, ProgressStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recycle_failure_returns_partial_results() {
        let links: Vec<String> = (1..=5).map(|i| format!("https://ex.com/p{}", i)).collect();
        let link_refs: Vec<&str> = links.iter().map(|s| s.as_str()).collect();
        let mut site = FakeSite::new()
            .page("https://ex.com/", 200, &link_refs)
            .fail_open_at(2);
        for link in &links {
            site = site.page(link, 200, &[]);
        }

        let settings = EngineSettings {
            recycle_every: 2,
            ..EngineSettings::default()
        };
        let failure = crawler(&site, settings)
            .run("https://ex.com/", &config(1, 50), &ProgressEmitter::disabled())
            .await
            .unwrap_err();

        assert!(matches!(failure.error, CrawlError::Recycle(_)));
        // Seed + one more page went through before the recycle
        assert_eq!(failure.partial.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_pages_are_outcomes() {
        let site = FakeSite::new()
            .page("https://ex.com/", 200, &["https://ex.com/down"])
            .failing("https://ex.com/down", crate::testing::Failure::Transport);

        let outcomes = crawler(&site, EngineSettings::default())
            .run("https://ex.com/", &config(1, 5), &ProgressEmitter::disabled())
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[1].http_status, 0);
        assert_eq!(outcomes[1].attempts, 3);
        assert!(outcomes[1].error_message.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_seed_is_rejected_before_opening_session() {
        let site = FakeSite::new();
        let failure = crawler(&site, EngineSettings::default())
            .run("mailto:someone@ex.com", &config(1, 5), &ProgressEmitter::disabled())
            .await
            .unwrap_err();

        assert!(matches!(failure.error, CrawlError::InvalidSeed { .. }));
        assert_eq!(site.opens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_links_wait_for_whole_batch() {
        // /a and /b share a batch; /a's link is only fetched after both are recorded
        let site = FakeSite::new()
            .page(
                "https://ex.com/",
                200,
                &["https://ex.com/a", "https://ex.com/b"],
            )
            .page("https://ex.com/a", 200, &["https://ex.com/a/next"])
            .page("https://ex.com/b", 200, &[])
            .page("https://ex.com/a/next", 200, &[]);

        let outcomes = crawler(&site, EngineSettings::default())
            .run("https://ex.com/", &config(3, 10), &ProgressEmitter::disabled())
            .await
            .unwrap();

        let order: Vec<&str> = outcomes.iter().map(|o| o.url.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "https://ex.com/",
                "https://ex.com/a",
                "https://ex.com/b",
                "https://ex.com/a/next"
            ]
        );
    }
}
