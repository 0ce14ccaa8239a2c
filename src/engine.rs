// src/engine.rs
// =============================================================================
// The public entry point: crawl a site, audit what was found, report.
//
// start_crawl() returns immediately with a stream of events. The pipeline
// runs on its own task:
//   crawl (Crawler) -> scan (Scanner) -> summarize -> CrawlReport
// and the stream ends with exactly one Completed or Failed event.
//
// One crawl per engine at a time:
//
//   Idle ──start──> Running ──ok──> Completed ──start──> Running ...
//                      └──error──> Failed ──start──> Running ...
//
// Starting while Running is rejected with AlreadyRunning. If the task dies
// without reporting (panic, runtime shutdown) a drop guard moves the state
// to Failed so the engine doesn't stay stuck in Running.
// =============================================================================

use crate::audit::{AccessibilityAuditor, CrawlReport, Scanner};
use crate::config::{CrawlConfig, EngineSettings};
use crate::crawl::{CrawlFailure, CrawlOutcome, Crawler, MemoryProbe};
use crate::error::CrawlError;
use crate::progress::{CrawlEvent, EventStream, ProgressEmitter};
use crate::render::SessionFactory;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

pub struct CrawlEngine {
    settings: EngineSettings,
    factory: Arc<dyn SessionFactory>,
    auditor: Arc<dyn AccessibilityAuditor>,
    probe: Arc<dyn MemoryProbe>,
    state: Arc<Mutex<RunState>>,
}

impl CrawlEngine {
    pub fn new(
        settings: EngineSettings,
        factory: Arc<dyn SessionFactory>,
        auditor: Arc<dyn AccessibilityAuditor>,
        probe: Arc<dyn MemoryProbe>,
    ) -> Self {
        Self {
            settings,
            factory,
            auditor,
            probe,
            state: Arc::new(Mutex::new(RunState::Idle)),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> RunState {
        *lock(&self.state)
    }

    // Starts a crawl of `seed` on a background task. Must be called from
    // within a tokio runtime.
    pub fn start_crawl(&self, seed: &str, config: CrawlConfig) -> Result<EventStream, CrawlError> {
        // Bad patterns are a caller mistake, reject them before changing state
        config.validate()?;

        {
            let mut state = lock(&self.state);
            if *state == RunState::Running {
                return Err(CrawlError::AlreadyRunning);
            }
            *state = RunState::Running;
        }

        let (emitter, events) = ProgressEmitter::channel();
        let run = Run {
            seed: seed.to_string(),
            config,
            crawler: Crawler::new(
                self.settings.clone(),
                Arc::clone(&self.factory),
                Arc::clone(&self.probe),
            ),
            scanner: Scanner::new(
                &self.settings,
                Arc::clone(&self.factory),
                Arc::clone(&self.auditor),
                Arc::clone(&self.probe),
            ),
            guard: RunGuard {
                state: Arc::clone(&self.state),
                finished: false,
            },
        };

        let span = tracing::info_span!("crawl", seed);
        tokio::spawn(run.execute(emitter).instrument(span));
        Ok(events)
    }
}

/// Everything one background run needs, moved into its task
struct Run {
    seed: String,
    config: CrawlConfig,
    crawler: Crawler,
    scanner: Scanner,
    guard: RunGuard,
}

impl Run {
    async fn execute(mut self, emitter: ProgressEmitter) {
        let outcomes = match self.crawler.run(&self.seed, &self.config, &emitter).await {
            Ok(outcomes) => outcomes,
            Err(CrawlFailure { error, partial }) => {
                return self.fail(&emitter, error, partial);
            }
        };

        let scan = match self
            .scanner
            .scan(&outcomes, self.config.wcag_level, &emitter)
            .await
        {
            Ok(scan) => scan,
            Err(e) => return self.fail(&emitter, e, outcomes),
        };

        let report = CrawlReport::build(&self.seed, self.config.clone(), outcomes, scan);
        info!(
            pages = report.crawl_results.len(),
            violations = report.summary.total_violations,
            "crawl completed"
        );

        // State first, so a caller reacting to the event can start again
        self.guard.finish(RunState::Completed);
        emitter.emit(CrawlEvent::Completed {
            report: Box::new(report),
        });
    }

    fn fail(
        &mut self,
        emitter: &ProgressEmitter,
        error: CrawlError,
        partial: Vec<CrawlOutcome>,
    ) {
        error!(code = error.code(), pages = partial.len(), "crawl failed: {}", error);
        self.guard.finish(RunState::Failed);
        emitter.emit(CrawlEvent::Failed {
            code: error.code().to_string(),
            message: error.to_string(),
            partial_results: partial,
        });
    }
}

/// Leaves the engine in Failed if the run ends without finish()
struct RunGuard {
    state: Arc<Mutex<RunState>>,
    finished: bool,
}

impl RunGuard {
    fn finish(&mut self, outcome: RunState) {
        *lock(&self.state) = outcome;
        self.finished = true;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.finished {
            *lock(&self.state) = RunState::Failed;
        }
    }
}

// The state is a plain enum, so a poisoned lock still holds a usable value
fn lock(state: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
