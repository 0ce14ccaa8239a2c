// src/testing.rs
// =============================================================================
// In-memory stand-ins for the external collaborators, used by unit tests.
//
// - FakeSite: a site graph that is also a SessionFactory. Records every
//   navigation (time, session generation), opens/closes and peak
//   concurrency so tests can assert on scheduling.
// - FakeAuditor: returns canned findings per URL, or fails on demand.
// - FakeProbe: memory samples chosen by the test.
// =============================================================================

use crate::audit::{
    AccessibilityAuditor, AffectedNode, AuditResults, Impact, TargetSelector, Violation,
};
use crate::crawl::{MemoryProbe, MemorySample};
use crate::error::{RenderError, ScanError};
use crate::render::{NavigateOptions, RenderSession, RenderedPage, SessionFactory};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Timeout,
    InvalidUrl,
    Tls,
    Transport,
    /// Never answers; only the executor's timeout ends it
    Hang,
}

impl Failure {
    fn to_error(self, url: &str) -> RenderError {
        match self {
            Failure::Timeout => RenderError::Timeout(Duration::from_secs(30)),
            Failure::InvalidUrl => RenderError::InvalidUrl(url.to_string()),
            Failure::Tls => RenderError::Tls("self-signed certificate".to_string()),
            Failure::Transport | Failure::Hang => {
                RenderError::Transport("connection reset".to_string())
            }
        }
    }
}

#[derive(Default)]
struct SiteState {
    pages: HashMap<String, (u16, Vec<String>)>,
    failures: HashMap<String, Failure>,
    fail_first: HashMap<String, usize>,
    latency: Duration,
    attempts: HashMap<String, Vec<Instant>>,
    // (session generation, url) per navigation, in start order
    navigations: Vec<(usize, String)>,
    in_flight: usize,
    max_in_flight: usize,
    opens: usize,
    closes: usize,
    fail_open_at: Option<usize>,
    fail_close: bool,
}

#[derive(Clone, Default)]
pub struct FakeSite {
    state: Arc<Mutex<SiteState>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, status: u16, links: &[&str]) -> Self {
        self.state.lock().unwrap().pages.insert(
            url.to_string(),
            (status, links.iter().map(|s| s.to_string()).collect()),
        );
        self
    }

    pub fn failing(self, url: &str, failure: Failure) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(url.to_string(), failure);
        self
    }

    /// Fail the first `times` navigations to `url` with a transport error
    pub fn fail_first(self, url: &str, times: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_first
            .insert(url.to_string(), times);
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.lock().unwrap().latency = latency;
        self
    }

    /// The n-th call to open() (1-based) fails
    pub fn fail_open_at(self, n: usize) -> Self {
        self.state.lock().unwrap().fail_open_at = Some(n);
        self
    }

    pub fn fail_close(self) -> Self {
        self.state.lock().unwrap().fail_close = true;
        self
    }

    pub fn attempt_times(&self, url: &str) -> Vec<Instant> {
        self.state
            .lock()
            .unwrap()
            .attempts
            .get(url)
            .cloned()
            .unwrap_or_default()
    }

    pub fn navigations(&self) -> Vec<(usize, String)> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn max_concurrent_navigations(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }

    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

#[async_trait]
impl SessionFactory for FakeSite {
    async fn open(&self) -> Result<Arc<dyn RenderSession>, RenderError> {
        let generation = {
            let mut state = self.state.lock().unwrap();
            state.opens += 1;
            if state.fail_open_at == Some(state.opens) {
                return Err(RenderError::Init("browser failed to launch".to_string()));
            }
            state.opens
        };
        Ok(Arc::new(FakeSession {
            site: self.clone(),
            generation,
            closed: AtomicBool::new(false),
        }))
    }
}

struct FakeSession {
    site: FakeSite,
    generation: usize,
    closed: AtomicBool,
}

#[async_trait]
impl RenderSession for FakeSession {
    async fn navigate(
        &self,
        url: &str,
        _options: &NavigateOptions,
    ) -> Result<RenderedPage, RenderError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RenderError::SessionClosed);
        }

        let (latency, failure, page) = {
            let mut state = self.site.state.lock().unwrap();
            state
                .attempts
                .entry(url.to_string())
                .or_default()
                .push(Instant::now());
            state.navigations.push((self.generation, url.to_string()));
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);

            let mut failure = state.failures.get(url).copied();
            if let Some(remaining) = state.fail_first.get_mut(url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    failure = Some(Failure::Transport);
                }
            }
            let page = state.pages.get(url).cloned();
            (state.latency, failure, page)
        };

        if matches!(failure, Some(Failure::Hang)) {
            std::future::pending::<()>().await;
        }
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        self.site.state.lock().unwrap().in_flight -= 1;

        if let Some(failure) = failure {
            return Err(failure.to_error(url));
        }

        let (status, links) = page.unwrap_or((404, Vec::new()));
        Ok(RenderedPage {
            url: url.to_string(),
            final_url: url.to_string(),
            status,
            links,
            html: format!("<html><body>{}</body></html>", url),
        })
    }

    async fn close(&self) -> Result<(), RenderError> {
        self.closed.store(true, Ordering::SeqCst);
        let mut state = self.site.state.lock().unwrap();
        state.closes += 1;
        if state.fail_close {
            return Err(RenderError::Transport("browser crashed on close".to_string()));
        }
        Ok(())
    }
}

/// Rule engine fake
#[derive(Clone, Default)]
pub struct FakeAuditor {
    findings: Arc<Mutex<HashMap<String, Vec<Violation>>>>,
    failing: Arc<Mutex<Vec<String>>>,
    seen_tags: Arc<Mutex<Vec<Vec<String>>>>,
    scanned: Arc<Mutex<Vec<String>>>,
}

impl FakeAuditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_violations(self, url: &str, violations: Vec<Violation>) -> Self {
        self.findings
            .lock()
            .unwrap()
            .insert(url.to_string(), violations);
        self
    }

    pub fn failing_on(self, url: &str) -> Self {
        self.failing.lock().unwrap().push(url.to_string());
        self
    }

    pub fn seen_tags(&self) -> Vec<Vec<String>> {
        self.seen_tags.lock().unwrap().clone()
    }

    pub fn scanned(&self) -> Vec<String> {
        self.scanned.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccessibilityAuditor for FakeAuditor {
    async fn scan(&self, page: &RenderedPage, tags: &[&str]) -> Result<AuditResults, ScanError> {
        self.seen_tags
            .lock()
            .unwrap()
            .push(tags.iter().map(|t| t.to_string()).collect());
        self.scanned.lock().unwrap().push(page.url.clone());

        if self.failing.lock().unwrap().contains(&page.url) {
            return Err(ScanError::Engine("axe crashed".to_string()));
        }

        let violations = self
            .findings
            .lock()
            .unwrap()
            .get(&page.url)
            .cloned()
            .unwrap_or_default();

        Ok(AuditResults {
            violations,
            passes: 10,
            incomplete: 1,
            inapplicable: 5,
        })
    }
}

pub fn violation(id: &str, impact: Impact) -> Violation {
    Violation {
        id: id.to_string(),
        impact,
        description: format!("{} description", id),
        help: format!("{} help", id),
        help_url: format!("https://dequeuniversity.com/rules/axe/4.8/{}", id),
        nodes: vec![AffectedNode {
            html: "<img src=\"logo.png\">".to_string(),
            target: vec![TargetSelector::Css("img".to_string())],
            failure_summary: "Fix any of the following".to_string(),
        }],
    }
}

/// Memory probe fake; the ratio can be changed while a crawl runs
#[derive(Clone)]
pub struct FakeProbe {
    ratio: Arc<Mutex<Option<f64>>>,
}

impl FakeProbe {
    pub fn new(ratio: Option<f64>) -> Self {
        Self {
            ratio: Arc::new(Mutex::new(ratio)),
        }
    }

    pub fn set(&self, ratio: Option<f64>) {
        *self.ratio.lock().unwrap() = ratio;
    }
}

impl MemoryProbe for FakeProbe {
    fn sample(&self) -> Option<MemorySample> {
        let ratio = (*self.ratio.lock().unwrap())?;
        let total = 1024 * 1024 * 1024_u64;
        Some(MemorySample {
            used_bytes: (total as f64 * ratio) as u64,
            total_bytes: total,
            process_rss_bytes: Some(100 * 1024 * 1024),
        })
    }
}
