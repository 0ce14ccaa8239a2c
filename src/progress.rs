// src/progress.rs
// =============================================================================
// Progress events, delivered as a stream.
//
// The engine doesn't call back into the caller. It pushes events into an
// unbounded channel and the caller pulls them out as a Stream at its own
// pace. Sending never blocks and never fails the crawl: if nobody is
// listening any more, the event is dropped.
//
// Every stream ends with exactly one Completed or Failed event.
// =============================================================================

use crate::audit::CrawlReport;
use crate::crawl::{CrawlOutcome, RecycleReason};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Which stage of the pipeline is reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Crawl,
    Scan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProgressStatus {
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub phase: Phase,
    /// Empty on the final event of a phase
    pub current_url: String,
    pub processed_count: usize,
    pub total_discovered_count: usize,
    pub status: ProgressStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStatus {
    pub used_mb: u64,
    pub total_mb: u64,
    pub process_rss_mb: Option<u64>,
    pub ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CrawlEvent {
    Progress(Progress),
    MemoryStatus(MemoryStatus),
    Recycled {
        reason: RecycleReason,
        #[serde(rename = "pagesVisited")]
        pages_visited: usize,
    },
    Completed {
        report: Box<CrawlReport>,
    },
    Failed {
        code: String,
        message: String,
        #[serde(rename = "partialResults")]
        partial_results: Vec<CrawlOutcome>,
    },
}

impl CrawlEvent {
    #[cfg(test)]
    /// Completed and Failed end the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, CrawlEvent::Completed { .. } | CrawlEvent::Failed { .. })
    }
}

pub type EventStream = BoxStream<'static, CrawlEvent>;

/// Fire-and-forget sender side
#[derive(Debug, Clone)]
pub struct ProgressEmitter {
    tx: Option<mpsc::UnboundedSender<CrawlEvent>>,
}

impl ProgressEmitter {
    /// A connected emitter and the stream that receives its events.
    /// The stream ends once every clone of the emitter is dropped.
    pub fn channel() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed();
        (Self { tx: Some(tx) }, events)
    }

    #[cfg(test)]
    /// An emitter that drops everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: CrawlEvent) {
        if let Some(tx) = &self.tx {
            // A closed receiver only means nobody is watching
            let _ = tx.send(event);
        }
    }

    pub fn progress(
        &self,
        phase: Phase,
        current_url: &str,
        processed_count: usize,
        total_discovered_count: usize,
        status: ProgressStatus,
    ) {
        self.emit(CrawlEvent::Progress(Progress {
            phase,
            current_url: current_url.to_string(),
            processed_count,
            total_discovered_count,
            status,
        }));
    }
}
