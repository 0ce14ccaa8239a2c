// src/crawl/frontier.rs
// =============================================================================
// The frontier: which pages we've seen and which are waiting.
//
// State:
// - pending:   FIFO queue of URLs waiting to be fetched (breadth-first)
// - in_flight: taken by take_batch() but not yet recorded
// - visited:   recorded, whatever the outcome
//
// Invariants:
// - a URL lives in at most one of pending / in_flight / visited
// - no URL is ever enqueued twice
// - visited + in_flight never exceeds max_pages; the budget is checked when
//   a batch is taken, not after the fetch
//
// Depth is a heuristic: the number of non-empty path segments of a URL
// minus those of the seed's origin (which has none). /docs/intro has depth
// 2 no matter how many clicks it took to find it.
// =============================================================================

use super::filter::{is_in_scope, normalize_url, origin_of, PathPatterns};
use super::CrawlOutcome;
use crate::config::CrawlConfig;
use crate::error::{ConfigError, CrawlError};
use std::collections::{HashSet, VecDeque};
use url::Url;

#[derive(Debug)]
pub struct Frontier {
    base_origin: String,
    pending: VecDeque<String>,
    // Mirror of `pending` for O(1) membership checks
    queued: HashSet<String>,
    in_flight: HashSet<String>,
    visited: HashSet<String>,
    patterns: PathPatterns,
    max_depth: usize,
    max_pages: usize,
}

impl Frontier {
    pub fn new(config: &CrawlConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            base_origin: String::new(),
            pending: VecDeque::new(),
            queued: HashSet::new(),
            in_flight: HashSet::new(),
            visited: HashSet::new(),
            patterns: PathPatterns::compile(&config.include_patterns, &config.exclude_patterns)?,
            max_depth: config.max_depth,
            max_pages: config.max_pages,
        })
    }

    /// Reset everything and seed the queue with a single URL
    pub fn initialize(&mut self, seed: &str) -> Result<(), CrawlError> {
        let invalid = |reason: &str| CrawlError::InvalidSeed {
            url: seed.to_string(),
            reason: reason.to_string(),
        };

        let parsed = Url::parse(seed).map_err(|e| invalid(&e.to_string()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(invalid("only http and https URLs can be crawled"));
        }
        let origin = origin_of(&parsed).ok_or_else(|| invalid("URL has no origin"))?;
        let seed = normalize_url(seed).ok_or_else(|| invalid("URL cannot be normalized"))?;

        self.clear();
        self.base_origin = origin;
        self.queued.insert(seed.clone());
        self.pending.push_back(seed);
        Ok(())
    }

    #[cfg(test)]
    pub fn base_origin(&self) -> &str {
        &self.base_origin
    }

    // Pops up to `max` URLs off the queue, also bounded by the remaining page
    // budget. The URLs move to in_flight; visited is untouched.
    pub fn take_batch(&mut self, max: usize) -> Vec<String> {
        let limit = max.min(self.remaining_budget());
        let mut batch = Vec::with_capacity(limit);

        while batch.len() < limit {
            let Some(url) = self.pending.pop_front() else {
                break;
            };
            self.queued.remove(&url);
            if self.visited.contains(&url) || self.in_flight.contains(&url) {
                continue;
            }
            self.in_flight.insert(url.clone());
            batch.push(url);
        }

        batch
    }

    // Marks the outcome's URL visited and, for a 200 page shallower than
    // max_depth, enqueues its in-scope links that we haven't seen yet.
    //
    // Returns how many new URLs were enqueued.
    pub fn record_outcome(&mut self, outcome: &CrawlOutcome) -> usize {
        self.in_flight.remove(&outcome.url);
        self.visited.insert(outcome.url.clone());

        if outcome.http_status != 200 || self.depth_of(&outcome.url) >= self.max_depth {
            return 0;
        }

        let mut added = 0;
        for link in &outcome.linked_urls {
            let Some(link) = normalize_url(link) else {
                continue;
            };
            if !is_in_scope(&link, &self.base_origin, &self.patterns)
                || self.depth_of(&link) > self.max_depth
                || self.is_known(&link)
            {
                continue;
            }
            self.queued.insert(link.clone());
            self.pending.push_back(link);
            added += 1;
        }
        added
    }

    pub fn depth_of(&self, url: &str) -> usize {
        depth_of(url, &self.base_origin)
    }

    /// Nothing left to fetch, or the page budget is used up
    pub fn is_done(&self) -> bool {
        (self.pending.is_empty() && self.in_flight.is_empty())
            || self.visited.len() >= self.max_pages
    }

    pub fn remaining_budget(&self) -> usize {
        self.max_pages
            .saturating_sub(self.visited.len() + self.in_flight.len())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn visited_len(&self) -> usize {
        self.visited.len()
    }

    /// Everything we know about: visited, in flight and waiting
    pub fn discovered_len(&self) -> usize {
        self.visited.len() + self.in_flight.len() + self.pending.len()
    }

    #[cfg(test)]
    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    fn is_known(&self, url: &str) -> bool {
        self.visited.contains(url) || self.queued.contains(url) || self.in_flight.contains(url)
    }

    /// Drop all crawl state
    pub fn clear(&mut self) {
        self.pending.clear();
        self.queued.clear();
        self.in_flight.clear();
        self.visited.clear();
    }
}

// Path-segment depth of `url` relative to `base_origin`.
// Unparseable URLs count as depth 0.
pub fn depth_of(url: &str, base_origin: &str) -> usize {
    segment_count(url).saturating_sub(segment_count(base_origin))
}

fn segment_count(url: &str) -> usize {
    Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments().map(|s| s.filter(|seg| !seg.is_empty()).count()))
        .unwrap_or(0)
}
