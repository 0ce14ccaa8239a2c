// src/audit/summary.rs
// =============================================================================
// Reduces the collected violations into summary statistics.
//
// - violations by impact: how many findings of each severity
// - top violations: the 5 most frequent rule ids
//
// Ties in the top list keep first-seen order: a rule that showed up
// earlier in the crawl ranks ahead of one with the same count found later.
// =============================================================================

use super::types::{Impact, ScanSummary, Violation, ViolationCount};
use std::collections::{BTreeMap, HashMap};

const TOP_VIOLATIONS: usize = 5;

pub fn summarize(violations: &[Violation], total_pages: usize) -> ScanSummary {
    ScanSummary {
        total_pages,
        total_violations: violations.len(),
        violations_by_impact: count_by_impact(violations),
        top_violations: top_violations(violations, TOP_VIOLATIONS),
    }
}

pub fn count_by_impact(violations: &[Violation]) -> BTreeMap<Impact, usize> {
    let mut counts = BTreeMap::new();
    for violation in violations {
        *counts.entry(violation.impact).or_insert(0) += 1;
    }
    counts
}

pub fn top_violations(violations: &[Violation], limit: usize) -> Vec<ViolationCount> {
    // Vec keeps first-seen order, the map points into it
    let mut counts: Vec<ViolationCount> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for violation in violations {
        match index.get(violation.id.as_str()) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(&violation.id, counts.len());
                counts.push(ViolationCount {
                    id: violation.id.clone(),
                    count: 1,
                });
            }
        }
    }

    // sort_by is stable, so equal counts stay in first-seen order
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(limit);
    counts
}
