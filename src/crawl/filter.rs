// src/crawl/filter.rs
// =============================================================================
// Decides whether a discovered URL belongs to the crawl.
//
// A URL is in scope when:
// 1. it parses, and its origin (scheme + host + port) equals the seed's
// 2. its path matches at least one include pattern (if any are given)
// 3. its path matches no exclude pattern - exclude always wins
//
// Malformed URLs are simply out of scope; they are not errors.
//
// Patterns are regular expressions tested against the path only, so
// "^/admin" excludes /admin and /admin/settings but not /blog/admin.
// =============================================================================

use crate::error::ConfigError;
use regex::{Regex, RegexSet};
use url::Url;

/// Compiled include/exclude path patterns
#[derive(Debug, Clone)]
pub struct PathPatterns {
    include: Option<RegexSet>,
    exclude: Option<RegexSet>,
}

impl PathPatterns {
    pub fn compile(include: &[String], exclude: &[String]) -> Result<Self, ConfigError> {
        Ok(Self {
            include: compile_set(include)?,
            exclude: compile_set(exclude)?,
        })
    }

    #[cfg(test)]
    /// Patterns that let every path through
    pub fn allow_all() -> Self {
        Self {
            include: None,
            exclude: None,
        }
    }

    pub fn allows(&self, path: &str) -> bool {
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(path) {
                return false;
            }
        }
        match &self.include {
            Some(include) => include.is_match(path),
            None => true,
        }
    }
}

// Empty pattern lists compile to None ("no constraint")
fn compile_set(patterns: &[String]) -> Result<Option<RegexSet>, ConfigError> {
    if patterns.is_empty() {
        return Ok(None);
    }

    // Compile one by one first so the error names the bad pattern
    for pattern in patterns {
        Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
    }

    RegexSet::new(patterns)
        .map(Some)
        .map_err(|e| ConfigError::InvalidPattern {
            pattern: patterns.join(", "),
            message: e.to_string(),
        })
}

/// scheme://host[:port] of a URL; None for opaque origins (data:, file:)
pub fn origin_of(url: &Url) -> Option<String> {
    let origin = url.origin();
    if origin.is_tuple() {
        Some(origin.ascii_serialization())
    } else {
        None
    }
}

/// Canonical string form used for dedup: parsed, fragment removed
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    url.set_fragment(None);
    Some(url.to_string())
}

/// Is `candidate` part of the crawl rooted at `base_origin`?
pub fn is_in_scope(candidate: &str, base_origin: &str, patterns: &PathPatterns) -> bool {
    let url = match Url::parse(candidate) {
        Ok(url) => url,
        Err(_) => return false,
    };

    match origin_of(&url) {
        Some(origin) if origin == base_origin => patterns.allows(url.path()),
        _ => false,
    }
}
