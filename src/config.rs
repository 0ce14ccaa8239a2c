// src/config.rs
// =============================================================================
// Configuration for a crawl.
//
// There are two layers:
// - CrawlConfig: what to crawl (depth, page budget, path patterns, WCAG
//   level). Immutable for the lifetime of one crawl.
// - EngineSettings: how hard to push (concurrency, spacing, retries,
//   timeouts, recycling). Sensible defaults, rarely changed.
//
// Both can come from a TOML file, then A11Y_GUARDIAN_* environment
// variables, then command-line flags (highest priority).
//
// Rust concepts:
// - #[serde(default)]: missing fields fall back to Default::default()
// - Builder-style "merge" methods that take and return self
// =============================================================================

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// WCAG conformance level the audit is run against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WcagLevel {
    A,
    #[default]
    AA,
    AAA,
}

impl std::str::FromStr for WcagLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(WcagLevel::A),
            "AA" => Ok(WcagLevel::AA),
            "AAA" => Ok(WcagLevel::AAA),
            other => Err(ConfigError::InvalidValue {
                key: "wcag_level".to_string(),
                message: format!("expected A, AA or AAA, got '{}'", other),
            }),
        }
    }
}

/// What to crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrawlConfig {
    /// Pages deeper than this (by path segments) are never expanded
    pub max_depth: usize,
    /// Hard cap on pages visited
    pub max_pages: usize,
    /// Regexes matched against the URL path; empty = everything in scope
    pub include_patterns: Vec<String>,
    /// Regexes matched against the URL path; any match rejects the URL
    pub exclude_patterns: Vec<String>,
    pub wcag_level: WcagLevel,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_pages: 50,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            wcag_level: WcagLevel::AA,
        }
    }
}

impl CrawlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pages == 0 {
            return Err(invalid("max_pages", "must be at least 1"));
        }
        // Compiling the patterns here surfaces a bad regex before any
        // browser session is opened
        crate::crawl::PathPatterns::compile(&self.include_patterns, &self.exclude_patterns)?;
        Ok(())
    }
}

/// How the engine schedules work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Fetches in flight at once
    pub max_concurrent: usize,
    /// Minimum gap between two dispatches
    pub min_dispatch_interval_ms: u64,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff before retry n is base * 2^n
    pub backoff_base_ms: u64,
    pub navigation_timeout_secs: u64,
    /// URLs taken from the frontier per round
    pub batch_size: usize,
    /// Recycle the rendering session after this many pages
    pub recycle_every: usize,
    /// used/total memory ratio that forces a recycle
    pub memory_threshold: f64,
    pub memory_check_interval_secs: u64,
    pub user_agent: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            min_dispatch_interval_ms: 1000,
            max_retries: 2,
            backoff_base_ms: 1000,
            navigation_timeout_secs: 30,
            batch_size: 3,
            recycle_every: 50,
            memory_threshold: 0.8,
            memory_check_interval_secs: 10,
            user_agent: String::from("a11y-guardian/0.1 (+accessibility crawler)"),
        }
    }
}

impl EngineSettings {
    pub fn min_dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.min_dispatch_interval_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn memory_check_interval(&self) -> Duration {
        Duration::from_secs(self.memory_check_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(invalid("max_concurrent", "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be at least 1"));
        }
        if self.recycle_every == 0 {
            return Err(invalid("recycle_every", "must be at least 1"));
        }
        if !(self.memory_threshold > 0.0 && self.memory_threshold <= 1.0) {
            return Err(invalid("memory_threshold", "must be in (0, 1]"));
        }
        if self.memory_check_interval_secs == 0 {
            return Err(invalid("memory_check_interval_secs", "must be at least 1"));
        }
        Ok(())
    }
}

/// Logging section of the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// pretty, compact or json
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("compact"),
        }
    }
}

/// Where the accessibility rule engine lives
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditorConfig {
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Everything that can be put in the config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub crawl: CrawlConfig,
    pub engine: EngineSettings,
    pub logging: LoggingConfig,
    pub auditor: AuditorConfig,
}

impl Settings {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply A11Y_GUARDIAN_* environment overrides
    pub fn merge_env(self) -> Result<Self, ConfigError> {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    // Split out from merge_env so tests don't have to touch the real
    // process environment
    fn merge_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(val) = var("A11Y_GUARDIAN_MAX_DEPTH") {
            self.crawl.max_depth = parse_number("A11Y_GUARDIAN_MAX_DEPTH", &val)?;
        }
        if let Some(val) = var("A11Y_GUARDIAN_MAX_PAGES") {
            self.crawl.max_pages = parse_number("A11Y_GUARDIAN_MAX_PAGES", &val)?;
        }
        if let Some(val) = var("A11Y_GUARDIAN_WCAG_LEVEL") {
            self.crawl.wcag_level = val.parse()?;
        }
        if let Some(val) = var("A11Y_GUARDIAN_MAX_CONCURRENT") {
            self.engine.max_concurrent = parse_number("A11Y_GUARDIAN_MAX_CONCURRENT", &val)?;
        }
        if let Some(val) = var("A11Y_GUARDIAN_AUDITOR_URL") {
            self.auditor.url = Some(val);
        }
        if let Some(val) = var("A11Y_GUARDIAN_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = var("A11Y_GUARDIAN_LOG_FORMAT") {
            self.logging.format = val;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.crawl.validate()?;
        self.engine.validate()
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, val: &str) -> Result<T, ConfigError> {
    val.trim()
        .parse()
        .map_err(|_| invalid(key, &format!("'{}' is not a number", val)))
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
