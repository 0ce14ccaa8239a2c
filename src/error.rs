// src/error.rs
// =============================================================================
// Error types for the crawl engine.
//
// Errors fall into three groups:
// - RenderError: one navigation failed. Becomes data (CrawlOutcome) unless
//   it happens while opening or recycling the rendering session.
// - ScanError: one page could not be audited. Logged and skipped.
// - CrawlError: the whole crawl cannot continue (or never started).
//
// Rust concepts:
// - thiserror: derives Display and std::error::Error for our enums
// - #[from]: lets the ? operator convert one error type into another
// =============================================================================

use std::time::Duration;
use thiserror::Error;

/// Failure of a single navigation through the rendering session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("TLS/certificate error: {0}")]
    Tls(String),

    #[error("Navigation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rendering session is closed")]
    SessionClosed,

    #[error("Could not start rendering session: {0}")]
    Init(String),
}

impl RenderError {
    /// Invalid URLs and certificate problems fail the same way every time
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RenderError::InvalidUrl(_) | RenderError::Tls(_))
    }

    /// Stable code for logs and progress events
    pub fn code(&self) -> &'static str {
        match self {
            RenderError::InvalidUrl(_) => "INVALID_URL",
            RenderError::Tls(_) => "TLS_FAILURE",
            RenderError::Timeout(_) => "NAVIGATION_TIMEOUT",
            RenderError::Navigation(_) => "NAVIGATION_ERROR",
            RenderError::Transport(_) => "TRANSPORT_ERROR",
            RenderError::SessionClosed => "SESSION_CLOSED",
            RenderError::Init(_) => "RENDERER_INIT",
        }
    }
}

/// Failure to audit a single page
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Could not render page for audit: {0}")]
    Render(#[from] RenderError),

    #[error("Rule engine error: {0}")]
    Engine(String),

    #[error("Rule engine returned an unreadable response: {0}")]
    Malformed(String),
}

/// Errors that end (or prevent) a whole crawl
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrawlError {
    #[error("A crawl is already running on this engine")]
    AlreadyRunning,

    #[error("Invalid seed URL '{url}': {reason}")]
    InvalidSeed { url: String, reason: String },

    #[error("Renderer initialization failed: {0}")]
    RendererInit(String),

    #[error("Rendering session recycle failed: {0}")]
    Recycle(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CrawlError {
    pub fn code(&self) -> &'static str {
        match self {
            CrawlError::AlreadyRunning => "ALREADY_RUNNING",
            CrawlError::InvalidSeed { .. } => "INVALID_SEED",
            CrawlError::RendererInit(_) => "RENDERER_INIT",
            CrawlError::Recycle(_) => "RECYCLE_FAILED",
            CrawlError::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl From<ConfigError> for CrawlError {
    fn from(err: ConfigError) -> Self {
        CrawlError::Config(err.to_string())
    }
}

/// Problems loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid URL pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}
