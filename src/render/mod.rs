// src/render/mod.rs
// =============================================================================
// The rendering seam.
//
// The crawl engine never talks to a browser (or to HTTP) directly. It goes
// through two traits:
// - SessionFactory: opens a fresh rendering session (a browsing context)
// - RenderSession: navigates to a URL and reports status + outbound links
//
// Recycling a session means close() on the old one and open() on the
// factory again. The engine owns the session exclusively; nothing else
// mutates it.
//
// Submodules:
// - http: a reqwest-backed session (no JavaScript)
// - links: extracts and resolves <a href> links from HTML
//
// Rust concepts:
// - Traits as interfaces, Arc<dyn Trait> for shared trait objects
// - async-trait: async methods in object-safe traits
// =============================================================================

mod http;
mod links;

pub use http::HttpSessionFactory;
pub use links::extract_page_links;

use crate::error::RenderError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Options passed with every navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigateOptions {
    /// Covers the whole navigation, main document body included
    pub timeout: Duration,
}

/// What a session hands back after navigating
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// URL that was requested
    pub url: String,
    /// URL after redirects; links are resolved against this one
    pub final_url: String,
    /// HTTP status of the main document
    pub status: u16,
    /// Absolute outbound links, in document order
    pub links: Vec<String>,
    /// Serialized DOM, handed to the rule engine
    pub html: String,
}

#[async_trait]
pub trait RenderSession: Send + Sync {
    async fn navigate(
        &self,
        url: &str,
        options: &NavigateOptions,
    ) -> Result<RenderedPage, RenderError>;

    /// Release everything the session holds. Navigating afterwards fails
    /// with RenderError::SessionClosed.
    async fn close(&self) -> Result<(), RenderError>;
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Arc<dyn RenderSession>, RenderError>;
}
