// src/render/http.rs
// =============================================================================
// A rendering session backed by plain HTTP (reqwest).
//
// It does not execute JavaScript. For server-rendered sites that is enough
// to discover links and hand the markup to the rule engine; a headless
// browser can be plugged in through the same SessionFactory trait.
//
// Session lifecycle:
// - open(): builds a new reqwest::Client (own connection pool)
// - close(): drops the client, releasing its pooled connections
//
// A navigation is finished once the whole response body has been read.
// There are no subresources to wait for.
//
// Error mapping (see categorize_error):
// - timeout            -> RenderError::Timeout     (retried)
// - bad URL / builder  -> RenderError::InvalidUrl  (never retried)
// - certificate / TLS  -> RenderError::Tls         (never retried)
// - anything else      -> Transport / Navigation   (retried)
// =============================================================================

use super::{extract_page_links, NavigateOptions, RenderSession, RenderedPage, SessionFactory};
use crate::error::RenderError;
use async_trait::async_trait;
use reqwest::{header, Client};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

/// Opens reqwest-backed sessions
#[derive(Debug, Clone)]
pub struct HttpSessionFactory {
    user_agent: String,
    timeout: Duration,
}

impl HttpSessionFactory {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.into(),
            timeout,
        }
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn open(&self) -> Result<Arc<dyn RenderSession>, RenderError> {
        let client = Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| RenderError::Init(e.to_string()))?;

        debug!("opened HTTP rendering session");
        Ok(Arc::new(HttpSession {
            client: RwLock::new(Some(client)),
        }))
    }
}

/// One browsing context: a client and its connection pool
struct HttpSession {
    client: RwLock<Option<Client>>,
}

#[async_trait]
impl RenderSession for HttpSession {
    async fn navigate(
        &self,
        url: &str,
        options: &NavigateOptions,
    ) -> Result<RenderedPage, RenderError> {
        let target =
            Url::parse(url).map_err(|e| RenderError::InvalidUrl(format!("{}: {}", url, e)))?;

        // Client is reference counted; clone it so the lock isn't held
        // across the request
        let client = self
            .client
            .read()
            .await
            .clone()
            .ok_or(RenderError::SessionClosed)?;

        let response = client
            .get(target)
            .timeout(options.timeout)
            .send()
            .await
            .map_err(|e| categorize_error(&e, options.timeout))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        // Missing Content-Type is treated as HTML, like browsers do for
        // most documents
        let is_html = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("html"))
            .unwrap_or(true);

        let html = if is_html {
            response
                .text()
                .await
                .map_err(|e| categorize_error(&e, options.timeout))?
        } else {
            String::new()
        };

        let links = if is_html {
            extract_page_links(&html, &final_url)
        } else {
            Vec::new()
        };

        Ok(RenderedPage {
            url: url.to_string(),
            final_url,
            status,
            links,
            html,
        })
    }

    async fn close(&self) -> Result<(), RenderError> {
        self.client.write().await.take();
        debug!("closed HTTP rendering session");
        Ok(())
    }
}

// Maps reqwest errors onto the engine's error classes
//
// reqwest wraps the interesting part (hyper, rustls) in its source chain,
// so the whole chain is searched for TLS hints.
fn categorize_error(error: &reqwest::Error, timeout: Duration) -> RenderError {
    let chain = error_chain(error);

    if error.is_timeout() {
        RenderError::Timeout(timeout)
    } else if error.is_builder() {
        RenderError::InvalidUrl(chain)
    } else if looks_like_tls(&chain) {
        RenderError::Tls(chain)
    } else if error.is_redirect() {
        RenderError::Navigation(format!("too many redirects: {}", chain))
    } else if error.is_connect() || error.is_request() {
        RenderError::Transport(chain)
    } else {
        RenderError::Navigation(chain)
    }
}

fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn looks_like_tls(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("certificate") || lower.contains("ssl") || lower.contains("tls")
}
