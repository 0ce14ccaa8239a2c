// src/audit/remote.rs
// =============================================================================
// An AccessibilityAuditor that delegates to a rule engine over HTTP.
//
// Request:  POST <endpoint>  {"url": ..., "html": ..., "tags": [...]}
// Response: the axe-core results object
//           {"violations": [...], "passes": [...], "incomplete": [...],
//            "inapplicable": [...]}
//
// Only violations are decoded in full; for the other three lists we just
// need the length.
// =============================================================================

use super::types::{AuditResults, Violation};
use super::AccessibilityAuditor;
use crate::error::{ConfigError, ScanError};
use crate::render::RenderedPage;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Serialize)]
struct ScanRequest<'a> {
    url: &'a str,
    html: &'a str,
    tags: &'a [&'a str],
}

#[derive(Deserialize)]
struct AxeResponse {
    #[serde(default)]
    violations: Vec<Violation>,
    #[serde(default)]
    passes: Vec<IgnoredAny>,
    #[serde(default)]
    incomplete: Vec<IgnoredAny>,
    #[serde(default)]
    inapplicable: Vec<IgnoredAny>,
}

#[derive(Debug, Clone)]
pub struct RemoteAuditor {
    client: Client,
    endpoint: Url,
}

impl RemoteAuditor {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(endpoint).map_err(|e| ConfigError::InvalidValue {
            key: "auditor.url".to_string(),
            message: format!("'{}': {}", endpoint, e),
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "auditor".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl AccessibilityAuditor for RemoteAuditor {
    async fn scan(&self, page: &RenderedPage, tags: &[&str]) -> Result<AuditResults, ScanError> {
        let request = ScanRequest {
            url: &page.final_url,
            html: &page.html,
            tags,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| ScanError::Engine(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScanError::Engine(format!(
                "rule engine answered {}: {}",
                status,
                body.trim()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ScanError::Engine(e.to_string()))?;
        let decoded: AxeResponse =
            serde_json::from_slice(&body).map_err(|e| ScanError::Malformed(e.to_string()))?;

        debug!(
            url = %page.url,
            violations = decoded.violations.len(),
            passes = decoded.passes.len(),
            "rule engine responded"
        );

        Ok(AuditResults {
            violations: decoded.violations,
            passes: decoded.passes.len(),
            incomplete: decoded.incomplete.len(),
            inapplicable: decoded.inapplicable.len(),
        })
    }
}
