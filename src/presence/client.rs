//! Graph presence endpoint (/beta/me/presence)

use anyhow::{bail, Context, Result};
use serde::Deserialize;

const PRESENCE_PATH: &str = "/beta/me/presence";

#[derive(Debug, Clone, Deserialize)]
pub struct PresenceResponse {
    pub availability: Option<String>,
    pub activity: Option<String>,
}

/// Bearer-authenticated client for the presence API.
#[derive(Debug, Clone)]
pub struct PresenceClient {
    http: reqwest::Client,
    url: String,
}

impl PresenceClient {
    pub fn new(http: reqwest::Client, graph_url: &str) -> Self {
        Self {
            http,
            url: format!("{}{}", graph_url.trim_end_matches('/'), PRESENCE_PATH),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// GET the signed-in user's presence.
    pub async fn fetch(&self, token: &str) -> Result<PresenceResponse> {
        tracing::debug!("Graph GET {}", self.url);

        let resp = self
            .http
            .get(&self.url)
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("Graph GET {} failed", self.url))?;

        let resp = check_response(resp, &self.url).await?;
        resp.json()
            .await
            .context("Failed to parse presence response")
    }
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        bail!("401 Unauthorized for {}. Token may be invalid or revoked.", url);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("HTTP {} for {}: {}", status.as_u16(), url, body);
    }
    Ok(resp)
}
