//! HTTP client for the analysis pipeline API.
//!
//! Two operations: trigger an analysis run, and probe the status of an
//! existing session. The status probe distinguishes "not found" from other
//! failures so the fallback poller can count consecutive misses.

use crate::data::SessionStatus;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Per-request timeout. Probes run on a 5s cadence; a slow server should
/// fail the tick, not stall the next one.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(4);

/// Response from the status probe endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusProbe {
    pub status: SessionStatus,
    #[serde(default)]
    pub progress: Option<f64>,
}

/// Response from the trigger endpoint.
#[derive(Debug, Deserialize)]
struct TriggerResponse {
    session_id: String,
}

#[derive(Debug, Serialize)]
struct TriggerRequest<'a> {
    week: Option<&'a str>,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    /// The session does not exist (yet) server-side.
    #[error("session not found")]
    NotFound,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Start an analysis run for the given week, returning the new session
    /// identifier.
    pub async fn trigger_analysis(&self, week: Option<&str>) -> Result<String> {
        let url = format!("{}/api/analysis", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&TriggerRequest { week })
            .send()
            .await
            .context("failed to reach the analysis API")?;

        if !response.status().is_success() {
            anyhow::bail!("analysis API returned status {}", response.status());
        }

        let body: TriggerResponse = response
            .json()
            .await
            .context("malformed trigger response")?;
        Ok(body.session_id)
    }

    /// Fetch coarse `{status, progress}` for a session.
    pub async fn fetch_status(&self, session_id: &str) -> Result<StatusProbe, ProbeError> {
        let url = format!("{}/api/analysis/{}/status", self.base_url, session_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("status probe request failed")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProbeError::NotFound);
        }
        if !response.status().is_success() {
            return Err(ProbeError::Other(anyhow::anyhow!(
                "status probe returned {}",
                response.status()
            )));
        }

        let probe = response
            .json()
            .await
            .context("malformed status probe response")?;
        Ok(probe)
    }

    /// WebSocket endpoint delivering real-time events for one session.
    pub fn channel_url(&self, session_id: &str) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!("{ws_base}/api/analysis/{session_id}/events")
    }
}
