use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, trace};

use super::decision::Decision;
use super::rules::Rule;
use super::{Gate, GateError, GateResult, RequestDetails};

pub const DEFAULT_DECIDE_URL: &str = "https://decide.arcjet.com";

#[derive(Debug, Clone)]
pub struct RemoteGateConfig {
    pub base_url: String,
    pub key: String,
    pub timeout: Duration,
}

/// Gate backed by a remote decision service.
///
/// Holds no per-client state: every evaluation is a `POST {base_url}/v1/decide`
/// carrying the request details and the rule set, authenticated with the site
/// key. Building the gate allocates the HTTP client only.
#[derive(Debug)]
pub struct RemoteGate {
    client: Client,
    endpoint: String,
    key: String,
    rules: Vec<Rule>,
}

#[derive(Serialize)]
struct DecideRequest<'a> {
    details: &'a RequestDetails,
    rules: &'a [Rule],
}

impl RemoteGate {
    pub fn new(config: RemoteGateConfig, rules: Vec<Rule>) -> GateResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(Some(Duration::from_secs(50)))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/v1/decide", config.base_url.trim_end_matches('/')),
            key: config.key,
            rules,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Gate for RemoteGate {
    async fn protect(&self, details: &RequestDetails) -> GateResult<Decision> {
        trace!(endpoint = %self.endpoint, client = details.client_key(), "Requesting decision");

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.key)
            .json(&DecideRequest {
                details,
                rules: &self.rules,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GateError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        let decision: Decision = serde_json::from_slice(&bytes)
            .map_err(|e| GateError::InvalidResponse(e.to_string()))?;
        debug!(
            decision_id = %decision.id,
            conclusion = ?decision.conclusion,
            "Decision received"
        );
        Ok(decision)
    }

    fn backend(&self) -> &'static str {
        "remote"
    }
}
