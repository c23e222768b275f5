//! HTTP implementations of the click sinks, built on a blocking ureq agent
//! driven from `spawn_blocking`.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use ureq::Agent;

use super::sink::{UsageNotifier, WarehouseSink};
use super::{ClickEvent, UsagePayload};
use crate::config::WarehouseConfig;
use crate::errors::{LinkgateError, Result};

fn build_agent(timeout_secs: u64) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(timeout_secs)))
        .build()
        .into()
}

/// Appends events to the warehouse ingest endpoint as one NDJSON row per
/// request, authenticated with a bearer token.
pub struct HttpWarehouseSink {
    agent: Agent,
    endpoint: String,
    token: Option<String>,
}

impl HttpWarehouseSink {
    /// Returns `None` when no endpoint is configured.
    pub fn from_config(config: &WarehouseConfig) -> Option<Self> {
        let endpoint = config.endpoint.as_ref()?;
        let url = format!("{}?name={}", endpoint.trim_end_matches('/'), config.datasource);
        debug!("Warehouse sink targeting {}", url);
        Some(Self {
            agent: build_agent(config.timeout_secs),
            endpoint: url,
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl WarehouseSink for HttpWarehouseSink {
    async fn emit(&self, event: &ClickEvent) -> Result<()> {
        let agent = self.agent.clone();
        let url = self.endpoint.clone();
        let token = self.token.clone();
        let body = serde_json::to_string(event)?;

        tokio::task::spawn_blocking(move || {
            let mut request = agent
                .post(&url)
                .header("Content-Type", "application/x-ndjson");
            if let Some(token) = token.as_deref() {
                request = request.header("Authorization", &format!("Bearer {token}"));
            }
            match request.send(&body) {
                Ok(_) => Ok(()),
                Err(e) => {
                    warn!("Warehouse ingest to \"{}\" failed: {}", url, e);
                    Err(LinkgateError::upstream_failure(format!(
                        "warehouse ingest failed: {e}"
                    )))
                }
            }
        })
        .await
        .map_err(|e| LinkgateError::upstream_failure(format!("warehouse task failed: {e}")))?
    }

    fn name(&self) -> &'static str {
        "HttpWarehouse"
    }
}

/// POSTs usage increments to the internal analytics endpoint.
pub struct HttpUsageNotifier {
    agent: Agent,
    endpoint: String,
}

impl HttpUsageNotifier {
    pub fn new(endpoint: String, timeout_secs: u64) -> Self {
        Self {
            agent: build_agent(timeout_secs),
            endpoint,
        }
    }
}

#[async_trait]
impl UsageNotifier for HttpUsageNotifier {
    async fn notify(&self, event: &ClickEvent) -> Result<()> {
        let agent = self.agent.clone();
        let url = self.endpoint.clone();
        let body = serde_json::to_string(&UsagePayload::from(event))?;

        tokio::task::spawn_blocking(move || {
            match agent
                .post(&url)
                .header("Content-Type", "application/json")
                .send(&body)
            {
                Ok(_) => Ok(()),
                Err(e) => {
                    warn!("Usage increment POST to \"{}\" failed: {}", url, e);
                    Err(LinkgateError::upstream_failure(format!(
                        "usage increment failed: {e}"
                    )))
                }
            }
        })
        .await
        .map_err(|e| LinkgateError::upstream_failure(format!("usage task failed: {e}")))?
    }

    fn name(&self) -> &'static str {
        "HttpUsage"
    }
}
