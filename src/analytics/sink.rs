//! Outbound click sinks: the columnar warehouse and the internal usage
//! endpoint. Both are best-effort; callers log failures and move on.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::ClickEvent;
use crate::errors::Result;
use crate::services::UsageService;

/// Emits events to the columnar click warehouse.
#[async_trait]
pub trait WarehouseSink: Send + Sync {
    async fn emit(&self, event: &ClickEvent) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Notifies the usage-increment endpoint of a tracked click.
#[async_trait]
pub trait UsageNotifier: Send + Sync {
    async fn notify(&self, event: &ClickEvent) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Stand-in when no warehouse is configured.
pub struct NoopSink;

#[async_trait]
impl WarehouseSink for NoopSink {
    async fn emit(&self, event: &ClickEvent) -> Result<()> {
        debug!("No warehouse configured, dropping event {}", event.event_id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Noop"
    }
}

/// Stand-in when no usage endpoint is configured.
pub struct NoopNotifier;

#[async_trait]
impl UsageNotifier for NoopNotifier {
    async fn notify(&self, _event: &ClickEvent) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Noop"
    }
}

/// Applies usage increments in process, for single-binary deployments where
/// the ingest endpoint would be this same server.
pub struct LocalNotifier {
    usage: Arc<UsageService>,
}

impl LocalNotifier {
    pub fn new(usage: Arc<UsageService>) -> Self {
        Self { usage }
    }
}

#[async_trait]
impl UsageNotifier for LocalNotifier {
    async fn notify(&self, event: &ClickEvent) -> Result<()> {
        self.usage.record_click(&event.workspace_id).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Local"
    }
}
