//! Workspace usage snapshots and the soft click quota.
//!
//! Snapshots are cached with a short TTL so the redirect hot path never
//! waits on the usage table. The cached copy is advisory between reconcile
//! runs: the usages endpoint bumps it in place for faster quota visibility,
//! and the reconciler invalidates it after the durable increment lands.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::errors::{LinkgateError, Result};
use crate::storage::{SeaOrmStorage, WorkspaceUsage};

pub struct UsageService {
    storage: Arc<SeaOrmStorage>,
    snapshots: Cache<String, Option<WorkspaceUsage>>,
}

impl UsageService {
    pub fn new(storage: Arc<SeaOrmStorage>, capacity: u64, ttl: Duration) -> Self {
        let snapshots = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self { storage, snapshots }
    }

    /// Cached usage row for a workspace; `None` when no row exists yet
    /// (freshly provisioned workspaces are unlimited until their first
    /// usage row appears).
    pub async fn snapshot(&self, workspace_id: &str) -> Result<Option<WorkspaceUsage>> {
        let storage = self.storage.clone();
        let key = workspace_id.to_string();
        self.snapshots
            .try_get_with(key.clone(), async move {
                storage.find_workspace_usage(&key).await
            })
            .await
            .map_err(|e: std::sync::Arc<LinkgateError>| (*e).clone())
    }

    /// Soft quota check: at or over the limit counts as exceeded.
    /// A zero or negative limit means unlimited.
    pub async fn quota_exceeded(&self, workspace_id: &str) -> Result<bool> {
        Ok(self
            .snapshot(workspace_id)
            .await?
            .map(|usage| usage.max_clicks_limit > 0 && usage.clicks_tracked >= usage.max_clicks_limit)
            .unwrap_or(false))
    }

    /// Bumps the cached snapshot only. The durable counter is owned by the
    /// reconciler; this keeps the quota gate roughly current between runs.
    /// A concurrent bump can be lost, which is within the soft-quota budget.
    pub async fn record_click(&self, workspace_id: &str) {
        if let Some(Some(mut usage)) = self.snapshots.get(workspace_id).await {
            usage.clicks_tracked += 1;
            self.snapshots
                .insert(workspace_id.to_string(), Some(usage))
                .await;
        }
    }

    pub async fn invalidate(&self, workspace_id: &str) {
        self.snapshots.invalidate(workspace_id).await;
    }
}
