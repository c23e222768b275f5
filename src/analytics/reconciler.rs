//! Batch reconciliation: drains the click buffer into relational storage.
//!
//! Runs are idempotent and safe to overlap. Every event carries a content
//! hash (`event_id`) that the insert path treats as unique, so a member that
//! survives one run (crash between commit and removal, overlapping windows)
//! is skipped as a duplicate on the next. Failures are isolated per
//! workspace: one bad group leaves its members buffered for the next run and
//! never blocks the rest of the batch.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::ClickEvent;
use crate::buffer::ClickBuffer;
use crate::errors::Result;
use crate::services::UsageService;

/// Durable application of one workspace's click batch. The implementation
/// must be transactional per call: either every row, counter and usage
/// increment lands, or none do.
#[async_trait]
pub trait ClickStore: Send + Sync {
    async fn apply_click_batch(&self, workspace_id: &str, events: &[ClickEvent])
    -> Result<BatchApplied>;
}

/// What one committed workspace transaction did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchApplied {
    /// Rows actually inserted.
    pub inserted: u64,
    /// Events already present (replayed members), skipped.
    pub duplicates: u64,
}

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub max_batch_size: usize,
    pub dry_run: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            dry_run: false,
        }
    }
}

/// Per-workspace outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkspaceOutcome {
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Aggregate report of one run. `skipped` counts malformed entries dropped
/// from the buffer plus duplicate events; `failed` events stay buffered.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Buffer depth after this run.
    pub remaining: u64,
    pub workspaces: BTreeMap<String, WorkspaceOutcome>,
    pub dry_run: bool,
}

pub struct Reconciler {
    buffer: Arc<dyn ClickBuffer>,
    store: Arc<dyn ClickStore>,
    usage: Arc<UsageService>,
    txn_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        buffer: Arc<dyn ClickBuffer>,
        store: Arc<dyn ClickStore>,
        usage: Arc<UsageService>,
        txn_timeout: Duration,
    ) -> Self {
        Self {
            buffer,
            store,
            usage,
            txn_timeout,
        }
    }

    /// Reconciles buffered events with scores inside `[from, to]`. Never
    /// returns an error; everything that can go wrong is counted instead.
    pub async fn reconcile(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        opts: &ReconcileOptions,
    ) -> ReconcileReport {
        let mut report = ReconcileReport {
            dry_run: opts.dry_run,
            ..Default::default()
        };

        let entries = match self
            .buffer
            .range(
                from.timestamp_millis(),
                to.timestamp_millis(),
                opts.max_batch_size,
            )
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Reconcile aborted, buffer range failed: {}", e);
                report.remaining = self.buffer.depth().await.unwrap_or(0);
                return report;
            }
        };

        if entries.is_empty() {
            report.remaining = self.buffer.depth().await.unwrap_or(0);
            return report;
        }
        debug!("Reconciling {} buffered events", entries.len());

        // Parse and group by workspace; malformed members are dropped from
        // the buffer and counted, never retried.
        let mut malformed: Vec<String> = Vec::new();
        let mut groups: BTreeMap<String, Vec<(String, ClickEvent)>> = BTreeMap::new();
        for entry in entries {
            match serde_json::from_str::<ClickEvent>(&entry.member) {
                Ok(event) if !event.workspace_id.is_empty() && !event.link_id.is_empty() => {
                    groups
                        .entry(event.workspace_id.clone())
                        .or_default()
                        .push((entry.member, event));
                }
                Ok(event) => {
                    warn!(
                        "Dropping event without workspace/link attribution: {}",
                        event.event_id
                    );
                    malformed.push(entry.member);
                }
                Err(e) => {
                    warn!("Dropping malformed buffer entry: {}", e);
                    malformed.push(entry.member);
                }
            }
        }
        report.skipped += malformed.len() as u64;

        for (workspace_id, group) in groups {
            let outcome = self.reconcile_workspace(&workspace_id, &group, opts).await;
            report.success += outcome.success;
            report.failed += outcome.failed;
            report.skipped += outcome.skipped;
            report.workspaces.insert(workspace_id, outcome);
        }

        if !opts.dry_run && !malformed.is_empty() {
            if let Err(e) = self.buffer.remove(&malformed).await {
                warn!("Failed to drop malformed entries: {}", e);
            }
        }

        report.remaining = self.buffer.depth().await.unwrap_or(0);
        info!(
            "Reconcile run: {} persisted, {} failed, {} skipped, {} remaining{}",
            report.success,
            report.failed,
            report.skipped,
            report.remaining,
            if opts.dry_run { " (dry run)" } else { "" },
        );
        report
    }

    async fn reconcile_workspace(
        &self,
        workspace_id: &str,
        group: &[(String, ClickEvent)],
        opts: &ReconcileOptions,
    ) -> WorkspaceOutcome {
        let total = group.len() as u64;
        if opts.dry_run {
            return WorkspaceOutcome {
                success: total,
                ..Default::default()
            };
        }

        let events: Vec<ClickEvent> = group.iter().map(|(_, event)| event.clone()).collect();
        let applied = match timeout(
            self.txn_timeout,
            self.store.apply_click_batch(workspace_id, &events),
        )
        .await
        {
            Ok(Ok(applied)) => applied,
            Ok(Err(e)) => {
                warn!(
                    "Workspace {} batch failed, {} events stay buffered: {}",
                    workspace_id, total, e
                );
                return WorkspaceOutcome {
                    failed: total,
                    ..Default::default()
                };
            }
            Err(_) => {
                warn!(
                    "Workspace {} batch timed out after {:?}, {} events stay buffered",
                    workspace_id, self.txn_timeout, total
                );
                return WorkspaceOutcome {
                    failed: total,
                    ..Default::default()
                };
            }
        };

        // Committed: removing the members is what makes replays harmless.
        // A crash right here leaves them buffered; the next run skips them
        // as duplicates via their event ids.
        let members: Vec<String> = group.iter().map(|(member, _)| member.clone()).collect();
        if let Err(e) = self.buffer.remove(&members).await {
            warn!(
                "Workspace {} reconciled but member removal failed: {}",
                workspace_id, e
            );
        }

        self.usage.invalidate(workspace_id).await;

        WorkspaceOutcome {
            success: applied.inserted,
            failed: 0,
            skipped: applied.duplicates,
        }
    }
}
