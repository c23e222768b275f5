//! The per-workspace reconcile transaction.
//!
//! One transaction per workspace group: insert the fresh click events,
//! advance the per-link counters, and apply the durable usage increment.
//! A failure anywhere rolls back that workspace only.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, ExprTrait, QueryFilter,
    QuerySelect, TransactionTrait,
};
use tracing::debug;

use super::SeaOrmStorage;
use crate::analytics::ClickEvent;
use crate::analytics::reconciler::{BatchApplied, ClickStore};
use crate::errors::Result;

use migration::entities::{click_event, link, workspace_usage};

fn event_to_active_model(event: &ClickEvent) -> click_event::ActiveModel {
    click_event::ActiveModel {
        event_id: Set(event.event_id.clone()),
        link_id: Set(event.link_id.clone()),
        workspace_id: Set(event.workspace_id.clone()),
        slug: Set(event.slug.clone()),
        domain: Set(event.domain.clone()),
        url: Set(event.url.clone()),
        ip: Set(event.ip.clone()),
        country: Set(event.country.clone()),
        city: Set(event.city.clone()),
        continent: Set(event.continent.clone()),
        device: Set(event.device.clone()),
        browser: Set(event.browser.clone()),
        os: Set(event.os.clone()),
        referrer: Set(event.referrer.clone()),
        trigger: Set(event.trigger.as_ref().to_string()),
        utm_source: Set(event.utm.utm_source.clone()),
        utm_medium: Set(event.utm.utm_medium.clone()),
        utm_campaign: Set(event.utm.utm_campaign.clone()),
        utm_term: Set(event.utm.utm_term.clone()),
        utm_content: Set(event.utm.utm_content.clone()),
        clicked_at: Set(event.timestamp),
        ..Default::default()
    }
}

#[async_trait]
impl ClickStore for SeaOrmStorage {
    async fn apply_click_batch(
        &self,
        workspace_id: &str,
        events: &[ClickEvent],
    ) -> Result<BatchApplied> {
        if events.is_empty() {
            return Ok(BatchApplied {
                inserted: 0,
                duplicates: 0,
            });
        }

        let txn = self.db.begin().await?;

        // Which of these event ids are already durable? At-least-once
        // delivery replays members after a crash between commit and buffer
        // removal.
        let ids: Vec<String> = events.iter().map(|e| e.event_id.clone()).collect();
        let existing: HashSet<String> = click_event::Entity::find()
            .select_only()
            .column(click_event::Column::EventId)
            .filter(click_event::Column::EventId.is_in(ids))
            .into_tuple::<String>()
            .all(&txn)
            .await?
            .into_iter()
            .collect();

        let fresh: Vec<&ClickEvent> = events
            .iter()
            .filter(|e| !existing.contains(&e.event_id))
            .collect();

        if fresh.is_empty() {
            txn.commit().await?;
            return Ok(BatchApplied {
                inserted: 0,
                duplicates: events.len() as u64,
            });
        }

        // The unique index still guards against a concurrent reconcile that
        // slipped between the select above and this insert.
        let models: Vec<click_event::ActiveModel> =
            fresh.iter().map(|e| event_to_active_model(e)).collect();
        let inserted = click_event::Entity::insert_many(models)
            .on_conflict(
                OnConflict::column(click_event::Column::EventId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        // Per-link counters, sized by the fresh groups. A concurrent run
        // landing the same events first can double-bump a counter; the
        // event rows themselves stay exact.
        let mut per_link: BTreeMap<&str, (i64, DateTime<Utc>)> = BTreeMap::new();
        for event in &fresh {
            per_link
                .entry(event.link_id.as_str())
                .and_modify(|(count, last)| {
                    *count += 1;
                    *last = Ord::max(*last, event.timestamp);
                })
                .or_insert((1, event.timestamp));
        }

        for (link_id, (count, last)) in per_link {
            match link::Entity::find_by_id(link_id).one(&txn).await? {
                Some(row) => {
                    let click_count = row.click_count + count;
                    let last_clicked = row.last_clicked.map_or(last, |cur| Ord::max(cur, last));
                    let mut active: link::ActiveModel = row.into();
                    active.click_count = Set(click_count);
                    active.last_clicked = Set(Some(last_clicked));
                    active.update(&txn).await?;
                }
                None => {
                    // Hard-deleted out of band; keep the event rows, skip
                    // the counter.
                    debug!("Link {} missing during reconcile, counter skipped", link_id);
                }
            }
        }

        // The one durable click increment in the system, sized by rows that
        // actually landed.
        workspace_usage::Entity::update_many()
            .col_expr(
                workspace_usage::Column::ClicksTracked,
                Expr::col(workspace_usage::Column::ClicksTracked).add(inserted as i64),
            )
            .filter(workspace_usage::Column::WorkspaceId.eq(workspace_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        Ok(BatchApplied {
            inserted,
            duplicates: events.len() as u64 - inserted,
        })
    }
}

impl SeaOrmStorage {
    /// Durable event rows for a workspace, oldest first. Verification and
    /// export use this; the dashboard goes through the aggregate queries.
    pub async fn list_click_events(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<click_event::Model>> {
        use sea_orm::QueryOrder;

        Ok(click_event::Entity::find()
            .filter(click_event::Column::WorkspaceId.eq(workspace_id))
            .order_by_asc(click_event::Column::ClickedAt)
            .all(&self.db)
            .await?)
    }
}
