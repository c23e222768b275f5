//! Workspace rows: usage counters and the membership gate.

use chrono::{Duration, Utc};
use sea_orm::{ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

use super::{SeaOrmStorage, retry};
use crate::errors::Result;
use crate::storage::{Workspace, WorkspaceUsage};

use migration::entities::{workspace, workspace_member, workspace_usage};

impl SeaOrmStorage {
    pub async fn find_workspace_usage(&self, workspace_id: &str) -> Result<Option<WorkspaceUsage>> {
        let db = &self.db;
        let result = retry::with_retry(
            &format!("find_workspace_usage({})", workspace_id),
            self.retry_config,
            || async {
                workspace_usage::Entity::find()
                    .filter(workspace_usage::Column::WorkspaceId.eq(workspace_id))
                    .one(db)
                    .await
            },
        )
        .await?;

        Ok(result.map(WorkspaceUsage::from))
    }

    pub async fn find_workspace_by_slug(&self, slug: &str) -> Result<Option<Workspace>> {
        Ok(workspace::Entity::find()
            .filter(workspace::Column::Slug.eq(slug))
            .one(&self.db)
            .await?
            .map(Workspace::from))
    }

    /// Owner or listed member passes the analytics gate.
    pub async fn is_workspace_member(&self, workspace_id: &str, user_id: &str) -> Result<bool> {
        if let Some(ws) = workspace::Entity::find_by_id(workspace_id).one(&self.db).await?
            && ws.owner_id == user_id
        {
            return Ok(true);
        }

        let members = workspace_member::Entity::find()
            .filter(workspace_member::Column::WorkspaceId.eq(workspace_id))
            .filter(workspace_member::Column::UserId.eq(user_id))
            .count(&self.db)
            .await?;

        Ok(members > 0)
    }

    // ============ provisioning / fixture helpers ============

    pub async fn create_workspace(&self, ws: &Workspace) -> Result<()> {
        let model = workspace::ActiveModel {
            id: Set(ws.id.clone()),
            slug: Set(ws.slug.clone()),
            name: Set(ws.name.clone()),
            owner_id: Set(ws.owner_id.clone()),
            plan: Set("free".to_string()),
            created_at: Set(Utc::now()),
        };
        workspace::Entity::insert(model).exec(&self.db).await?;
        Ok(())
    }

    pub async fn add_workspace_member(
        &self,
        workspace_id: &str,
        user_id: &str,
        role: &str,
    ) -> Result<()> {
        let model = workspace_member::ActiveModel {
            workspace_id: Set(workspace_id.to_string()),
            user_id: Set(user_id.to_string()),
            role: Set(role.to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        workspace_member::Entity::insert(model).exec(&self.db).await?;
        Ok(())
    }

    /// One usage row per workspace, current billing period starting now.
    pub async fn create_workspace_usage(
        &self,
        workspace_id: &str,
        clicks_tracked: i64,
        max_clicks_limit: i64,
    ) -> Result<()> {
        let now = Utc::now();
        let model = workspace_usage::ActiveModel {
            workspace_id: Set(workspace_id.to_string()),
            links_created: Set(0),
            clicks_tracked: Set(clicks_tracked),
            users_added: Set(0),
            max_links_limit: Set(0),
            max_clicks_limit: Set(max_clicks_limit),
            period_start: Set(now),
            period_end: Set(now + Duration::days(30)),
            ..Default::default()
        };
        workspace_usage::Entity::insert(model).exec(&self.db).await?;
        Ok(())
    }
}
