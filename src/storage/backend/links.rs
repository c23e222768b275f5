//! Link queries for the resolver and fixtures for provisioning/tests.

use chrono::Utc;
use sea_orm::{ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};

use super::{SeaOrmStorage, retry};
use crate::errors::Result;
use crate::storage::Link;

use migration::entities::link;

impl SeaOrmStorage {
    /// Domain-scoped lookup. Soft-deleted rows are invisible here; their
    /// click events keep referencing them, but they never resolve again.
    pub async fn find_link(&self, slug: &str, domain: &str) -> Result<Option<Link>> {
        let db = &self.db;
        let result = retry::with_retry(
            &format!("find_link({}/{})", domain, slug),
            self.retry_config,
            || async {
                link::Entity::find()
                    .filter(link::Column::Slug.eq(slug))
                    .filter(link::Column::Domain.eq(domain))
                    .filter(link::Column::DeletedAt.is_null())
                    .one(db)
                    .await
            },
        )
        .await?;

        Ok(result.map(Link::from))
    }

    pub async fn create_link(&self, new_link: &Link) -> Result<()> {
        let model = link::ActiveModel {
            id: Set(new_link.id.clone()),
            slug: Set(new_link.slug.clone()),
            domain: Set(new_link.domain.clone()),
            url: Set(new_link.url.clone()),
            password: Set(new_link.password.clone()),
            expires_at: Set(new_link.expires_at),
            expiration_url: Set(new_link.expiration_url.clone()),
            workspace_id: Set(new_link.workspace_id.clone()),
            click_count: Set(0),
            last_clicked: Set(None),
            created_at: Set(Utc::now()),
            deleted_at: Set(None),
        };

        link::Entity::insert(model).exec(&self.db).await?;
        Ok(())
    }

    pub async fn soft_delete_link(&self, link_id: &str) -> Result<()> {
        let Some(model) = link::Entity::find_by_id(link_id).one(&self.db).await? else {
            return Ok(());
        };
        let mut active: link::ActiveModel = model.into();
        active.deleted_at = Set(Some(Utc::now()));
        link::Entity::update(active).exec(&self.db).await?;
        Ok(())
    }

    /// Counter columns, read back for reconciler verification.
    pub async fn link_click_count(&self, link_id: &str) -> Result<Option<i64>> {
        Ok(link::Entity::find_by_id(link_id)
            .one(&self.db)
            .await?
            .map(|model| model.click_count))
    }
}
