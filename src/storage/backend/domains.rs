//! Custom domain rows: the ownership gate for tenant hosts.

use chrono::Utc;
use sea_orm::{ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};

use super::{SeaOrmStorage, retry};
use crate::errors::Result;
use crate::storage::CustomDomain;

use migration::entities::custom_domain;

impl SeaOrmStorage {
    /// Case-insensitive callers must pass an already-normalized hostname;
    /// domains are stored lowercase.
    pub async fn find_custom_domain(&self, domain: &str) -> Result<Option<CustomDomain>> {
        let db = &self.db;
        let result = retry::with_retry(
            &format!("find_custom_domain({})", domain),
            self.retry_config,
            || async {
                custom_domain::Entity::find()
                    .filter(custom_domain::Column::Domain.eq(domain))
                    .one(db)
                    .await
            },
        )
        .await?;

        Ok(result.map(CustomDomain::from))
    }

    // ============ provisioning / fixture helpers ============

    pub async fn create_custom_domain(&self, custom: &CustomDomain) -> Result<()> {
        let model = custom_domain::ActiveModel {
            id: Set(format!("dom_{}", custom.domain)),
            domain: Set(custom.domain.clone()),
            workspace_id: Set(custom.workspace_id.clone()),
            verified: Set(custom.verified),
            dns_configured: Set(custom.dns_configured),
            created_at: Set(Utc::now()),
        };
        custom_domain::Entity::insert(model).exec(&self.db).await?;
        Ok(())
    }
}
