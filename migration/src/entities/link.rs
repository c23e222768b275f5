//! Short link entity
//!
//! `(slug, domain)` is unique among non-deleted rows; lookups always filter
//! on `deleted_at IS NULL`.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "links")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub slug: String,
    pub domain: String,
    #[sea_orm(column_type = "Text")]
    pub url: String,
    /// Argon2 hash when the link is password protected
    pub password: Option<String>,
    pub expires_at: Option<DateTimeUtc>,
    /// Where to send visitors after `expires_at` has passed
    #[sea_orm(column_type = "Text", nullable)]
    pub expiration_url: Option<String>,
    pub workspace_id: String,
    pub click_count: i64,
    pub last_clicked: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    /// Soft-delete marker; rows are never hard-deleted while click events reference them
    pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
