//! Per-workspace, per-billing-period usage counters
//!
//! One row per workspace; period rollover resets the counters in place and
//! moves the `period_start`/`period_end` boundaries forward.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "workspace_usage")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub workspace_id: String,
    pub links_created: i64,
    pub clicks_tracked: i64,
    pub users_added: i64,
    pub max_links_limit: i64,
    pub max_clicks_limit: i64,
    pub period_start: DateTimeUtc,
    pub period_end: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
