//! Durable click event rows, written by the batch reconciler

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "click_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Content hash of the event; unique so at-least-once redelivery cannot
    /// produce duplicate rows
    pub event_id: String,
    pub link_id: String,
    pub workspace_id: String,
    pub slug: String,
    pub domain: String,
    #[sea_orm(column_type = "Text")]
    pub url: String,
    pub ip: Option<String>,
    pub country: String,
    pub city: String,
    pub continent: String,
    pub device: String,
    pub browser: String,
    pub os: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub referrer: Option<String>,
    /// "link" or "qr"
    pub trigger: String,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
    pub clicked_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
