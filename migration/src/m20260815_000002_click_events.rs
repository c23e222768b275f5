//! Click events table
//!
//! Durable form of the analytics event. `event_id` is a content hash with a
//! unique index so the at-least-once reconciler can re-deliver a batch
//! without creating duplicate rows.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ClickEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClickEvents::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::EventId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClickEvents::LinkId).string().not_null())
                    .col(
                        ColumnDef::new(ClickEvents::WorkspaceId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClickEvents::Slug).string().not_null())
                    .col(ColumnDef::new(ClickEvents::Domain).string().not_null())
                    .col(ColumnDef::new(ClickEvents::Url).text().not_null())
                    .col(ColumnDef::new(ClickEvents::Ip).string_len(45).null())
                    .col(
                        ColumnDef::new(ClickEvents::Country)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::City)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::Continent)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::Device)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::Browser)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClickEvents::Os).string_len(64).not_null())
                    .col(ColumnDef::new(ClickEvents::Referrer).text().null())
                    .col(
                        ColumnDef::new(ClickEvents::Trigger)
                            .string_len(8)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClickEvents::UtmSource).string().null())
                    .col(ColumnDef::new(ClickEvents::UtmMedium).string().null())
                    .col(ColumnDef::new(ClickEvents::UtmCampaign).string().null())
                    .col(ColumnDef::new(ClickEvents::UtmTerm).string().null())
                    .col(ColumnDef::new(ClickEvents::UtmContent).string().null())
                    .col(
                        ColumnDef::new(ClickEvents::ClickedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_click_events_event_id")
                    .table(ClickEvents::Table)
                    .col(ClickEvents::EventId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Workspace dashboards scan by (workspace, time)
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_click_events_workspace_time")
                    .table(ClickEvents::Table)
                    .col(ClickEvents::WorkspaceId)
                    .col(ClickEvents::ClickedAt)
                    .to_owned(),
            )
            .await?;

        // Per-link time series
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_click_events_link_time")
                    .table(ClickEvents::Table)
                    .col(ClickEvents::LinkId)
                    .col(ClickEvents::ClickedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_click_events_link_time").to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_click_events_workspace_time")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_click_events_event_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ClickEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ClickEvents {
    #[sea_orm(iden = "click_events")]
    Table,
    Id,
    EventId,
    LinkId,
    WorkspaceId,
    Slug,
    Domain,
    Url,
    Ip,
    Country,
    City,
    Continent,
    Device,
    Browser,
    Os,
    Referrer,
    Trigger,
    UtmSource,
    UtmMedium,
    UtmCampaign,
    UtmTerm,
    UtmContent,
    ClickedAt,
}
