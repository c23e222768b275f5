//! Core tenant tables: workspaces, memberships, usage counters, links and
//! custom domains.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Workspaces::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Workspaces::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Workspaces::Slug).string().not_null())
                    .col(ColumnDef::new(Workspaces::Name).string().not_null())
                    .col(ColumnDef::new(Workspaces::OwnerId).string().not_null())
                    .col(
                        ColumnDef::new(Workspaces::Plan)
                            .string()
                            .not_null()
                            .default("free"),
                    )
                    .col(
                        ColumnDef::new(Workspaces::CreatedAt)
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
                    .name("idx_workspaces_slug")
                    .table(Workspaces::Table)
                    .col(Workspaces::Slug)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(WorkspaceMembers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WorkspaceMembers::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(WorkspaceMembers::WorkspaceId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkspaceMembers::UserId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkspaceMembers::Role)
                            .string()
                            .not_null()
                            .default("member"),
                    )
                    .col(
                        ColumnDef::new(WorkspaceMembers::CreatedAt)
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
                    .name("idx_members_workspace_user")
                    .table(WorkspaceMembers::Table)
                    .col(WorkspaceMembers::WorkspaceId)
                    .col(WorkspaceMembers::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(WorkspaceUsage::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WorkspaceUsage::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(WorkspaceUsage::WorkspaceId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkspaceUsage::LinksCreated)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(WorkspaceUsage::ClicksTracked)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(WorkspaceUsage::UsersAdded)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(WorkspaceUsage::MaxLinksLimit)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkspaceUsage::MaxClicksLimit)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkspaceUsage::PeriodStart)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkspaceUsage::PeriodEnd)
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
                    .name("idx_usage_workspace")
                    .table(WorkspaceUsage::Table)
                    .col(WorkspaceUsage::WorkspaceId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Links::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Links::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Links::Slug).string().not_null())
                    .col(ColumnDef::new(Links::Domain).string().not_null())
                    .col(ColumnDef::new(Links::Url).text().not_null())
                    .col(ColumnDef::new(Links::Password).string().null())
                    .col(
                        ColumnDef::new(Links::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Links::ExpirationUrl).text().null())
                    .col(ColumnDef::new(Links::WorkspaceId).string().not_null())
                    .col(
                        ColumnDef::new(Links::ClickCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Links::LastClicked)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Links::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Links::DeletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // (slug, domain) is the lookup key on every redirect
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_links_slug_domain")
                    .table(Links::Table)
                    .col(Links::Slug)
                    .col(Links::Domain)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_links_workspace")
                    .table(Links::Table)
                    .col(Links::WorkspaceId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CustomDomains::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CustomDomains::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CustomDomains::Domain).string().not_null())
                    .col(
                        ColumnDef::new(CustomDomains::WorkspaceId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CustomDomains::Verified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(CustomDomains::DnsConfigured)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(CustomDomains::CreatedAt)
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
                    .name("idx_custom_domains_domain")
                    .table(CustomDomains::Table)
                    .col(CustomDomains::Domain)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CustomDomains::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Links::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WorkspaceUsage::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WorkspaceMembers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Workspaces::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Workspaces {
    #[sea_orm(iden = "workspaces")]
    Table,
    Id,
    Slug,
    Name,
    OwnerId,
    Plan,
    CreatedAt,
}

#[derive(DeriveIden)]
enum WorkspaceMembers {
    #[sea_orm(iden = "workspace_members")]
    Table,
    Id,
    WorkspaceId,
    UserId,
    Role,
    CreatedAt,
}

#[derive(DeriveIden)]
enum WorkspaceUsage {
    #[sea_orm(iden = "workspace_usage")]
    Table,
    Id,
    WorkspaceId,
    LinksCreated,
    ClicksTracked,
    UsersAdded,
    MaxLinksLimit,
    MaxClicksLimit,
    PeriodStart,
    PeriodEnd,
}

#[derive(DeriveIden)]
enum Links {
    #[sea_orm(iden = "links")]
    Table,
    Id,
    Slug,
    Domain,
    Url,
    Password,
    ExpiresAt,
    ExpirationUrl,
    WorkspaceId,
    ClickCount,
    LastClicked,
    CreatedAt,
    DeletedAt,
}

#[derive(DeriveIden)]
enum CustomDomains {
    #[sea_orm(iden = "custom_domains")]
    Table,
    Id,
    Domain,
    WorkspaceId,
    Verified,
    DnsConfigured,
    CreatedAt,
}
