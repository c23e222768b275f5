//! Relational storage: links, workspaces, usage counters, click events.
//!
//! Entities and migrations live in the `migration` workspace member; this
//! module owns the connection, the transient-error retry policy, and every
//! query the services run. Callers see small domain structs, not entity
//! models.

pub mod backend;

pub use backend::retry;
pub use backend::{
    DimensionRow, SeaOrmStorage, TrendRow, connect_generic, connect_sqlite,
    infer_backend_from_url, run_migrations,
};

use chrono::{DateTime, Utc};

use migration::entities::{custom_domain, link, workspace, workspace_usage};

/// A short link as the resolver sees it. Counter columns stay behind in the
/// entity; they belong to the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub id: String,
    pub slug: String,
    pub domain: String,
    pub url: String,
    /// Argon2 hash when password protected.
    pub password: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub expiration_url: Option<String>,
    pub workspace_id: String,
}

impl From<link::Model> for Link {
    fn from(model: link::Model) -> Self {
        Link {
            id: model.id,
            slug: model.slug,
            domain: model.domain,
            url: model.url,
            password: model.password,
            expires_at: model.expires_at,
            expiration_url: model.expiration_url,
            workspace_id: model.workspace_id,
        }
    }
}

/// Usage counters relevant to the click quota gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceUsage {
    pub workspace_id: String,
    pub clicks_tracked: i64,
    /// Zero or negative means unlimited.
    pub max_clicks_limit: i64,
}

impl From<workspace_usage::Model> for WorkspaceUsage {
    fn from(model: workspace_usage::Model) -> Self {
        WorkspaceUsage {
            workspace_id: model.workspace_id,
            clicks_tracked: model.clicks_tracked,
            max_clicks_limit: model.max_clicks_limit,
        }
    }
}

/// A tenant-owned domain. Only verified domains serve short links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomDomain {
    pub domain: String,
    pub workspace_id: String,
    pub verified: bool,
    pub dns_configured: bool,
}

impl From<custom_domain::Model> for CustomDomain {
    fn from(model: custom_domain::Model) -> Self {
        CustomDomain {
            domain: model.domain,
            workspace_id: model.workspace_id,
            verified: model.verified,
            dns_configured: model.dns_configured,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub owner_id: String,
}

impl From<workspace::Model> for Workspace {
    fn from(model: workspace::Model) -> Self {
        Workspace {
            id: model.id,
            slug: model.slug,
            name: model.name,
            owner_id: model.owner_id,
        }
    }
}
