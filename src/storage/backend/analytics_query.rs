//! Workspace-scoped aggregation queries over the click event table.
//!
//! Time bucketing happens in SQL via per-backend date formatting, so the
//! rows coming back are already grouped and labeled.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, FromQueryResult, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select,
};

use super::SeaOrmStorage;
use crate::analytics::aggregate::{Bucket, DimensionFilters, Metric};
use crate::errors::{LinkgateError, Result};

use migration::entities::click_event;

/// One time bucket with its click count.
#[derive(Debug, FromQueryResult)]
pub struct TrendRow {
    pub label: String,
    pub count: i64,
}

/// One dimension value with its click count.
#[derive(Debug, FromQueryResult)]
pub struct DimensionRow {
    pub value: Option<String>,
    pub count: i64,
}

/// Bucket labels come out of the database pre-formatted; each backend has
/// its own date-formatting function.
fn date_format_expr(backend: DbBackend, bucket: Bucket) -> Expr {
    let (sqlite_fmt, mysql_fmt, pg_fmt) = match bucket {
        Bucket::Hour => ("%Y-%m-%d %H:00", "%Y-%m-%d %H:00", "YYYY-MM-DD HH24:00"),
        Bucket::Day => ("%Y-%m-%d", "%Y-%m-%d", "YYYY-MM-DD"),
        Bucket::Month => ("%Y-%m", "%Y-%m", "YYYY-MM"),
    };

    match backend {
        DbBackend::Sqlite => Expr::cust(format!("strftime('{}', clicked_at)", sqlite_fmt)),
        DbBackend::MySql => Expr::cust(format!("DATE_FORMAT(clicked_at, '{}')", mysql_fmt)),
        _ => Expr::cust(format!("TO_CHAR(clicked_at, '{}')", pg_fmt)),
    }
}

fn dimension_column(metric: Metric) -> Option<click_event::Column> {
    match metric {
        Metric::Links => Some(click_event::Column::Slug),
        Metric::Cities => Some(click_event::Column::City),
        Metric::Countries => Some(click_event::Column::Country),
        Metric::Continents => Some(click_event::Column::Continent),
        Metric::Devices => Some(click_event::Column::Device),
        Metric::Browsers => Some(click_event::Column::Browser),
        Metric::Oses => Some(click_event::Column::Os),
        Metric::Referrers => Some(click_event::Column::Referrer),
        Metric::Destinations => Some(click_event::Column::Url),
        Metric::TotalClicks | Metric::ClicksOverTime => None,
    }
}

/// Workspace + window + every set dimension filter, ANDed.
fn base_query(
    workspace_id: &str,
    start: Option<DateTime<Utc>>,
    end: DateTime<Utc>,
    filters: &DimensionFilters,
) -> Select<click_event::Entity> {
    let mut query = click_event::Entity::find()
        .filter(click_event::Column::WorkspaceId.eq(workspace_id))
        .filter(click_event::Column::ClickedAt.lte(end));

    if let Some(start) = start {
        query = query.filter(click_event::Column::ClickedAt.gte(start));
    }
    if let Some(country) = &filters.country {
        query = query.filter(click_event::Column::Country.eq(country));
    }
    if let Some(city) = &filters.city {
        query = query.filter(click_event::Column::City.eq(city));
    }
    if let Some(continent) = &filters.continent {
        query = query.filter(click_event::Column::Continent.eq(continent));
    }
    if let Some(device) = &filters.device {
        query = query.filter(click_event::Column::Device.eq(device));
    }
    if let Some(browser) = &filters.browser {
        query = query.filter(click_event::Column::Browser.eq(browser));
    }
    if let Some(os) = &filters.os {
        query = query.filter(click_event::Column::Os.eq(os));
    }
    if let Some(referrer) = &filters.referrer {
        query = query.filter(click_event::Column::Referrer.eq(referrer));
    }
    if let Some(slug) = &filters.slug {
        query = query.filter(click_event::Column::Slug.eq(slug));
    }
    if let Some(destination) = &filters.destination {
        query = query.filter(click_event::Column::Url.eq(destination));
    }

    query
}

impl SeaOrmStorage {
    pub async fn count_workspace_clicks(
        &self,
        workspace_id: &str,
        start: Option<DateTime<Utc>>,
        end: DateTime<Utc>,
        filters: &DimensionFilters,
    ) -> Result<u64> {
        Ok(base_query(workspace_id, start, end, filters)
            .count(&self.db)
            .await?)
    }

    pub async fn workspace_clicks_over_time(
        &self,
        workspace_id: &str,
        start: Option<DateTime<Utc>>,
        end: DateTime<Utc>,
        bucket: Bucket,
        filters: &DimensionFilters,
    ) -> Result<Vec<TrendRow>> {
        let date_expr = date_format_expr(self.db.get_database_backend(), bucket);

        Ok(base_query(workspace_id, start, end, filters)
            .select_only()
            .column_as(date_expr.clone(), "label")
            .column_as(click_event::Column::Id.count(), "count")
            .group_by(date_expr)
            .order_by_asc(Expr::cust("label"))
            .into_model::<TrendRow>()
            .all(&self.db)
            .await?)
    }

    pub async fn workspace_dimension_counts(
        &self,
        workspace_id: &str,
        start: Option<DateTime<Utc>>,
        end: DateTime<Utc>,
        metric: Metric,
        filters: &DimensionFilters,
        limit: u64,
    ) -> Result<Vec<DimensionRow>> {
        let column = dimension_column(metric).ok_or_else(|| {
            LinkgateError::validation(format!("{} is not a dimension metric", metric.as_ref()))
        })?;

        Ok(base_query(workspace_id, start, end, filters)
            .select_only()
            .column_as(column, "value")
            .column_as(click_event::Column::Id.count(), "count")
            .group_by(column)
            .order_by_desc(Expr::cust("count"))
            .limit(limit.min(100))
            .into_model::<DimensionRow>()
            .all(&self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_dimension_metric_has_a_column() {
        let dimensions = [
            Metric::Links,
            Metric::Cities,
            Metric::Countries,
            Metric::Continents,
            Metric::Devices,
            Metric::Browsers,
            Metric::Oses,
            Metric::Referrers,
            Metric::Destinations,
        ];
        for metric in dimensions {
            assert!(dimension_column(metric).is_some(), "{:?}", metric);
        }
        assert!(dimension_column(Metric::TotalClicks).is_none());
        assert!(dimension_column(Metric::ClicksOverTime).is_none());
    }
}
