//! Dashboard aggregation over stored click events.
//!
//! Given a workspace, a time period and dimension filters, produces counts
//! for each requested metric. The response object carries only the metrics
//! that were asked for.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures_util::future::try_join_all;
use serde::Serialize;
use strum::{AsRefStr, EnumString};
use tracing::debug;

use crate::errors::{LinkgateError, Result};
use crate::storage::SeaOrmStorage;

/// Query window, selected by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
pub enum TimePeriod {
    #[strum(serialize = "24h")]
    Last24Hours,
    #[strum(serialize = "7d")]
    Last7Days,
    #[strum(serialize = "30d")]
    Last30Days,
    #[strum(serialize = "3m")]
    Last3Months,
    #[strum(serialize = "12m")]
    Last12Months,
    #[strum(serialize = "all")]
    All,
}

/// Bucket granularity for `clicksOverTime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Hour,
    Day,
    Month,
}

impl TimePeriod {
    /// Window start, or `None` for all time.
    pub fn start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TimePeriod::Last24Hours => Some(now - Duration::hours(24)),
            TimePeriod::Last7Days => Some(now - Duration::days(7)),
            TimePeriod::Last30Days => Some(now - Duration::days(30)),
            TimePeriod::Last3Months => Some(now - Duration::days(90)),
            TimePeriod::Last12Months => Some(now - Duration::days(365)),
            TimePeriod::All => None,
        }
    }

    pub fn bucket(&self) -> Bucket {
        match self {
            TimePeriod::Last24Hours => Bucket::Hour,
            TimePeriod::Last7Days | TimePeriod::Last30Days => Bucket::Day,
            TimePeriod::Last3Months | TimePeriod::Last12Months | TimePeriod::All => Bucket::Month,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr)]
pub enum Metric {
    #[strum(serialize = "totalClicks")]
    TotalClicks,
    #[strum(serialize = "clicksOverTime")]
    ClicksOverTime,
    #[strum(serialize = "links")]
    Links,
    #[strum(serialize = "cities")]
    Cities,
    #[strum(serialize = "countries")]
    Countries,
    #[strum(serialize = "continents")]
    Continents,
    #[strum(serialize = "devices")]
    Devices,
    #[strum(serialize = "browsers")]
    Browsers,
    #[strum(serialize = "oses")]
    Oses,
    #[strum(serialize = "referrers")]
    Referrers,
    #[strum(serialize = "destinations")]
    Destinations,
}

impl Metric {
    /// Parses a comma-separated metrics parameter, rejecting unknown names.
    pub fn parse_list(raw: &str) -> Result<Vec<Metric>> {
        let mut metrics = Vec::new();
        for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let metric = name
                .parse::<Metric>()
                .map_err(|_| LinkgateError::validation(format!("unknown metric: {name}")))?;
            if !metrics.contains(&metric) {
                metrics.push(metric);
            }
        }
        if metrics.is_empty() {
            return Err(LinkgateError::validation("no metrics requested"));
        }
        Ok(metrics)
    }
}

/// Optional equality filters, ANDed onto every metric query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DimensionFilters {
    pub country: Option<String>,
    pub city: Option<String>,
    pub continent: Option<String>,
    pub device: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub referrer: Option<String>,
    pub slug: Option<String>,
    pub destination: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketCount {
    pub bucket: String,
    pub clicks: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionCount {
    pub value: String,
    pub clicks: u64,
}

/// Response shape: only requested metrics are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_clicks: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clicks_over_time: Option<Vec<BucketCount>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<DimensionCount>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cities: Option<Vec<DimensionCount>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countries: Option<Vec<DimensionCount>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continents: Option<Vec<DimensionCount>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devices: Option<Vec<DimensionCount>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browsers: Option<Vec<DimensionCount>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oses: Option<Vec<DimensionCount>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrers: Option<Vec<DimensionCount>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destinations: Option<Vec<DimensionCount>>,
}

enum MetricValue {
    Count(u64),
    Buckets(Vec<BucketCount>),
    Dimensions(Vec<DimensionCount>),
}

/// Maximum rows returned per dimension metric.
const DIMENSION_LIMIT: u64 = 100;

pub struct AnalyticsQuery {
    storage: Arc<SeaOrmStorage>,
}

impl AnalyticsQuery {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    /// Runs every requested metric concurrently and assembles the response.
    pub async fn run(
        &self,
        workspace_id: &str,
        period: TimePeriod,
        metrics: &[Metric],
        filters: &DimensionFilters,
    ) -> Result<AnalyticsResponse> {
        let now = Utc::now();
        let start = period.start(now);
        debug!(
            "Analytics query for {}: period={}, {} metrics",
            workspace_id,
            period.as_ref(),
            metrics.len()
        );

        let futures = metrics
            .iter()
            .map(|metric| self.run_metric(*metric, workspace_id, start, now, period, filters));
        let values = try_join_all(futures).await?;

        let mut response = AnalyticsResponse::default();
        for (metric, value) in metrics.iter().zip(values) {
            match (metric, value) {
                (Metric::TotalClicks, MetricValue::Count(n)) => response.total_clicks = Some(n),
                (Metric::ClicksOverTime, MetricValue::Buckets(rows)) => {
                    response.clicks_over_time = Some(rows)
                }
                (Metric::Links, MetricValue::Dimensions(rows)) => response.links = Some(rows),
                (Metric::Cities, MetricValue::Dimensions(rows)) => response.cities = Some(rows),
                (Metric::Countries, MetricValue::Dimensions(rows)) => {
                    response.countries = Some(rows)
                }
                (Metric::Continents, MetricValue::Dimensions(rows)) => {
                    response.continents = Some(rows)
                }
                (Metric::Devices, MetricValue::Dimensions(rows)) => response.devices = Some(rows),
                (Metric::Browsers, MetricValue::Dimensions(rows)) => response.browsers = Some(rows),
                (Metric::Oses, MetricValue::Dimensions(rows)) => response.oses = Some(rows),
                (Metric::Referrers, MetricValue::Dimensions(rows)) => {
                    response.referrers = Some(rows)
                }
                (Metric::Destinations, MetricValue::Dimensions(rows)) => {
                    response.destinations = Some(rows)
                }
                _ => unreachable!("metric value shape mismatch"),
            }
        }
        Ok(response)
    }

    async fn run_metric(
        &self,
        metric: Metric,
        workspace_id: &str,
        start: Option<DateTime<Utc>>,
        end: DateTime<Utc>,
        period: TimePeriod,
        filters: &DimensionFilters,
    ) -> Result<MetricValue> {
        match metric {
            Metric::TotalClicks => {
                let count = self
                    .storage
                    .count_workspace_clicks(workspace_id, start, end, filters)
                    .await?;
                Ok(MetricValue::Count(count))
            }
            Metric::ClicksOverTime => {
                let rows = self
                    .storage
                    .workspace_clicks_over_time(workspace_id, start, end, period.bucket(), filters)
                    .await?;
                Ok(MetricValue::Buckets(
                    rows.into_iter()
                        .map(|row| BucketCount {
                            bucket: row.label,
                            clicks: row.count as u64,
                        })
                        .collect(),
                ))
            }
            _ => {
                let rows = self
                    .storage
                    .workspace_dimension_counts(
                        workspace_id,
                        start,
                        end,
                        metric,
                        filters,
                        DIMENSION_LIMIT,
                    )
                    .await?;
                Ok(MetricValue::Dimensions(
                    rows.into_iter()
                        .map(|row| DimensionCount {
                            value: row.value.unwrap_or_else(|| "(direct)".to_string()),
                            clicks: row.count as u64,
                        })
                        .collect(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_parsing_and_buckets() {
        let cases = vec![
            ("24h", TimePeriod::Last24Hours, Bucket::Hour),
            ("7d", TimePeriod::Last7Days, Bucket::Day),
            ("30d", TimePeriod::Last30Days, Bucket::Day),
            ("3m", TimePeriod::Last3Months, Bucket::Month),
            ("12m", TimePeriod::Last12Months, Bucket::Month),
            ("all", TimePeriod::All, Bucket::Month),
        ];
        for (raw, period, bucket) in cases {
            let parsed = raw.parse::<TimePeriod>().unwrap();
            assert_eq!(parsed, period);
            assert_eq!(parsed.bucket(), bucket);
        }
        assert!("1y".parse::<TimePeriod>().is_err());
    }

    #[test]
    fn test_period_window_start() {
        let now = Utc::now();
        assert_eq!(
            TimePeriod::Last24Hours.start(now),
            Some(now - Duration::hours(24))
        );
        assert_eq!(
            TimePeriod::Last3Months.start(now),
            Some(now - Duration::days(90))
        );
        assert_eq!(TimePeriod::All.start(now), None);
    }

    #[test]
    fn test_metric_list_parsing() {
        let metrics = Metric::parse_list("totalClicks, devices,devices,browsers").unwrap();
        assert_eq!(
            metrics,
            vec![Metric::TotalClicks, Metric::Devices, Metric::Browsers],
            "duplicates are collapsed, order preserved"
        );

        assert!(Metric::parse_list("clicks").is_err());
        assert!(Metric::parse_list("").is_err());
        assert!(Metric::parse_list(" , ").is_err());
    }

    #[test]
    fn test_response_contains_only_requested_keys() {
        let response = AnalyticsResponse {
            total_clicks: Some(42),
            devices: Some(vec![DimensionCount {
                value: "desktop".to_string(),
                clicks: 40,
            }]),
            ..Default::default()
        };
        let json = serde_json::to_value(&response).unwrap();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 2);
        assert!(json.get("totalClicks").is_some());
        assert!(json.get("devices").is_some());
        assert!(json.get("clicksOverTime").is_none());
    }
}
