//! Click analytics: event model, enrichment, dispatch, reconciliation and
//! aggregation.
//!
//! A click produces one [`ClickEvent`] that travels three ways at once: to
//! the columnar warehouse, to the usage-increment endpoint, and into the
//! sorted-set buffer the reconciler later drains into relational storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::AsRefStr;
use xxhash_rust::xxh64::xxh64;

pub mod aggregate;
pub mod device;
pub mod dispatcher;
pub mod geo;
pub mod http_sink;
pub mod reconciler;
pub mod sink;

pub use aggregate::{AnalyticsQuery, DimensionFilters, Metric, TimePeriod};
pub use device::{DeviceInfo, parse_user_agent};
pub use dispatcher::{ClickDispatcher, DispatchContext, RequestParts};
pub use geo::{GeoInfo, GeoIpLookup, GeoResolver, MaxMindProvider};
pub use reconciler::{ReconcileOptions, ReconcileReport, Reconciler};
pub use sink::{LocalNotifier, NoopNotifier, NoopSink, UsageNotifier, WarehouseSink};

/// How the click was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Trigger {
    Link,
    Qr,
}

/// UTM parameters captured from the inbound query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_term: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
}

impl UtmParams {
    /// Extracts UTM keys from a raw query string; everything else is ignored.
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            let value = value.into_owned();
            match key.as_ref() {
                "utm_source" => params.utm_source = Some(value),
                "utm_medium" => params.utm_medium = Some(value),
                "utm_campaign" => params.utm_campaign = Some(value),
                "utm_term" => params.utm_term = Some(value),
                "utm_content" => params.utm_content = Some(value),
                _ => {}
            }
        }
        params
    }

    pub fn is_empty(&self) -> bool {
        self.utm_source.is_none()
            && self.utm_medium.is_none()
            && self.utm_campaign.is_none()
            && self.utm_term.is_none()
            && self.utm_content.is_none()
    }
}

/// One normalized click, immutable once built.
///
/// Serialized form is the wire format for the buffer, the warehouse and the
/// usage endpoint, so field names stay camelCase to match the HTTP contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickEvent {
    /// Content hash over the identity fields; the relational insert key.
    #[serde(default)]
    pub event_id: String,
    pub link_id: String,
    pub workspace_id: String,
    pub slug: String,
    pub domain: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    pub country: String,
    pub city: String,
    pub continent: String,
    pub device: String,
    pub browser: String,
    pub os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    pub trigger: Trigger,
    #[serde(flatten)]
    pub utm: UtmParams,
    pub timestamp: DateTime<Utc>,
}

impl ClickEvent {
    /// Deterministic id over the fields that identify a click. Replays of
    /// the same buffered event hash identically, which is what lets the
    /// reconciler insert with on-conflict-do-nothing.
    pub fn compute_event_id(&self) -> String {
        let identity = format!(
            "{}|{}|{}|{}|{}",
            self.link_id,
            self.ip.as_deref().unwrap_or(""),
            self.timestamp.timestamp_millis(),
            self.slug,
            self.trigger.as_ref(),
        );
        format!("{:016x}", xxh64(identity.as_bytes(), 0))
    }
}

/// Body of the internal usage-increment POST. `analyticsData` carries the
/// full event so the receiving side never has to re-derive enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsagePayload {
    pub link_id: String,
    pub slug: String,
    pub domain: String,
    pub workspace_id: String,
    pub analytics_data: ClickEvent,
    pub trigger: Trigger,
    pub timestamp: DateTime<Utc>,
}

impl From<&ClickEvent> for UsagePayload {
    fn from(event: &ClickEvent) -> Self {
        Self {
            link_id: event.link_id.clone(),
            slug: event.slug.clone(),
            domain: event.domain.clone(),
            workspace_id: event.workspace_id.clone(),
            analytics_data: event.clone(),
            trigger: event.trigger,
            timestamp: event.timestamp,
        }
    }
}
