//! Subscription webhook payload normalization.
//!
//! The billing provider delivers plan changes with inconsistent field
//! shapes: camelCase at the top level, snake_case from older hooks, or the
//! workspace id tucked under `metadata` and limits under a `limits` object.
//! Everything funnels through `normalize_subscription_payload` so the rest
//! of the system only ever sees one record shape.

use serde_json::Value;

use crate::errors::{LinkgateError, Result};

/// Canonical plan limits for a workspace. Absent limits mean "leave the
/// current value alone", not "unlimited".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanLimits {
    pub workspace_id: String,
    pub max_clicks_limit: Option<i64>,
    pub max_links_limit: Option<i64>,
}

pub fn normalize_subscription_payload(payload: &Value) -> Result<PlanLimits> {
    let workspace_id = string_field(payload, &["workspaceId", "workspace_id"])
        .or_else(|| {
            payload
                .get("metadata")
                .and_then(|meta| string_field(meta, &["workspaceId", "workspace_id"]))
        })
        .ok_or_else(|| {
            LinkgateError::validation("subscription payload carries no workspace id")
        })?;

    let max_clicks_limit = int_field(payload, &["maxClicksLimit", "max_clicks_limit"])
        .or_else(|| payload.get("limits").and_then(|l| int_field(l, &["clicks"])));
    let max_links_limit = int_field(payload, &["maxLinksLimit", "max_links_limit"])
        .or_else(|| payload.get("limits").and_then(|l| int_field(l, &["links"])));

    Ok(PlanLimits {
        workspace_id,
        max_clicks_limit,
        max_links_limit,
    })
}

fn string_field(value: &Value, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| value.get(name))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Limits arrive as numbers or numeric strings depending on the hook
/// version.
fn int_field(value: &Value, names: &[&str]) -> Option<i64> {
    let field = names.iter().find_map(|name| value.get(name))?;
    match field {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
