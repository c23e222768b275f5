//! Domain services over the storage layer.

pub mod domains;
pub mod plans;
pub mod resolver;
pub mod usage;

pub use domains::DomainGate;
pub use plans::{PlanLimits, normalize_subscription_payload};
pub use resolver::{
    LinkResolver, RedirectDecision, Resolution, TEMP_REDIRECT_SUFFIX, split_temp_marker,
};
pub use usage::UsageService;
