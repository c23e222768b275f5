//! Edge routing: hostname/path classification.

mod classifier;

pub use classifier::{Classifier, RouteIntent, is_static_asset};
