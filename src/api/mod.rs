//! HTTP layer: middleware and request handlers.

pub mod middleware;
pub mod services;
