//! System-level concerns: logging initialization.

pub mod logging;
