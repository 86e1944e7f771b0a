//! Structured logging is used directly via `tracing` throughout the crate;
//! this module only carries the optional metrics facade.

pub mod metrics;
