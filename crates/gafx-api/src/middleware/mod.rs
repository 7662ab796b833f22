//! # HTTP Middleware
//!
//! Request metrics live here; authentication is in [`crate::auth`] and
//! request tracing uses `tower_http::trace::TraceLayer` directly.

pub mod metrics;
