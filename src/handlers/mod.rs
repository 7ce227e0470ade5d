//! HTTP endpoint handlers for the exporter.
//!
//! This module provides handlers for all HTTP endpoints:
//! - metrics path (default `/metrics`): Prometheus metrics endpoint
//! - `/health`: Health check endpoint
//! - `/`: Landing page

pub mod health;
pub mod metrics;
pub mod root;

// Re-export handlers
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use root::root_handler;
