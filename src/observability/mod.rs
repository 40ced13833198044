//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields (logging.rs installs the subscriber)
//!     → metrics facade counters and gauges (metrics.rs)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → GET /metrics on the hub (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - The library never requires a subscriber or recorder; both are opt-in
//! - Metric updates are facade calls, cheap when no recorder is installed
//! - Names are centralised here so dashboards have one source of truth

pub mod logging;
pub mod metrics;
