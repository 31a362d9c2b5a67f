//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, spans per synchronizer)
//!     → metrics.rs (counters)
//!
//! Consumers:
//!     → stdout and daily log files
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields (app_id, namespace) instead of formatted messages
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
