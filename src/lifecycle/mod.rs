//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config resolved → Supervisor::start → watch config file → wait
//!
//! Supervisor (supervisor.rs):
//!     initialize namespace files → spawn watchers → spawn synchronizers
//!     config change → cancel + join generation → start next generation
//!
//! Shutdown (shutdown.rs):
//!     Signal received → cancel root token → join every task → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGQUIT/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Trigger config reload
//! ```
//!
//! # Design Decisions
//! - Ordered startup: files first, then watchers, then synchronizers
//! - Shutdown is cooperative: every suspension point observes cancellation
//! - Shutdown waits for every task; panics are logged, not propagated

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod supervisor;

pub use shutdown::Shutdown;
pub use supervisor::{Supervisor, SupervisorError};
