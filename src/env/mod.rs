//! Environment file subsystem.
//!
//! # Data Flow
//! ```text
//! Synchronizer
//!     → materializer.rs: {app_dir}/apollo.config.{namespace} (temp file + rename)
//!     → watcher.rs: notify event on app_dir, filtered & debounced
//!     → reloader.rs: lock app → merge namespaces in order → write env file
//!     → ProcessManager::reload (supervisorctl, if its socket exists)
//! ```
//!
//! # Design Decisions
//! - Every write is all-or-nothing from a reader's point of view
//! - The reloader always re-reads every namespace file
//! - A missing process manager is normal, not an error

pub mod materializer;
pub mod reloader;
pub mod watcher;

pub use materializer::{materialize, namespace_file, render, MaterializeError};
pub use reloader::{
    ProcessManager, ReloadError, ReloadOutcome, ReloadReport, Reloader, Supervisorctl,
};
pub use watcher::{ChangeWatcher, WatchError};
