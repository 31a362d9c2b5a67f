//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Fetch from the config server:
//!     → success: backoff resets
//!     → transport/decode failure or rejected status: backoff.rs picks the delay
//!     → the synchronizer sleeps (cancellably) and retries with its old cursor
//! ```
//!
//! # Design Decisions
//! - No failure of one namespace affects another; each synchronizer owns its backoff
//! - Jittered backoff keeps namespaces from retrying in lockstep
//! - Delays are capped well below the server's long-poll hold time

pub mod backoff;

pub use backoff::{calculate_backoff, Backoff};
