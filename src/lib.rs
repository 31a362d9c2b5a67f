//! Apollo configuration sync agent library.

pub mod client;
pub mod config;
pub mod env;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod sync;

pub use config::schema::AgentConfig;
pub use lifecycle::{Shutdown, Supervisor};
