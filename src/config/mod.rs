//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! --config file (TOML/YAML) | APOLLO_* env | ~/.lapollo/app.yaml | ./app.yaml
//!     → loader.rs (discover, parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AgentConfig (validated, immutable)
//!     → handed to the Supervisor, which injects it into each task
//!
//! On change (file watcher or SIGHUP):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → Supervisor tears down the running generation and starts a new one
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full rebuild
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{discover, load_config, ConfigError, ConfigOrigin};
pub use schema::AgentConfig;
pub use schema::AppConfig;
pub use schema::SyncMode;
pub use schema::{LoggingConfig, ObservabilityConfig, ReloadConfig, RetryConfig};
