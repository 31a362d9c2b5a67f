//! Remote config source.
//!
//! # Endpoints
//! ```text
//! fetch_cached        GET {host}/configfiles/json/{appId}/{cluster}/{namespace}[?ip=]
//! fetch_notifications GET {host}/notifications/v2?appId=&cluster=&notifications=[...]
//! fetch_uncached      GET {host}/configs/{appId}/{cluster}/{namespace}?releaseKey=[&ip=]
//! ```
//!
//! # Design Decisions
//! - Synchronizers depend on the `ConfigSource` trait, never on HTTP directly
//! - Non-200 answers are values (`FetchOutcome::NotModified`), not errors
//! - No error here terminates the process; the caller decides to skip or back off

pub mod http;
pub mod types;

use async_trait::async_trait;

use crate::sync::NamespaceTarget;

pub use http::HttpConfigSource;
pub use types::{ConfigSnapshot, FetchError, FetchOutcome, ReleasedConfig};

/// The three logical operations of the remote config service.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Full namespace configuration from the server-side cache.
    async fn fetch_cached(
        &self,
        target: &NamespaceTarget,
    ) -> Result<FetchOutcome<ConfigSnapshot>, FetchError>;

    /// Blocks until the namespace changes past `notification_id` or the
    /// server times the request out. Returns the new notification id.
    async fn fetch_notifications(
        &self,
        target: &NamespaceTarget,
        notification_id: i64,
    ) -> Result<FetchOutcome<i64>, FetchError>;

    /// Authoritative configuration, bypassing the server cache.
    async fn fetch_uncached(
        &self,
        target: &NamespaceTarget,
        release_key: &str,
    ) -> Result<FetchOutcome<ReleasedConfig>, FetchError>;
}
