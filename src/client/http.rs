//! HTTP implementation of the config source.
//!
//! # Responsibilities
//! - Build request URLs with percent-encoded path segments and queries
//! - Give each endpoint its own timeout; the notification request gets the long one
//! - Translate status codes and bodies into `FetchOutcome` / `FetchError`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

use crate::client::types::{
    fold_notifications, ConfigSnapshot, FetchError, FetchOutcome, NotificationEntry,
    NotificationRequest, ReleasedConfig, UncachedResponse,
};
use crate::client::ConfigSource;
use crate::config::AgentConfig;
use crate::sync::NamespaceTarget;

/// Errors building the HTTP source.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid host url '{host}': {reason}")]
    InvalidHost { host: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// `ConfigSource` backed by `reqwest`.
#[derive(Clone)]
pub struct HttpConfigSource {
    client: reqwest::Client,
    base: Url,
    ip: Option<String>,
    cached_timeout: Duration,
    notification_timeout: Duration,
    uncached_timeout: Duration,
}

impl HttpConfigSource {
    /// Create a source for the configured host.
    pub fn new(config: &AgentConfig) -> Result<Self, BuildError> {
        let base = Url::parse(config.host.trim()).map_err(|e| BuildError::InvalidHost {
            host: config.host.clone(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(BuildError::InvalidHost {
                host: config.host.clone(),
                reason: "not a base URL".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("lapollo-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base,
            ip: config.ip.clone().filter(|ip| !ip.is_empty()),
            cached_timeout: Duration::from_secs(config.polling.request_timeout_secs),
            notification_timeout: Duration::from_secs(config.long_polling.request_timeout_secs),
            uncached_timeout: Duration::from_secs(config.long_polling.fetch_timeout_secs),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn cached_url(&self, target: &NamespaceTarget) -> Url {
        let mut url = self.endpoint(&[
            "configfiles",
            "json",
            &target.app_id,
            &target.cluster,
            &target.namespace,
        ]);
        if let Some(ip) = &self.ip {
            url.query_pairs_mut().append_pair("ip", ip);
        }
        url
    }

    pub fn notifications_url(
        &self,
        target: &NamespaceTarget,
        notification_id: i64,
    ) -> Result<Url, FetchError> {
        let notifications = serde_json::to_string(&[NotificationRequest {
            namespace_name: &target.namespace,
            notification_id,
        }])?;

        let mut url = self.endpoint(&["notifications", "v2"]);
        url.query_pairs_mut()
            .append_pair("appId", &target.app_id)
            .append_pair("cluster", &target.cluster)
            .append_pair("notifications", &notifications);
        Ok(url)
    }

    pub fn uncached_url(&self, target: &NamespaceTarget, release_key: &str) -> Url {
        let mut url =
            self.endpoint(&["configs", &target.app_id, &target.cluster, &target.namespace]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("releaseKey", release_key);
            if let Some(ip) = &self.ip {
                query.append_pair("ip", ip);
            }
        }
        url
    }

    async fn get(&self, url: Url, timeout: Duration) -> Result<(StatusCode, Vec<u8>), FetchError> {
        tracing::trace!(url = %url, "GET");
        let response = self.client.get(url).timeout(timeout).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok((status, body.to_vec()))
    }
}

#[async_trait]
impl ConfigSource for HttpConfigSource {
    async fn fetch_cached(
        &self,
        target: &NamespaceTarget,
    ) -> Result<FetchOutcome<ConfigSnapshot>, FetchError> {
        let (status, body) = self.get(self.cached_url(target), self.cached_timeout).await?;
        if status != StatusCode::OK {
            return Ok(FetchOutcome::NotModified { status: status.as_u16() });
        }
        Ok(FetchOutcome::Updated(serde_json::from_slice(&body)?))
    }

    async fn fetch_notifications(
        &self,
        target: &NamespaceTarget,
        notification_id: i64,
    ) -> Result<FetchOutcome<i64>, FetchError> {
        let url = self.notifications_url(target, notification_id)?;
        let (status, body) = self.get(url, self.notification_timeout).await?;
        if status != StatusCode::OK {
            return Ok(FetchOutcome::NotModified { status: status.as_u16() });
        }

        let entries: Vec<NotificationEntry> = serde_json::from_slice(&body)?;
        match fold_notifications(&entries, &target.namespace) {
            Some(id) => Ok(FetchOutcome::Updated(id)),
            None => Err(FetchError::EmptyNotification(target.namespace.clone())),
        }
    }

    async fn fetch_uncached(
        &self,
        target: &NamespaceTarget,
        release_key: &str,
    ) -> Result<FetchOutcome<ReleasedConfig>, FetchError> {
        let (status, body) = self
            .get(self.uncached_url(target, release_key), self.uncached_timeout)
            .await?;
        if status != StatusCode::OK {
            return Ok(FetchOutcome::NotModified { status: status.as_u16() });
        }
        let body: UncachedResponse = serde_json::from_slice(&body)?;
        Ok(FetchOutcome::Updated(body.into()))
    }
}

impl std::fmt::Debug for HttpConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConfigSource")
            .field("base", &self.base.as_str())
            .field("ip", &self.ip)
            .field("cached_timeout", &self.cached_timeout)
            .field("notification_timeout", &self.notification_timeout)
            .field("uncached_timeout", &self.uncached_timeout)
            .finish()
    }
}
