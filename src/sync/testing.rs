//! Scripted `ConfigSource` for synchronizer tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{ConfigSnapshot, ConfigSource, FetchError, FetchOutcome, ReleasedConfig};
use crate::sync::NamespaceTarget;

type Scripted<T> = Mutex<VecDeque<Result<FetchOutcome<T>, FetchError>>>;

/// Replays queued responses in order. An exhausted queue blocks forever,
/// like a long poll the server never answers.
#[derive(Default)]
pub struct ScriptedSource {
    cached: Scripted<ConfigSnapshot>,
    notifications: Scripted<i64>,
    uncached: Scripted<ReleasedConfig>,
    pub notification_ids_seen: Mutex<Vec<i64>>,
    pub release_keys_seen: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn push_cached(&self, response: Result<FetchOutcome<ConfigSnapshot>, FetchError>) {
        self.cached.lock().unwrap().push_back(response);
    }

    pub fn push_notification(&self, response: Result<FetchOutcome<i64>, FetchError>) {
        self.notifications.lock().unwrap().push_back(response);
    }

    pub fn push_uncached(&self, response: Result<FetchOutcome<ReleasedConfig>, FetchError>) {
        self.uncached.lock().unwrap().push_back(response);
    }

    async fn next<T>(queue: &Scripted<T>) -> Result<FetchOutcome<T>, FetchError> {
        let next = queue.lock().unwrap().pop_front();
        match next {
            Some(response) => response,
            None => std::future::pending().await,
        }
    }
}

#[async_trait]
impl ConfigSource for ScriptedSource {
    async fn fetch_cached(
        &self,
        _target: &NamespaceTarget,
    ) -> Result<FetchOutcome<ConfigSnapshot>, FetchError> {
        Self::next(&self.cached).await
    }

    async fn fetch_notifications(
        &self,
        _target: &NamespaceTarget,
        notification_id: i64,
    ) -> Result<FetchOutcome<i64>, FetchError> {
        self.notification_ids_seen.lock().unwrap().push(notification_id);
        Self::next(&self.notifications).await
    }

    async fn fetch_uncached(
        &self,
        _target: &NamespaceTarget,
        release_key: &str,
    ) -> Result<FetchOutcome<ReleasedConfig>, FetchError> {
        self.release_keys_seen.lock().unwrap().push(release_key.to_string());
        Self::next(&self.uncached).await
    }
}

pub fn snapshot(pairs: &[(&str, &str)]) -> ConfigSnapshot {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

pub fn released(release_key: &str, pairs: &[(&str, &str)]) -> ReleasedConfig {
    ReleasedConfig {
        release_key: release_key.to_string(),
        configurations: snapshot(pairs),
    }
}

pub fn target(directory: &std::path::Path, namespace: &str) -> NamespaceTarget {
    NamespaceTarget {
        app_id: "shop".into(),
        cluster: "default".into(),
        namespace: namespace.into(),
        directory: directory.to_path_buf(),
    }
}
