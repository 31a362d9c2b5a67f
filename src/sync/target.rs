//! Synchronization units and per-namespace protocol state.

use std::fmt;
use std::path::PathBuf;

use crate::config::{AgentConfig, AppConfig};

/// One (application, namespace) pair and the directory it is written to.
///
/// At most one running synchronizer exists per target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespaceTarget {
    pub app_id: String,
    pub cluster: String,
    pub namespace: String,
    pub directory: PathBuf,
}

impl fmt::Display for NamespaceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.app_id, self.cluster, self.namespace)
    }
}

/// One application's merge unit: its namespace files and environment file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppTarget {
    pub app_id: String,
    pub directory: PathBuf,
    pub env_file: PathBuf,
    /// Merge order.
    pub namespaces: Vec<String>,
}

impl AppTarget {
    pub fn from_config(app: &AppConfig) -> Self {
        Self {
            app_id: app.app_id.clone(),
            directory: app.directory(),
            env_file: app.env_file().to_path_buf(),
            namespaces: app.namespaces.clone(),
        }
    }

    pub fn namespace_targets(&self, cluster: &str) -> Vec<NamespaceTarget> {
        self.namespaces
            .iter()
            .map(|namespace| NamespaceTarget {
                app_id: self.app_id.clone(),
                cluster: cluster.to_string(),
                namespace: namespace.clone(),
                directory: self.directory.clone(),
            })
            .collect()
    }
}

/// Every application in the configuration, in declaration order.
pub fn app_targets(config: &AgentConfig) -> Vec<AppTarget> {
    config.apps.iter().map(AppTarget::from_config).collect()
}

/// Long-polling position of one namespace. Owned by its synchronizer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncCursor {
    pub notification_id: i64,
    pub release_key: String,
}

impl SyncCursor {
    /// The cursor after a notification and its uncached fetch both succeeded.
    pub fn advance(self, notification_id: i64, release_key: Option<String>) -> Self {
        Self {
            notification_id,
            release_key: release_key.unwrap_or(self.release_key),
        }
    }
}
