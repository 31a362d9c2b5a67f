//! Configuration file watcher for hot reload.
//!
//! Editors tend to produce several events per save (truncate, write,
//! rename), so events are coalesced for `debounce` before the file is
//! loaded. Only configurations that validate and differ from the last one
//! forwarded are sent on.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::AgentConfig;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// A watcher that monitors the agent's own configuration file.
pub struct ConfigWatcher {
    path: PathBuf,
    debounce: Duration,
    update_tx: mpsc::UnboundedSender<AgentConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<AgentConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            debounce: DEFAULT_DEBOUNCE,
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. The returned handle must be kept alive; dropping it
    /// stops the watch and ends the forwarding task.
    ///
    /// The parent directory is watched so editors that replace the file by
    /// rename are still observed.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let file_name = self.path.file_name().map(|n| n.to_os_string());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if touches(&event, file_name.as_ref()) => {
                    let _ = event_tx.send(());
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default(),
        )?;

        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %self.path.display(), "Config watcher started");
        tokio::spawn(forward_changes(self.path, self.debounce, event_rx, self.update_tx));
        Ok(watcher)
    }
}

fn touches(event: &Event, file_name: Option<&OsString>) -> bool {
    (event.kind.is_modify() || event.kind.is_create())
        && event
            .paths
            .iter()
            .any(|p| p.file_name().map(|n| n.to_os_string()).as_ref() == file_name)
}

/// Load `path` after each burst of change notifications and forward the
/// result if it differs from the previous one.
async fn forward_changes(
    path: PathBuf,
    debounce: Duration,
    mut events: mpsc::UnboundedReceiver<()>,
    updates: mpsc::UnboundedSender<AgentConfig>,
) {
    let mut last: Option<AgentConfig> = None;

    while events.recv().await.is_some() {
        // Quiet period: keep absorbing until nothing arrives for `debounce`.
        loop {
            match tokio::time::timeout(debounce, events.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        match load_config(&path) {
            Ok(config) if last.as_ref() == Some(&config) => {
                tracing::debug!(path = %path.display(), "Config file touched but unchanged");
            }
            Ok(config) => {
                tracing::info!(path = %path.display(), "Config file changed");
                last = Some(config.clone());
                if updates.send(config).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Failed to reload config. Keeping current configuration."
                );
            }
        }
    }
}
