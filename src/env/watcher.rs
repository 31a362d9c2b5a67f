//! Namespace file change watcher.
//!
//! # Responsibilities
//! - Observe an application's directory for writes to its namespace files
//! - Coalesce bursts of events into a single `Reloader` call
//!
//! # Design Decisions
//! - The directory is watched rather than each file: atomic replacement
//!   swaps the inode, which would silently drop a per-file watch
//! - A burst ends after `debounce` of quiet, or at `debounce * MAX_DEBOUNCE_FACTOR`
//!   after its first event, so a steady stream cannot starve reloads

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::env::materializer::namespace_file;
use crate::env::reloader::{ReloadReport, Reloader};
use crate::sync::AppTarget;

const MAX_DEBOUNCE_FACTOR: u32 = 10;

/// Errors establishing a watch.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Triggers a reload of one application when its namespace files change.
pub struct ChangeWatcher {
    app: AppTarget,
    reloader: Arc<Reloader>,
    debounce: Duration,
    watched: HashSet<OsString>,
}

impl ChangeWatcher {
    pub fn new(app: AppTarget, reloader: Arc<Reloader>, debounce: Duration) -> Self {
        let watched = app
            .namespaces
            .iter()
            .filter_map(|ns| {
                namespace_file(&app.directory, ns)
                    .file_name()
                    .map(|n| n.to_os_string())
            })
            .collect();
        Self {
            app,
            reloader,
            debounce,
            watched,
        }
    }

    /// Establish the watch and spawn the event loop.
    ///
    /// Failing to establish the watch is returned to the caller; the loop
    /// itself ends on cancellation or when the event stream closes.
    pub fn spawn(self, token: CancellationToken) -> Result<JoinHandle<()>, WatchError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let directory = self.app.directory.clone();
        let watch_error = |source| WatchError::Watch {
            path: directory.clone(),
            source,
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .map_err(watch_error)?;
        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(watch_error)?;

        tracing::info!(
            app_id = %self.app.app_id,
            directory = %directory.display(),
            "Watching namespace files"
        );

        Ok(tokio::spawn(async move {
            // Dropping the watcher closes the channel, so it lives as long as the loop.
            let _watcher = watcher;
            self.run(rx, token).await;
        }))
    }

    fn is_relevant(&self, event: &Event) -> bool {
        (event.kind.is_modify() || event.kind.is_create())
            && event
                .paths
                .iter()
                .any(|p| p.file_name().is_some_and(|n| self.watched.contains(n)))
    }

    /// Event loop over an already established event stream.
    pub async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = events.recv() => match event {
                    None => {
                        tracing::warn!(app_id = %self.app.app_id, "Watch event stream closed");
                        break;
                    }
                    Some(Ok(event)) if self.is_relevant(&event) => {
                        tracing::debug!(
                            app_id = %self.app.app_id,
                            kind = ?event.kind,
                            paths = ?event.paths,
                            "Namespace file changed"
                        );
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::error!(app_id = %self.app.app_id, error = %e, "Watch error");
                        continue;
                    }
                },
            }

            let closed = match self.absorb_burst(&mut events, &token).await {
                Some(closed) => closed,
                None => break,
            };

            self.reload().await;

            if closed {
                tracing::warn!(app_id = %self.app.app_id, "Watch event stream closed");
                break;
            }
        }
        tracing::debug!(app_id = %self.app.app_id, "Change watcher stopped");
    }

    /// Swallow events until the burst is over. Returns whether the stream
    /// closed meanwhile, or `None` on cancellation.
    async fn absorb_burst(
        &self,
        events: &mut mpsc::UnboundedReceiver<notify::Result<Event>>,
        token: &CancellationToken,
    ) -> Option<bool> {
        let started = Instant::now();
        let hard_deadline = started + self.debounce * MAX_DEBOUNCE_FACTOR;
        let mut quiet_deadline = started + self.debounce;

        loop {
            tokio::select! {
                _ = token.cancelled() => return None,
                _ = sleep_until(quiet_deadline.min(hard_deadline)) => return Some(false),
                event = events.recv() => match event {
                    None => return Some(true),
                    Some(Ok(event)) if self.is_relevant(&event) => {
                        quiet_deadline = Instant::now() + self.debounce;
                    }
                    Some(_) => {}
                },
            }
        }
    }

    async fn reload(&self) {
        match self.reloader.reload(&self.app).await {
            Ok(ReloadReport::Written(outcome)) => {
                tracing::info!(
                    app_id = %self.app.app_id,
                    outcome = ?outcome,
                    "Environment reloaded"
                );
            }
            Ok(ReloadReport::Unchanged) => {}
            Err(e) => {
                tracing::error!(app_id = %self.app.app_id, error = %e, "Environment reload failed");
            }
        }
    }
}
