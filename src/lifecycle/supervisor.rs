//! Task supervision.
//!
//! A generation is every task started for one configuration: a
//! synchronizer per (app, namespace) and a change watcher per app, all
//! under one cancellation token. Generations never overlap; the old one is
//! cancelled and joined before the next is started, so two synchronizers
//! never write the same namespace file.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures_util::future::join_all;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::client::http::BuildError;
use crate::client::{ConfigSource, HttpConfigSource};
use crate::config::AgentConfig;
use crate::env::materializer::{self, MaterializeError};
use crate::env::{ChangeWatcher, ProcessManager, Reloader, Supervisorctl, WatchError};
use crate::sync::{app_targets, Synchronizer};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to build config server client: {0}")]
    Source(#[from] BuildError),

    #[error("failed to initialize namespace file: {0}")]
    Initialize(#[from] MaterializeError),

    #[error(transparent)]
    Watch(#[from] WatchError),
}

type SourceFactory =
    dyn Fn(&AgentConfig) -> Result<Arc<dyn ConfigSource>, BuildError> + Send + Sync;

struct Generation {
    token: CancellationToken,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Generation {
    async fn stop(self) {
        self.token.cancel();
        let (names, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        for (name, result) in names.into_iter().zip(join_all(handles).await) {
            if let Err(e) = result {
                log_join_error(&name, e);
            }
        }
    }
}

/// Owns the running generation and the configuration it was built from.
pub struct Supervisor {
    config: Arc<ArcSwap<AgentConfig>>,
    root: CancellationToken,
    source_factory: Box<SourceFactory>,
    manager: Option<Arc<dyn ProcessManager>>,
    generation: Option<Generation>,
}

impl Supervisor {
    /// Generations run under children of `root`.
    pub fn new(config: AgentConfig, root: CancellationToken) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            root,
            source_factory: Box::new(|config: &AgentConfig| {
                let source: Arc<dyn ConfigSource> = Arc::new(HttpConfigSource::new(config)?);
                Ok(source)
            }),
            manager: None,
            generation: None,
        }
    }

    /// Build the config source for each generation with `factory` instead of HTTP.
    pub fn with_source_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&AgentConfig) -> Result<Arc<dyn ConfigSource>, BuildError> + Send + Sync + 'static,
    {
        self.source_factory = Box::new(factory);
        self
    }

    /// Use `manager` instead of `supervisorctl` from the configuration.
    pub fn with_process_manager(mut self, manager: Arc<dyn ProcessManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    /// The configuration of the current generation.
    pub fn config(&self) -> Arc<AgentConfig> {
        self.config.load_full()
    }

    pub fn task_count(&self) -> usize {
        self.generation.as_ref().map_or(0, |g| g.tasks.len())
    }

    /// Start a generation for the current configuration, stopping any
    /// generation already running first.
    ///
    /// Namespace files are reset to empty before the watchers exist, so the
    /// reset itself never rewrites an environment file. On error nothing of
    /// the new generation is left running.
    pub async fn start(&mut self) -> Result<(), SupervisorError> {
        if let Some(previous) = self.generation.take() {
            previous.stop().await;
        }

        let config = self.config.load_full();
        let source = (self.source_factory)(&config)?;
        let apps = app_targets(&config);

        for app in &apps {
            for namespace in &app.namespaces {
                materializer::initialize(&app.directory, namespace)?;
            }
        }

        let manager = match &self.manager {
            Some(manager) => manager.clone(),
            None => Arc::new(Supervisorctl::new(&config.reload)),
        };
        let reloader = Arc::new(Reloader::new(manager));
        let debounce = Duration::from_millis(config.reload.debounce_ms);

        let mut generation = Generation {
            token: self.root.child_token(),
            tasks: Vec::new(),
        };

        for app in &apps {
            let watcher = ChangeWatcher::new(app.clone(), reloader.clone(), debounce);
            match watcher.spawn(generation.token.clone()) {
                Ok(handle) => generation.tasks.push((format!("watcher {}", app.app_id), handle)),
                Err(e) => {
                    generation.stop().await;
                    return Err(e.into());
                }
            }
        }

        for app in &apps {
            for target in app.namespace_targets(&config.cluster) {
                let name = target.to_string();
                let synchronizer = Synchronizer::for_config(&config, target, source.clone());
                let handle = tokio::spawn(synchronizer.run(generation.token.clone()));
                generation.tasks.push((name, handle));
            }
        }

        tracing::info!(
            mode = %config.mode,
            apps = apps.len(),
            tasks = generation.tasks.len(),
            "Generation started"
        );
        self.generation = Some(generation);
        Ok(())
    }

    /// Replace the configuration and restart every task.
    ///
    /// If the new configuration cannot be started, the previous one is
    /// restored and started again before the error is returned.
    pub async fn rebuild(&mut self, config: AgentConfig) -> Result<(), SupervisorError> {
        let previous = self.config.swap(Arc::new(config));
        tracing::info!("Rebuilding tasks for new configuration");

        match self.start().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "New configuration failed to start, restoring previous"
                );
                self.config.store(previous);
                if let Err(restore) = self.start().await {
                    tracing::error!(error = %restore, "Previous configuration failed to start");
                }
                Err(e)
            }
        }
    }

    /// Cancel the running generation and wait for every task to return.
    pub async fn shutdown(&mut self) {
        if let Some(generation) = self.generation.take() {
            let tasks = generation.tasks.len();
            generation.stop().await;
            tracing::info!(tasks, "All tasks stopped");
        }
    }
}

fn log_join_error(name: &str, error: JoinError) {
    if error.is_panic() {
        let payload = panic_message(error.into_panic());
        tracing::error!(task = name, panic = %payload, "Task panicked");
    } else {
        tracing::warn!(task = name, "Task was aborted");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
