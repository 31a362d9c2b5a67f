//! Startup orchestration.
//!
//! # Responsibilities
//! - Start the first generation of tasks
//! - Watch the configuration file when there is one
//! - React to signals and configuration changes until told to stop
//!
//! # Design Decisions
//! - Fail fast: an error starting the first generation is fatal
//! - A bad configuration change is logged and the running one kept

use std::path::Path;

use tokio::sync::mpsc;

use crate::config::watcher::ConfigWatcher;
use crate::config::{load_config, AgentConfig, ConfigOrigin};
use crate::lifecycle::signals::{Signal, Signals};
use crate::lifecycle::supervisor::Supervisor;
use crate::lifecycle::Shutdown;

/// Run the agent until a termination signal.
pub async fn run(
    config: AgentConfig,
    origin: ConfigOrigin,
) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = Shutdown::new();
    let mut supervisor = Supervisor::new(config, shutdown.token());
    supervisor.start().await?;

    let config_path = match &origin {
        ConfigOrigin::File(path) => Some(path.clone()),
        ConfigOrigin::Environment => None,
    };

    // The notify handle stops watching when dropped.
    let mut _watch_guard = None;
    let mut updates = None;
    if let Some(path) = &config_path {
        let (watcher, rx) = ConfigWatcher::new(path);
        match watcher.run() {
            Ok(guard) => {
                _watch_guard = Some(guard);
                updates = Some(rx);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Config file watch unavailable, use SIGHUP to reload")
            }
        }
    }

    let mut signals = Signals::new()?;
    tracing::info!("Agent running");

    loop {
        tokio::select! {
            signal = signals.recv() => match signal {
                Signal::Terminate => break,
                Signal::Reload => match &config_path {
                    Some(path) => reload_from(&mut supervisor, path).await,
                    None => {
                        tracing::info!("Configuration came from the environment, nothing to reload")
                    }
                },
            },
            update = next_update(&mut updates) => match update {
                Some(config) => apply(&mut supervisor, config).await,
                None => updates = None,
            },
        }
    }

    tracing::info!("Shutting down");
    shutdown.trigger();
    supervisor.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn next_update(
    updates: &mut Option<mpsc::UnboundedReceiver<AgentConfig>>,
) -> Option<AgentConfig> {
    match updates {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn reload_from(supervisor: &mut Supervisor, path: &Path) {
    match load_config(path) {
        Ok(config) => apply(supervisor, config).await,
        Err(e) => tracing::error!(
            error = %e,
            "Failed to reload config. Keeping current configuration."
        ),
    }
}

async fn apply(supervisor: &mut Supervisor, config: AgentConfig) {
    if *supervisor.config() == config {
        tracing::debug!("Configuration unchanged");
        return;
    }
    if let Err(e) = supervisor.rebuild(config).await {
        tracing::error!(error = %e, "Configuration change rejected");
    }
}
