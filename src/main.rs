//! Apollo configuration sync agent.
//!
//! Keeps `apollo.config.{namespace}` files in sync with an Apollo config
//! server and rebuilds each application's `.env` from them, asking the
//! process manager to reload whenever the result changes.
//!
//! # Architecture Overview
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────────────────┐
//!  │                              AGENT                                   │
//!  │                                                                      │
//!  │  ┌────────────┐   one task per (app, namespace)                      │
//!  │  │ supervisor │────────────┐                                         │
//!  │  └─────┬──────┘            ▼                                         │
//!  │        │          ┌─────────────────┐   GET   ┌──────────────────┐   │
//!  │        │          │  synchronizer   │────────▶│  config server   │   │
//!  │        │          │ polling / hot   │◀────────│ (client::http)   │   │
//!  │        │          └────────┬────────┘         └──────────────────┘   │
//!  │        │                   │ atomic write                            │
//!  │        │                   ▼                                         │
//!  │        │          apollo.config.{namespace}                          │
//!  │        │                   │ notify event                            │
//!  │        ▼                   ▼                                         │
//!  │  ┌────────────┐   ┌─────────────────┐   merge   ┌──────┐             │
//!  │  │ change     │──▶│    reloader     │──────────▶│ .env │             │
//!  │  │ watcher    │   │ (mutex per app) │           └──────┘             │
//!  │  └────────────┘   └────────┬────────┘                                │
//!  │                            └──────▶ supervisorctl reload             │
//!  └──────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use lapollo_agent::config::{discover, ConfigOrigin};
use lapollo_agent::lifecycle::startup;
use lapollo_agent::observability::{logging, metrics};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "lapollo-agent")]
#[command(
    about = "Sync Apollo namespaces into .env files and reload supervisord",
    long_about = None
)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Configuration file (TOML or YAML). Without it, APOLLO_* variables,
    /// then ~/.lapollo/app.yaml, then app.yaml beside the binary are tried.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,

    /// Print version and build information.
    #[arg(short = 'V', long)]
    version: bool,
}

fn long_version() -> String {
    let mut version = VERSION.to_string();
    for (label, value) in [
        ("branch", option_env!("LAPOLLO_GIT_BRANCH")),
        ("commit", option_env!("LAPOLLO_GIT_COMMIT")),
        ("built", option_env!("LAPOLLO_BUILD_TIME")),
    ] {
        if let Some(value) = value {
            version.push_str(&format!("\n{}: {}", label, value));
        }
    }
    version
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    if cli.version {
        println!("lapollo-agent {}", long_version());
        return Ok(());
    }

    let (config, origin) = discover(cli.config.as_deref())?;

    if cli.check {
        match &origin {
            ConfigOrigin::File(path) => println!("{}: configuration OK", path.display()),
            ConfigOrigin::Environment => println!("environment: configuration OK"),
        }
        return Ok(());
    }

    let _log_guard = logging::init(&config.logging);

    tracing::info!(version = VERSION, "lapollo-agent starting");
    tracing::info!(
        origin = ?origin,
        cluster = %config.cluster,
        mode = %config.mode,
        host = %config.host,
        apps = config.apps.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    startup::run(config, origin).await
}
