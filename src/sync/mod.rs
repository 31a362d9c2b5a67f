//! Namespace synchronization subsystem.
//!
//! # Data Flow
//! ```text
//! Supervisor
//!     → one Synchronizer per NamespaceTarget (polling.rs or long_polling.rs)
//!     → ConfigSource fetch
//!     → env::materializer writes apollo.config.{namespace}
//!     → env::watcher observes the write
//! ```
//!
//! # Design Decisions
//! - Each synchronizer owns its target, cursor and backoff; nothing is shared
//! - Cancellation is checked at every suspension point (fetch, sleep)
//! - Failures stay inside the synchronizer that saw them

pub mod long_polling;
pub mod polling;
pub mod target;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::ConfigSource;
use crate::config::{AgentConfig, SyncMode};
use crate::resilience::Backoff;

pub use long_polling::{LongPollStep, LongPollingSynchronizer};
pub use polling::{PollStep, PollingSynchronizer};
pub use target::{app_targets, AppTarget, NamespaceTarget, SyncCursor};

/// A synchronizer in the mode selected by configuration.
pub enum Synchronizer {
    Polling(PollingSynchronizer),
    LongPolling(LongPollingSynchronizer),
}

impl Synchronizer {
    pub fn for_config(
        config: &AgentConfig,
        target: NamespaceTarget,
        source: Arc<dyn ConfigSource>,
    ) -> Self {
        let backoff = Backoff::new(&config.retries);
        match config.mode {
            SyncMode::Polling => Synchronizer::Polling(PollingSynchronizer::new(
                target,
                source,
                Duration::from_secs(config.polling.interval_secs),
                backoff,
            )),
            SyncMode::Hot => {
                Synchronizer::LongPolling(LongPollingSynchronizer::new(target, source, backoff))
            }
        }
    }

    /// Run until `token` is cancelled.
    pub async fn run(self, token: CancellationToken) {
        match self {
            Synchronizer::Polling(sync) => sync.run(token).await,
            Synchronizer::LongPolling(sync) => sync.run(token).await,
        }
    }
}

/// Sleep for `delay` unless cancelled first. Returns `false` on cancellation.
pub(crate) async fn sleep_or_cancel(delay: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
