//! Polling synchronizer.
//!
//! Fetches the cached namespace configuration every `interval` and
//! materializes it. A rejected request leaves the previous file in place.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::client::{ConfigSource, FetchOutcome};
use crate::env::materializer;
use crate::observability::metrics::record_fetch;
use crate::resilience::Backoff;
use crate::sync::{sleep_or_cancel, NamespaceTarget};

/// What one polling iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    Written,
    /// Non-200 answer; nothing written.
    Skipped,
    /// Fetch or write failed; retry after backoff.
    Failed,
}

pub struct PollingSynchronizer {
    target: NamespaceTarget,
    source: Arc<dyn ConfigSource>,
    interval: Duration,
    backoff: Backoff,
}

impl PollingSynchronizer {
    pub fn new(
        target: NamespaceTarget,
        source: Arc<dyn ConfigSource>,
        interval: Duration,
        backoff: Backoff,
    ) -> Self {
        Self {
            target,
            source,
            interval,
            backoff,
        }
    }

    /// Fetch once and materialize the result.
    pub async fn poll_once(&mut self) -> PollStep {
        match self.source.fetch_cached(&self.target).await {
            Ok(FetchOutcome::Updated(snapshot)) => {
                record_fetch("polling", "updated");
                let written = materializer::materialize_async(
                    self.target.directory.clone(),
                    self.target.namespace.clone(),
                    snapshot,
                )
                .await;
                match written {
                    Ok(_) => {
                        self.backoff.reset();
                        PollStep::Written
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to write namespace file");
                        PollStep::Failed
                    }
                }
            }
            Ok(FetchOutcome::NotModified { status }) => {
                record_fetch("polling", "rejected");
                tracing::warn!(status, "Config server answered non-200, keeping previous file");
                PollStep::Skipped
            }
            Err(e) => {
                record_fetch("polling", e.label());
                if e.is_transient() {
                    tracing::warn!(
                        error = %e,
                        attempt = self.backoff.attempts() + 1,
                        "Fetch failed, will retry"
                    );
                } else {
                    tracing::error!(error = %e, "Discarding malformed response");
                }
                PollStep::Failed
            }
        }
    }

    /// Run until `token` is cancelled.
    pub async fn run(mut self, token: CancellationToken) {
        let span = tracing::info_span!(
            "polling",
            app_id = %self.target.app_id,
            namespace = %self.target.namespace
        );

        async move {
            tracing::info!(interval_secs = self.interval.as_secs(), "Polling synchronizer started");
            while !token.is_cancelled() {
                let step = tokio::select! {
                    _ = token.cancelled() => break,
                    step = self.poll_once() => step,
                };

                let delay = match step {
                    PollStep::Written | PollStep::Skipped => self.interval,
                    PollStep::Failed => self.backoff.next_delay().min(self.interval),
                };
                if !sleep_or_cancel(delay, &token).await {
                    break;
                }
            }
            tracing::info!("Polling synchronizer stopped");
        }
        .instrument(span)
        .await
    }
}
