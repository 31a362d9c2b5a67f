//! Long-polling ("hot") synchronizer.
//!
//! # State Machine
//! ```text
//! ┌──────────────┐  304          ┌──────────────┐
//! │ notification │──────────────▶│ loop at once │
//! │  (blocking)  │               └──────────────┘
//! └──────┬───────┘  error / other status → backoff, cursor unchanged
//!        │ 200, id
//!        ▼
//! ┌──────────────┐  error / status ≠ 200,304 → backoff, cursor unchanged
//! │   uncached   │
//! │ (releaseKey) │  304 → cursor.notification_id = id
//! └──────┬───────┘
//!        │ 200, (releaseKey', snapshot)
//!        ▼
//!   materialize → cursor = (id, releaseKey')
//! ```
//!
//! The cursor only moves after the change it acknowledges is on disk, so a
//! failed fetch is retried with the old cursor and no update is lost.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::client::{ConfigSource, FetchOutcome};
use crate::env::materializer;
use crate::observability::metrics::record_fetch;
use crate::resilience::Backoff;
use crate::sync::{sleep_or_cancel, NamespaceTarget, SyncCursor};

const NOT_MODIFIED: u16 = 304;

/// What one long-poll iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LongPollStep {
    /// Server reported no change before its timeout.
    NoChange,
    /// New configuration written; cursor advanced.
    Applied,
    /// Server says our release is current; only the notification id moved.
    AlreadyCurrent,
    /// Something failed; cursor unchanged.
    Failed,
}

pub struct LongPollingSynchronizer {
    target: NamespaceTarget,
    source: Arc<dyn ConfigSource>,
    cursor: SyncCursor,
    backoff: Backoff,
}

impl LongPollingSynchronizer {
    pub fn new(target: NamespaceTarget, source: Arc<dyn ConfigSource>, backoff: Backoff) -> Self {
        Self {
            target,
            source,
            cursor: SyncCursor::default(),
            backoff,
        }
    }

    pub fn cursor(&self) -> &SyncCursor {
        &self.cursor
    }

    /// One notification round trip, plus the uncached fetch if it reported
    /// a change. The cursor is only written at the very end, so dropping
    /// this future half way leaves it untouched.
    pub async fn step(&mut self) -> LongPollStep {
        let notification_id = match self
            .source
            .fetch_notifications(&self.target, self.cursor.notification_id)
            .await
        {
            Ok(FetchOutcome::Updated(id)) => {
                record_fetch("notification", "updated");
                id
            }
            Ok(FetchOutcome::NotModified { status: NOT_MODIFIED }) => {
                record_fetch("notification", "not_modified");
                return LongPollStep::NoChange;
            }
            Ok(FetchOutcome::NotModified { status }) => {
                record_fetch("notification", "rejected");
                tracing::warn!(status, "Notification request rejected");
                return LongPollStep::Failed;
            }
            Err(e) => {
                record_fetch("notification", e.label());
                tracing::warn!(error = %e, "Notification request failed");
                return LongPollStep::Failed;
            }
        };

        tracing::debug!(
            from = self.cursor.notification_id,
            to = notification_id,
            "Change notified, fetching configuration"
        );

        match self
            .source
            .fetch_uncached(&self.target, &self.cursor.release_key)
            .await
        {
            Ok(FetchOutcome::Updated(released)) => {
                record_fetch("uncached", "updated");
                let keys = released.configurations.len();
                let written = materializer::materialize_async(
                    self.target.directory.clone(),
                    self.target.namespace.clone(),
                    released.configurations,
                )
                .await;
                if let Err(e) = written {
                    tracing::error!(error = %e, "Failed to write namespace file");
                    return LongPollStep::Failed;
                }
                tracing::info!(
                    notification_id,
                    release_key = %released.release_key,
                    keys,
                    "Configuration applied"
                );
                self.cursor = std::mem::take(&mut self.cursor)
                    .advance(notification_id, Some(released.release_key));
                LongPollStep::Applied
            }
            Ok(FetchOutcome::NotModified { status: NOT_MODIFIED }) => {
                record_fetch("uncached", "not_modified");
                self.cursor = std::mem::take(&mut self.cursor).advance(notification_id, None);
                LongPollStep::AlreadyCurrent
            }
            Ok(FetchOutcome::NotModified { status }) => {
                record_fetch("uncached", "rejected");
                tracing::warn!(status, "Configuration fetch rejected, cursor kept");
                LongPollStep::Failed
            }
            Err(e) => {
                record_fetch("uncached", e.label());
                tracing::warn!(error = %e, "Configuration fetch failed, cursor kept");
                LongPollStep::Failed
            }
        }
    }

    /// Run until `token` is cancelled.
    pub async fn run(mut self, token: CancellationToken) {
        let span = tracing::info_span!(
            "long_polling",
            app_id = %self.target.app_id,
            namespace = %self.target.namespace
        );

        async move {
            tracing::info!("Long-polling synchronizer started");
            while !token.is_cancelled() {
                let step = tokio::select! {
                    _ = token.cancelled() => break,
                    step = self.step() => step,
                };

                match step {
                    LongPollStep::NoChange => {}
                    LongPollStep::Applied | LongPollStep::AlreadyCurrent => self.backoff.reset(),
                    LongPollStep::Failed => {
                        let delay = self.backoff.next_delay();
                        tracing::debug!(delay_ms = delay.as_millis() as u64, "Backing off");
                        if !sleep_or_cancel(delay, &token).await {
                            break;
                        }
                    }
                }
            }
            tracing::info!(
                notification_id = self.cursor.notification_id,
                release_key = %self.cursor.release_key,
                "Long-polling synchronizer stopped"
            );
        }
        .instrument(span)
        .await
    }
}
