//! Retry worker.
//!
//! Polls the `delivery_task` table and re-delivers tasks whose backoff has
//! expired. Tasks for the same object and inbox leave strictly oldest first:
//! a task is held back while an earlier one for the pair is still pending.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fedigraph_common::{AppResult, RetrySettings};
use fedigraph_db::{entities::delivery_task, repositories::DeliveryTaskRepository};
use fedigraph_federation::{ActivityTransport, DeliveryError};
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::retry::RetryConfig;

const DEFAULT_BATCH_SIZE: u64 = 100;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// What one polling pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryRunSummary {
    /// Tasks delivered and removed.
    pub delivered: usize,
    /// Tasks that failed again and were pushed back.
    pub rescheduled: usize,
    /// Tasks given up on.
    pub dead: usize,
    /// Due tasks held back behind an older pending task.
    pub waiting: usize,
}

/// Re-delivers queued tasks with exponential backoff.
#[derive(Clone)]
pub struct RetryWorker {
    tasks: DeliveryTaskRepository,
    transport: Arc<dyn ActivityTransport>,
    config: RetryConfig,
    batch_size: u64,
    poll_interval: Duration,
}

impl RetryWorker {
    /// Create a worker with the default batch size and poll interval.
    #[must_use]
    pub fn new(
        tasks: DeliveryTaskRepository,
        transport: Arc<dyn ActivityTransport>,
        config: RetryConfig,
    ) -> Self {
        Self {
            tasks,
            transport,
            config,
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Create a worker from the `[retry]` settings.
    #[must_use]
    pub fn from_settings(
        tasks: DeliveryTaskRepository,
        transport: Arc<dyn ActivityTransport>,
        settings: &RetrySettings,
    ) -> Self {
        Self::new(tasks, transport, RetryConfig::from(settings))
            .with_batch_size(settings.batch_size)
            .with_poll_interval(Duration::from_secs(settings.poll_interval_secs))
    }

    /// Maximum number of tasks loaded per pass.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Poll until `shutdown` turns true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            batch_size = self.batch_size,
            "Retry worker started"
        );
        let mut ticker = interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(summary) if summary != RetryRunSummary::default() => {
                            info!(
                                delivered = summary.delivered,
                                rescheduled = summary.rescheduled,
                                dead = summary.dead,
                                waiting = summary.waiting,
                                "Retry pass finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Retry pass failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Retry worker stopped");
    }

    /// Process every task that is due now.
    pub async fn run_once(&self) -> AppResult<RetryRunSummary> {
        let due = self.tasks.find_due(Utc::now().into(), self.batch_size).await?;
        let mut summary = RetryRunSummary::default();

        for task in due {
            if self
                .tasks
                .has_pending_before(&task.object_id, &task.inbox_url, &task.id)
                .await?
            {
                debug!(task = %task.id, inbox = %task.inbox_url, "Waiting behind an older task");
                summary.waiting += 1;
                continue;
            }

            match self.attempt(&task).await {
                Ok(()) => {
                    self.tasks.delete(&task.id).await?;
                    info!(
                        task = %task.id,
                        activity = %task.activity_id,
                        inbox = %task.inbox_url,
                        "Queued delivery succeeded"
                    );
                    summary.delivered += 1;
                }
                Err(e) => {
                    let attempt = task.attempt + 1;
                    let message = e.to_string();
                    if e.is_retryable() && self.config.should_retry(attempt) {
                        let next = Utc::now() + self.config.backoff(attempt - 1);
                        self.tasks
                            .reschedule(&task.id, attempt, next.into(), &message)
                            .await?;
                        warn!(
                            task = %task.id,
                            inbox = %task.inbox_url,
                            attempt,
                            next_attempt_at = %next,
                            error = %message,
                            "Queued delivery failed, rescheduled"
                        );
                        summary.rescheduled += 1;
                    } else {
                        self.tasks.mark_dead(&task.id, attempt, &message).await?;
                        error!(
                            task = %task.id,
                            inbox = %task.inbox_url,
                            attempt,
                            error = %message,
                            "Giving up on delivery"
                        );
                        summary.dead += 1;
                    }
                }
            }
        }

        Ok(summary)
    }

    async fn attempt(&self, task: &delivery_task::Model) -> Result<(), DeliveryError> {
        let inbox = Url::parse(&task.inbox_url)
            .map_err(|e| DeliveryError::InvalidInbox(format!("{}: {e}", task.inbox_url)))?;
        let sender = Url::parse(&task.sender_iri)
            .map_err(|e| DeliveryError::Signing(format!("{}: {e}", task.sender_iri)))?;
        let body = serde_json::to_vec(&task.payload)
            .map_err(|e| DeliveryError::InvalidInbox(format!("unserializable payload: {e}")))?;

        self.transport.deliver(&sender, &inbox, &body).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use fedigraph_federation::testing::FakeTransport;

    #[test]
    fn test_from_settings_applies_polling_options() {
        let settings = RetrySettings {
            batch_size: 7,
            poll_interval_secs: 2,
            ..RetrySettings::default()
        };
        let db = Arc::new(sea_orm::DatabaseConnection::Disconnected);
        let worker = RetryWorker::from_settings(
            DeliveryTaskRepository::new(db),
            Arc::new(FakeTransport::default()),
            &settings,
        );

        assert_eq!(worker.batch_size, 7);
        assert_eq!(worker.poll_interval, Duration::from_secs(2));
        assert_eq!(worker.config.max_attempts, settings.max_attempts);
    }
}
