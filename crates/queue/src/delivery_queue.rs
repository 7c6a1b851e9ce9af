//! Database-backed retry queue.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fedigraph_common::{AppResult, IdGenerator};
use fedigraph_db::entities::delivery_task::{self, DeliveryTaskStatus};
use fedigraph_db::repositories::DeliveryTaskRepository;
use fedigraph_federation::{RetryQueue, RetryTask};
use sea_orm::{DatabaseConnection, Set};
use tracing::{debug, info};
use url::Url;

use crate::retry::RetryConfig;

/// Stores failed and deferred deliveries as `delivery_task` rows.
#[derive(Clone)]
pub struct DeliveryTaskQueue {
    tasks: DeliveryTaskRepository,
    config: RetryConfig,
    id_gen: IdGenerator,
}

impl DeliveryTaskQueue {
    /// Create a queue over `db`.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>, config: RetryConfig) -> Self {
        Self {
            tasks: DeliveryTaskRepository::new(db),
            config,
            id_gen: IdGenerator::new(),
        }
    }

    /// The repository the queue writes to.
    #[must_use]
    pub const fn repository(&self) -> &DeliveryTaskRepository {
        &self.tasks
    }
}

#[async_trait]
impl RetryQueue for DeliveryTaskQueue {
    async fn enqueue(&self, task: RetryTask) -> AppResult<()> {
        let now = Utc::now();
        // A deferred task has not failed yet and may go as soon as the tasks
        // ahead of it are gone.
        let (attempt, next_attempt_at) = match task.last_error {
            Some(_) => (1, now + self.config.backoff(0)),
            None => (0, now),
        };

        let model = delivery_task::ActiveModel {
            id: Set(self.id_gen.generate()),
            activity_id: Set(task.activity_id),
            object_id: Set(task.object_id),
            sender_iri: Set(task.sender.to_string()),
            inbox_url: Set(task.inbox.to_string()),
            payload: Set(task.payload),
            attempt: Set(attempt),
            status: Set(DeliveryTaskStatus::Pending),
            last_error: Set(task.last_error),
            next_attempt_at: Set(next_attempt_at.into()),
            created_at: Set(now.into()),
        };
        let stored = self.tasks.create(model).await?;

        if attempt == 0 {
            debug!(task = %stored.id, inbox = %stored.inbox_url, "Delivery deferred behind pending task");
        } else {
            info!(
                task = %stored.id,
                inbox = %stored.inbox_url,
                next_attempt_at = %stored.next_attempt_at,
                "Delivery queued for retry"
            );
        }
        Ok(())
    }

    async fn has_pending(&self, object_id: &str, inbox: &Url) -> AppResult<bool> {
        self.tasks.has_pending(object_id, inbox.as_str()).await
    }
}
