//! Delivery task repository.

use std::sync::Arc;

use crate::entities::{DeliveryTask, delivery_task, delivery_task::DeliveryTaskStatus};
use chrono::{DateTime, FixedOffset};
use fedigraph_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, prelude::Expr,
};

/// Repository for the persisted delivery retry queue.
#[derive(Clone)]
pub struct DeliveryTaskRepository {
    db: Arc<DatabaseConnection>,
}

impl DeliveryTaskRepository {
    /// Create a new delivery task repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a task by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<delivery_task::Model>> {
        DeliveryTask::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new task.
    pub async fn create(&self, model: delivery_task::ActiveModel) -> AppResult<delivery_task::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Whether any pending task exists for an object and inbox.
    pub async fn has_pending(&self, object_id: &str, inbox_url: &str) -> AppResult<bool> {
        let count = DeliveryTask::find()
            .filter(delivery_task::Column::ObjectId.eq(object_id))
            .filter(delivery_task::Column::InboxUrl.eq(inbox_url))
            .filter(delivery_task::Column::Status.eq(DeliveryTaskStatus::Pending))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(count > 0)
    }

    /// Whether a pending task enqueued before `id` exists for the same
    /// object and inbox.
    pub async fn has_pending_before(
        &self,
        object_id: &str,
        inbox_url: &str,
        id: &str,
    ) -> AppResult<bool> {
        let count = DeliveryTask::find()
            .filter(delivery_task::Column::ObjectId.eq(object_id))
            .filter(delivery_task::Column::InboxUrl.eq(inbox_url))
            .filter(delivery_task::Column::Status.eq(DeliveryTaskStatus::Pending))
            .filter(delivery_task::Column::Id.lt(id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(count > 0)
    }

    /// Pending tasks due at `now`, in enqueue order.
    pub async fn find_due(
        &self,
        now: DateTime<FixedOffset>,
        limit: u64,
    ) -> AppResult<Vec<delivery_task::Model>> {
        DeliveryTask::find()
            .filter(delivery_task::Column::Status.eq(DeliveryTaskStatus::Pending))
            .filter(delivery_task::Column::NextAttemptAt.lte(now))
            .order_by_asc(delivery_task::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Remove a delivered task.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        DeliveryTask::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Record a failed attempt and schedule the next one.
    pub async fn reschedule(
        &self,
        id: &str,
        attempt: i32,
        next_attempt_at: DateTime<FixedOffset>,
        error: &str,
    ) -> AppResult<()> {
        DeliveryTask::update_many()
            .col_expr(delivery_task::Column::Attempt, Expr::value(attempt))
            .col_expr(
                delivery_task::Column::NextAttemptAt,
                Expr::value(next_attempt_at),
            )
            .col_expr(delivery_task::Column::LastError, Expr::value(error))
            .filter(delivery_task::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Give up on a task.
    pub async fn mark_dead(&self, id: &str, attempt: i32, error: &str) -> AppResult<()> {
        DeliveryTask::update_many()
            .col_expr(delivery_task::Column::Attempt, Expr::value(attempt))
            .col_expr(
                delivery_task::Column::Status,
                Expr::value(DeliveryTaskStatus::Dead),
            )
            .col_expr(delivery_task::Column::LastError, Expr::value(error))
            .filter(delivery_task::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Count tasks in a status.
    pub async fn count_by_status(&self, status: DeliveryTaskStatus) -> AppResult<u64> {
        DeliveryTask::find()
            .filter(delivery_task::Column::Status.eq(status))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
