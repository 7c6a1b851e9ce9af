//! Follow repository.

use std::sync::Arc;

use crate::entities::{Follow, follow, follow::FollowStatus};
use chrono::{DateTime, FixedOffset};
use fedigraph_common::{AppError, AppResult};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, prelude::Expr, sea_query::OnConflict,
};

/// Follow edge repository for database operations.
#[derive(Clone)]
pub struct FollowRepository {
    db: Arc<DatabaseConnection>,
}

impl FollowRepository {
    /// Create a new follow repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find an edge by follower and target.
    pub async fn find_by_pair(
        &self,
        follower_id: &str,
        following_id: &str,
    ) -> AppResult<Option<follow::Model>> {
        self.find_by_pair_on(self.db.as_ref(), follower_id, following_id, false)
            .await
    }

    /// Find an edge on the given connection.
    ///
    /// With `for_update` the row is locked until the surrounding transaction
    /// ends. `SQLite` has no row locks; it serialises writers instead.
    pub async fn find_by_pair_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        follower_id: &str,
        following_id: &str,
        for_update: bool,
    ) -> AppResult<Option<follow::Model>> {
        let mut query = Follow::find()
            .filter(follow::Column::FollowerId.eq(follower_id))
            .filter(follow::Column::FollowingId.eq(following_id));

        if for_update && conn.get_database_backend() != DbBackend::Sqlite {
            query = query.lock_exclusive();
        }

        query
            .one(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert an edge unless one already exists for the same pair.
    ///
    /// Returns the stored edge and whether this call created it.
    pub async fn insert_if_absent<C: ConnectionTrait>(
        &self,
        conn: &C,
        model: follow::Model,
    ) -> AppResult<(follow::Model, bool)> {
        let follower_id = model.follower_id.clone();
        let following_id = model.following_id.clone();
        let active: follow::ActiveModel = model.into();

        let inserted = Follow::insert(active)
            .on_conflict(
                OnConflict::columns([follow::Column::FollowerId, follow::Column::FollowingId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let stored = self
            .find_by_pair_on(conn, &follower_id, &following_id, false)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "follow {follower_id} -> {following_id} vanished after insert"
                ))
            })?;

        Ok((stored, inserted > 0))
    }

    /// Move an edge from `pending` to `accepted`.
    ///
    /// Returns `false` when the edge is not pending any more.
    pub async fn mark_accepted<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
        accepted_at: DateTime<FixedOffset>,
    ) -> AppResult<bool> {
        let result = Follow::update_many()
            .col_expr(follow::Column::Status, Expr::value(FollowStatus::Accepted))
            .col_expr(follow::Column::AcceptedAt, Expr::value(accepted_at))
            .filter(follow::Column::Id.eq(id))
            .filter(follow::Column::Status.eq(FollowStatus::Pending))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    /// Delete an edge if it is still in `status`.
    ///
    /// Returns `false` when the edge is gone or has moved to another state.
    pub async fn delete_in_status<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
        status: FollowStatus,
    ) -> AppResult<bool> {
        let result = Follow::delete_many()
            .filter(follow::Column::Id.eq(id))
            .filter(follow::Column::Status.eq(status))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    /// Edges into an actor with the given status, oldest first.
    pub async fn find_by_following(
        &self,
        following_id: &str,
        status: FollowStatus,
    ) -> AppResult<Vec<follow::Model>> {
        Follow::find()
            .filter(follow::Column::FollowingId.eq(following_id))
            .filter(follow::Column::Status.eq(status))
            .order_by_asc(follow::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count edges into an actor with the given status.
    pub async fn count_by_following(
        &self,
        following_id: &str,
        status: FollowStatus,
    ) -> AppResult<u64> {
        Follow::find()
            .filter(follow::Column::FollowingId.eq(following_id))
            .filter(follow::Column::Status.eq(status))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count edges out of an actor with the given status.
    pub async fn count_by_follower(
        &self,
        follower_id: &str,
        status: FollowStatus,
    ) -> AppResult<u64> {
        Follow::find()
            .filter(follow::Column::FollowerId.eq(follower_id))
            .filter(follow::Column::Status.eq(status))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
