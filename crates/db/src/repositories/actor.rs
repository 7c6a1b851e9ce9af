//! Actor repository.

use std::sync::Arc;

use crate::entities::{Actor, actor};
use fedigraph_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    prelude::Expr, sea_query::OnConflict,
};

/// Actor repository for database operations.
#[derive(Clone)]
pub struct ActorRepository {
    db: Arc<DatabaseConnection>,
}

impl ActorRepository {
    /// Create a new actor repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find an actor by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<actor::Model>> {
        Actor::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find an actor by ID, failing if absent.
    pub async fn get_by_id(&self, id: &str) -> AppResult<actor::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Actor: {id}")))
    }

    /// Find several actors by ID. Missing IDs are skipped.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<actor::Model>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Actor::find()
            .filter(actor::Column::Id.is_in(ids.iter().cloned()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find an actor by its canonical IRI.
    pub async fn find_by_iri(&self, iri: &str) -> AppResult<Option<actor::Model>> {
        Actor::find()
            .filter(actor::Column::Iri.eq(iri))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find the actor owned by a local user.
    pub async fn find_by_user_id(&self, user_id: &str) -> AppResult<Option<actor::Model>> {
        Actor::find()
            .filter(actor::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a local actor by username.
    pub async fn find_local_by_username(&self, username: &str) -> AppResult<Option<actor::Model>> {
        Actor::find()
            .filter(actor::Column::Username.eq(username))
            .filter(actor::Column::IsLocal.eq(true))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert an actor unless one with the same IRI already exists.
    ///
    /// Returns the stored row and whether this call created it. A concurrent
    /// insert of the same IRI is not an error: the losing side reads back the
    /// winning row.
    pub async fn insert_if_absent(&self, model: actor::ActiveModel) -> AppResult<(actor::Model, bool)> {
        let iri = match &model.iri {
            sea_orm::ActiveValue::Set(iri) | sea_orm::ActiveValue::Unchanged(iri) => iri.clone(),
            sea_orm::ActiveValue::NotSet => {
                return Err(AppError::Validation("actor iri is required".to_string()));
            }
        };

        let inserted = Actor::insert(model)
            .on_conflict(OnConflict::column(actor::Column::Iri).do_nothing().to_owned())
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let stored = self
            .find_by_iri(&iri)
            .await?
            .ok_or_else(|| AppError::Conflict(format!("actor {iri} vanished after insert")))?;

        Ok((stored, inserted > 0))
    }

    /// Update an actor.
    pub async fn update(&self, model: actor::ActiveModel) -> AppResult<actor::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Increment the follower's `following_count` and the target's
    /// `followers_count` on the given connection.
    pub async fn increment_follow_counts<C: ConnectionTrait>(
        &self,
        conn: &C,
        follower_id: &str,
        following_id: &str,
    ) -> AppResult<()> {
        Actor::update_many()
            .col_expr(
                actor::Column::FollowingCount,
                Expr::col(actor::Column::FollowingCount).add(1),
            )
            .filter(actor::Column::Id.eq(follower_id))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Actor::update_many()
            .col_expr(
                actor::Column::FollowersCount,
                Expr::col(actor::Column::FollowersCount).add(1),
            )
            .filter(actor::Column::Id.eq(following_id))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// Decrement both counters of an edge on the given connection.
    /// Counters never go below zero.
    pub async fn decrement_follow_counts<C: ConnectionTrait>(
        &self,
        conn: &C,
        follower_id: &str,
        following_id: &str,
    ) -> AppResult<()> {
        Actor::update_many()
            .col_expr(
                actor::Column::FollowingCount,
                Expr::col(actor::Column::FollowingCount).sub(1),
            )
            .filter(actor::Column::Id.eq(follower_id))
            .filter(actor::Column::FollowingCount.gt(0))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Actor::update_many()
            .col_expr(
                actor::Column::FollowersCount,
                Expr::col(actor::Column::FollowersCount).sub(1),
            )
            .filter(actor::Column::Id.eq(following_id))
            .filter(actor::Column::FollowersCount.gt(0))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::{ActorFixture, TestDatabase};

    #[tokio::test]
    async fn test_insert_if_absent_converges_on_existing_row() {
        let db = TestDatabase::new().await.unwrap();
        let repo = ActorRepository::new(db.shared());

        let first = ActorFixture::remote("bob", "remote.example").active_model();
        let second = ActorFixture::remote("bob", "remote.example").active_model();

        let (a, created_a) = repo.insert_if_absent(first).await.unwrap();
        let (b, created_b) = repo.insert_if_absent(second).await.unwrap();

        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_counters_never_negative() {
        let db = TestDatabase::new().await.unwrap();
        let repo = ActorRepository::new(db.shared());
        let a = ActorFixture::local("alice").insert(db.connection()).await.unwrap();
        let b = ActorFixture::remote("bob", "remote.example")
            .insert(db.connection())
            .await
            .unwrap();

        repo.increment_follow_counts(db.connection(), &b.id, &a.id)
            .await
            .unwrap();
        repo.decrement_follow_counts(db.connection(), &b.id, &a.id)
            .await
            .unwrap();
        repo.decrement_follow_counts(db.connection(), &b.id, &a.id)
            .await
            .unwrap();

        let a = repo.get_by_id(&a.id).await.unwrap();
        let b = repo.get_by_id(&b.id).await.unwrap();
        assert_eq!(a.followers_count, 0);
        assert_eq!(b.following_count, 0);
    }

    #[tokio::test]
    async fn test_find_local_by_username_ignores_remote() {
        let db = TestDatabase::new().await.unwrap();
        let repo = ActorRepository::new(db.shared());
        ActorFixture::remote("carol", "remote.example")
            .insert(db.connection())
            .await
            .unwrap();

        assert!(repo.find_local_by_username("carol").await.unwrap().is_none());

        ActorFixture::local("carol").insert(db.connection()).await.unwrap();
        let found = repo.find_local_by_username("carol").await.unwrap().unwrap();
        assert!(found.is_local);
    }
}
