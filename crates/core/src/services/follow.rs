//! Follow state machine.
//!
//! A follow edge is `pending` or `accepted` while it exists. Rejecting or
//! undoing it deletes the row. Every transition and its counter delta run in
//! one transaction scoped to the edge, and every transition is conditional on
//! the state it starts from, so a concurrent transition on the same edge
//! either wins or becomes a no-op.

use std::sync::Arc;

use chrono::Utc;
use fedigraph_common::{AppError, AppResult, IdGenerator};
use fedigraph_db::{
    entities::{actor, follow, follow::FollowStatus},
    repositories::{ActorRepository, FollowRepository},
};
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::Serialize;
use tracing::{debug, info};

/// Lifecycle state of a follow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowState {
    /// Awaiting approval by the target.
    Pending,
    /// Active follow.
    Accepted,
    /// Refused by the target. The row is gone.
    Rejected,
    /// Withdrawn by the follower. The row is gone.
    Removed,
}

impl From<FollowStatus> for FollowState {
    fn from(status: FollowStatus) -> Self {
        match status {
            FollowStatus::Pending => Self::Pending,
            FollowStatus::Accepted => Self::Accepted,
        }
    }
}

/// Why a transition did not change anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoOpReason {
    /// No edge exists for the pair.
    NotFound,
    /// The edge is already accepted.
    AlreadyAccepted,
    /// The edge is not pending.
    NotPending,
}

/// Result of a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition<T> {
    /// The transition was persisted.
    Applied(T),
    /// Nothing changed.
    NoOp(NoOpReason),
}

impl<T> Transition<T> {
    /// Whether the transition was persisted.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    /// The persisted value, if the transition was applied.
    #[must_use]
    pub const fn applied(&self) -> Option<&T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::NoOp(_) => None,
        }
    }

    /// The no-op reason, if nothing changed.
    #[must_use]
    pub const fn no_op_reason(&self) -> Option<NoOpReason> {
        match self {
            Self::Applied(_) => None,
            Self::NoOp(reason) => Some(*reason),
        }
    }
}

/// Result of a follow request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowRequest {
    /// The stored edge.
    pub edge: follow::Model,
    /// Whether this call created the edge. `false` means the existing edge
    /// was returned unchanged.
    pub created: bool,
}

impl FollowRequest {
    /// Current state of the edge.
    #[must_use]
    pub fn state(&self) -> FollowState {
        self.edge.status.into()
    }
}

/// Owns follow-edge transitions and the counters that move with them.
#[derive(Clone)]
pub struct FollowStateMachine {
    db: Arc<DatabaseConnection>,
    follow_repo: FollowRepository,
    actor_repo: ActorRepository,
    id_gen: IdGenerator,
}

impl FollowStateMachine {
    /// Create a new state machine over the given connection.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            follow_repo: FollowRepository::new(db.clone()),
            actor_repo: ActorRepository::new(db.clone()),
            db,
            id_gen: IdGenerator::new(),
        }
    }

    /// Request that `follower` follow `target`.
    ///
    /// Creates the edge as `accepted` (with both counters incremented) when
    /// the target does not manually approve followers, otherwise as
    /// `pending`. An existing edge is returned unchanged.
    pub async fn request_follow(
        &self,
        follower: &actor::Model,
        target: &actor::Model,
    ) -> AppResult<FollowRequest> {
        if follower.id == target.id {
            return Err(AppError::Validation("Cannot follow yourself".to_string()));
        }

        let now = Utc::now();
        let status = if target.manually_approves_followers {
            FollowStatus::Pending
        } else {
            FollowStatus::Accepted
        };
        let candidate = follow::Model {
            id: self.id_gen.generate(),
            follower_id: follower.id.clone(),
            following_id: target.id.clone(),
            status,
            created_at: now.into(),
            accepted_at: (status == FollowStatus::Accepted).then(|| now.into()),
        };

        let txn = self.db.begin().await?;
        let (edge, created) = self.follow_repo.insert_if_absent(&txn, candidate).await?;
        if created && edge.status == FollowStatus::Accepted {
            self.actor_repo
                .increment_follow_counts(&txn, &follower.id, &target.id)
                .await?;
        }
        txn.commit().await?;

        if created {
            info!(
                follower = %follower.iri,
                target = %target.iri,
                status = ?edge.status,
                "Follow edge created"
            );
        } else {
            debug!(
                follower = %follower.iri,
                target = %target.iri,
                status = ?edge.status,
                "Follow edge already exists"
            );
        }

        Ok(FollowRequest { edge, created })
    }

    /// Accept a pending follow request from `requester` to `target`.
    pub async fn accept_follow_request(
        &self,
        requester: &actor::Model,
        target: &actor::Model,
    ) -> AppResult<Transition<follow::Model>> {
        let txn = self.db.begin().await?;

        let Some(edge) = self
            .follow_repo
            .find_by_pair_on(&txn, &requester.id, &target.id, true)
            .await?
        else {
            txn.commit().await?;
            return Ok(self.no_op("accept", requester, target, NoOpReason::NotFound));
        };

        let accepted_at = Utc::now().into();
        if edge.status != FollowStatus::Pending
            || !self
                .follow_repo
                .mark_accepted(&txn, &edge.id, accepted_at)
                .await?
        {
            txn.commit().await?;
            return Ok(self.no_op("accept", requester, target, NoOpReason::AlreadyAccepted));
        }

        self.actor_repo
            .increment_follow_counts(&txn, &requester.id, &target.id)
            .await?;
        txn.commit().await?;

        info!(follower = %requester.iri, target = %target.iri, "Follow request accepted");

        Ok(Transition::Applied(follow::Model {
            status: FollowStatus::Accepted,
            accepted_at: Some(accepted_at),
            ..edge
        }))
    }

    /// Reject a pending follow request. The edge is deleted; counters are
    /// untouched.
    pub async fn reject_follow_request(
        &self,
        requester: &actor::Model,
        target: &actor::Model,
    ) -> AppResult<Transition<follow::Model>> {
        let txn = self.db.begin().await?;

        let Some(edge) = self
            .follow_repo
            .find_by_pair_on(&txn, &requester.id, &target.id, true)
            .await?
        else {
            txn.commit().await?;
            return Ok(self.no_op("reject", requester, target, NoOpReason::NotFound));
        };

        if edge.status != FollowStatus::Pending
            || !self
                .follow_repo
                .delete_in_status(&txn, &edge.id, FollowStatus::Pending)
                .await?
        {
            txn.commit().await?;
            return Ok(self.no_op("reject", requester, target, NoOpReason::NotPending));
        }
        txn.commit().await?;

        info!(follower = %requester.iri, target = %target.iri, "Follow request rejected");

        Ok(Transition::Applied(edge))
    }

    /// Withdraw a follow or follow request.
    ///
    /// Returns the deleted edge as it was before removal. Counters are
    /// decremented only when the edge had been accepted.
    pub async fn undo_follow(
        &self,
        follower: &actor::Model,
        target: &actor::Model,
    ) -> AppResult<Transition<follow::Model>> {
        let txn = self.db.begin().await?;

        let Some(edge) = self
            .follow_repo
            .find_by_pair_on(&txn, &follower.id, &target.id, true)
            .await?
        else {
            txn.commit().await?;
            return Ok(self.no_op("undo", follower, target, NoOpReason::NotFound));
        };

        // The delete is conditional on the observed status so that a
        // concurrent accept cannot slip between the read and the delete
        // and leave counters behind.
        if !self
            .follow_repo
            .delete_in_status(&txn, &edge.id, edge.status)
            .await?
        {
            txn.commit().await?;
            return Ok(self.no_op("undo", follower, target, NoOpReason::NotFound));
        }

        if edge.status == FollowStatus::Accepted {
            self.actor_repo
                .decrement_follow_counts(&txn, &follower.id, &target.id)
                .await?;
        }
        txn.commit().await?;

        info!(
            follower = %follower.iri,
            target = %target.iri,
            prior = ?edge.status,
            "Follow edge removed"
        );

        Ok(Transition::Applied(edge))
    }

    /// Alias of [`Self::undo_follow`] for locally initiated unfollows.
    pub async fn unfollow(
        &self,
        follower: &actor::Model,
        target: &actor::Model,
    ) -> AppResult<Transition<follow::Model>> {
        self.undo_follow(follower, target).await
    }

    /// Look up the edge between two actors.
    pub async fn find_edge(
        &self,
        follower_id: &str,
        following_id: &str,
    ) -> AppResult<Option<follow::Model>> {
        self.follow_repo.find_by_pair(follower_id, following_id).await
    }

    /// Actors with an accepted edge into `target`, oldest follow first.
    pub async fn accepted_followers(&self, target: &actor::Model) -> AppResult<Vec<actor::Model>> {
        self.followers_in(target, FollowStatus::Accepted).await
    }

    /// Actors with a pending request to `target`, oldest first.
    pub async fn pending_requests(&self, target: &actor::Model) -> AppResult<Vec<actor::Model>> {
        self.followers_in(target, FollowStatus::Pending).await
    }

    async fn followers_in(
        &self,
        target: &actor::Model,
        status: FollowStatus,
    ) -> AppResult<Vec<actor::Model>> {
        let edges = self.follow_repo.find_by_following(&target.id, status).await?;
        let ids: Vec<String> = edges.iter().map(|e| e.follower_id.clone()).collect();
        let mut actors = self.actor_repo.find_by_ids(&ids).await?;
        actors.sort_by_key(|a| ids.iter().position(|id| id == &a.id));
        Ok(actors)
    }

    fn no_op<T>(
        &self,
        op: &str,
        follower: &actor::Model,
        target: &actor::Model,
        reason: NoOpReason,
    ) -> Transition<T> {
        debug!(
            op = op,
            follower = %follower.iri,
            target = %target.iri,
            reason = ?reason,
            "Follow transition is a no-op"
        );
        Transition::NoOp(reason)
    }
}
