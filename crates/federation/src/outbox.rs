//! Entry point for actions taken by local actors.
//!
//! Each call applies the local change first and returns it. Federation
//! follows on a best-effort basis: delivery problems are logged and reported,
//! and never turn the local action into an error.

use fedigraph_common::{AppError, AppResult};
use fedigraph_core::{FollowRequest, FollowStateMachine, NoOpReason, Transition};
use fedigraph_db::entities::{actor, follow, note};
use tracing::{debug, info, warn};

use crate::composer::{ActivityComposer, OutboundActivity};
use crate::directory::ActorDirectory;
use crate::fanout::{DeliveryFanout, DeliveryReport};

/// The local result of an action and, if anything was sent, its delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxOutcome<T> {
    /// The local state change.
    pub result: T,
    /// Report of the federated side effect.
    pub delivery: Option<DeliveryReport>,
}

impl<T> OutboxOutcome<T> {
    const fn local(result: T) -> Self {
        Self {
            result,
            delivery: None,
        }
    }
}

/// Applies local follow and publishing actions and federates them.
#[derive(Clone)]
pub struct Outbox {
    directory: ActorDirectory,
    follows: FollowStateMachine,
    composer: ActivityComposer,
    fanout: DeliveryFanout,
    federation_enabled: bool,
}

impl Outbox {
    /// Create a new outbox.
    #[must_use]
    pub const fn new(
        directory: ActorDirectory,
        follows: FollowStateMachine,
        composer: ActivityComposer,
        fanout: DeliveryFanout,
    ) -> Self {
        Self {
            directory,
            follows,
            composer,
            fanout,
            federation_enabled: true,
        }
    }

    /// Turn outbound delivery on or off. Local state changes are unaffected.
    #[must_use]
    pub const fn with_federation(mut self, enabled: bool) -> Self {
        self.federation_enabled = enabled;
        self
    }

    /// `local` follows the actor named by `target` (local username or IRI).
    ///
    /// A Follow is sent only when the edge is new and the target remote.
    pub async fn follow(
        &self,
        local: &actor::Model,
        target: &str,
    ) -> AppResult<OutboxOutcome<FollowRequest>> {
        ensure_local(local)?;
        let target = self.directory.resolve(target).await?;
        let request = self.follows.request_follow(local, &target).await?;

        if !request.created || target.is_local {
            return Ok(OutboxOutcome::local(request));
        }

        let activity = self
            .composer
            .compose_follow(local, &target, &request.edge)
            .map(OutboundActivity::Follow);
        let delivery = self.federate(activity, local).await;
        Ok(OutboxOutcome { result: request, delivery })
    }

    /// `local` stops following `target`, or withdraws its pending request.
    pub async fn unfollow(
        &self,
        local: &actor::Model,
        target: &actor::Model,
    ) -> AppResult<OutboxOutcome<Transition<follow::Model>>> {
        ensure_local(local)?;
        let transition = self.follows.unfollow(local, target).await?;

        let Some(edge) = transition.applied().filter(|_| !target.is_local).cloned() else {
            return Ok(OutboxOutcome::local(transition));
        };

        let activity = self.composer.compose_undo_follow(local, target, &edge);
        let delivery = self.federate(activity, local).await;
        Ok(OutboxOutcome {
            result: transition,
            delivery,
        })
    }

    /// `owner` approves the pending request from `requester`.
    ///
    /// An already accepted edge is confirmed again so a requester that
    /// missed the first Accept still gets one.
    pub async fn accept_request(
        &self,
        owner: &actor::Model,
        requester: &actor::Model,
    ) -> AppResult<OutboxOutcome<Transition<follow::Model>>> {
        ensure_local(owner)?;
        let transition = self.follows.accept_follow_request(requester, owner).await?;

        if requester.is_local {
            return Ok(OutboxOutcome::local(transition));
        }
        let edge = match transition.no_op_reason() {
            None => transition.applied().cloned(),
            Some(NoOpReason::AlreadyAccepted) => {
                self.follows.find_edge(&requester.id, &owner.id).await?
            }
            Some(_) => None,
        };
        let Some(edge) = edge else {
            return Ok(OutboxOutcome::local(transition));
        };

        let activity = self
            .composer
            .compose_follow(requester, owner, &edge)
            .and_then(|follow| self.composer.compose_accept(owner, &edge, follow));
        let delivery = self.federate(activity, owner).await;
        Ok(OutboxOutcome {
            result: transition,
            delivery,
        })
    }

    /// `owner` refuses the pending request from `requester`.
    pub async fn reject_request(
        &self,
        owner: &actor::Model,
        requester: &actor::Model,
    ) -> AppResult<OutboxOutcome<Transition<follow::Model>>> {
        ensure_local(owner)?;
        let transition = self.follows.reject_follow_request(requester, owner).await?;

        let Some(edge) = transition.applied().filter(|_| !requester.is_local).cloned() else {
            return Ok(OutboxOutcome::local(transition));
        };

        let activity = self
            .composer
            .compose_follow(requester, owner, &edge)
            .and_then(|follow| self.composer.compose_reject(owner, &edge, follow));
        let delivery = self.federate(activity, owner).await;
        Ok(OutboxOutcome {
            result: transition,
            delivery,
        })
    }

    /// Federate a newly stored note.
    pub async fn publish_note(
        &self,
        note: &note::Model,
        author: &actor::Model,
    ) -> AppResult<OutboxOutcome<OutboundActivity>> {
        ensure_author(note, author)?;
        let activity = self.composer.compose_create(note, author)?;
        Ok(self.publish(activity, author).await)
    }

    /// Federate an edit of a note.
    pub async fn publish_note_update(
        &self,
        note: &note::Model,
        author: &actor::Model,
    ) -> AppResult<OutboxOutcome<OutboundActivity>> {
        ensure_author(note, author)?;
        let activity = self.composer.compose_update(note, author)?;
        Ok(self.publish(activity, author).await)
    }

    /// Federate the deletion of a note. `note` is the row as it was before
    /// deletion.
    pub async fn publish_note_delete(
        &self,
        note: &note::Model,
        author: &actor::Model,
    ) -> AppResult<OutboxOutcome<OutboundActivity>> {
        ensure_author(note, author)?;
        let activity = self.composer.compose_delete(note, author)?;
        Ok(self.publish(activity, author).await)
    }

    async fn publish(
        &self,
        activity: OutboundActivity,
        author: &actor::Model,
    ) -> OutboxOutcome<OutboundActivity> {
        let delivery = self.federate(Ok(activity.clone()), author).await;
        OutboxOutcome {
            result: activity,
            delivery,
        }
    }

    async fn federate(
        &self,
        activity: AppResult<OutboundActivity>,
        sender: &actor::Model,
    ) -> Option<DeliveryReport> {
        if !self.federation_enabled {
            debug!(actor = %sender.iri, "Federation disabled, not delivering");
            return None;
        }

        let activity = match activity {
            Ok(activity) => activity,
            Err(e) => {
                warn!(actor = %sender.iri, error = %e, "Could not compose activity");
                return None;
            }
        };

        match self.fanout.deliver(&activity, sender).await {
            Ok(report) => {
                if report.failed_count() > 0 || report.no_recipients {
                    warn!(
                        activity = %report.activity_id,
                        failed = report.failed_count(),
                        no_recipients = report.no_recipients,
                        "Activity not delivered everywhere"
                    );
                } else {
                    info!(
                        activity = %report.activity_id,
                        kind = activity.activity_type(),
                        inboxes = report.outcomes.len(),
                        "Activity federated"
                    );
                }
                Some(report)
            }
            Err(e) => {
                warn!(activity = %activity.id(), error = %e, "Delivery aborted");
                None
            }
        }
    }
}

fn ensure_local(actor: &actor::Model) -> AppResult<()> {
    if actor.is_local {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "{} is not a local actor",
            actor.iri
        )))
    }
}

fn ensure_author(note: &note::Model, author: &actor::Model) -> AppResult<()> {
    ensure_local(author)?;
    if note.author_id == author.id {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "note {} is not by {}",
            note.id, author.iri
        )))
    }
}
