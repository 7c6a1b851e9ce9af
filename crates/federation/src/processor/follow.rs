//! Inbound Follow.

use fedigraph_common::{AppError, AppResult};
use fedigraph_core::FollowState;
use fedigraph_db::entities::{actor, follow};
use tracing::{info, warn};

use super::{InboxOutcome, InboxProcessor, unresolved};
use crate::activities::FollowActivity;
use crate::fanout::DeliveryReport;

impl InboxProcessor {
    /// A remote actor asks to follow a local one.
    ///
    /// The remote follower is resolved (and stored on first sight) before
    /// the edge is requested. An accepted edge is answered with an Accept,
    /// also when the Follow is a redelivery of one already accepted.
    pub(super) async fn handle_follow(&self, follow: FollowActivity) -> AppResult<InboxOutcome> {
        info!(actor = %follow.actor, object = %follow.object, "Processing Follow activity");

        if self.directory.local_username(&follow.object).is_none() {
            return Ok(InboxOutcome::ignored(
                "Follow",
                format!("{} is not a local actor", follow.object),
            ));
        }
        if self.directory.uris().is_local(&follow.actor) {
            return Ok(InboxOutcome::ignored(
                "Follow",
                format!("{} is a local actor", follow.actor),
            ));
        }

        let target = match self.directory.resolve_iri(&follow.object).await {
            Ok(target) => target,
            Err(e) => {
                return Ok(InboxOutcome::ignored(
                    "Follow",
                    unresolved(&follow.object, e)?,
                ));
            }
        };
        let follower = match self.directory.resolve_iri(&follow.actor).await {
            Ok(follower) => follower,
            Err(e) => {
                return Ok(InboxOutcome::ignored("Follow", unresolved(&follow.actor, e)?));
            }
        };

        let request = match self.follows.request_follow(&follower, &target).await {
            Ok(request) => request,
            Err(AppError::Validation(reason)) => {
                return Ok(InboxOutcome::ignored("Follow", reason));
            }
            Err(e) => return Err(e),
        };

        let accept_delivery = if request.state() == FollowState::Accepted {
            self.send_accept(&target, &follower, &request.edge, follow).await
        } else {
            info!(
                follower = %follower.iri,
                target = %target.iri,
                "Follow request awaits approval"
            );
            None
        };

        Ok(InboxOutcome::Follow {
            request,
            accept_delivery,
        })
    }

    async fn send_accept(
        &self,
        target: &actor::Model,
        follower: &actor::Model,
        edge: &follow::Model,
        follow: FollowActivity,
    ) -> Option<DeliveryReport> {
        let fanout = self.fanout.as_ref()?;
        let result = match self.composer.compose_accept(target, edge, follow) {
            Ok(accept) => fanout.deliver(&accept, target).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(follower = %follower.iri, error = %e, "Failed to send Accept");
                None
            }
        }
    }
}
