//! Inbound Accept.

use fedigraph_common::AppResult;
use tracing::info;

use super::{FollowPair, InboxOutcome, InboxProcessor, not_found};
use crate::activities::AcceptActivity;

impl InboxProcessor {
    /// A remote actor accepts a Follow one of our actors sent it.
    ///
    /// The actor of the Accept must be the target of the Follow. A repeated
    /// Accept is a no-op.
    pub(super) async fn handle_accept(&self, accept: AcceptActivity) -> AppResult<InboxOutcome> {
        info!(actor = %accept.actor, object = %accept.object.id(), "Processing Accept activity");

        match self
            .outbound_follow_pair(&accept.actor, &accept.object)
            .await?
        {
            FollowPair::Matched { follower, target } => {
                let transition = self.follows.accept_follow_request(&follower, &target).await?;
                Ok(InboxOutcome::Accept(transition))
            }
            FollowPair::UnknownResponder => Ok(InboxOutcome::Accept(not_found())),
            FollowPair::Mismatch(reason) => Ok(InboxOutcome::ignored("Accept", reason)),
        }
    }
}
