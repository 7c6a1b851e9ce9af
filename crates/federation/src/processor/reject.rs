//! Inbound Reject.

use fedigraph_common::AppResult;
use tracing::info;

use super::{FollowPair, InboxOutcome, InboxProcessor, not_found};
use crate::activities::RejectActivity;

impl InboxProcessor {
    /// A remote actor refuses a Follow one of our actors sent it.
    ///
    /// Only a pending request is withdrawn. A Reject of an accepted follow
    /// is reported as a no-op and leaves the edge in place.
    pub(super) async fn handle_reject(&self, reject: RejectActivity) -> AppResult<InboxOutcome> {
        info!(actor = %reject.actor, object = %reject.object.id(), "Processing Reject activity");

        match self
            .outbound_follow_pair(&reject.actor, &reject.object)
            .await?
        {
            FollowPair::Matched { follower, target } => {
                let transition = self.follows.reject_follow_request(&follower, &target).await?;
                Ok(InboxOutcome::Reject(transition))
            }
            FollowPair::UnknownResponder => Ok(InboxOutcome::Reject(not_found())),
            FollowPair::Mismatch(reason) => Ok(InboxOutcome::ignored("Reject", reason)),
        }
    }
}
