//! Inbound Undo.

use fedigraph_common::AppResult;
use tracing::info;

use super::{InboxOutcome, InboxProcessor, not_found};
use crate::activities::{FollowObject, UndoActivity};

impl InboxProcessor {
    /// A remote actor withdraws its Follow of a local actor.
    ///
    /// Works for pending and accepted edges alike. Undoing a Follow that
    /// never arrived, or arriving twice, is a no-op.
    pub(super) async fn handle_undo(&self, undo: UndoActivity) -> AppResult<InboxOutcome> {
        info!(actor = %undo.actor, object = %undo.object.id(), "Processing Undo activity");

        let FollowObject::Activity(follow) = &undo.object else {
            return Ok(InboxOutcome::ignored(
                "Undo",
                format!("Undo of {} does not embed the Follow", undo.object.id()),
            ));
        };
        if follow.actor != undo.actor {
            return Ok(InboxOutcome::ignored(
                "Undo",
                format!("{} cannot undo a Follow by {}", undo.actor, follow.actor),
            ));
        }
        if self.directory.local_username(&follow.object).is_none() {
            return Ok(InboxOutcome::ignored(
                "Undo",
                format!("{} is not a local actor", follow.object),
            ));
        }

        let Some(follower) = self.directory.find_known(&undo.actor).await? else {
            return Ok(InboxOutcome::Undo(not_found()));
        };
        if follower.is_local {
            return Ok(InboxOutcome::ignored(
                "Undo",
                format!("{} is a local actor", undo.actor),
            ));
        }
        let Some(target) = self.directory.find_known(&follow.object).await? else {
            return Ok(InboxOutcome::Undo(not_found()));
        };

        let transition = self.follows.undo_follow(&follower, &target).await?;
        Ok(InboxOutcome::Undo(transition))
    }
}
