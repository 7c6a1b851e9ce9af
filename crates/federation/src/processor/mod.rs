//! Inbound activity processing.
//!
//! Every activity posted to an inbox is parsed into [`InboundActivity`] and
//! dispatched with one exhaustive match. Follow-graph activities drive the
//! [`FollowStateMachine`]; anything else is dropped with a logged reason.

#![allow(missing_docs)]

mod accept;
mod follow;
mod reject;
mod undo;

use fedigraph_common::{AppError, AppResult};
use fedigraph_core::{FollowRequest, FollowStateMachine, NoOpReason, Transition};
use fedigraph_db::entities::{actor, follow as follow_edge};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::activities::{
    AcceptActivity, FollowActivity, FollowObject, RejectActivity, UndoActivity,
};
use crate::composer::ActivityComposer;
use crate::directory::ActorDirectory;
use crate::fanout::{DeliveryFanout, DeliveryReport};

/// An activity received on an inbox.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InboundActivity {
    Follow(FollowActivity),
    Accept(AcceptActivity),
    Reject(RejectActivity),
    Undo(UndoActivity),
    /// Any other JSON object.
    Unknown(Value),
}

impl InboundActivity {
    /// The `type` of the activity, as sent.
    #[must_use]
    pub fn kind(&self) -> String {
        match self {
            Self::Follow(_) => "Follow".to_string(),
            Self::Accept(_) => "Accept".to_string(),
            Self::Reject(_) => "Reject".to_string(),
            Self::Undo(_) => "Undo".to_string(),
            Self::Unknown(value) => value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
        }
    }
}

/// What an inbound activity changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboxOutcome {
    Follow {
        request: FollowRequest,
        /// The Accept sent back when the edge is accepted.
        accept_delivery: Option<DeliveryReport>,
    },
    Accept(Transition<follow_edge::Model>),
    Reject(Transition<follow_edge::Model>),
    Undo(Transition<follow_edge::Model>),
    /// Dropped without touching state.
    Ignored { reason: String },
}

impl InboxOutcome {
    fn ignored(activity: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(activity, reason = %reason, "Dropping inbound activity");
        Self::Ignored { reason }
    }
}

/// Applies inbound activities to the follow graph.
#[derive(Clone)]
pub struct InboxProcessor {
    directory: ActorDirectory,
    follows: FollowStateMachine,
    composer: ActivityComposer,
    fanout: Option<DeliveryFanout>,
}

impl InboxProcessor {
    #[must_use]
    pub const fn new(
        directory: ActorDirectory,
        follows: FollowStateMachine,
        composer: ActivityComposer,
    ) -> Self {
        Self {
            directory,
            follows,
            composer,
            fanout: None,
        }
    }

    /// Send Accept replies through `fanout`. Without it, accepted Follows
    /// are recorded but not answered.
    #[must_use]
    pub fn with_fanout(mut self, fanout: DeliveryFanout) -> Self {
        self.fanout = Some(fanout);
        self
    }

    /// Process one inbound activity.
    ///
    /// Only persistence failures are errors. Unresolvable actors, foreign
    /// objects and unsupported types come back as [`InboxOutcome::Ignored`].
    pub async fn handle(&self, activity: InboundActivity) -> AppResult<InboxOutcome> {
        debug!(kind = %activity.kind(), "Processing inbound activity");
        match activity {
            InboundActivity::Follow(follow) => self.handle_follow(follow).await,
            InboundActivity::Accept(accept) => self.handle_accept(accept).await,
            InboundActivity::Reject(reject) => self.handle_reject(reject).await,
            InboundActivity::Undo(undo) => self.handle_undo(undo).await,
            InboundActivity::Unknown(value) => {
                let kind = value.get("type").and_then(Value::as_str).unwrap_or("unknown");
                Ok(InboxOutcome::ignored(
                    kind,
                    format!("unsupported activity type {kind}"),
                ))
            }
        }
    }

    /// The local follower and remote target of a Follow answered by
    /// `responder`.
    ///
    /// An embedded Follow must be from a local actor to `responder`. A bare
    /// Follow id must be one this server minted for `responder`.
    async fn outbound_follow_pair(
        &self,
        responder: &Url,
        follow: &FollowObject,
    ) -> AppResult<FollowPair> {
        let Some(target) = self.directory.find_known(responder).await? else {
            return Ok(FollowPair::UnknownResponder);
        };
        if target.is_local {
            return Ok(FollowPair::Mismatch(format!("{responder} is a local actor")));
        }

        let follower = match follow {
            FollowObject::Activity(follow) => {
                if follow.object != *responder {
                    return Ok(FollowPair::Mismatch(format!(
                        "Follow {} targets {}, not {responder}",
                        follow.id, follow.object
                    )));
                }
                let Some(username) = self.directory.local_username(&follow.actor) else {
                    return Ok(FollowPair::Mismatch(format!(
                        "{} is not a local actor",
                        follow.actor
                    )));
                };
                username
            }
            FollowObject::Id(id) => {
                let Some((username, target_id)) = self.composer.uris().parse_follow_activity(id)
                else {
                    return Ok(FollowPair::Mismatch(format!(
                        "{id} is not a Follow sent from here"
                    )));
                };
                if target_id != target.id {
                    return Ok(FollowPair::Mismatch(format!(
                        "Follow {id} was not sent to {responder}"
                    )));
                }
                username
            }
        };

        match self.directory.find_local(&follower).await {
            Ok(follower) => Ok(FollowPair::Matched { follower, target }),
            Err(AppError::NotFound(_)) => {
                Ok(FollowPair::Mismatch(format!("no local actor {follower}")))
            }
            Err(e) => Err(e),
        }
    }
}

/// The two ends of a Follow sent from here, as seen from a response to it.
enum FollowPair {
    Matched {
        follower: actor::Model,
        target: actor::Model,
    },
    /// The responder was never stored, so no edge to it can exist.
    UnknownResponder,
    Mismatch(String),
}

/// Collapse a directory failure into an ignore reason, keeping persistence
/// errors fatal.
fn unresolved(iri: &Url, error: AppError) -> AppResult<String> {
    match error {
        AppError::Database(_) => Err(error),
        other => Ok(format!("cannot resolve {iri}: {other}")),
    }
}

/// Edge lookups that found nothing come back as this no-op.
const fn not_found() -> Transition<follow_edge::Model> {
    Transition::NoOp(NoOpReason::NotFound)
}
