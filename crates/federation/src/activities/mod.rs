//! `ActivityPub` activity types.

#![allow(missing_docs)]

mod accept;
mod create;
mod delete;
mod follow;
mod reject;
mod undo;
mod update;

pub use accept::AcceptActivity;
pub use create::CreateActivity;
pub use delete::DeleteActivity;
pub use follow::{FollowActivity, FollowObject};
pub use reject::RejectActivity;
pub use undo::UndoActivity;
pub use update::UpdateActivity;

/// The `ActivityStreams` JSON-LD context.
pub const ACTIVITYSTREAMS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";
