//! Domain services.

pub mod follow;

pub use follow::{FollowRequest, FollowState, FollowStateMachine, NoOpReason, Transition};
