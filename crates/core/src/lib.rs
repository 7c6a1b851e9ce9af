//! Core domain logic for fedigraph.
//!
//! Owns the follow-edge lifecycle and the follower/following counters that
//! move with it.

pub mod services;

pub use services::*;
