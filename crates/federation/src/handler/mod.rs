//! `ActivityPub` request handlers.

#![allow(missing_docs)]

mod inbox;

pub use inbox::{inbox_handler, inbox_router, user_inbox_handler};
