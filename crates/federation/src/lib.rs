//! `ActivityPub` follow-graph federation for fedigraph.
//!
//! - **Directory**: local and remote actor resolution with a freshness window
//! - **Composer**: Create, Update, Delete, Follow, Accept, Reject and Undo
//! - **Fan-out**: recipient resolution, shared-inbox coalescing, bounded
//!   concurrent delivery with per-recipient outcomes
//! - **Processor**: inbound Follow, Accept, Reject and Undo
//! - **Outbox**: local follow and publishing actions, federated best-effort
//! - **Handlers**: axum inbox routes
//!
//! HTTP signing, transport and actor fetching sit behind the traits in
//! [`transport`]; [`ApClient`] is the reqwest implementation.

pub mod activities;
pub mod client;
pub mod composer;
pub mod directory;
pub mod error;
pub mod fanout;
pub mod handler;
pub mod objects;
pub mod outbox;
pub mod processor;
pub mod profile;
pub mod sequencer;
pub mod testing;
pub mod transport;
pub mod uris;

pub use activities::*;
pub use client::ApClient;
pub use composer::{ActivityComposer, Addressing, OutboundActivity};
pub use directory::{ActorDirectory, LocalUser};
pub use error::{DeliveryError, FetchError};
pub use fanout::{
    DeliveryFanout, DeliveryOutcome, DeliveryReport, DeliveryTarget, Recipient, RecipientOutcome,
    group_by_delivery_inbox,
};
pub use handler::inbox_router;
pub use objects::*;
pub use outbox::{Outbox, OutboxOutcome};
pub use processor::{InboundActivity, InboxOutcome, InboxProcessor};
pub use profile::ActorProfile;
pub use sequencer::ObjectSequencer;
pub use transport::{ActivityTransport, RemoteActorFetcher, RequestSigner, RetryQueue, RetryTask};
pub use uris::LocalUris;
