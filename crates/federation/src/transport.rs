//! Collaborator interfaces at the network and queue boundary.
//!
//! HTTP signing, wire transport and actor fetching are provided by
//! implementations of these traits ([`crate::ApClient`] in production, fakes
//! in tests). Components receive them as explicit constructor arguments.

use async_trait::async_trait;
use fedigraph_common::AppResult;
use serde_json::Value;
use url::Url;

use crate::{ActorProfile, DeliveryError, FetchError};

/// Fetches remote actor documents on a directory cache miss.
#[async_trait]
pub trait RemoteActorFetcher: Send + Sync {
    /// Fetch and parse the actor at `iri`.
    async fn fetch(&self, iri: &Url) -> Result<ActorProfile, FetchError>;
}

/// Sends a serialized activity to one inbox.
///
/// Signing happens inside the implementation, on behalf of `sender`.
#[async_trait]
pub trait ActivityTransport: Send + Sync {
    /// Deliver `body` to `inbox`.
    async fn deliver(&self, sender: &Url, inbox: &Url, body: &[u8]) -> Result<(), DeliveryError>;
}

/// Adds HTTP signature headers to an outgoing request.
#[async_trait]
pub trait RequestSigner: Send + Sync {
    /// Sign `request` with the key of the actor `sender`.
    async fn sign(&self, sender: &Url, request: &mut reqwest::Request) -> Result<(), DeliveryError>;
}

/// A delivery that should be attempted again later.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryTask {
    pub activity_id: String,
    /// Deliveries for the same object to the same inbox keep their order.
    pub object_id: String,
    pub sender: Url,
    pub inbox: Url,
    pub payload: Value,
    /// The failure that caused the enqueue. `None` when the task was only
    /// deferred behind an earlier pending task.
    pub last_error: Option<String>,
}

/// Persistent store of deliveries awaiting retry.
#[async_trait]
pub trait RetryQueue: Send + Sync {
    /// Store a task.
    async fn enqueue(&self, task: RetryTask) -> AppResult<()>;

    /// Whether a task for `object_id` to `inbox` is still pending.
    async fn has_pending(&self, object_id: &str, inbox: &Url) -> AppResult<bool>;
}
