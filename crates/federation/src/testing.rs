//! In-memory collaborators for tests.

#![allow(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use fedigraph_common::{AppError, AppResult};
use serde_json::Value;
use tokio::sync::Barrier;
use url::Url;

use crate::{
    ActivityTransport, ActorProfile, DeliveryError, FetchError, RemoteActorFetcher, RetryQueue,
    RetryTask,
};

/// Serves actor profiles from a map keyed by IRI.
#[derive(Default)]
pub struct FakeFetcher {
    profiles: Mutex<HashMap<String, ActorProfile>>,
    calls: AtomicUsize,
    barrier: Option<Barrier>,
}

impl FakeFetcher {
    /// Make every fetch wait until `n` fetches are in flight.
    #[must_use]
    pub fn with_barrier(mut self, n: usize) -> Self {
        self.barrier = Some(Barrier::new(n));
        self
    }

    pub fn add_profile(&self, profile: ActorProfile) {
        self.profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.id.to_string(), profile);
    }

    /// Register `https://{domain}/users/{username}` with a shared inbox.
    pub fn add_remote(&self, username: &str, domain: &str) -> Url {
        let id = remote_iri(username, domain);
        self.add_profile(ActorProfile {
            id: id.clone(),
            preferred_username: username.to_string(),
            inbox: url(&format!("{id}/inbox")),
            shared_inbox: Some(url(&format!("https://{domain}/inbox"))),
            manually_approves_followers: false,
            name: None,
            summary: None,
            icon: None,
            public_key_pem: None,
        });
        id
    }

    /// Toggle `manuallyApprovesFollowers` on a profile added by
    /// [`Self::add_remote`].
    pub fn set_locked(&self, username: &str, locked: bool) {
        let mut profiles = self.profiles.lock().unwrap_or_else(PoisonError::into_inner);
        for profile in profiles.values_mut() {
            if profile.preferred_username == username {
                profile.manually_approves_followers = locked;
            }
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteActorFetcher for FakeFetcher {
    async fn fetch(&self, iri: &Url) -> Result<ActorProfile, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        self.profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(iri.as_str())
            .cloned()
            .ok_or_else(|| FetchError::NotFound(iri.to_string()))
    }
}

/// A delivery recorded by [`FakeTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentActivity {
    pub sender: Url,
    pub inbox: Url,
    pub body: Value,
}

/// Records deliveries and fails the inboxes it is told to.
#[derive(Default)]
pub struct FakeTransport {
    sent: Mutex<Vec<SentActivity>>,
    failures: Mutex<HashMap<String, DeliveryError>>,
    delay: Option<Duration>,
    slow_kinds: HashMap<String, Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeTransport {
    /// Sleep before every delivery.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep before delivering activities of type `kind`, instead of the
    /// default delay.
    #[must_use]
    pub fn with_slow_kind(mut self, kind: &str, delay: Duration) -> Self {
        self.slow_kinds.insert(kind.to_string(), delay);
        self
    }

    /// Highest number of deliveries seen in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Fail every delivery to `inbox` with `error`.
    pub fn fail(&self, inbox: &str, error: DeliveryError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(inbox.to_string(), error);
    }

    /// Let deliveries to `inbox` succeed again.
    pub fn recover(&self, inbox: &str) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(inbox);
    }

    /// Successful deliveries, in completion order.
    pub fn sent(&self) -> Vec<SentActivity> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Activity types delivered to `inbox`, in order.
    pub fn types_sent_to(&self, inbox: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|s| s.inbox.as_str() == inbox)
            .filter_map(|s| s.body.get("type").and_then(Value::as_str).map(String::from))
            .collect()
    }
}

#[async_trait]
impl ActivityTransport for FakeTransport {
    async fn deliver(&self, sender: &Url, inbox: &Url, body: &[u8]) -> Result<(), DeliveryError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let result = self.record(sender, inbox, body).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl FakeTransport {
    async fn record(&self, sender: &Url, inbox: &Url, body: &[u8]) -> Result<(), DeliveryError> {
        let body: Value = serde_json::from_slice(body)
            .map_err(|e| DeliveryError::Transport(format!("unreadable body: {e}")))?;
        let kind_delay = body
            .get("type")
            .and_then(Value::as_str)
            .and_then(|kind| self.slow_kinds.get(kind))
            .copied();
        if let Some(delay) = kind_delay.or(self.delay) {
            tokio::time::sleep(delay).await;
        }
        let failure = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(inbox.as_str())
            .cloned();
        if let Some(error) = failure {
            return Err(error);
        }

        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentActivity {
                sender: sender.clone(),
                inbox: inbox.clone(),
                body,
            });
        Ok(())
    }
}

/// Retry queue kept in memory.
#[derive(Default)]
pub struct MemoryRetryQueue {
    tasks: Mutex<Vec<RetryTask>>,
    broken: Mutex<HashSet<String>>,
}

impl MemoryRetryQueue {
    pub fn tasks(&self) -> Vec<RetryTask> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make enqueues for `inbox` fail.
    pub fn break_inbox(&self, inbox: &str) {
        self.broken
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(inbox.to_string());
    }
}

#[async_trait]
impl RetryQueue for MemoryRetryQueue {
    async fn enqueue(&self, task: RetryTask) -> AppResult<()> {
        let broken = self
            .broken
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(task.inbox.as_str());
        if broken {
            return Err(AppError::Database("queue unavailable".to_string()));
        }
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
        Ok(())
    }

    async fn has_pending(&self, object_id: &str, inbox: &Url) -> AppResult<bool> {
        Ok(self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|t| t.object_id == object_id && t.inbox == *inbox))
    }
}

/// `https://{domain}/users/{username}`.
#[must_use]
pub fn remote_iri(username: &str, domain: &str) -> Url {
    url(&format!("https://{domain}/users/{username}"))
}

/// Parse a URL known to be valid.
#[must_use]
#[allow(clippy::expect_used)]
pub fn url(s: &str) -> Url {
    Url::parse(s).expect("valid URL")
}
