//! Outbound activity fan-out.
//!
//! Resolves who an activity is for, coalesces recipients behind shared
//! inboxes and delivers to every inbox concurrently. One inbox failing never
//! affects the others; every outcome lands in the [`DeliveryReport`].

#![allow(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use activitypub_federation::kinds::public;
use fedigraph_common::{AppError, AppResult};
use fedigraph_core::FollowStateMachine;
use fedigraph_db::entities::actor;
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use crate::composer::OutboundActivity;
use crate::directory::ActorDirectory;
use crate::sequencer::{ObjectSequencer, SequenceGuard};
use crate::uris::LocalUris;
use crate::{ActivityTransport, DeliveryError, RetryQueue, RetryTask};

/// Default bound on concurrent inbox deliveries per fan-out.
pub const DEFAULT_DELIVERY_CONCURRENCY: usize = 16;

/// One actor an activity is delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub actor: Url,
    pub inbox: Url,
    pub shared_inbox: Option<Url>,
}

impl Recipient {
    /// Build from a stored actor. Fails when the inbox is not a valid URL.
    pub fn from_actor(actor: &actor::Model) -> Result<Self, DeliveryError> {
        let actor_iri = Url::parse(&actor.iri)
            .map_err(|e| DeliveryError::InvalidInbox(format!("{}: {e}", actor.iri)))?;
        let inbox = Url::parse(&actor.inbox_url)
            .map_err(|e| DeliveryError::InvalidInbox(format!("{}: {e}", actor.inbox_url)))?;
        let shared_inbox = actor
            .shared_inbox_url
            .as_deref()
            .and_then(|url| Url::parse(url).ok());

        Ok(Self {
            actor: actor_iri,
            inbox,
            shared_inbox,
        })
    }

    /// The inbox to post to, preferring the shared one.
    #[must_use]
    pub fn delivery_inbox(&self) -> &Url {
        self.shared_inbox.as_ref().unwrap_or(&self.inbox)
    }
}

/// One POST: an inbox and the recipients it stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTarget {
    pub inbox: Url,
    pub recipients: Vec<Url>,
    pub shared: bool,
}

/// Group recipients by delivery inbox, keeping first-seen order.
#[must_use]
pub fn group_by_delivery_inbox(recipients: Vec<Recipient>) -> Vec<DeliveryTarget> {
    let mut targets: Vec<DeliveryTarget> = Vec::new();
    let mut index: HashMap<Url, usize> = HashMap::new();

    for recipient in recipients {
        let inbox = recipient.delivery_inbox().clone();
        if let Some(&i) = index.get(&inbox) {
            targets[i].recipients.push(recipient.actor);
            continue;
        }
        index.insert(inbox.clone(), targets.len());
        targets.push(DeliveryTarget {
            shared: recipient.shared_inbox.is_some(),
            inbox,
            recipients: vec![recipient.actor],
        });
    }

    targets
}

/// What happened to one inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(DeliveryError),
    /// Queued behind an earlier pending delivery for the same object.
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientOutcome {
    pub inbox: Url,
    pub recipients: Vec<Url>,
    pub outcome: DeliveryOutcome,
    /// Whether the delivery was handed to the retry queue.
    pub queued: bool,
}

/// Result of one fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub activity_id: Url,
    pub outcomes: Vec<RecipientOutcome>,
    /// Recipients dropped before dispatch, with the reason.
    pub skipped: Vec<(String, String)>,
    /// Set when the activity is only addressed to specific actors and none of
    /// them resolved to a local actor or a deliverable inbox.
    pub no_recipients: bool,
}

impl DeliveryReport {
    fn empty(activity_id: Url) -> Self {
        Self {
            activity_id,
            outcomes: Vec::new(),
            skipped: Vec::new(),
            no_recipients: false,
        }
    }

    #[must_use]
    pub fn delivered_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome == DeliveryOutcome::Delivered)
            .count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, DeliveryOutcome::Failed(_)))
            .count()
    }

    #[must_use]
    pub fn deferred_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome == DeliveryOutcome::Deferred)
            .count()
    }

    /// Outcome of the inbox that carried `actor`.
    #[must_use]
    pub fn outcome_for(&self, actor: &str) -> Option<&DeliveryOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.recipients.iter().any(|r| r.as_str() == actor))
            .map(|o| &o.outcome)
    }
}

/// Delivers outbound activities to remote inboxes.
#[derive(Clone)]
pub struct DeliveryFanout {
    follows: FollowStateMachine,
    directory: ActorDirectory,
    transport: Arc<dyn ActivityTransport>,
    retry_queue: Option<Arc<dyn RetryQueue>>,
    semaphore: Arc<Semaphore>,
    sequencer: ObjectSequencer,
}

/// Everything a spawned delivery needs, shared across one fan-out.
struct Dispatch {
    sender: Url,
    activity_id: String,
    object_id: String,
    payload: Value,
    body: Vec<u8>,
    transport: Arc<dyn ActivityTransport>,
    retry_queue: Option<Arc<dyn RetryQueue>>,
    semaphore: Arc<Semaphore>,
    _sequence: SequenceGuard,
}

impl DeliveryFanout {
    #[must_use]
    pub fn new(
        follows: FollowStateMachine,
        directory: ActorDirectory,
        transport: Arc<dyn ActivityTransport>,
    ) -> Self {
        Self {
            follows,
            directory,
            transport,
            retry_queue: None,
            semaphore: Arc::new(Semaphore::new(DEFAULT_DELIVERY_CONCURRENCY)),
            sequencer: ObjectSequencer::new(),
        }
    }

    /// Bound concurrent deliveries. Zero is treated as one.
    #[must_use]
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.semaphore = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    /// Persist retryable failures and keep per-object order across retries.
    #[must_use]
    pub fn with_retry_queue(mut self, queue: Arc<dyn RetryQueue>) -> Self {
        self.retry_queue = Some(queue);
        self
    }

    /// Deliver `activity` by `author` to everyone it is addressed to.
    ///
    /// The followers collection expands to the author's accepted followers;
    /// any other addressed actor is resolved through the directory. Only
    /// failures to read local state are returned as errors.
    pub async fn deliver(
        &self,
        activity: &OutboundActivity,
        author: &actor::Model,
    ) -> AppResult<DeliveryReport> {
        let addressing = activity.addressing();
        let author_iri = parse_iri(&author.iri)?;
        let followers_iri = LocalUris::followers(&author_iri);
        let public = public();

        let mut skipped = Vec::new();
        let mut actors = Vec::new();
        let mut to_followers = false;

        for iri in addressing.iter() {
            if *iri == public {
                continue;
            }
            if *iri == followers_iri {
                to_followers = true;
                actors.extend(self.follows.accepted_followers(author).await?);
                continue;
            }
            if *iri == author_iri {
                continue;
            }
            match self.directory.resolve_iri(iri).await {
                Ok(actor) => actors.push(actor),
                Err(AppError::Database(e)) => return Err(AppError::Database(e)),
                Err(e) => {
                    warn!(recipient = %iri, error = %e, "Skipping unresolvable recipient");
                    skipped.push((iri.to_string(), e.to_string()));
                }
            }
        }

        // Local recipients see the note without an HTTP delivery.
        let has_local_recipient = actors.iter().any(|a| a.is_local && a.id != author.id);

        let mut report = self.deliver_to(activity, author, actors).await?;
        skipped.append(&mut report.skipped);
        report.skipped = skipped;
        if report.outcomes.is_empty()
            && !has_local_recipient
            && !to_followers
            && !addressing.is_public()
        {
            info!(activity = %activity.id(), "No recipients resolved for activity");
            report.no_recipients = true;
        }
        Ok(report)
    }

    /// Deliver `activity` by `author` to the given actors.
    ///
    /// Local actors, the author and duplicates are dropped; actors without a
    /// usable inbox are reported as skipped.
    pub async fn deliver_to(
        &self,
        activity: &OutboundActivity,
        author: &actor::Model,
        actors: Vec<actor::Model>,
    ) -> AppResult<DeliveryReport> {
        let mut report = DeliveryReport::empty(activity.id().clone());
        let mut seen = HashSet::new();
        let mut recipients = Vec::new();

        for actor in actors {
            if actor.id == author.id || actor.is_local || !seen.insert(actor.id.clone()) {
                continue;
            }
            match Recipient::from_actor(&actor) {
                Ok(recipient) => recipients.push(recipient),
                Err(e) => {
                    warn!(recipient = %actor.iri, error = %e, "Skipping recipient without inbox");
                    report.skipped.push((actor.iri.clone(), e.to_string()));
                }
            }
        }

        let targets = group_by_delivery_inbox(recipients);
        if targets.is_empty() {
            debug!(activity = %activity.id(), "Nothing to deliver");
            return Ok(report);
        }

        let payload = activity.to_json()?;
        let body = serde_json::to_vec(&payload).map_err(|e| AppError::Internal(e.to_string()))?;
        let object_id = activity.object_id().to_string();

        // Held by every spawned delivery, so it outlives a cancelled caller.
        let sequence = self.sequencer.acquire(&object_id).await;
        let dispatch = Arc::new(Dispatch {
            sender: activity.actor().clone(),
            activity_id: activity.id().to_string(),
            object_id,
            payload,
            body,
            transport: self.transport.clone(),
            retry_queue: self.retry_queue.clone(),
            semaphore: self.semaphore.clone(),
            _sequence: sequence,
        });

        let handles: Vec<_> = targets
            .iter()
            .map(|target| {
                let dispatch = dispatch.clone();
                let inbox = target.inbox.clone();
                tokio::spawn(async move { dispatch.run(inbox).await })
            })
            .collect();
        drop(dispatch);

        for (target, joined) in targets.into_iter().zip(join_all(handles).await) {
            let (outcome, queued) = joined.unwrap_or_else(|e| {
                (
                    DeliveryOutcome::Failed(DeliveryError::Transport(format!(
                        "delivery task failed: {e}"
                    ))),
                    false,
                )
            });
            report.outcomes.push(RecipientOutcome {
                inbox: target.inbox,
                recipients: target.recipients,
                outcome,
                queued,
            });
        }

        info!(
            activity = %report.activity_id,
            kind = activity.activity_type(),
            inboxes = report.outcomes.len(),
            delivered = report.delivered_count(),
            failed = report.failed_count(),
            deferred = report.deferred_count(),
            "Fan-out finished"
        );
        Ok(report)
    }
}

impl Dispatch {
    async fn run(&self, inbox: Url) -> (DeliveryOutcome, bool) {
        if let Some(queue) = &self.retry_queue {
            match queue.has_pending(&self.object_id, &inbox).await {
                Ok(true) => return self.defer(queue.as_ref(), inbox).await,
                Ok(false) => {}
                Err(e) => {
                    warn!(inbox = %inbox, error = %e, "Could not check pending deliveries");
                }
            }
        }

        let Ok(_permit) = self.semaphore.acquire().await else {
            return (
                DeliveryOutcome::Failed(DeliveryError::Transport(
                    "delivery pool closed".to_string(),
                )),
                false,
            );
        };

        match self.transport.deliver(&self.sender, &inbox, &self.body).await {
            Ok(()) => {
                debug!(inbox = %inbox, activity = %self.activity_id, "Delivered");
                (DeliveryOutcome::Delivered, false)
            }
            Err(e) => {
                warn!(inbox = %inbox, activity = %self.activity_id, error = %e, "Delivery failed");
                let queued = match &self.retry_queue {
                    Some(queue) if e.is_retryable() => {
                        self.enqueue(queue.as_ref(), inbox, Some(e.to_string())).await
                    }
                    _ => false,
                };
                (DeliveryOutcome::Failed(e), queued)
            }
        }
    }

    async fn defer(&self, queue: &dyn RetryQueue, inbox: Url) -> (DeliveryOutcome, bool) {
        debug!(inbox = %inbox, object = %self.object_id, "Deferring behind pending delivery");
        if self.enqueue(queue, inbox, None).await {
            (DeliveryOutcome::Deferred, true)
        } else {
            (
                DeliveryOutcome::Failed(DeliveryError::Transport(
                    "could not queue behind pending delivery".to_string(),
                )),
                false,
            )
        }
    }

    async fn enqueue(&self, queue: &dyn RetryQueue, inbox: Url, last_error: Option<String>) -> bool {
        let task = RetryTask {
            activity_id: self.activity_id.clone(),
            object_id: self.object_id.clone(),
            sender: self.sender.clone(),
            inbox: inbox.clone(),
            payload: self.payload.clone(),
            last_error,
        };
        match queue.enqueue(task).await {
            Ok(()) => true,
            Err(e) => {
                warn!(inbox = %inbox, activity = %self.activity_id, error = %e, "Failed to queue delivery retry");
                false
            }
        }
    }
}

fn parse_iri(iri: &str) -> AppResult<Url> {
    Url::parse(iri).map_err(|e| AppError::Validation(format!("invalid IRI {iri}: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn recipient(actor: &str, inbox: &str, shared: Option<&str>) -> Recipient {
        Recipient {
            actor: Url::parse(actor).unwrap(),
            inbox: Url::parse(inbox).unwrap(),
            shared_inbox: shared.map(|s| Url::parse(s).unwrap()),
        }
    }

    #[test]
    fn test_group_by_shared_inbox() {
        let targets = group_by_delivery_inbox(vec![
            recipient(
                "https://example.com/users/alice",
                "https://example.com/users/alice/inbox",
                Some("https://example.com/inbox"),
            ),
            recipient(
                "https://other.com/users/charlie",
                "https://other.com/users/charlie/inbox",
                None,
            ),
            recipient(
                "https://example.com/users/bob",
                "https://example.com/users/bob/inbox",
                Some("https://example.com/inbox"),
            ),
        ]);

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].inbox.as_str(), "https://example.com/inbox");
        assert!(targets[0].shared);
        assert_eq!(targets[0].recipients.len(), 2);
        assert_eq!(
            targets[1].inbox.as_str(),
            "https://other.com/users/charlie/inbox"
        );
        assert!(!targets[1].shared);
    }

    #[test]
    fn test_recipients_without_shared_inbox_stay_separate() {
        let targets = group_by_delivery_inbox(vec![
            recipient(
                "https://example.com/users/alice",
                "https://example.com/users/alice/inbox",
                None,
            ),
            recipient(
                "https://example.com/users/bob",
                "https://example.com/users/bob/inbox",
                None,
            ),
        ]);

        assert_eq!(targets.len(), 2);
        assert!(targets.iter().all(|t| t.recipients.len() == 1));
    }

    #[test]
    fn test_recipient_rejects_bad_inbox() {
        let actor = actor::Model {
            id: "1".to_string(),
            iri: "https://remote.example/users/bob".to_string(),
            username: "bob".to_string(),
            domain: "remote.example".to_string(),
            is_local: false,
            user_id: None,
            inbox_url: "not a url".to_string(),
            shared_inbox_url: Some("also bad".to_string()),
            manually_approves_followers: false,
            followers_count: 0,
            following_count: 0,
            display_name: None,
            summary: None,
            avatar_url: None,
            public_key_pem: None,
            last_fetched_at: None,
            created_at: chrono::Utc::now().into(),
            updated_at: None,
        };

        assert!(matches!(
            Recipient::from_actor(&actor),
            Err(DeliveryError::InvalidInbox(_))
        ));
    }

    #[test]
    fn test_report_lookup() {
        let report = DeliveryReport {
            activity_id: Url::parse("https://local.example/notes/1/activity").unwrap(),
            outcomes: vec![
                RecipientOutcome {
                    inbox: Url::parse("https://b.example/inbox").unwrap(),
                    recipients: vec![Url::parse("https://b.example/users/b").unwrap()],
                    outcome: DeliveryOutcome::Delivered,
                    queued: false,
                },
                RecipientOutcome {
                    inbox: Url::parse("https://c.example/inbox").unwrap(),
                    recipients: vec![Url::parse("https://c.example/users/c").unwrap()],
                    outcome: DeliveryOutcome::Failed(DeliveryError::Transport("down".into())),
                    queued: true,
                },
            ],
            skipped: Vec::new(),
            no_recipients: false,
        };

        assert_eq!(report.delivered_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(
            report.outcome_for("https://b.example/users/b"),
            Some(&DeliveryOutcome::Delivered)
        );
        assert!(report.outcome_for("https://d.example/users/d").is_none());
    }
}
