//! Shared setup for federation integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;

use fedigraph_core::FollowStateMachine;
use fedigraph_db::{
    entities::actor,
    repositories::ActorRepository,
    test_utils::{ActorFixture, LOCAL_BASE_URL, TestDatabase},
};
use fedigraph_federation::{
    ActivityComposer, ActorDirectory, DeliveryFanout, InboxProcessor, LocalUris, Outbox,
    testing::{FakeFetcher, FakeTransport, MemoryRetryQueue, remote_iri},
};

/// A database, fake network and the components wired over them.
pub struct Harness {
    pub db: TestDatabase,
    pub fetcher: Arc<FakeFetcher>,
    pub transport: Arc<FakeTransport>,
    pub queue: Arc<MemoryRetryQueue>,
    pub directory: ActorDirectory,
    pub follows: FollowStateMachine,
    pub composer: ActivityComposer,
    pub fanout: DeliveryFanout,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_transport(FakeTransport::default()).await
    }

    pub async fn with_transport(transport: FakeTransport) -> Self {
        let db = TestDatabase::new().await.unwrap();
        let uris = LocalUris::parse(LOCAL_BASE_URL).unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let transport = Arc::new(transport);
        let queue = Arc::new(MemoryRetryQueue::default());

        let directory = ActorDirectory::new(db.shared(), fetcher.clone(), uris.clone());
        let follows = FollowStateMachine::new(db.shared());
        let composer = ActivityComposer::new(uris);
        let fanout = DeliveryFanout::new(follows.clone(), directory.clone(), transport.clone())
            .with_concurrency(4);

        Self {
            db,
            fetcher,
            transport,
            queue,
            directory,
            follows,
            composer,
            fanout,
        }
    }

    /// Fan-out that hands retryable failures to [`Self::queue`].
    pub fn queued_fanout(&self) -> DeliveryFanout {
        self.fanout.clone().with_retry_queue(self.queue.clone())
    }

    pub fn processor(&self) -> InboxProcessor {
        InboxProcessor::new(
            self.directory.clone(),
            self.follows.clone(),
            self.composer.clone(),
        )
        .with_fanout(self.fanout.clone())
    }

    pub fn outbox(&self) -> Outbox {
        Outbox::new(
            self.directory.clone(),
            self.follows.clone(),
            self.composer.clone(),
            self.fanout.clone(),
        )
    }

    pub async fn local(&self, username: &str) -> actor::Model {
        ActorFixture::local(username)
            .insert(self.db.connection())
            .await
            .unwrap()
    }

    pub async fn locked_local(&self, username: &str) -> actor::Model {
        ActorFixture::local(username)
            .locked()
            .insert(self.db.connection())
            .await
            .unwrap()
    }

    /// A remote actor known to the fake network and stored through the
    /// directory.
    pub async fn remote(&self, username: &str, domain: &str) -> actor::Model {
        let iri = self.fetcher.add_remote(username, domain);
        self.directory.resolve_iri(&iri).await.unwrap()
    }

    /// A remote actor that exists on the fake network but is not stored yet.
    pub fn unseen_remote(&self, username: &str, domain: &str) -> url::Url {
        self.fetcher.add_remote(username, domain);
        remote_iri(username, domain)
    }

    pub async fn reload(&self, actor: &actor::Model) -> actor::Model {
        ActorRepository::new(self.db.shared())
            .get_by_id(&actor.id)
            .await
            .unwrap()
    }
}
