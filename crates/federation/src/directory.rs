//! Actor directory: resolves local and remote actors.
//!
//! Local actors come from the store and never expire. Remote actors are
//! served from the store while fresh and refetched through the
//! [`RemoteActorFetcher`] otherwise. Concurrent discovery of the same IRI
//! converges on one row through the unique index on `actor.iri`.

use std::sync::Arc;

use chrono::{Duration, Utc};
use fedigraph_common::{AppError, AppResult, IdGenerator};
use fedigraph_db::{entities::actor, repositories::ActorRepository};
use sea_orm::{DatabaseConnection, Set};
use tracing::{debug, info, warn};
use url::Url;

use crate::{ActorProfile, FetchError, RemoteActorFetcher, uris::LocalUris};

/// How long a fetched remote profile is served without refetching.
pub const DEFAULT_REFRESH_HOURS: i64 = 24;

/// Profile fields of a local user that are projected onto its actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    /// User id; becomes the actor's `user_id`.
    pub id: String,
    /// Login name, also the last segment of the actor IRI.
    pub username: String,
    /// Shown name.
    pub display_name: Option<String>,
    /// Bio.
    pub summary: Option<String>,
    /// Avatar image URL.
    pub avatar_url: Option<String>,
    /// PEM-encoded public key published on the actor document.
    pub public_key_pem: Option<String>,
    /// Whether follow requests wait for approval.
    pub manually_approves_followers: bool,
    /// Seed for a newly created actor. Afterwards the follow state machine
    /// owns the counters.
    pub followers_count: i32,
    /// Seed for a newly created actor.
    pub following_count: i32,
}

/// Resolves actors by local username or IRI.
#[derive(Clone)]
pub struct ActorDirectory {
    actors: ActorRepository,
    fetcher: Arc<dyn RemoteActorFetcher>,
    uris: LocalUris,
    refresh_after: Duration,
    id_gen: IdGenerator,
}

impl ActorDirectory {
    /// Create a new directory.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        fetcher: Arc<dyn RemoteActorFetcher>,
        uris: LocalUris,
    ) -> Self {
        Self {
            actors: ActorRepository::new(db),
            fetcher,
            uris,
            refresh_after: Duration::hours(DEFAULT_REFRESH_HOURS),
            id_gen: IdGenerator::new(),
        }
    }

    /// Override the remote profile freshness window.
    #[must_use]
    pub fn with_refresh_hours(mut self, hours: i64) -> Self {
        self.refresh_after = Duration::hours(hours);
        self
    }

    /// The local IRI scheme.
    #[must_use]
    pub const fn uris(&self) -> &LocalUris {
        &self.uris
    }

    /// Username of `iri` if it is a local actor IRI.
    #[must_use]
    pub fn local_username(&self, iri: &Url) -> Option<String> {
        self.uris.local_username(iri)
    }

    /// Resolve a local username (optionally `@`-prefixed) or an actor IRI.
    pub async fn resolve(&self, identifier: &str) -> AppResult<actor::Model> {
        let identifier = identifier.trim();
        if identifier.contains("://") {
            let iri = Url::parse(identifier)
                .map_err(|e| AppError::Validation(format!("invalid IRI {identifier}: {e}")))?;
            return self.resolve_iri(&iri).await;
        }

        let username = identifier.strip_prefix('@').unwrap_or(identifier);
        if username.is_empty() || username.contains(['@', '/']) {
            return Err(AppError::Validation(format!(
                "not a local username or IRI: {identifier}"
            )));
        }
        self.find_local(username).await
    }

    /// Resolve an actor IRI.
    pub async fn resolve_iri(&self, iri: &Url) -> AppResult<actor::Model> {
        if self.uris.is_local(iri) {
            return self
                .actors
                .find_by_iri(iri.as_str())
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Actor: {iri}")));
        }

        let cached = self.actors.find_by_iri(iri.as_str()).await?;
        if let Some(actor) = cached.as_ref().filter(|a| self.is_fresh(a)) {
            debug!(actor = %iri, "Remote actor cache hit");
            return Ok(actor.clone());
        }

        let fetched = self.fetcher.fetch(iri).await.and_then(|profile| {
            if profile.id == *iri {
                Ok(profile)
            } else {
                Err(FetchError::Invalid(format!(
                    "document for {iri} has id {}",
                    profile.id
                )))
            }
        });

        match (fetched, cached) {
            (Ok(profile), cached) => self.store_profile(cached, profile).await,
            (Err(e), Some(stale)) => {
                warn!(actor = %iri, error = %e, "Refetch failed, serving stale actor");
                Ok(stale)
            }
            (Err(FetchError::NotFound(_)), None) => {
                Err(AppError::NotFound(format!("Actor: {iri}")))
            }
            (Err(FetchError::Invalid(reason)), None) => Err(AppError::Validation(reason)),
            (Err(FetchError::Transport(reason)), None) => Err(AppError::Federation(reason)),
        }
    }

    /// Look up a stored actor without fetching.
    pub async fn find_known(&self, iri: &Url) -> AppResult<Option<actor::Model>> {
        self.actors.find_by_iri(iri.as_str()).await
    }

    /// Find a local actor by username.
    pub async fn find_local(&self, username: &str) -> AppResult<actor::Model> {
        self.actors
            .find_local_by_username(username)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Local actor: {username}")))
    }

    /// Project a local user's profile onto its actor, creating the actor on
    /// first call. Unchanged input leaves the row untouched.
    pub async fn sync_local_actor_from_user(&self, user: &LocalUser) -> AppResult<actor::Model> {
        let iri = self.uris.actor(&user.username);
        let inbox = LocalUris::inbox(&iri).to_string();
        let shared_inbox = Some(self.uris.shared_inbox().to_string());

        let Some(existing) = self.actors.find_by_user_id(&user.id).await? else {
            let now = Utc::now();
            let model = actor::ActiveModel {
                id: Set(self.id_gen.generate()),
                iri: Set(iri.to_string()),
                username: Set(user.username.clone()),
                domain: Set(self.uris.domain()),
                is_local: Set(true),
                user_id: Set(Some(user.id.clone())),
                inbox_url: Set(inbox),
                shared_inbox_url: Set(shared_inbox),
                manually_approves_followers: Set(user.manually_approves_followers),
                followers_count: Set(user.followers_count),
                following_count: Set(user.following_count),
                display_name: Set(user.display_name.clone()),
                summary: Set(user.summary.clone()),
                avatar_url: Set(user.avatar_url.clone()),
                public_key_pem: Set(user.public_key_pem.clone()),
                last_fetched_at: Set(None),
                created_at: Set(now.into()),
                updated_at: Set(None),
            };
            let (created, inserted) = self.actors.insert_if_absent(model).await?;
            if inserted {
                info!(actor = %created.iri, user_id = %user.id, "Local actor created");
            }
            return Ok(created);
        };

        let unchanged = existing.iri == iri.as_str()
            && existing.username == user.username
            && existing.inbox_url == inbox
            && existing.shared_inbox_url == shared_inbox
            && existing.manually_approves_followers == user.manually_approves_followers
            && existing.display_name == user.display_name
            && existing.summary == user.summary
            && existing.avatar_url == user.avatar_url
            && existing.public_key_pem == user.public_key_pem;
        if unchanged {
            debug!(actor = %existing.iri, "Local actor already in sync");
            return Ok(existing);
        }

        let mut model: actor::ActiveModel = existing.into();
        model.iri = Set(iri.to_string());
        model.username = Set(user.username.clone());
        model.inbox_url = Set(inbox);
        model.shared_inbox_url = Set(shared_inbox);
        model.manually_approves_followers = Set(user.manually_approves_followers);
        model.display_name = Set(user.display_name.clone());
        model.summary = Set(user.summary.clone());
        model.avatar_url = Set(user.avatar_url.clone());
        model.public_key_pem = Set(user.public_key_pem.clone());
        model.updated_at = Set(Some(Utc::now().into()));

        let updated = self.actors.update(model).await?;
        info!(actor = %updated.iri, "Local actor profile synced");
        Ok(updated)
    }

    fn is_fresh(&self, actor: &actor::Model) -> bool {
        actor
            .last_fetched_at
            .is_some_and(|at| Utc::now().signed_duration_since(at) <= self.refresh_after)
    }

    async fn store_profile(
        &self,
        cached: Option<actor::Model>,
        profile: ActorProfile,
    ) -> AppResult<actor::Model> {
        let now = Utc::now();

        if let Some(existing) = cached {
            let mut model: actor::ActiveModel = existing.into();
            model.username = Set(profile.preferred_username.clone());
            model.inbox_url = Set(profile.inbox.to_string());
            model.shared_inbox_url = Set(profile.shared_inbox.as_ref().map(Url::to_string));
            model.manually_approves_followers = Set(profile.manually_approves_followers);
            model.display_name = Set(profile.name.clone());
            model.summary = Set(profile.summary.clone());
            model.avatar_url = Set(profile.icon.clone());
            model.public_key_pem = Set(profile.public_key_pem.clone());
            model.last_fetched_at = Set(Some(now.into()));
            model.updated_at = Set(Some(now.into()));

            let refreshed = self.actors.update(model).await?;
            debug!(actor = %refreshed.iri, "Remote actor refreshed");
            return Ok(refreshed);
        }

        let model = actor::ActiveModel {
            id: Set(self.id_gen.generate()),
            iri: Set(profile.id.to_string()),
            username: Set(profile.preferred_username.clone()),
            domain: Set(profile.domain()),
            is_local: Set(false),
            user_id: Set(None),
            inbox_url: Set(profile.inbox.to_string()),
            shared_inbox_url: Set(profile.shared_inbox.as_ref().map(Url::to_string)),
            manually_approves_followers: Set(profile.manually_approves_followers),
            followers_count: Set(0),
            following_count: Set(0),
            display_name: Set(profile.name.clone()),
            summary: Set(profile.summary.clone()),
            avatar_url: Set(profile.icon.clone()),
            public_key_pem: Set(profile.public_key_pem.clone()),
            last_fetched_at: Set(Some(now.into())),
            created_at: Set(now.into()),
            updated_at: Set(None),
        };

        let (actor, created) = self.actors.insert_if_absent(model).await?;
        if created {
            info!(actor = %actor.iri, "Remote actor discovered");
        } else {
            debug!(actor = %actor.iri, "Remote actor inserted concurrently, using stored row");
        }
        Ok(actor)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::FakeFetcher;
    use fedigraph_db::test_utils::{ActorFixture, LOCAL_BASE_URL, TestDatabase};

    fn uris() -> LocalUris {
        LocalUris::parse(LOCAL_BASE_URL).unwrap()
    }

    fn user(id: &str, username: &str) -> LocalUser {
        LocalUser {
            id: id.to_string(),
            username: username.to_string(),
            display_name: Some("Alice".to_string()),
            summary: None,
            avatar_url: None,
            public_key_pem: None,
            manually_approves_followers: false,
            followers_count: 3,
            following_count: 4,
        }
    }

    #[tokio::test]
    async fn test_resolves_local_username_without_fetching() {
        let db = TestDatabase::new().await.unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let directory = ActorDirectory::new(db.shared(), fetcher.clone(), uris());
        let alice = ActorFixture::local("alice").insert(db.connection()).await.unwrap();

        let by_name = directory.resolve("alice").await.unwrap();
        let by_handle = directory.resolve("@alice").await.unwrap();
        let by_iri = directory.resolve(&alice.iri).await.unwrap();

        assert_eq!(by_name.id, alice.id);
        assert_eq!(by_handle.id, alice.id);
        assert_eq!(by_iri.id, alice.id);
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_local_iri_is_not_found() {
        let db = TestDatabase::new().await.unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let directory = ActorDirectory::new(db.shared(), fetcher.clone(), uris());

        let result = directory.resolve("https://local.example/users/nobody").await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_remote_cache_hit_and_refresh() {
        let db = TestDatabase::new().await.unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.add_remote("bob", "remote.example");
        let directory = ActorDirectory::new(db.shared(), fetcher.clone(), uris());
        let iri = "https://remote.example/users/bob";

        let first = directory.resolve(iri).await.unwrap();
        let second = directory.resolve(iri).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(fetcher.calls(), 1);
        assert!(!first.is_local);
        assert_eq!(first.domain, "remote.example");
        assert_eq!(
            first.shared_inbox_url.as_deref(),
            Some("https://remote.example/inbox")
        );

        // A zero-hour window makes every cached copy stale.
        let eager = directory.clone().with_refresh_hours(0);
        fetcher.set_locked("bob", true);
        let refreshed = eager.resolve(iri).await.unwrap();
        assert_eq!(refreshed.id, first.id);
        assert!(refreshed.manually_approves_followers);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_stale_copy_served_when_refetch_fails() {
        let db = TestDatabase::new().await.unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let directory = ActorDirectory::new(db.shared(), fetcher.clone(), uris());
        let stale = ActorFixture::remote("bob", "remote.example")
            .fetched_at(Utc::now() - Duration::hours(48))
            .insert(db.connection())
            .await
            .unwrap();

        let resolved = directory.resolve(&stale.iri).await.unwrap();

        assert_eq!(resolved.id, stale.id);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_remote_actor_is_not_found() {
        let db = TestDatabase::new().await.unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let directory = ActorDirectory::new(db.shared(), fetcher, uris());

        let result = directory.resolve("https://remote.example/users/ghost").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rejects_remote_handles_and_garbage() {
        let db = TestDatabase::new().await.unwrap();
        let directory =
            ActorDirectory::new(db.shared(), Arc::new(FakeFetcher::default()), uris());

        for input in ["", "@bob@remote.example", "https://", "a/b"] {
            let result = directory.resolve(input).await;
            assert!(
                matches!(result, Err(AppError::Validation(_))),
                "{input}: {result:?}"
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cold_resolves_converge_on_one_row() {
        let db = TestDatabase::new().await.unwrap();
        let fetcher = Arc::new(FakeFetcher::default().with_barrier(2));
        fetcher.add_remote("bob", "remote.example");
        let directory = ActorDirectory::new(db.shared(), fetcher.clone(), uris());

        let a = {
            let directory = directory.clone();
            tokio::spawn(async move { directory.resolve("https://remote.example/users/bob").await })
        };
        let b = {
            let directory = directory.clone();
            tokio::spawn(async move { directory.resolve("https://remote.example/users/bob").await })
        };
        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        // Both callers missed the cache and fetched.
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(a.id, b.id);

        use fedigraph_db::entities::Actor;
        use sea_orm::{EntityTrait, PaginatorTrait};
        assert_eq!(Actor::find().count(db.connection()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sync_local_actor_is_idempotent() {
        let db = TestDatabase::new().await.unwrap();
        let directory =
            ActorDirectory::new(db.shared(), Arc::new(FakeFetcher::default()), uris());
        let alice = user("u1", "alice");

        let created = directory.sync_local_actor_from_user(&alice).await.unwrap();
        assert_eq!(created.iri, "https://local.example/users/alice");
        assert_eq!(created.inbox_url, "https://local.example/users/alice/inbox");
        assert_eq!(
            created.shared_inbox_url.as_deref(),
            Some("https://local.example/inbox")
        );
        assert!(created.is_local);
        assert_eq!(created.followers_count, 3);
        assert!(created.last_fetched_at.is_none());

        let again = directory.sync_local_actor_from_user(&alice).await.unwrap();
        assert_eq!(again, created);

        let renamed = LocalUser {
            display_name: Some("Alice B.".to_string()),
            manually_approves_followers: true,
            followers_count: 99,
            ..alice
        };
        let updated = directory.sync_local_actor_from_user(&renamed).await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.display_name.as_deref(), Some("Alice B."));
        assert!(updated.manually_approves_followers);
        assert_eq!(updated.followers_count, 3);
        assert!(updated.updated_at.is_some());
    }
}
