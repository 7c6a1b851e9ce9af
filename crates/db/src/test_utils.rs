//! Test utilities for database operations.
//!
//! Provides an in-memory `SQLite` database with migrations applied, plus
//! fixture builders for actors and notes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fedigraph_common::IdGenerator;
use sea_orm::{
    ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, DbErr, Set,
};
use sea_orm_migration::MigratorTrait;
use serde_json::json;
use tracing::debug;

use crate::entities::{actor, note, note::Visibility};
use crate::migrations::Migrator;

/// Base URL local fixtures are minted under.
pub const LOCAL_BASE_URL: &str = "https://local.example";

/// A migrated in-memory test database.
///
/// The pool holds exactly one connection, since every `SQLite` memory
/// connection is its own database.
pub struct TestDatabase {
    /// Database connection.
    pub conn: Arc<DatabaseConnection>,
}

impl TestDatabase {
    /// Create a fresh database and run all migrations.
    pub async fn new() -> Result<Self, DbErr> {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(3600))
            .max_lifetime(Duration::from_secs(3600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;
        Migrator::up(&conn, None).await?;

        debug!("Created in-memory test database");

        Ok(Self {
            conn: Arc::new(conn),
        })
    }

    /// Get the database connection.
    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        self.conn.as_ref()
    }

    /// Get a shared handle for repositories.
    #[must_use]
    pub fn shared(&self) -> Arc<DatabaseConnection> {
        self.conn.clone()
    }
}

/// Builder for actor rows.
#[derive(Debug, Clone)]
pub struct ActorFixture {
    username: String,
    domain: String,
    base_url: String,
    is_local: bool,
    manually_approves_followers: bool,
    shared_inbox: Option<String>,
    inbox: Option<String>,
    last_fetched_at: Option<chrono::DateTime<Utc>>,
}

impl ActorFixture {
    /// A local actor under [`LOCAL_BASE_URL`].
    #[must_use]
    pub fn local(username: &str) -> Self {
        Self {
            username: username.to_string(),
            domain: "local.example".to_string(),
            base_url: LOCAL_BASE_URL.to_string(),
            is_local: true,
            manually_approves_followers: false,
            shared_inbox: Some(format!("{LOCAL_BASE_URL}/inbox")),
            inbox: None,
            last_fetched_at: None,
        }
    }

    /// A freshly fetched remote actor on `domain`, with a shared inbox.
    #[must_use]
    pub fn remote(username: &str, domain: &str) -> Self {
        Self {
            username: username.to_string(),
            domain: domain.to_string(),
            base_url: format!("https://{domain}"),
            is_local: false,
            manually_approves_followers: false,
            shared_inbox: Some(format!("https://{domain}/inbox")),
            inbox: None,
            last_fetched_at: Some(Utc::now()),
        }
    }

    /// Require manual approval of followers.
    #[must_use]
    pub const fn locked(mut self) -> Self {
        self.manually_approves_followers = true;
        self
    }

    /// Drop the shared inbox.
    #[must_use]
    pub fn without_shared_inbox(mut self) -> Self {
        self.shared_inbox = None;
        self
    }

    /// Override the personal inbox URL.
    #[must_use]
    pub fn inbox(mut self, url: &str) -> Self {
        self.inbox = Some(url.to_string());
        self
    }

    /// Mark the remote profile as fetched at `at`.
    #[must_use]
    pub const fn fetched_at(mut self, at: chrono::DateTime<Utc>) -> Self {
        self.last_fetched_at = Some(at);
        self
    }

    /// The IRI this fixture will be stored under.
    #[must_use]
    pub fn iri(&self) -> String {
        format!("{}/users/{}", self.base_url, self.username)
    }

    /// Build the active model without inserting it.
    #[must_use]
    pub fn active_model(&self) -> actor::ActiveModel {
        let id = IdGenerator::new().generate();
        let iri = self.iri();
        actor::ActiveModel {
            id: Set(id.clone()),
            iri: Set(iri.clone()),
            username: Set(self.username.clone()),
            domain: Set(self.domain.clone()),
            is_local: Set(self.is_local),
            user_id: Set(self.is_local.then(|| id.clone())),
            inbox_url: Set(self.inbox.clone().unwrap_or_else(|| format!("{iri}/inbox"))),
            shared_inbox_url: Set(self.shared_inbox.clone()),
            manually_approves_followers: Set(self.manually_approves_followers),
            followers_count: Set(0),
            following_count: Set(0),
            display_name: Set(None),
            summary: Set(None),
            avatar_url: Set(None),
            public_key_pem: Set(None),
            last_fetched_at: Set(self.last_fetched_at.map(Into::into)),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        }
    }

    /// Insert the actor.
    pub async fn insert(&self, db: &DatabaseConnection) -> Result<actor::Model, DbErr> {
        self.active_model().insert(db).await
    }
}

/// Builder for note rows.
#[derive(Debug, Clone)]
pub struct NoteFixture {
    author_id: String,
    content: String,
    visibility: Option<Visibility>,
    mentions: Vec<String>,
}

impl NoteFixture {
    /// A note by `author_id` with unset visibility.
    #[must_use]
    pub fn new(author_id: &str) -> Self {
        Self {
            author_id: author_id.to_string(),
            content: "hello fediverse".to_string(),
            visibility: None,
            mentions: Vec::new(),
        }
    }

    /// Set the visibility.
    #[must_use]
    pub const fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Mention an actor IRI.
    #[must_use]
    pub fn mention(mut self, iri: &str) -> Self {
        self.mentions.push(iri.to_string());
        self
    }

    /// Build the note model without inserting it.
    #[must_use]
    pub fn model(&self) -> note::Model {
        note::Model {
            id: IdGenerator::new().generate(),
            author_id: self.author_id.clone(),
            content: self.content.clone(),
            summary: None,
            visibility: self.visibility.map(|v| v.as_str().to_string()),
            mentions: json!(
                self.mentions
                    .iter()
                    .map(|iri| json!({ "iri": iri }))
                    .collect::<Vec<_>>()
            ),
            sensitive: false,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    /// Insert the note.
    pub async fn insert(&self, db: &DatabaseConnection) -> Result<note::Model, DbErr> {
        let active: note::ActiveModel = self.model().into();
        active.insert(db).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixtures_insert() {
        let db = TestDatabase::new().await.unwrap();
        let alice = ActorFixture::local("alice").insert(db.connection()).await.unwrap();
        assert_eq!(alice.iri, "https://local.example/users/alice");
        assert_eq!(alice.user_id.as_deref(), Some(alice.id.as_str()));

        let bob = ActorFixture::remote("bob", "remote.example")
            .without_shared_inbox()
            .insert(db.connection())
            .await
            .unwrap();
        assert_eq!(bob.inbox_url, "https://remote.example/users/bob/inbox");
        assert!(bob.shared_inbox_url.is_none());

        let note = NoteFixture::new(&alice.id)
            .mention(&bob.iri)
            .insert(db.connection())
            .await
            .unwrap();
        assert_eq!(note.mention_list().len(), 1);
    }
}
