//! Database integration tests.
//!
//! Run against an in-memory `SQLite` database with all migrations applied.

#![allow(clippy::unwrap_used)]

use chrono::{Duration, Utc};
use fedigraph_db::entities::{
    Actor, delivery_task, delivery_task::DeliveryTaskStatus, follow, follow::FollowStatus,
    note::Visibility,
};
use fedigraph_db::repositories::{ActorRepository, DeliveryTaskRepository, NoteRepository};
use fedigraph_db::test_utils::{ActorFixture, NoteFixture, TestDatabase};
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set};
use serde_json::json;

fn task(id: &str, object_id: &str, inbox: &str, due_in: Duration) -> delivery_task::ActiveModel {
    delivery_task::ActiveModel {
        id: Set(id.to_string()),
        activity_id: Set(format!("{object_id}/activity")),
        object_id: Set(object_id.to_string()),
        sender_iri: Set("https://local.example/users/alice".to_string()),
        inbox_url: Set(inbox.to_string()),
        payload: Set(json!({"type": "Create"})),
        attempt: Set(1),
        status: Set(DeliveryTaskStatus::Pending),
        last_error: Set(None),
        next_attempt_at: Set((Utc::now() + due_in).into()),
        created_at: Set(Utc::now().into()),
    }
}

#[tokio::test]
async fn test_database_connection() {
    let db = TestDatabase::new().await.unwrap();
    let result = db
        .connection()
        .execute(sea_orm::Statement::from_string(
            db.connection().get_database_backend(),
            "SELECT 1".to_string(),
        ))
        .await;
    assert!(result.is_ok(), "Query failed: {:?}", result.err());
}

#[tokio::test]
async fn test_actor_iri_is_unique() {
    let db = TestDatabase::new().await.unwrap();
    ActorFixture::remote("bob", "remote.example")
        .insert(db.connection())
        .await
        .unwrap();

    let duplicate = ActorFixture::remote("bob", "remote.example")
        .insert(db.connection())
        .await;
    assert!(duplicate.is_err());
}

#[tokio::test]
async fn test_note_round_trip() {
    let db = TestDatabase::new().await.unwrap();
    let alice = ActorFixture::local("alice").insert(db.connection()).await.unwrap();
    let note = NoteFixture::new(&alice.id).insert(db.connection()).await.unwrap();

    let repo = NoteRepository::new(db.shared());
    let stored = repo.get_by_id(&note.id).await.unwrap();
    assert_eq!(stored.visibility, None);

    repo.delete(&note.id).await.unwrap();
    assert!(repo.find_by_id(&note.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_stored_visibility_loads_as_public() {
    let db = TestDatabase::new().await.unwrap();
    let alice = ActorFixture::local("alice").insert(db.connection()).await.unwrap();
    let note = NoteFixture::new(&alice.id)
        .visibility(Visibility::Followers)
        .insert(db.connection())
        .await
        .unwrap();

    db.connection()
        .execute(sea_orm::Statement::from_sql_and_values(
            db.connection().get_database_backend(),
            "UPDATE note SET visibility = 'specified' WHERE id = ?",
            [note.id.clone().into()],
        ))
        .await
        .unwrap();

    let stored = NoteRepository::new(db.shared())
        .find_by_id(&note.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.visibility.as_deref(), Some("specified"));
    assert_eq!(stored.effective_visibility(), Visibility::Public);
}

#[tokio::test]
async fn test_actor_referenced_by_follow_cannot_be_deleted() {
    let db = TestDatabase::new().await.unwrap();
    let alice = ActorFixture::local("alice").insert(db.connection()).await.unwrap();
    let bob = ActorFixture::remote("bob", "remote.example")
        .insert(db.connection())
        .await
        .unwrap();
    follow::ActiveModel {
        id: Set("01edge".to_string()),
        follower_id: Set(bob.id.clone()),
        following_id: Set(alice.id.clone()),
        status: Set(FollowStatus::Accepted),
        created_at: Set(Utc::now().into()),
        accepted_at: Set(Some(Utc::now().into())),
    }
    .insert(db.connection())
    .await
    .unwrap();

    assert!(Actor::delete_by_id(bob.id.clone()).exec(db.connection()).await.is_err());
    assert!(Actor::delete_by_id(alice.id.clone()).exec(db.connection()).await.is_err());
    assert!(Actor::find_by_id(bob.id).one(db.connection()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_actor_referenced_by_note_cannot_be_deleted() {
    let db = TestDatabase::new().await.unwrap();
    let alice = ActorFixture::local("alice").insert(db.connection()).await.unwrap();
    let note = NoteFixture::new(&alice.id).insert(db.connection()).await.unwrap();

    assert!(Actor::delete_by_id(alice.id.clone()).exec(db.connection()).await.is_err());

    NoteRepository::new(db.shared()).delete(&note.id).await.unwrap();
    let deleted = Actor::delete_by_id(alice.id).exec(db.connection()).await.unwrap();
    assert_eq!(deleted.rows_affected, 1);
}

#[tokio::test]
async fn test_due_tasks_in_enqueue_order() {
    let db = TestDatabase::new().await.unwrap();
    let repo = DeliveryTaskRepository::new(db.shared());
    let inbox = "https://remote.example/inbox";

    repo.create(task("01b", "https://local.example/notes/1", inbox, Duration::seconds(-5)))
        .await
        .unwrap();
    repo.create(task("01a", "https://local.example/notes/1", inbox, Duration::seconds(-5)))
        .await
        .unwrap();
    repo.create(task("01c", "https://local.example/notes/2", inbox, Duration::hours(1)))
        .await
        .unwrap();

    let due = repo.find_due(Utc::now().into(), 10).await.unwrap();
    let ids: Vec<_> = due.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["01a", "01b"]);

    assert!(
        repo.has_pending_before("https://local.example/notes/1", inbox, "01b")
            .await
            .unwrap()
    );
    assert!(
        !repo
            .has_pending_before("https://local.example/notes/1", inbox, "01a")
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_task_lifecycle() {
    let db = TestDatabase::new().await.unwrap();
    let repo = DeliveryTaskRepository::new(db.shared());
    let inbox = "https://remote.example/inbox";
    let object = "https://local.example/notes/1";

    repo.create(task("01a", object, inbox, Duration::zero()))
        .await
        .unwrap();
    assert!(repo.has_pending(object, inbox).await.unwrap());

    let later = (Utc::now() + Duration::minutes(2)).into();
    repo.reschedule("01a", 2, later, "503").await.unwrap();
    let stored = repo.find_by_id("01a").await.unwrap().unwrap();
    assert_eq!(stored.attempt, 2);
    assert_eq!(stored.last_error.as_deref(), Some("503"));

    repo.mark_dead("01a", 5, "gave up").await.unwrap();
    assert!(!repo.has_pending(object, inbox).await.unwrap());
    assert_eq!(
        repo.count_by_status(DeliveryTaskStatus::Dead).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_actor_lookup_by_user() {
    let db = TestDatabase::new().await.unwrap();
    let alice = ActorFixture::local("alice").insert(db.connection()).await.unwrap();
    let repo = ActorRepository::new(db.shared());

    let by_user = repo
        .find_by_user_id(alice.user_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_user.id, alice.id);

    let by_ids = repo
        .find_by_ids(&[alice.id.clone(), "missing".to_string()])
        .await
        .unwrap();
    assert_eq!(by_ids.len(), 1);
}
