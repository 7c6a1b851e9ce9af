//! Inbound follow-graph activities, through the processor and over HTTP.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::Harness;
use fedigraph_core::{FollowState, NoOpReason, Transition};
use fedigraph_federation::{InboundActivity, InboxOutcome, inbox_router};
use serde_json::{Value, json};
use tower::ServiceExt;

fn parse(value: Value) -> InboundActivity {
    serde_json::from_value(value).unwrap()
}

fn follow(actor: &str, object: &str) -> Value {
    json!({
        "@context": "https://www.w3.org/ns/activitystreams",
        "id": format!("{actor}/follows/1"),
        "type": "Follow",
        "actor": actor,
        "object": object,
    })
}

fn wrap(kind: &str, actor: &str, object: Value) -> Value {
    json!({
        "@context": "https://www.w3.org/ns/activitystreams",
        "id": format!("{actor}/{}/1", kind.to_lowercase()),
        "type": kind,
        "actor": actor,
        "object": object,
    })
}

#[tokio::test]
async fn test_follow_of_open_account_is_accepted_and_answered() {
    let h = Harness::new().await;
    let alice = h.local("alice").await;
    let bob = h.unseen_remote("bob", "b.example");

    let outcome = h
        .processor()
        .handle(parse(follow(bob.as_str(), &alice.iri)))
        .await
        .unwrap();

    let InboxOutcome::Follow {
        request,
        accept_delivery,
    } = outcome
    else {
        panic!("expected a Follow outcome");
    };
    assert!(request.created);
    assert_eq!(request.state(), FollowState::Accepted);
    assert_eq!(accept_delivery.unwrap().delivered_count(), 1);

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].inbox.as_str(), "https://b.example/inbox");
    assert_eq!(sent[0].body["type"], "Accept");
    assert_eq!(sent[0].body["actor"], alice.iri.as_str());
    assert_eq!(sent[0].body["object"]["id"], format!("{bob}/follows/1"));

    assert_eq!(h.reload(&alice).await.followers_count, 1);
}

#[tokio::test]
async fn test_follow_of_locked_account_waits_for_approval() {
    let h = Harness::new().await;
    let alice = h.locked_local("alice").await;
    let bob = h.unseen_remote("bob", "b.example");

    let outcome = h
        .processor()
        .handle(parse(follow(bob.as_str(), &alice.iri)))
        .await
        .unwrap();

    let InboxOutcome::Follow {
        request,
        accept_delivery,
    } = outcome
    else {
        panic!("expected a Follow outcome");
    };
    assert_eq!(request.state(), FollowState::Pending);
    assert!(accept_delivery.is_none());
    assert!(h.transport.sent().is_empty());
    assert_eq!(h.reload(&alice).await.followers_count, 0);
}

#[tokio::test]
async fn test_redelivered_follow_is_idempotent_but_answered_again() {
    let h = Harness::new().await;
    let alice = h.local("alice").await;
    let bob = h.unseen_remote("bob", "b.example");
    let processor = h.processor();

    for _ in 0..2 {
        processor
            .handle(parse(follow(bob.as_str(), &alice.iri)))
            .await
            .unwrap();
    }

    assert_eq!(h.reload(&alice).await.followers_count, 1);
    assert_eq!(
        h.transport.types_sent_to("https://b.example/inbox"),
        ["Accept", "Accept"]
    );
}

#[tokio::test]
async fn test_follow_creates_unknown_remote_follower() {
    let h = Harness::new().await;
    let alice = h.local("alice").await;
    let bob = h.unseen_remote("bob", "b.example");

    h.processor()
        .handle(parse(follow(bob.as_str(), &alice.iri)))
        .await
        .unwrap();

    let stored = h.directory.find_known(&bob).await.unwrap().unwrap();
    assert!(!stored.is_local);
    assert_eq!(stored.following_count, 1);
    assert_eq!(h.fetcher.calls(), 1);
}

#[tokio::test]
async fn test_follow_is_dropped_when_it_cannot_apply() {
    let h = Harness::new().await;
    let alice = h.local("alice").await;
    let bob = h.unseen_remote("bob", "b.example");
    let processor = h.processor();

    let cases = [
        // Object is not one of ours.
        follow(bob.as_str(), "https://elsewhere.example/users/zed"),
        // Object looks local but does not exist.
        follow(bob.as_str(), "https://local.example/users/nobody"),
        // Follower cannot be fetched.
        follow("https://gone.example/users/ghost", &alice.iri),
        // Local actors do not come in over HTTP.
        follow(&alice.iri, "https://local.example/users/alice"),
    ];
    for case in cases {
        let outcome = processor.handle(parse(case)).await.unwrap();
        assert!(
            matches!(outcome, InboxOutcome::Ignored { .. }),
            "{outcome:?}"
        );
    }
    assert_eq!(h.reload(&alice).await.followers_count, 0);
}

#[tokio::test]
async fn test_undo_after_accept_removes_edge_and_counters() {
    let h = Harness::new().await;
    let alice = h.local("alice").await;
    let bob = h.unseen_remote("bob", "b.example");
    let processor = h.processor();
    let follow_json = follow(bob.as_str(), &alice.iri);
    processor.handle(parse(follow_json.clone())).await.unwrap();

    let undo = wrap("Undo", bob.as_str(), follow_json);
    let outcome = processor.handle(parse(undo.clone())).await.unwrap();
    assert!(matches!(outcome, InboxOutcome::Undo(Transition::Applied(_))));
    assert_eq!(h.reload(&alice).await.followers_count, 0);
    let stored_bob = h.directory.find_known(&bob).await.unwrap().unwrap();
    assert_eq!(stored_bob.following_count, 0);

    let again = processor.handle(parse(undo)).await.unwrap();
    assert_eq!(
        again,
        InboxOutcome::Undo(Transition::NoOp(NoOpReason::NotFound))
    );
}

#[tokio::test]
async fn test_undo_of_pending_request_leaves_counters() {
    let h = Harness::new().await;
    let alice = h.locked_local("alice").await;
    let bob = h.unseen_remote("bob", "b.example");
    let processor = h.processor();
    let follow_json = follow(bob.as_str(), &alice.iri);
    processor.handle(parse(follow_json.clone())).await.unwrap();

    let outcome = processor
        .handle(parse(wrap("Undo", bob.as_str(), follow_json)))
        .await
        .unwrap();

    assert!(matches!(outcome, InboxOutcome::Undo(Transition::Applied(_))));
    let stored_bob = h.directory.find_known(&bob).await.unwrap().unwrap();
    let edge = h.follows.find_edge(&stored_bob.id, &alice.id).await.unwrap();
    assert!(edge.is_none());
    assert_eq!(h.reload(&alice).await.followers_count, 0);
}

#[tokio::test]
async fn test_undo_by_someone_else_is_ignored() {
    let h = Harness::new().await;
    let alice = h.local("alice").await;
    let bob = h.unseen_remote("bob", "b.example");
    let processor = h.processor();
    let follow_json = follow(bob.as_str(), &alice.iri);
    processor.handle(parse(follow_json.clone())).await.unwrap();

    let outcome = processor
        .handle(parse(wrap(
            "Undo",
            "https://evil.example/users/mallory",
            follow_json,
        )))
        .await
        .unwrap();

    assert!(matches!(outcome, InboxOutcome::Ignored { .. }));
    assert_eq!(h.reload(&alice).await.followers_count, 1);
}

#[tokio::test]
async fn test_remote_accept_completes_our_pending_follow() {
    let h = Harness::new().await;
    let alice = h.local("alice").await;
    let carol_iri = h.unseen_remote("carol", "c.example");
    h.fetcher.set_locked("carol", true);

    let sent = h.outbox().follow(&alice, carol_iri.as_str()).await.unwrap();
    assert_eq!(sent.result.state(), FollowState::Pending);
    let follow_json = h.transport.sent()[0].body.clone();
    assert_eq!(follow_json["type"], "Follow");

    let accept = wrap("Accept", carol_iri.as_str(), follow_json);
    let outcome = h.processor().handle(parse(accept.clone())).await.unwrap();
    assert!(matches!(outcome, InboxOutcome::Accept(Transition::Applied(_))));
    assert_eq!(h.reload(&alice).await.following_count, 1);

    let again = h.processor().handle(parse(accept)).await.unwrap();
    assert_eq!(
        again,
        InboxOutcome::Accept(Transition::NoOp(NoOpReason::AlreadyAccepted))
    );
    assert_eq!(h.reload(&alice).await.following_count, 1);
}

#[tokio::test]
async fn test_remote_accept_by_follow_id() {
    let h = Harness::new().await;
    let alice = h.local("alice").await;
    let carol_iri = h.unseen_remote("carol", "c.example");
    h.fetcher.set_locked("carol", true);
    h.outbox().follow(&alice, carol_iri.as_str()).await.unwrap();
    let follow_id = h.transport.sent()[0].body["id"].clone();

    let outcome = h
        .processor()
        .handle(parse(wrap("Accept", carol_iri.as_str(), follow_id)))
        .await
        .unwrap();

    assert!(matches!(outcome, InboxOutcome::Accept(Transition::Applied(_))));
}

#[tokio::test]
async fn test_accept_from_wrong_actor_is_ignored() {
    let h = Harness::new().await;
    let alice = h.local("alice").await;
    let carol_iri = h.unseen_remote("carol", "c.example");
    h.fetcher.set_locked("carol", true);
    h.remote("dave", "d.example").await;
    h.outbox().follow(&alice, carol_iri.as_str()).await.unwrap();
    let follow_json = h.transport.sent()[0].body.clone();

    let outcome = h
        .processor()
        .handle(parse(wrap(
            "Accept",
            "https://d.example/users/dave",
            follow_json,
        )))
        .await
        .unwrap();

    assert!(matches!(outcome, InboxOutcome::Ignored { .. }));
    assert_eq!(h.reload(&alice).await.following_count, 0);
}

#[tokio::test]
async fn test_remote_reject_withdraws_pending_follow() {
    let h = Harness::new().await;
    let alice = h.local("alice").await;
    let carol_iri = h.unseen_remote("carol", "c.example");
    h.fetcher.set_locked("carol", true);
    h.outbox().follow(&alice, carol_iri.as_str()).await.unwrap();
    let follow_json = h.transport.sent()[0].body.clone();

    let outcome = h
        .processor()
        .handle(parse(wrap("Reject", carol_iri.as_str(), follow_json)))
        .await
        .unwrap();

    assert!(matches!(outcome, InboxOutcome::Reject(Transition::Applied(_))));
    let carol = h.directory.find_known(&carol_iri).await.unwrap().unwrap();
    assert!(h.follows.find_edge(&alice.id, &carol.id).await.unwrap().is_none());
    assert_eq!(h.reload(&alice).await.following_count, 0);
}

#[tokio::test]
async fn test_accept_from_unknown_actor_is_a_no_op() {
    let h = Harness::new().await;
    let alice = h.local("alice").await;

    let outcome = h
        .processor()
        .handle(parse(wrap(
            "Accept",
            "https://never.example/users/nobody",
            follow(&alice.iri, "https://never.example/users/nobody"),
        )))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        InboxOutcome::Accept(Transition::NoOp(NoOpReason::NotFound))
    );
}

#[tokio::test]
async fn test_unsupported_activity_is_ignored() {
    let h = Harness::new().await;
    let outcome = h
        .processor()
        .handle(parse(json!({
            "id": "https://b.example/likes/1",
            "type": "Like",
            "actor": "https://b.example/users/bob",
            "object": "https://local.example/notes/1",
        })))
        .await
        .unwrap();

    assert!(matches!(outcome, InboxOutcome::Ignored { reason } if reason.contains("Like")));
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/activity+json")
        .body(body.into())
        .unwrap()
}

#[tokio::test]
async fn test_inbox_routes() {
    let h = Harness::new().await;
    let alice = h.local("alice").await;
    let bob = h.unseen_remote("bob", "b.example");
    let router = inbox_router(Arc::new(h.processor()));

    let bad = router
        .clone()
        .oneshot(post("/inbox", "{not json"))
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

    let ignored = router
        .clone()
        .oneshot(post(
            "/inbox",
            json!({ "type": "Like", "id": "https://b.example/likes/1" }).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(ignored.status(), StatusCode::ACCEPTED);

    let followed = router
        .oneshot(post(
            "/users/alice/inbox",
            follow(bob.as_str(), &alice.iri).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(followed.status(), StatusCode::ACCEPTED);
    assert_eq!(h.reload(&alice).await.followers_count, 1);
}
