use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::{TestResponse, TestServer};
use serde_json::{Value, json};
use shared::{
    config::server::Config,
    models::{Message, Notification, PublicProfile, RecentMessagesResponse, SeenResponse},
};

use crate::{
    app_state::AppState,
    server::{create_app_router, metrics_handle},
};

const IDENTITY: &str = "x-beacon-identity";

async fn server() -> TestServer {
    let state = Arc::new(AppState::in_memory(Arc::new(Config::default())));
    let server = TestServer::new(create_app_router(state, metrics_handle())).unwrap();

    for (identity, name) in [("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol")] {
        server
            .put("/api/profiles/me")
            .add_header(IDENTITY, identity)
            .json(&json!({ "display_name": name }))
            .await
            .assert_status_ok();
    }
    server
}

async fn send(server: &TestServer, from: &str, to: &str, text: &str) -> TestResponse {
    server
        .post("/api/messages")
        .add_header(IDENTITY, from)
        .json(&json!({ "to_identity": to, "text": text }))
        .await
}

fn assert_problem(response: &TestResponse, status: StatusCode, code: &str) {
    response.assert_status(status);
    let content_type = response.header("content-type");
    assert_eq!(content_type.to_str().unwrap(), "application/problem+json");
    let body: Value = response.json();
    assert_eq!(body["code"], code);
    assert_eq!(body["status"], status.as_u16());
}

#[tokio::test]
async fn send_returns_created_message() {
    let server = server().await;

    let response = send(&server, "alice", "bob", "hello bob").await;
    response.assert_status(StatusCode::CREATED);

    let message: Message = response.json();
    assert_eq!(message.from_identity.as_str(), "alice");
    assert_eq!(message.to_identity.as_str(), "bob");
    assert_eq!(message.body.text.as_deref(), Some("hello bob"));
    assert!(!message.seen);
}

#[tokio::test]
async fn send_to_unknown_recipient_is_not_found() {
    let server = server().await;
    let response = send(&server, "alice", "mallory", "anyone there?").await;
    assert_problem(&response, StatusCode::NOT_FOUND, "not_found");
}

#[tokio::test]
async fn send_without_content_is_rejected() {
    let server = server().await;
    let response = send(&server, "alice", "bob", "   ").await;
    assert_problem(&response, StatusCode::BAD_REQUEST, "validation_failed");
}

#[tokio::test]
async fn requests_without_identity_are_unauthorized() {
    let server = server().await;
    let response = server
        .post("/api/messages")
        .json(&json!({ "to_identity": "bob", "text": "hi" }))
        .await;
    assert_problem(&response, StatusCode::UNAUTHORIZED, "unauthenticated");

    server
        .get("/api/notifications")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn history_is_oldest_first_for_both_parties() {
    let server = server().await;
    send(&server, "alice", "bob", "one").await.assert_status(StatusCode::CREATED);
    send(&server, "bob", "alice", "two").await.assert_status(StatusCode::CREATED);
    send(&server, "alice", "bob", "three").await.assert_status(StatusCode::CREATED);
    send(&server, "alice", "carol", "elsewhere").await.assert_status(StatusCode::CREATED);

    for (viewer, peer) in [("alice", "bob"), ("bob", "alice")] {
        let history: Vec<Message> = server
            .get(&format!("/api/conversations/{peer}/messages"))
            .add_header(IDENTITY, viewer)
            .await
            .json();
        let texts: Vec<_> = history.iter().filter_map(|m| m.body.text.as_deref()).collect();
        assert_eq!(texts, ["one", "two", "three"]);
    }
}

#[tokio::test]
async fn history_pages_count_back_from_newest() {
    let server = server().await;
    for text in ["m1", "m2", "m3", "m4", "m5"] {
        send(&server, "alice", "bob", text).await.assert_status(StatusCode::CREATED);
    }

    let page = |n: u32| {
        server
            .get("/api/conversations/bob/messages")
            .add_header(IDENTITY, "alice")
            .add_query_param("page", n)
            .add_query_param("limit", 2)
    };

    let first: Vec<Message> = page(1).await.json();
    let second: Vec<Message> = page(2).await.json();
    let third: Vec<Message> = page(3).await.json();
    let texts = |messages: &[Message]| -> Vec<String> {
        messages.iter().filter_map(|m| m.body.text.clone()).collect()
    };

    assert_eq!(texts(&first), ["m4", "m5"]);
    assert_eq!(texts(&second), ["m2", "m3"]);
    assert_eq!(texts(&third), ["m1"]);
}

#[tokio::test]
async fn recent_lists_latest_inbound_per_sender() {
    let server = server().await;
    send(&server, "alice", "bob", "first from alice").await.assert_status(StatusCode::CREATED);
    send(&server, "carol", "bob", "from carol").await.assert_status(StatusCode::CREATED);
    send(&server, "alice", "bob", "second from alice").await.assert_status(StatusCode::CREATED);
    send(&server, "bob", "alice", "outbound").await.assert_status(StatusCode::CREATED);

    let recent: RecentMessagesResponse = server
        .get("/api/messages/recent")
        .add_header(IDENTITY, "bob")
        .await
        .json();

    let texts: Vec<_> = recent
        .messages
        .iter()
        .filter_map(|m| m.body.text.as_deref())
        .collect();
    assert_eq!(texts, ["second from alice", "from carol"]);
}

#[tokio::test]
async fn only_the_recipient_marks_seen() {
    let server = server().await;
    let message: Message = send(&server, "alice", "bob", "read me").await.json();
    let path = format!("/api/messages/{}/seen", message.id);

    let response = server.post(&path).add_header(IDENTITY, "alice").await;
    assert_problem(&response, StatusCode::FORBIDDEN, "forbidden");

    let seen: Message = server.post(&path).add_header(IDENTITY, "bob").await.json();
    assert!(seen.seen);

    let missing = server
        .post(&format!("/api/messages/{}/seen", uuid::Uuid::new_v4()))
        .add_header(IDENTITY, "bob")
        .await;
    assert_problem(&missing, StatusCode::NOT_FOUND, "not_found");
}

#[tokio::test]
async fn conversation_seen_counts_unread_inbound() {
    let server = server().await;
    send(&server, "alice", "bob", "a").await.assert_status(StatusCode::CREATED);
    send(&server, "alice", "bob", "b").await.assert_status(StatusCode::CREATED);
    send(&server, "bob", "alice", "c").await.assert_status(StatusCode::CREATED);

    let first: SeenResponse = server
        .post("/api/conversations/alice/seen")
        .add_header(IDENTITY, "bob")
        .await
        .json();
    assert_eq!(first.updated, 2);

    let again: SeenResponse = server
        .post("/api/conversations/alice/seen")
        .add_header(IDENTITY, "bob")
        .await
        .json();
    assert_eq!(again.updated, 0);
}

#[tokio::test]
async fn only_the_sender_deletes() {
    let server = server().await;
    let message: Message = send(&server, "alice", "bob", "oops").await.json();
    let path = format!("/api/messages/{}", message.id);

    let response = server.delete(&path).add_header(IDENTITY, "bob").await;
    assert_problem(&response, StatusCode::FORBIDDEN, "forbidden");

    server
        .delete(&path)
        .add_header(IDENTITY, "alice")
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let history: Vec<Message> = server
        .get("/api/conversations/alice/messages")
        .add_header(IDENTITY, "bob")
        .await
        .json();
    assert!(history.is_empty());
}

#[tokio::test]
async fn interactions_become_notifications() {
    let server = server().await;

    let created = server
        .post("/api/interactions")
        .add_header(IDENTITY, "alice")
        .json(&json!({ "to_identity": "bob", "kind": "like", "post_id": "post-1" }))
        .await;
    created.assert_status(StatusCode::CREATED);
    let notification: Notification = created.json();
    assert!(!notification.read);

    server
        .post("/api/interactions")
        .add_header(IDENTITY, "carol")
        .json(&json!({ "to_identity": "bob", "kind": "follow" }))
        .await
        .assert_status(StatusCode::CREATED);

    let listed: Vec<Notification> = server
        .get("/api/notifications")
        .add_header(IDENTITY, "bob")
        .await
        .json();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].sender.as_str(), "carol");
    assert!(listed.iter().all(|n| !n.read));

    let relisted: Vec<Notification> = server
        .get("/api/notifications")
        .add_header(IDENTITY, "bob")
        .await
        .json();
    assert!(relisted.iter().all(|n| n.read));
}

#[tokio::test]
async fn invalid_interactions_are_rejected() {
    let server = server().await;

    let to_self = server
        .post("/api/interactions")
        .add_header(IDENTITY, "alice")
        .json(&json!({ "to_identity": "alice", "kind": "follow" }))
        .await;
    assert_problem(&to_self, StatusCode::BAD_REQUEST, "validation_failed");

    let missing_post = server
        .post("/api/interactions")
        .add_header(IDENTITY, "alice")
        .json(&json!({ "to_identity": "bob", "kind": "comment", "text": "nice" }))
        .await;
    assert_problem(&missing_post, StatusCode::BAD_REQUEST, "validation_failed");

    let unknown = server
        .post("/api/interactions")
        .add_header(IDENTITY, "alice")
        .json(&json!({ "to_identity": "mallory", "kind": "follow" }))
        .await;
    assert_problem(&unknown, StatusCode::NOT_FOUND, "not_found");
}

#[tokio::test]
async fn profiles_can_be_read_back() {
    let server = server().await;

    let updated: PublicProfile = server
        .put("/api/profiles/me")
        .add_header(IDENTITY, "alice")
        .json(&json!({ "display_name": "  Alice A.  ", "username": "alice" }))
        .await
        .json();
    assert_eq!(updated.display_name, "Alice A.");

    let mine: PublicProfile = server
        .get("/api/profiles/me")
        .add_header(IDENTITY, "alice")
        .await
        .json();
    assert_eq!(mine, updated);

    let theirs: PublicProfile = server
        .get("/api/profiles/alice")
        .add_header(IDENTITY, "bob")
        .await
        .json();
    assert_eq!(theirs.username.as_deref(), Some("alice"));

    let unknown = server
        .get("/api/profiles/mallory")
        .add_header(IDENTITY, "bob")
        .await;
    assert_problem(&unknown, StatusCode::NOT_FOUND, "not_found");

    let blank = server
        .put("/api/profiles/me")
        .add_header(IDENTITY, "alice")
        .json(&json!({ "display_name": " " }))
        .await;
    assert_problem(&blank, StatusCode::BAD_REQUEST, "validation_failed");
}
