//! End-to-end tests over the real route table, backed by an in-memory
//! database and a stub transport (`sleep` stands in for jacktrip).

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use jamhub_hub::{CommandLauncher, Hub, HubConfig, SqliteDatabase};
use jamhub_server::{context_for, router};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn app_with(config: HubConfig) -> Router {
    let database = SqliteDatabase::in_memory().await.unwrap();
    let hub = Arc::new(Hub::new(
        config,
        database,
        Arc::new(CommandLauncher::new("sleep", &["600"])),
    ));
    hub.init().await.unwrap();

    router(context_for(hub))
}

async fn app() -> Router {
    app_with(HubConfig {
        transport_port_range: 8,
        ..HubConfig::default()
    })
    .await
}

async fn send(
    app: &Router,
    method: Method,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, value)
}

async fn register(app: &Router, username: &str, password: &str) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "registration failed: {body}");
    body
}

fn token(auth_body: &Value) -> String {
    auth_body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn first_registration_becomes_owner() {
    let app = app().await;

    let alice = register(&app, "alice", "s3cret").await;
    assert_eq!(alice["is_owner"], json!(true));
    assert_eq!(alice["has_patchbay_access"], json!(true));
    assert!(!token(&alice).is_empty());

    let bob = register(&app, "bob", "hunter2").await;
    assert_eq!(bob["is_owner"], json!(false));
    assert_eq!(bob["has_patchbay_access"], json!(false));
}

#[tokio::test]
async fn duplicate_username_is_a_conflict() {
    let app = app().await;
    register(&app, "alice", "s3cret").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "username": "alice", "password": "other1" })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("username"));
}

#[tokio::test]
async fn login_round_trips_and_rejects_bad_passwords() {
    let app = app().await;
    register(&app, "alice", "s3cret").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "s3cret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_owner"], json!(true));

    let (status, _) = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "wrong1" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn endpoints_require_a_bearer_token() {
    let app = app().await;

    let (status, _) = send(&app, Method::GET, "/rooms", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/rooms", Some("bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn room_lifecycle_end_to_end() {
    let app = app().await;
    let alice = register(&app, "alice", "s3cret").await;
    let bob = register(&app, "bob", "hunter2").await;
    let alice_token = token(&alice);
    let bob_token = token(&bob);

    // Alice creates a room
    let (status, room) = send(
        &app,
        Method::POST,
        "/rooms",
        Some(&alice_token),
        Some(json!({ "name": "Jam", "max_participants": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(room["id"], json!("jam-1"));
    assert_eq!(room["is_private"], json!(false));

    // It shows up in the listing without any passphrase material
    let (status, rooms) = send(&app, Method::GET, "/rooms", Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::OK);
    let listing = rooms.as_array().unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0]["participants"], json!(0));
    assert!(listing[0].get("passphrase").is_none());

    // Bob joins with no body at all
    let (status, join) = send(
        &app,
        Method::POST,
        "/rooms/jam-1/join",
        Some(&bob_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(join["hub_host"], json!("localhost"));
    assert_eq!(join["client_name_hint"], json!("jam-1"));
    let port = join["jacktrip_port"].as_u64().unwrap();
    assert!((4464..4472).contains(&port), "port {port} out of pool");

    // Bob leaves; the room was emptied and is gone
    let (status, body) = send(
        &app,
        Method::POST,
        "/rooms/jam-1/leave",
        Some(&bob_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));

    let (status, _) = send(&app, Method::GET, "/rooms/jam-1", Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn private_rooms_reject_wrong_passphrases() {
    let app = app().await;
    let alice = register(&app, "alice", "s3cret").await;
    let bob = register(&app, "bob", "hunter2").await;

    let (status, room) = send(
        &app,
        Method::POST,
        "/rooms",
        Some(&token(&alice)),
        Some(json!({ "name": "Private", "passphrase": "open sesame" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(room["is_private"], json!(true));
    let join_path = format!("/rooms/{}/join", room["id"].as_str().unwrap());

    let (status, body) = send(
        &app,
        Method::POST,
        &join_path,
        Some(&token(&bob)),
        Some(json!({ "passphrase": "open simsim" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("bad passphrase"));

    let (status, _) = send(
        &app,
        Method::POST,
        &join_path,
        Some(&token(&bob)),
        Some(json!({ "passphrase": "open sesame" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn full_rooms_turn_joiners_away() {
    let app = app().await;
    let alice = register(&app, "alice", "s3cret").await;
    let bob = register(&app, "bob", "hunter2").await;
    let carol = register(&app, "carol", "qwerty1").await;

    let (_, room) = send(
        &app,
        Method::POST,
        "/rooms",
        Some(&token(&alice)),
        Some(json!({ "name": "Duo", "max_participants": 1 })),
    )
    .await;
    let join_path = format!("/rooms/{}/join", room["id"].as_str().unwrap());

    let (status, _) = send(&app, Method::POST, &join_path, Some(&token(&bob)), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::POST, &join_path, Some(&token(&carol)), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], json!("room is full"));
}

#[tokio::test]
async fn unknown_rooms_are_not_found() {
    let app = app().await;
    let alice = register(&app, "alice", "s3cret").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/rooms/nope-1/join",
        Some(&token(&alice)),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn single_room_mode_serves_exactly_one_room() {
    let app = app_with(HubConfig {
        single_room_mode: true,
        band_name: "The Band".to_string(),
        ..HubConfig::default()
    })
    .await;

    let alice = register(&app, "alice", "s3cret").await;
    let alice_token = token(&alice);

    let (status, rooms) = send(&app, Method::GET, "/rooms", Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::OK);
    let listing = rooms.as_array().unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0]["name"], json!("The Band"));
    assert_eq!(listing[0]["creator"], json!("system"));
    let room_id = listing[0]["id"].as_str().unwrap().to_string();

    // Creation is disabled
    let (status, body) = send(
        &app,
        Method::POST,
        "/rooms",
        Some(&alice_token),
        Some(json!({ "name": "X" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], json!("room creation disabled"));

    // The default room outlives its last participant
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/rooms/{room_id}/join"),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/rooms/{room_id}/leave"),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/rooms/{room_id}"),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn patchbay_access_is_enforced_and_grantable() {
    let app = app().await;
    let alice = register(&app, "alice", "s3cret").await;
    let bob = register(&app, "bob", "hunter2").await;
    let bob_id = bob["user_id"].as_str().unwrap().to_string();

    let edge = json!({ "source": "system:capture_1", "dest": "jam-1:send_1" });

    // Bob has no patchbay access
    let (status, _) = send(
        &app,
        Method::POST,
        "/jack/connect",
        Some(&token(&bob)),
        Some(edge.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The owner grants it
    let (status, user) = send(
        &app,
        Method::POST,
        &format!("/users/{bob_id}/permissions"),
        Some(&token(&alice)),
        Some(json!({ "has_patchbay_access": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["has_patchbay_access"], json!(true));

    // Now the request clears the permission kernel. There is no JACK server
    // in the test environment, so it fails later, in the adapter.
    let (status, _) = send(
        &app,
        Method::POST,
        "/jack/connect",
        Some(&token(&bob)),
        Some(edge),
    )
    .await;
    assert_ne!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn user_administration_is_owner_only() {
    let app = app().await;
    let alice = register(&app, "alice", "s3cret").await;
    let bob = register(&app, "bob", "hunter2").await;
    let alice_id = alice["user_id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, Method::GET, "/users", Some(&token(&bob)), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, users) = send(&app, Method::GET, "/users", Some(&token(&alice)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 2);

    // Revoking the owner's own access is a recorded no-op
    let (status, owner) = send(
        &app,
        Method::POST,
        &format!("/users/{alice_id}/permissions"),
        Some(&token(&alice)),
        Some(json!({ "has_patchbay_access": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(owner["is_owner"], json!(true));
    assert_eq!(owner["has_patchbay_access"], json!(true));
}

#[tokio::test]
async fn health_is_unauthenticated() {
    let app = app().await;

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
    assert!(body["version"].as_str().is_some());
    assert_eq!(body["active_rooms"], json!(0));
}

#[tokio::test]
async fn unknown_fields_are_rejected() {
    let app = app().await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "username": "alice", "password": "s3cret", "admin": true })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
