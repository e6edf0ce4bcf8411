//! Internal fan-out API exercised through the router.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use vapor_hub::{DisabledProvisioner, EventReceiver, HubConfig};
use vapor_server::config::TransportConfig;
use vapor_server::{app, AppState};
use vapor_types::decode_client_frame;

fn test_state() -> AppState {
    AppState::new(
        Arc::new(DisabledProvisioner),
        HubConfig::default(),
        TransportConfig::default(),
    )
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };
    let response = app.clone().oneshot(request).await.expect("router response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, json)
}

/// Registers `r1` with participants `p1` and `p2`.
async fn seed(app: &Router) {
    let (status, _) = call(app, Method::PUT, "/api/rooms/r1", None).await;
    assert_eq!(status, StatusCode::CREATED);
    for id in ["p1", "p2"] {
        let (status, _) = call(
            app,
            Method::POST,
            "/api/rooms/r1/participants",
            Some(json!({"id": id, "displayName": format!("User {id}"), "avatar": "owl"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
}

/// Opens a hub session bound to `r1` as `participant` and clears its queue.
fn connect(state: &AppState, participant: &str) -> EventReceiver {
    let (session, mut rx) = state.hub.open_session();
    let frame = decode_client_frame(
        &json!({
            "type": "room:join",
            "requestId": 1,
            "data": {"roomId": "r1", "participantId": participant}
        })
        .to_string(),
    )
    .expect("valid frame");
    state.hub.dispatch(session, frame).expect("dispatch");
    drain(&mut rx);
    rx
}

fn drain(rx: &mut EventReceiver) -> Vec<Value> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(serde_json::to_value(event.as_ref()).expect("serialize event"));
    }
    events
}

#[tokio::test]
async fn test_health_reports_version() {
    let app = app(test_state());
    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_unknown_room_is_not_found() {
    let app = app(test_state());
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/rooms/missing/messages",
        Some(json!({"id": "m1", "content": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "RoomNotFound");

    let (status, body) = call(&app, Method::GET, "/api/rooms/missing/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "RoomNotFound");
}

#[tokio::test]
async fn test_register_room_is_idempotent() {
    let app = app(test_state());
    let (status, body) = call(&app, Method::PUT, "/api/rooms/r1", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["created"], true);

    let (status, body) = call(&app, Method::PUT, "/api/rooms/r1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], false);
}

#[tokio::test]
async fn test_message_fan_out_reaches_connected_sessions() {
    let state = test_state();
    let app = app(state.clone());
    seed(&app).await;
    let mut rx1 = connect(&state, "p1");
    let mut rx2 = connect(&state, "p2");
    drain(&mut rx1);

    let message = json!({"id": "m1", "senderId": "p1", "content": "hello"});
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/rooms/r1/messages",
        Some(message.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["delivered"], 2);

    for rx in [&mut rx1, &mut rx2] {
        let events = drain(rx);
        assert_eq!(events, vec![json!({"type": "message:new", "data": message})]);
    }

    let edited = json!({"id": "m1", "senderId": "p1", "content": "hello, edited"});
    let (status, _) = call(&app, Method::PUT, "/api/rooms/r1/messages/m1", Some(edited)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(drain(&mut rx1)[0]["type"], "message:update");

    let (status, _) = call(&app, Method::DELETE, "/api/rooms/r1/messages/m1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        drain(&mut rx1),
        vec![json!({"type": "message:delete", "data": "m1"})]
    );
}

#[tokio::test]
async fn test_message_update_requires_object() {
    let state = test_state();
    let app = app(state.clone());
    seed(&app).await;

    let (status, body) = call(
        &app,
        Method::PUT,
        "/api/rooms/r1/messages/m1",
        Some(json!("not an object")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadRequest");
}

#[tokio::test]
async fn test_reactions_fan_out() {
    let state = test_state();
    let app = app(state.clone());
    seed(&app).await;
    let mut rx = connect(&state, "p1");

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/rooms/r1/reactions",
        Some(json!({"messageId": "m1", "userId": "p2", "emoji": "🔥"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(
        &app,
        Method::DELETE,
        "/api/rooms/r1/reactions",
        Some(json!({"messageId": "m1", "userId": "p2"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["type"], "reaction:add");
    assert_eq!(events[0]["data"]["emoji"], "🔥");
    assert_eq!(events[1]["type"], "reaction:remove");
    assert_eq!(events[1]["data"]["userId"], "p2");
}

#[tokio::test]
async fn test_participant_lifecycle_is_announced() {
    let state = test_state();
    let app = app(state.clone());
    seed(&app).await;
    let mut rx = connect(&state, "p1");

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/rooms/r1/participants",
        Some(json!({"id": "p3", "displayName": "Newcomer", "avatar": "bee"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["delivered"], 1);
    let events = drain(&mut rx);
    assert_eq!(events[0]["type"], "participant:join");
    assert_eq!(events[0]["data"]["displayName"], "Newcomer");
    assert_eq!(events[0]["data"]["isOnline"], false);

    let (status, _) = call(
        &app,
        Method::PATCH,
        "/api/rooms/r1/participants/p3",
        Some(json!({"displayName": "Regular"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let events = drain(&mut rx);
    assert_eq!(events[0]["type"], "participant:update");
    assert_eq!(events[0]["data"]["displayName"], "Regular");
    assert_eq!(events[0]["data"]["avatar"], "bee");

    let (status, _) = call(&app, Method::DELETE, "/api/rooms/r1/participants/p3", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        drain(&mut rx),
        vec![json!({"type": "participant:leave", "data": "p3"})]
    );

    let (status, body) = call(&app, Method::DELETE, "/api/rooms/r1/participants/p3", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "ParticipantNotFound");
}

#[tokio::test]
async fn test_participant_of_other_room_is_not_found() {
    let state = test_state();
    let app = app(state.clone());
    seed(&app).await;
    call(&app, Method::PUT, "/api/rooms/r2", None).await;

    let (status, body) = call(
        &app,
        Method::PATCH,
        "/api/rooms/r2/participants/p1",
        Some(json!({"avatar": "cat"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "ParticipantNotFound");
}

#[tokio::test]
async fn test_room_status_and_close() {
    let state = test_state();
    let app = app(state.clone());
    seed(&app).await;
    let mut rx = connect(&state, "p1");

    let (status, body) = call(&app, Method::GET, "/api/rooms/r1/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["roomId"], "r1");
    assert_eq!(body["connectedSessions"], 1);
    assert_eq!(body["onlineParticipants"], json!(["p1"]));
    assert_eq!(body["activeCall"], Value::Null);

    let (status, body) = call(&app, Method::DELETE, "/api/rooms/r1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessions"], 1);
    assert_eq!(body["removedParticipants"], json!(["p1", "p2"]));
    assert_eq!(
        drain(&mut rx),
        vec![json!({"type": "room:expired", "data": {"roomId": "r1"}})]
    );

    let (status, _) = call(&app, Method::GET, "/api/rooms/r1/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!state.hub.is_online(&"p1".into()));
}
