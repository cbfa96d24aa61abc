#![allow(clippy::unwrap_used)]
// Integration tests for `EntityControl`: command correlation over the
// channel, timeouts, rejection on close, and the REST fallback.

mod common;

use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{MockConnector, next_session, wait_for_state};
use fleetsync_core::{
    CommandError, ConnectionState, Direction, FleetClient, Priority, SyncConfig,
};

async fn open_client() -> (FleetClient, common::Session) {
    let (connector, mut sessions) = MockConnector::accepting();
    let client = FleetClient::with_connector(SyncConfig::default(), connector).unwrap();
    client.connect();
    let session = next_session(&mut sessions).await;
    wait_for_state(client.manager(), ConnectionState::Open).await;
    (client, session)
}

fn response_frame(command_id: &str, data: serde_json::Value) -> serde_json::Value {
    let mut data = data;
    data["command_id"] = json!(command_id);
    json!({ "type": "command_response", "data": data })
}

// ── Over the channel ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_command_resolves_with_response_payload() {
    let (client, mut session) = open_client().await;
    let control = client.control("r1");
    let call = tokio::spawn(async move { control.move_to(Direction::Forward, 0.5, 1500).await });

    let frame = session.next_frame().await;
    assert_eq!(frame["type"], "command");
    let data = &frame["data"];
    assert_eq!(data["entity_id"], "r1");
    assert_eq!(data["command_type"], "move");
    assert_eq!(data["priority"], "normal");
    assert_eq!(data["timeout_ms"], 10_000);
    assert_eq!(
        data["params"],
        json!({ "direction": "forward", "speed": 0.5, "duration_ms": 1500 })
    );

    let id = data["command_id"].as_str().unwrap();
    session.push_json(&response_frame(id, json!({ "result": { "accepted": true } })));

    assert_eq!(call.await.unwrap().unwrap(), json!({ "accepted": true }));
    assert!(client.manager().pending().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_remote_failure_is_rejection() {
    let (client, mut session) = open_client().await;
    let control = client.control("r1");
    let call = tokio::spawn(async move { control.set_mode("docking").await });

    let frame = session.next_frame().await;
    assert_eq!(frame["data"]["params"], json!({ "mode": "docking" }));
    let id = frame["data"]["command_id"].as_str().unwrap();
    session.push_json(&response_frame(
        id,
        json!({ "success": false, "error": "mode not supported" }),
    ));

    assert_eq!(
        call.await.unwrap().unwrap_err(),
        CommandError::RemoteRejected {
            reason: "mode not supported".into()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_commands_correlate_independently() {
    let (client, mut session) = open_client().await;
    let a = client.control("r1");
    let b = client.control("r1");
    let first = tokio::spawn(async move { a.rotate(90.0, 1.0).await });
    let frame_a = session.next_frame().await;
    let second = tokio::spawn(async move { b.rotate(-90.0, 1.0).await });
    let frame_b = session.next_frame().await;

    let id_a = frame_a["data"]["command_id"].as_str().unwrap();
    let id_b = frame_b["data"]["command_id"].as_str().unwrap();
    assert_ne!(id_a, id_b);

    session.push_json(&response_frame(id_b, json!({ "result": "b" })));
    session.push_json(&response_frame(id_a, json!({ "result": "a" })));

    assert_eq!(first.await.unwrap().unwrap(), json!("a"));
    assert_eq!(second.await.unwrap().unwrap(), json!("b"));
}

#[tokio::test(start_paused = true)]
async fn test_emergency_stop_times_out_after_one_second() {
    let (client, mut session) = open_client().await;
    let control = client.control("r1");

    let started = Instant::now();
    let call = tokio::spawn(async move { control.emergency_stop().await });

    let frame = session.next_frame().await;
    assert_eq!(frame["data"]["command_type"], "emergency_stop");
    assert_eq!(frame["data"]["priority"], "critical");
    assert_eq!(frame["data"]["timeout_ms"], 1_000);

    let outcome = call.await.unwrap();
    assert_eq!(outcome, Err(CommandError::Timeout { timeout_ms: 1_000 }));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_millis(1_005));

    // A late answer is ignored.
    let id = frame["data"]["command_id"].as_str().unwrap();
    session.push_json(&response_frame(id, json!({})));
    assert!(client.manager().pending().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_custom_command_uses_caller_timeout_and_priority() {
    let (client, mut session) = open_client().await;
    let control = client.control("r9");
    let call = tokio::spawn(async move {
        control
            .send_command(
                "dock",
                json!({ "station": 2 }),
                Priority::High,
                Some(Duration::from_millis(250)),
            )
            .await
    });

    let frame = session.next_frame().await;
    assert_eq!(frame["data"]["command_type"], "dock");
    assert_eq!(frame["data"]["priority"], "high");
    assert_eq!(frame["data"]["timeout_ms"], 250);
    assert_eq!(
        call.await.unwrap(),
        Err(CommandError::Timeout { timeout_ms: 250 })
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_rejects_pending_commands() {
    let (client, mut session) = open_client().await;
    let control = client.control("r1");
    let call = tokio::spawn(async move { control.stop().await });
    session.next_frame().await;

    client.disconnect().await;

    assert!(matches!(
        call.await.unwrap(),
        Err(CommandError::TransportUnavailable { .. })
    ));
    assert!(client.manager().pending().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_channel_loss_rejects_without_waiting_for_timeout() {
    let (client, mut session) = open_client().await;
    let control = client.control("r1");
    let started = Instant::now();
    let call = tokio::spawn(async move { control.stop().await });
    session.next_frame().await;

    drop(session);

    assert!(matches!(
        call.await.unwrap(),
        Err(CommandError::TransportUnavailable { .. })
    ));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_closed_channel_without_fallback_is_unavailable() {
    let (connector, _sessions) = MockConnector::accepting();
    let client = FleetClient::with_connector(SyncConfig::default(), connector).unwrap();

    let outcome = client.control("r1").move_to(Direction::Left, 1.0, 100).await;
    assert!(matches!(
        outcome,
        Err(CommandError::TransportUnavailable { .. })
    ));
    assert_eq!(client.manager().queued_len(), 0, "commands are never queued");
    assert_eq!(client.manager().state(), ConnectionState::Idle);
}

// ── REST fallback ───────────────────────────────────────────────────

fn fallback_client(server: &MockServer) -> FleetClient {
    let config = SyncConfig {
        rest_url: Some(server.uri().parse().unwrap()),
        auth_token: Some("tok".to_string().into()),
        ..SyncConfig::default()
    };
    FleetClient::new(config).unwrap()
}

#[tokio::test]
async fn test_fallback_serves_commands_with_same_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/robots/r1/commands"))
        .and(header("authorization", "Bearer tok"))
        .and(body_partial_json(json!({
            "entity_id": "r1",
            "command_type": "move",
            "priority": "normal",
            "params": { "direction": "backward" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "result": { "accepted": true }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = fallback_client(&server);
    let outcome = client
        .control("r1")
        .move_to(Direction::Backward, 0.3, 500)
        .await;
    assert_eq!(outcome.unwrap(), json!({ "accepted": true }));
}

#[tokio::test]
async fn test_acknowledgement_without_result_matches_across_transports() {
    let ack = json!({ "success": true, "status": "executing" });

    let (client, mut session) = open_client().await;
    let control = client.control("r1");
    let call = tokio::spawn(async move { control.stop().await });
    let frame = session.next_frame().await;
    let id = frame["data"]["command_id"].as_str().unwrap();
    session.push_json(&response_frame(id, ack.clone()));
    let over_channel = call.await.unwrap().unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/robots/r1/commands"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&ack))
        .expect(1)
        .mount(&server)
        .await;
    let over_rest = fallback_client(&server).control("r1").stop().await.unwrap();

    assert_eq!(over_channel, json!({ "status": "executing" }));
    assert_eq!(over_rest, over_channel);
}

#[tokio::test]
async fn test_fallback_client_error_is_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/robots/r1/commands"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({ "detail": "robot busy" })),
        )
        .mount(&server)
        .await;

    let outcome = fallback_client(&server).control("r1").stop().await;
    assert_eq!(
        outcome,
        Err(CommandError::RemoteRejected {
            reason: "HTTP 409: robot busy".into()
        })
    );
}

#[tokio::test]
async fn test_fallback_server_error_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/robots/r1/commands"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let outcome = fallback_client(&server).control("r1").stop().await;
    assert!(matches!(
        outcome,
        Err(CommandError::TransportUnavailable { .. })
    ));
}

#[tokio::test]
async fn test_fallback_status_uses_get() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/robots/r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "robot_id": "r1",
            "status": "idle",
            "battery": 80
        })))
        .expect(1)
        .mount(&server)
        .await;

    let status = fallback_client(&server).control("r1").status().await.unwrap();
    assert_eq!(status["status"], "idle");
    assert_eq!(status["battery"], 80);
}
