// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests that run a real session over WebSockets against the
//! in-process fake room backend.

use std::time::Duration;

use serde_json::json;

use roomlink::{ConnectionState, Dispatch, EventKind, Session, SessionConfig, SessionError, SessionSettings};
use roomlink_specs::{free_port, wait_until, FakeBackend, Tap};

const TIMEOUT: Duration = Duration::from_secs(10);

fn fast_settings() -> SessionSettings {
    SessionSettings {
        heartbeat_interval: Duration::from_secs(30),
        reconnect_base_delay: Duration::from_millis(50),
        max_reconnect_attempts: 3,
    }
}

async fn connected(url: &str) -> anyhow::Result<(Session, Tap)> {
    let session = Session::websocket(fast_settings());
    let tap = Tap::attach(&session);
    session.connect(SessionConfig::new(url));
    tap.wait_for_state(ConnectionState::Connected, 1, TIMEOUT).await?;
    Ok((session, tap))
}

// -- Connection ---------------------------------------------------------------

#[tokio::test]
async fn connects_and_joins_room() -> anyhow::Result<()> {
    let backend = FakeBackend::start().await?;
    let (session, tap) = connected(&backend.url()).await?;

    assert!(session.is_connected());
    assert_eq!(tap.states(), vec![ConnectionState::Connecting, ConnectionState::Connected]);
    assert!(session.stats().connect_time.is_some());

    assert!(session.join_room("lobby", "alice").is_sent());
    let joined = tap.wait_for(EventKind::JoinedRoom, TIMEOUT, |p| p["roomId"] == "lobby").await?;
    assert_eq!(joined["members"], json!(["alice"]));
    assert_eq!(backend.members("lobby"), vec!["alice"]);

    session.destroy();
    Ok(())
}

#[tokio::test]
async fn http_scheme_is_normalized() -> anyhow::Result<()> {
    let backend = FakeBackend::start().await?;
    let (session, _tap) = connected(&backend.http_url()).await?;
    assert_eq!(backend.connection_count(), 1);
    session.destroy();
    Ok(())
}

#[tokio::test]
async fn auth_payload_is_sent_in_handshake() -> anyhow::Result<()> {
    let backend = FakeBackend::start().await?;
    let session = Session::websocket(fast_settings());
    let tap = Tap::attach(&session);
    session.connect(
        SessionConfig::new(backend.url()).with_auth_entry("token", "s3cret").with_auth_entry("v", 2),
    );
    tap.wait_for_state(ConnectionState::Connected, 1, TIMEOUT).await?;

    let handshakes = backend.handshakes();
    assert_eq!(handshakes.len(), 1);
    assert_eq!(handshakes[0].get("token").map(String::as_str), Some("s3cret"));
    assert_eq!(handshakes[0].get("v").map(String::as_str), Some("2"));

    session.destroy();
    Ok(())
}

// -- Room protocol ------------------------------------------------------------

#[tokio::test]
async fn messages_fan_out_to_room_members() -> anyhow::Result<()> {
    let backend = FakeBackend::start().await?;
    let (alice, alice_tap) = connected(&backend.url()).await?;
    let (bob, bob_tap) = connected(&backend.url()).await?;

    alice.join_room("lobby", "alice");
    alice_tap.wait_for(EventKind::JoinedRoom, TIMEOUT, |_| true).await?;
    bob.join_room("lobby", "bob");
    alice_tap.wait_for(EventKind::UserJoined, TIMEOUT, |p| p["userId"] == "bob").await?;

    assert!(alice.send_message("lobby", "alice", "  hello bob  ").is_sent());
    let msg = bob_tap.wait_for(EventKind::NewMessage, TIMEOUT, |p| p["userId"] == "alice").await?;
    assert_eq!(msg["content"], "hello bob");

    let stats = alice.stats();
    assert_eq!(stats.total_messages, 1);
    assert!(stats.last_message_time.is_some());
    assert!(bob.stats().messages_received >= 2);

    alice.destroy();
    bob.destroy();
    Ok(())
}

#[tokio::test]
async fn blank_message_never_reaches_backend() -> anyhow::Result<()> {
    let backend = FakeBackend::start().await?;
    let (session, _tap) = connected(&backend.url()).await?;

    assert_eq!(session.send_message("lobby", "alice", "   "), Dispatch::Dropped(SessionError::EmptyMessage));
    session.get_room_info("lobby");
    wait_until(TIMEOUT, "room info request", || !backend.received_events().is_empty()).await?;

    assert_eq!(backend.received_events(), vec!["get-room-info"]);
    assert_eq!(session.stats().total_messages, 0);

    session.destroy();
    Ok(())
}

#[tokio::test]
async fn typing_reaches_other_members() -> anyhow::Result<()> {
    let backend = FakeBackend::start().await?;
    let (alice, alice_tap) = connected(&backend.url()).await?;
    let (bob, bob_tap) = connected(&backend.url()).await?;

    alice.join_room("lobby", "alice");
    alice_tap.wait_for(EventKind::JoinedRoom, TIMEOUT, |_| true).await?;
    bob.join_room("lobby", "bob");
    bob_tap.wait_for(EventKind::JoinedRoom, TIMEOUT, |_| true).await?;

    assert!(alice.set_typing("lobby", "alice", true).is_sent());
    let typing = bob_tap.wait_for(EventKind::UserTyping, TIMEOUT, |_| true).await?;
    assert_eq!(typing, json!({ "roomId": "lobby", "userId": "alice", "isTyping": true }));
    assert!(alice_tap.payloads(EventKind::UserTyping).is_empty());

    alice.destroy();
    bob.destroy();
    Ok(())
}

#[tokio::test]
async fn room_info_arrives_as_notification() -> anyhow::Result<()> {
    let backend = FakeBackend::start().await?;
    let (session, tap) = connected(&backend.url()).await?;

    session.join_room("lobby", "alice");
    tap.wait_for(EventKind::JoinedRoom, TIMEOUT, |_| true).await?;
    assert!(session.get_room_info("lobby").is_sent());

    let info = tap.wait_for(EventKind::RoomInfo, TIMEOUT, |_| true).await?;
    assert_eq!(info["memberCount"], 1);
    assert_eq!(info["members"], json!(["alice"]));

    session.destroy();
    Ok(())
}

#[tokio::test]
async fn leave_room_notifies_remaining_members() -> anyhow::Result<()> {
    let backend = FakeBackend::start().await?;
    let (alice, alice_tap) = connected(&backend.url()).await?;
    let (bob, bob_tap) = connected(&backend.url()).await?;

    alice.join_room("lobby", "alice");
    alice_tap.wait_for(EventKind::JoinedRoom, TIMEOUT, |_| true).await?;
    bob.join_room("lobby", "bob");
    bob_tap.wait_for(EventKind::JoinedRoom, TIMEOUT, |_| true).await?;

    assert!(bob.leave_room("lobby", "bob").is_sent());
    bob_tap.wait_for(EventKind::LeftRoom, TIMEOUT, |_| true).await?;
    alice_tap.wait_for(EventKind::UserLeft, TIMEOUT, |p| p["userId"] == "bob").await?;
    assert_eq!(backend.members("lobby"), vec!["alice"]);

    alice.destroy();
    bob.destroy();
    Ok(())
}

#[tokio::test]
async fn leave_right_before_destroy_still_reaches_room() -> anyhow::Result<()> {
    let backend = FakeBackend::start().await?;
    let (alice, alice_tap) = connected(&backend.url()).await?;
    let (bob, bob_tap) = connected(&backend.url()).await?;

    alice.join_room("lobby", "alice");
    alice_tap.wait_for(EventKind::JoinedRoom, TIMEOUT, |_| true).await?;
    bob.join_room("lobby", "bob");
    bob_tap.wait_for(EventKind::JoinedRoom, TIMEOUT, |_| true).await?;

    assert!(bob.send_message("lobby", "bob", "bye").is_sent());
    assert!(bob.leave_room("lobby", "bob").is_sent());
    bob.destroy();

    alice_tap.wait_for(EventKind::NewMessage, TIMEOUT, |p| p["content"] == "bye").await?;
    alice_tap.wait_for(EventKind::UserLeft, TIMEOUT, |p| p["userId"] == "bob").await?;
    assert_eq!(backend.received_events().iter().filter(|e| *e == "leave-room").count(), 1);

    alice.destroy();
    Ok(())
}

// -- Liveness and recovery ----------------------------------------------------

#[tokio::test]
async fn heartbeat_pings_reach_backend() -> anyhow::Result<()> {
    let backend = FakeBackend::start().await?;
    let session = Session::websocket(SessionSettings {
        heartbeat_interval: Duration::from_millis(50),
        ..fast_settings()
    });
    let tap = Tap::attach(&session);
    session.connect(SessionConfig::new(backend.url()));
    tap.wait_for_state(ConnectionState::Connected, 1, TIMEOUT).await?;

    wait_until(TIMEOUT, "two pings", || backend.pings() >= 2).await?;
    assert!(session.stats().heartbeats_sent >= 2);

    session.destroy();
    Ok(())
}

#[tokio::test]
async fn server_drop_triggers_reconnect() -> anyhow::Result<()> {
    let backend = FakeBackend::start().await?;
    let (session, tap) = connected(&backend.url()).await?;

    backend.kick_all();
    tap.wait_for_state(ConnectionState::Reconnecting, 1, TIMEOUT).await?;
    tap.wait_for_state(ConnectionState::Connected, 2, TIMEOUT).await?;

    assert_eq!(session.stats().reconnect_attempts, 0);
    assert_eq!(backend.handshakes().len(), 2);
    wait_until(TIMEOUT, "single live connection", || backend.connection_count() == 1).await?;

    session.destroy();
    Ok(())
}

#[tokio::test]
async fn rejected_handshake_is_retried() -> anyhow::Result<()> {
    let backend = FakeBackend::start().await?;
    backend.set_reject(true);

    let session = Session::websocket(SessionSettings {
        reconnect_base_delay: Duration::from_millis(200),
        ..fast_settings()
    });
    let tap = Tap::attach(&session);
    session.connect(SessionConfig::new(backend.url()));
    tap.wait_for(EventKind::Error, TIMEOUT, |p| p["code"] == "CONNECT_ERROR").await?;

    backend.set_reject(false);
    tap.wait_for_state(ConnectionState::Connected, 1, TIMEOUT).await?;
    assert!(tap.states().contains(&ConnectionState::Error));

    session.destroy();
    Ok(())
}

#[tokio::test]
async fn unreachable_backend_ends_in_error() -> anyhow::Result<()> {
    let port = free_port()?;
    let session = Session::websocket(SessionSettings {
        reconnect_base_delay: Duration::from_millis(20),
        max_reconnect_attempts: 2,
        ..fast_settings()
    });
    let tap = Tap::attach(&session);
    session.connect(SessionConfig::new(format!("ws://127.0.0.1:{port}/ws")));

    tap.wait_for(EventKind::Error, TIMEOUT, |p| p["code"] == "RECONNECT_EXHAUSTED").await?;
    assert_eq!(session.connection_state(), ConnectionState::Error);
    let failures = tap.payloads(EventKind::Error).iter().filter(|p| p["code"] == "CONNECT_ERROR").count();
    assert_eq!(failures, 3);

    // Recovery needs an explicit call; the budget starts over.
    session.force_reconnect();
    assert_eq!(session.stats().reconnect_attempts, 0);
    session.destroy();
    Ok(())
}

#[tokio::test]
async fn destroy_closes_connection_and_stays_inert() -> anyhow::Result<()> {
    let backend = FakeBackend::start().await?;
    let (session, _tap) = connected(&backend.url()).await?;
    assert_eq!(backend.connection_count(), 1);

    session.destroy();
    wait_until(TIMEOUT, "connection closed", || backend.connection_count() == 0).await?;

    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(session.join_room("lobby", "alice"), Dispatch::Dropped(SessionError::Destroyed));
    session.connect(SessionConfig::new(backend.url()));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(backend.handshakes().len(), 1);
    Ok(())
}
