// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end session tests.
//!
//! Runs an in-process fake room backend over axum WebSockets that speaks the
//! `{event, data}` room protocol, and offers helpers to observe a real
//! [`Session`] from the outside.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use roomlink::{ConnectionState, EventKind, Session, SessionEvent};

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Poll `check` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until(
    timeout: Duration,
    what: &str,
    mut check: impl FnMut() -> bool,
) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return Ok(());
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// Fake backend
// ---------------------------------------------------------------------------

struct Peer {
    tx: mpsc::UnboundedSender<Value>,
    kick: CancellationToken,
}

#[derive(Default)]
struct Backend {
    next_id: AtomicU64,
    reject: AtomicBool,
    pings: AtomicU64,
    peers: Mutex<HashMap<u64, Peer>>,
    /// room id -> connection id -> user id
    rooms: Mutex<HashMap<String, BTreeMap<u64, String>>>,
    handshakes: Mutex<Vec<HashMap<String, String>>>,
    received: Mutex<Vec<(String, Value)>>,
}

impl Backend {
    fn send_to(&self, peer: u64, event: &str, data: Value) {
        if let Some(p) = self.peers.lock().get(&peer) {
            let _ = p.tx.send(json!({ "event": event, "data": data }));
        }
    }

    /// Send to every member of `room`, optionally skipping one connection.
    fn broadcast(&self, room: &str, skip: Option<u64>, event: &str, data: &Value) {
        let members: Vec<u64> = self
            .rooms
            .lock()
            .get(room)
            .map(|m| m.keys().copied().filter(|id| Some(*id) != skip).collect())
            .unwrap_or_default();
        for id in members {
            self.send_to(id, event, data.clone());
        }
    }

    fn members(&self, room: &str) -> Vec<String> {
        let mut users: Vec<String> =
            self.rooms.lock().get(room).map(|m| m.values().cloned().collect()).unwrap_or_default();
        users.sort();
        users.dedup();
        users
    }

    fn handle_frame(&self, conn: u64, event: &str, data: Value) {
        self.received.lock().push((event.to_owned(), data.clone()));
        let room = data.get("roomId").and_then(Value::as_str).unwrap_or_default().to_owned();
        let user = data.get("userId").and_then(Value::as_str).unwrap_or_default().to_owned();

        match event {
            "join-room" => {
                self.rooms.lock().entry(room.clone()).or_default().insert(conn, user.clone());
                let members = self.members(&room);
                self.send_to(conn, "joined-room", json!({ "roomId": room, "userId": user, "members": members }));
                self.broadcast(&room, Some(conn), "user-joined", &json!({ "roomId": room, "userId": user }));
            }
            "leave-room" => {
                if let Some(members) = self.rooms.lock().get_mut(&room) {
                    members.remove(&conn);
                }
                self.send_to(conn, "left-room", json!({ "roomId": room, "userId": user }));
                self.broadcast(&room, Some(conn), "user-left", &json!({ "roomId": room, "userId": user }));
            }
            "send-message" => {
                let content = data.get("content").cloned().unwrap_or(Value::Null);
                self.broadcast(
                    &room,
                    None,
                    "new-message",
                    &json!({ "roomId": room, "userId": user, "content": content }),
                );
            }
            "typing" => {
                let is_typing = data.get("isTyping").cloned().unwrap_or(Value::Bool(false));
                self.broadcast(
                    &room,
                    Some(conn),
                    "user-typing",
                    &json!({ "roomId": room, "userId": user, "isTyping": is_typing }),
                );
            }
            "get-room-info" => {
                let members = self.members(&room);
                let count = members.len();
                self.send_to(
                    conn,
                    "room-info",
                    json!({ "roomId": room, "members": members, "memberCount": count }),
                );
            }
            other => self.send_to(
                conn,
                "error",
                json!({ "code": "UNKNOWN_EVENT", "message": format!("unknown event: {other}") }),
            ),
        }
    }

    fn forget(&self, conn: u64) {
        self.peers.lock().remove(&conn);
        for members in self.rooms.lock().values_mut() {
            members.remove(&conn);
        }
    }
}

async fn ws_handler(
    State(backend): State<Arc<Backend>>,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> axum::response::Response {
    if backend.reject.load(Ordering::Relaxed) {
        return (StatusCode::SERVICE_UNAVAILABLE, "rejecting").into_response();
    }
    backend.handshakes.lock().push(query);
    ws.on_upgrade(move |socket| handle_connection(backend, socket)).into_response()
}

async fn handle_connection(backend: Arc<Backend>, socket: WebSocket) {
    let id = backend.next_id.fetch_add(1, Ordering::Relaxed);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let kick = CancellationToken::new();
    backend.peers.lock().insert(id, Peer { tx, kick: kick.clone() });

    let (mut ws_tx, mut ws_rx) = socket.split();
    loop {
        tokio::select! {
            _ = kick.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            Some(frame) = rx.recv() => {
                if ws_tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
                        continue;
                    };
                    let event = frame.get("event").and_then(Value::as_str).unwrap_or_default().to_owned();
                    let data = frame.get("data").cloned().unwrap_or(Value::Null);
                    backend.handle_frame(id, &event, data);
                }
                Some(Ok(Message::Ping(_))) => {
                    backend.pings.fetch_add(1, Ordering::Relaxed);
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    backend.forget(id);
}

/// An in-process room backend, shut down on drop.
pub struct FakeBackend {
    addr: SocketAddr,
    backend: Arc<Backend>,
    shutdown: CancellationToken,
}

impl FakeBackend {
    pub async fn start() -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let backend = Arc::new(Backend::default());
        let shutdown = CancellationToken::new();

        let router = Router::new().route("/ws", get(ws_handler)).with_state(Arc::clone(&backend));
        let token = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
        });

        Ok(Self { addr, backend, shutdown })
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn http_url(&self) -> String {
        format!("http://{}/ws", self.addr)
    }

    pub fn connection_count(&self) -> usize {
        self.backend.peers.lock().len()
    }

    /// Query parameters of every accepted handshake, in order.
    pub fn handshakes(&self) -> Vec<HashMap<String, String>> {
        self.backend.handshakes.lock().clone()
    }

    /// Names of every frame received from clients, in order.
    pub fn received_events(&self) -> Vec<String> {
        self.backend.received.lock().iter().map(|(e, _)| e.clone()).collect()
    }

    pub fn pings(&self) -> u64 {
        self.backend.pings.load(Ordering::Relaxed)
    }

    pub fn members(&self, room: &str) -> Vec<String> {
        self.backend.members(room)
    }

    /// Refuse (true) or accept (false) new handshakes.
    pub fn set_reject(&self, reject: bool) {
        self.backend.reject.store(reject, Ordering::Relaxed);
    }

    /// Close every live connection from the server side.
    pub fn kick_all(&self) {
        for peer in self.backend.peers.lock().values() {
            peer.kick.cancel();
        }
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.kick_all();
        self.shutdown.cancel();
    }
}

// ---------------------------------------------------------------------------
// Session observation
// ---------------------------------------------------------------------------

/// Records every notification a session delivers.
#[derive(Clone, Default)]
pub struct Tap {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Tap {
    /// Subscribe to every event kind on `session`.
    pub fn attach(session: &Session) -> Self {
        let tap = Self::default();
        for kind in EventKind::INBOUND.into_iter().chain([EventKind::ConnectionStateChange]) {
            let events = Arc::clone(&tap.events);
            session.on(kind, move |event| {
                events.lock().push(event.clone());
                Ok(())
            });
        }
        tap
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }

    pub fn payloads(&self, kind: EventKind) -> Vec<Value> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind() == kind)
            .filter_map(|e| e.payload().cloned())
            .collect()
    }

    pub fn states(&self) -> Vec<ConnectionState> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SessionEvent::ConnectionStateChange(change) => Some(change.state),
                _ => None,
            })
            .collect()
    }

    /// Wait for an inbound `kind` notification whose payload satisfies `pred`.
    pub async fn wait_for(
        &self,
        kind: EventKind,
        timeout: Duration,
        pred: impl Fn(&Value) -> bool,
    ) -> anyhow::Result<Value> {
        let mut found = None;
        wait_until(timeout, kind.as_str(), || {
            found = self.payloads(kind).into_iter().find(|p| pred(p));
            found.is_some()
        })
        .await?;
        found.ok_or_else(|| anyhow::anyhow!("{kind} vanished"))
    }

    /// Wait until `state` has been reached `times` times in total.
    pub async fn wait_for_state(
        &self,
        state: ConnectionState,
        times: usize,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        wait_until(timeout, state.as_str(), || {
            self.states().iter().filter(|s| **s == state).count() >= times
        })
        .await
    }
}
