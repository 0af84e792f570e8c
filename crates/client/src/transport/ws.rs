// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket transport over tokio-tungstenite.
//!
//! Each `open` spawns one connection task that owns the socket. Outbound
//! frames and pings reach it over an unbounded channel; lifecycle changes and
//! inbound frames are reported through the [`TransportSink`].

use std::sync::Once;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use super::{CloseReason, Frame, Transport, TransportSink};
use crate::config::SessionConfig;
use crate::error::SessionError;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for rustls (idempotent).
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

enum Outgoing {
    Text(String),
    Ping,
}

struct Connection {
    tx: mpsc::UnboundedSender<Outgoing>,
    cancel: CancellationToken,
}

pub struct WsTransport {
    conn: Option<Connection>,
    connect_timeout: Duration,
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl WsTransport {
    pub fn new() -> Self {
        Self { conn: None, connect_timeout: Duration::from_secs(10) }
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn push(&self, item: Outgoing) -> Result<(), SessionError> {
        let conn = self.conn.as_ref().ok_or(SessionError::NotConnected)?;
        conn.tx.send(item).map_err(|_| SessionError::Transport)
    }
}

impl Transport for WsTransport {
    fn open(&mut self, config: &SessionConfig, sink: TransportSink) {
        self.close(CloseReason::ClientDisconnect);

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        tokio::spawn(run_connection(
            config.clone(),
            self.connect_timeout,
            rx,
            cancel.clone(),
            sink,
        ));
        self.conn = Some(Connection { tx, cancel });
    }

    fn close(&mut self, reason: CloseReason) {
        if let Some(conn) = self.conn.take() {
            debug!(%reason, "closing websocket");
            conn.cancel.cancel();
        }
    }

    fn send(&mut self, frame: Frame) -> Result<(), SessionError> {
        let text = serde_json::to_string(&frame).map_err(|_| SessionError::Encode)?;
        self.push(Outgoing::Text(text))
    }

    fn ping(&mut self) -> Result<(), SessionError> {
        self.push(Outgoing::Ping)
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close(CloseReason::ClientDisconnect);
    }
}

/// Build the handshake URL for `config`.
///
/// `http`/`https` map to `ws`/`wss`; `secure` upgrades `ws` to `wss`. Auth
/// entries are appended as query parameters: strings verbatim, anything else
/// JSON-encoded.
pub fn build_ws_url(config: &SessionConfig) -> anyhow::Result<Url> {
    let mut url = Url::parse(&config.url)?;
    let scheme = match url.scheme() {
        "ws" | "http" if config.secure => "wss",
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => anyhow::bail!("unsupported scheme: {other}"),
    };
    if url.scheme() != scheme && url.set_scheme(scheme).is_err() {
        anyhow::bail!("cannot switch scheme to {scheme}");
    }

    if let Some(auth) = config.auth.as_ref().filter(|auth| !auth.is_empty()) {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in auth {
            match value {
                Value::String(s) => pairs.append_pair(key, s),
                other => pairs.append_pair(key, &other.to_string()),
            };
        }
    }
    Ok(url)
}

/// Decode a text frame into its event name and payload.
pub fn decode_frame(text: &str) -> Result<Frame, serde_json::Error> {
    serde_json::from_str(text)
}

async fn run_connection(
    config: SessionConfig,
    connect_timeout: Duration,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    cancel: CancellationToken,
    sink: TransportSink,
) {
    ensure_crypto();

    let url = match build_ws_url(&config) {
        Ok(url) => url,
        Err(e) => {
            sink.connect_error(format!("invalid url {}: {e:#}", config.url));
            return;
        }
    };

    debug!(%url, generation = sink.generation(), "websocket connecting");
    let connect = tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(url.as_str()));
    let stream = tokio::select! {
        _ = cancel.cancelled() => return,
        result = connect => match result {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                sink.connect_error(e.to_string());
                return;
            }
            Err(_) => {
                sink.connect_error(format!("connect timed out after {connect_timeout:?}"));
                return;
            }
        },
    };

    let (mut ws_tx, mut ws_rx) = stream.split();
    sink.opened();

    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                flush_and_close(&mut ws_tx, &mut rx).await;
                return;
            }
            item = rx.recv() => {
                let msg = match item {
                    Some(Outgoing::Text(text)) => Message::text(text),
                    Some(Outgoing::Ping) => Message::Ping(Default::default()),
                    // Transport handle dropped without close.
                    None => {
                        flush_and_close(&mut ws_tx, &mut rx).await;
                        return;
                    }
                };
                if let Err(e) = ws_tx.send(msg).await {
                    break CloseReason::TransportError(e.to_string());
                }
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => match decode_frame(text.as_str()) {
                    Ok(frame) => sink.message(frame.event, frame.data),
                    Err(e) => warn!(err = %e, "malformed frame ignored"),
                },
                Some(Ok(Message::Pong(_))) => trace!("pong"),
                Some(Ok(Message::Close(_))) | None => break CloseReason::ServerDisconnect,
                Some(Ok(_)) => {}
                Some(Err(e)) => break CloseReason::TransportError(e.to_string()),
            },
        }
    };

    if !cancel.is_cancelled() {
        sink.closed(reason);
    }
}

/// Send frames accepted before a local close, then the Close frame.
/// Queued pings are dropped.
async fn flush_and_close<S>(ws_tx: &mut S, rx: &mut mpsc::UnboundedReceiver<Outgoing>)
where
    S: futures_util::Sink<Message> + Unpin,
{
    rx.close();
    while let Ok(item) = rx.try_recv() {
        if let Outgoing::Text(text) = item {
            if ws_tx.send(Message::text(text)).await.is_err() {
                return;
            }
        }
    }
    let _ = ws_tx.send(Message::Close(None)).await;
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
