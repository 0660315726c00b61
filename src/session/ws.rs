//! WebSocket transport for editor sessions.
//!
//! Each connection gets exactly two tasks: a reader that decodes frames and
//! runs handlers one at a time (frames are processed strictly in arrival
//! order), and a writer that owns the sink. Every outbound frame — the
//! greeting, handler responses, pings — goes through one mpsc channel into
//! the writer, so partial writes from different sources can never
//! interleave.
//!
//! Liveness: the writer sends a Ping every `ping_interval`; if no Pong has
//! arrived within twice that interval the connection is considered dead and
//! closed, releasing the session.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::session::protocol::{ClientEvent, ServerEvent};
use crate::session::router::{Session, SessionDeps};

/// Outbound frame buffer per connection.
const OUTBOUND_BUFFER: usize = 64;

/// Shared context handed to every upgraded connection.
pub struct WsContext {
    pub deps: SessionDeps,
    pub ping_interval: Duration,
}

pub async fn ws_handler(ws: WebSocketUpgrade, ctx: Arc<WsContext>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

async fn handle_socket(socket: WebSocket, ctx: Arc<WsContext>) {
    let (sink, stream) = socket.split();
    let (tx, rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);
    let (pong_tx, pong_rx) = watch::channel(Instant::now());

    // Greeting goes through the same writer path as everything else.
    let greeting = ServerEvent::Info {
        message: "Connection established".into(),
        details: Some(serde_json::json!({
            "server": "questlab-runner",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    };
    if let Some(frame) = encode(&greeting) {
        let _ = tx.send(frame).await;
    }

    let mut writer = tokio::spawn(write_loop(sink, rx, pong_rx, ctx.ping_interval));
    let mut reader = tokio::spawn(read_loop(stream, tx, pong_tx, ctx.deps.clone()));

    // Whichever task exits first takes the other down with it. A dead peer is
    // detected by the writer; the reader would otherwise stay parked on a
    // socket nobody will answer on, keeping the session alive forever.
    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => {
            // Reader exit dropped the outbound sender; the writer drains and
            // sends the close frame.
            let _ = writer.await;
        }
    }
    info!("client disconnected");
}

/// Single writer: drains outbound frames and drives the heartbeat.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
    pong_rx: watch::Receiver<Instant>,
    ping_interval: Duration,
) {
    let pong_timeout = ping_interval * 2;
    let mut ticker = tokio::time::interval(ping_interval);
    // The first tick completes immediately; consume it so the first real
    // ping fires after one full interval.
    ticker.tick().await;

    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if awaiting_pong && pong_rx.borrow().elapsed() > pong_timeout {
                    warn!("no pong within {:?}, closing connection", pong_timeout);
                    break;
                }
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }
            frame = rx.recv() => {
                match frame {
                    Some(frame) => {
                        if sink.send(frame).await.is_err() {
                            break;
                        }
                    }
                    // All senders dropped: the reader is gone.
                    None => break,
                }
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
}

/// Single reader: decodes frames and runs handlers to completion, in order.
async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    tx: mpsc::Sender<Message>,
    pong_tx: watch::Sender<Instant>,
    deps: SessionDeps,
) {
    let mut session = Session::new();

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "websocket read error");
                break;
            }
        };
        match msg {
            Message::Text(text) => {
                let response = match serde_json::from_str::<ClientEvent>(text.as_str()) {
                    Ok(event) => session.handle(&deps, event).await,
                    Err(e) => ServerEvent::error("Unknown event type", e.to_string()),
                };
                let Some(frame) = encode(&response) else { continue };
                if tx.send(frame).await.is_err() {
                    // Writer is gone; nothing left to do for this session.
                    break;
                }
            }
            Message::Pong(_) => {
                let _ = pong_tx.send(Instant::now());
            }
            Message::Close(_) => break,
            // Binary frames and client pings carry nothing for us.
            Message::Binary(_) | Message::Ping(_) => {}
        }
    }
}

fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!(error = %e, "failed to serialize server event");
            None
        }
    }
}
