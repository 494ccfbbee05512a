//! Resolver-facing WebSocket surface.
//!
//! One pump task per connection: frames queued by the broadcaster are written
//! out under a short deadline, inbound text frames are handed to the manager
//! unparsed. A subscriber that cannot keep up is disconnected rather than
//! allowed to slow its peers.

use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::server::handlers::AppState;

/// A frame write that cannot complete within this deadline marks the
/// connection dead.
const WRITE_DEADLINE: Duration = Duration::from_millis(100);

pub fn router(state: AppState) -> Router {
    Router::new().route("/ws", get(upgrade)).with_state(state)
}

async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| pump(state, socket))
}

async fn pump(state: AppState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (outbox, mut frames) = mpsc::channel::<String>(state.outbox_capacity);
    let id = state.manager.broadcaster().register(outbox);
    debug!(subscriber_id = id, "resolver connected");

    loop {
        tokio::select! {
            queued = frames.recv() => {
                let Some(frame) = queued else {
                    // broadcaster closed our outbox
                    break;
                };
                let write = sink.send(Message::Text(frame.into()));
                match tokio::time::timeout(WRITE_DEADLINE, write).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!(subscriber_id = id, error = %e, "write failed");
                        break;
                    }
                    Err(_) => {
                        warn!(subscriber_id = id, "write deadline exceeded, dropping subscriber");
                        break;
                    }
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(payload))) => {
                        if let Err(e) = state.manager.handle_receive_event(payload.as_str()) {
                            warn!(subscriber_id = id, error = %e, "frame discarded");
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // axum answers pings itself; anything else is ignored
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(subscriber_id = id, error = %e, "socket error");
                        break;
                    }
                }
            }
        }
    }

    state.manager.broadcaster().unregister(id);
    debug!(subscriber_id = id, "resolver disconnected");
}
