//! WebSocket transport endpoint
//!
//! Each socket becomes one transport link: frames are JSON
//! [`TransportMessage`]s and the server assigns the connection id the
//! authority lease tracks the peer by.

use crate::{
    api::AppState,
    transport::{memory_link, TransportMessage},
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};

const LINK_CAPACITY: usize = 256;

pub fn create_socket_routes() -> Router<AppState> {
    Router::new().route("/ws", get(upgrade))
}

/// GET /ws
async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| bridge(state, socket))
}

/// Pump frames between the socket and a link attached to the runtime
async fn bridge(state: AppState, mut socket: WebSocket) {
    let (ours, mut peer) = memory_link(LINK_CAPACITY);
    let connection = ours.id.clone();
    let pump = state.runtime.connect(ours);

    loop {
        tokio::select! {
            frame = socket.recv() => match frame {
                Some(Ok(Message::Text(text))) => match TransportMessage::from_json(text.as_str()) {
                    Ok(message) => {
                        if peer.tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("⚠️ Dropping frame from '{}': {}", connection, e),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("⚠️ WebSocket '{}' failed: {}", connection, e);
                    break;
                }
            },
            outgoing = peer.rx.recv() => match outgoing {
                Some(message) => {
                    let text = match message.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!("❌ {}", e);
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    // Closing our side ends the pump, which releases the connection's hold
    drop(peer);
    let _ = pump.await;
}
