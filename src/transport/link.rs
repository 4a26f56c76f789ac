//! Duplex message links between runtimes
//!
//! A [`LinkEnd`] is one side of an ordered, bidirectional channel of
//! [`TransportMessage`]s. [`memory_link`] joins two runtimes in-process; the
//! WebSocket route bridges a socket onto one end. [`attach`] plugs an end
//! into a [`TransportHub`] and pumps traffic until either side hangs up.

use crate::{
    buffer::BufferEvent,
    transport::{
        hub::TransportHub,
        message::{AuthoritySignal, TransportMessage},
    },
};
use std::sync::Arc;
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        mpsc,
    },
    task::JoinHandle,
};

/// One side of a duplex link
#[derive(Debug)]
pub struct LinkEnd {
    /// Connection id the attached hub knows the peer by
    pub id: String,
    pub tx: mpsc::Sender<TransportMessage>,
    pub rx: mpsc::Receiver<TransportMessage>,
}

/// Two connected link ends, each with a fresh connection id
pub fn memory_link(capacity: usize) -> (LinkEnd, LinkEnd) {
    let (a_tx, b_rx) = mpsc::channel(capacity);
    let (b_tx, a_rx) = mpsc::channel(capacity);
    (
        LinkEnd {
            id: uuid::Uuid::new_v4().to_string(),
            tx: a_tx,
            rx: a_rx,
        },
        LinkEnd {
            id: uuid::Uuid::new_v4().to_string(),
            tx: b_tx,
            rx: b_rx,
        },
    )
}

/// Pump `end` through `hub` until the link closes
///
/// Subscriptions are taken before returning so nothing written after the
/// call is missed. Each link runs a reader and a writer task. The reader
/// applies incoming messages and never waits on outbound traffic, so two
/// peers flooding each other cannot stall the link. The writer first sends
/// a full buffer snapshot, then replies to the peer's requests, every
/// accepted write that did not come from the peer, and outgoing authority
/// signals.
///
/// The returned handle is the reader; the link is open until it finishes.
pub fn attach(hub: Arc<TransportHub>, end: LinkEnd) -> JoinHandle<()> {
    let LinkEnd { id, tx, mut rx } = end;
    let events = hub.subscribe_buffer();
    let signals = hub.subscribe_signals();
    hub.on_link_opened(&id);

    let (replies, pending_replies) = mpsc::unbounded_channel();
    let mut writer = tokio::spawn(write_loop(
        Arc::clone(&hub),
        id.clone(),
        tx,
        events,
        signals,
        pending_replies,
    ));

    tokio::spawn(async move {
        loop {
            tokio::select! {
                incoming = rx.recv() => match incoming {
                    Some(message) => {
                        if let Some(reply) = hub.handle_incoming(&id, message) {
                            // The writer is gone only if the link is closing
                            let _ = replies.send(reply);
                        }
                    }
                    None => break,
                },
                // Peer stopped reading
                _ = &mut writer => break,
            }
        }
        writer.abort();
        hub.on_link_closed(&id);
    })
}

/// Everything this side sends to the peer, in one ordered stream
async fn write_loop(
    hub: Arc<TransportHub>,
    id: String,
    tx: mpsc::Sender<TransportMessage>,
    mut events: broadcast::Receiver<BufferEvent>,
    mut signals: broadcast::Receiver<AuthoritySignal>,
    mut replies: mpsc::UnboundedReceiver<TransportMessage>,
) {
    if !resync(&hub, &tx).await {
        return;
    }
    loop {
        let message: TransportMessage = tokio::select! {
            biased;
            reply = replies.recv() => match reply {
                Some(reply) => reply,
                None => break,
            },
            signal = signals.recv() => match signal {
                Ok(signal) => signal.into(),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("💤 Link '{}' skipped {} authority signals", id, skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            event = events.recv() => match event {
                Ok(event) if event.origin.as_deref() == Some(id.as_str()) => continue,
                Ok(event) => event.delta.into(),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "⚠️ Link '{}' lagged {} buffer events, resyncing",
                        id,
                        skipped
                    );
                    if !resync(&hub, &tx).await {
                        break;
                    }
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
        };
        if tx.send(message).await.is_err() {
            break;
        }
    }
}

/// Send every buffer entry; false once the peer is gone
async fn resync(hub: &TransportHub, tx: &mpsc::Sender<TransportMessage>) -> bool {
    for delta in hub.buffer().snapshot() {
        if tx.send(delta.into()).await.is_err() {
            return false;
        }
    }
    true
}
