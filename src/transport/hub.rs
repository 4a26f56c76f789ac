//! Routes transport traffic into this runtime's Buffer Store and authority
//! coordinator, and fans local activity out to every attached link.

use crate::{
    authority::{AuthorityCoordinator, SignalKind, LOCAL_CONNECTION},
    buffer::{BufferEvent, BufferStore},
    role::RuntimeRole,
    transport::message::{AuthorityGrant, AuthoritySignal, TransportMessage},
};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::{sync::broadcast, time::Instant};

const SIGNAL_CAPACITY: usize = 64;
/// Ungranted authority requests remembered by a frontend
const PENDING_REQUESTS: usize = 16;

#[derive(Debug)]
pub struct TransportHub {
    role: RuntimeRole,
    buffer: Arc<BufferStore>,
    coordinator: Arc<AuthorityCoordinator>,
    signals: broadcast::Sender<AuthoritySignal>,
    links: AtomicUsize,
    /// Frontend: whether a session currently wants the lease
    wants_authority: AtomicBool,
    next_seq: AtomicU64,
    /// Frontend: send instant of each ungranted request, oldest first
    pending: Mutex<VecDeque<(u64, Instant)>>,
}

impl TransportHub {
    pub fn new(buffer: Arc<BufferStore>, coordinator: Arc<AuthorityCoordinator>) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            role: coordinator.role(),
            buffer,
            coordinator,
            signals,
            links: AtomicUsize::new(0),
            wants_authority: AtomicBool::new(false),
            next_seq: AtomicU64::new(1),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn role(&self) -> RuntimeRole {
        self.role
    }

    pub fn buffer(&self) -> &Arc<BufferStore> {
        &self.buffer
    }

    pub fn coordinator(&self) -> &Arc<AuthorityCoordinator> {
        &self.coordinator
    }

    /// Number of currently attached links
    pub fn link_count(&self) -> usize {
        self.links.load(Ordering::SeqCst)
    }

    /// Handle one message received on `connection`, returning the reply for
    /// that link, if any
    ///
    /// Safe to call with duplicates: stale deltas are dropped by the store
    /// and authority signals are idempotent.
    pub fn handle_incoming(
        &self,
        connection: &str,
        message: TransportMessage,
    ) -> Option<TransportMessage> {
        match message {
            TransportMessage::BufferDelta(delta) => {
                let holder = self.coordinator.holder();
                self.buffer.apply_remote(delta, holder, connection);
                None
            }
            TransportMessage::AuthoritySignal(signal) => match self.role {
                // The link identifies the sender, not the payload
                RuntimeRole::Backend => self.grant(connection, signal),
                RuntimeRole::Frontend => {
                    tracing::debug!(
                        "💤 Frontend ignoring authority signal {:?} from '{}'",
                        signal.kind,
                        connection
                    );
                    None
                }
            },
            TransportMessage::AuthorityGrant(grant) => {
                match self.role {
                    RuntimeRole::Frontend => self.on_grant(grant),
                    RuntimeRole::Backend => {
                        tracing::debug!(
                            "💤 Backend ignoring authority grant from '{}'",
                            connection
                        )
                    }
                }
                None
            }
        }
    }

    /// Hand an authority signal to every attached link
    ///
    /// Returns false when no link is attached, i.e. the signal went nowhere.
    pub fn send_signal(&self, kind: SignalKind) -> bool {
        self.signals.send(AuthoritySignal::new(kind)).is_ok()
    }

    /// Frontend: ask the backend for the lease (acquire or heartbeat)
    ///
    /// The local hold starts or is renewed only when the backend's grant for
    /// this request arrives, and then counts from the moment it was sent.
    pub fn request_authority(&self, kind: SignalKind) -> bool {
        self.wants_authority.store(true, Ordering::SeqCst);
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        {
            let mut pending = self.pending.lock();
            if pending.len() == PENDING_REQUESTS {
                pending.pop_front();
            }
            pending.push_back((seq, Instant::now()));
        }
        self.signals.send(AuthoritySignal::with_seq(kind, seq)).is_ok()
    }

    /// Frontend: stop accepting grants for earlier requests
    pub fn withdraw_authority(&self) {
        self.wants_authority.store(false, Ordering::SeqCst);
        self.pending.lock().clear();
    }

    pub(crate) fn subscribe_signals(&self) -> broadcast::Receiver<AuthoritySignal> {
        self.signals.subscribe()
    }

    pub(crate) fn subscribe_buffer(&self) -> broadcast::Receiver<BufferEvent> {
        self.buffer.subscribe()
    }

    pub(crate) fn on_link_opened(&self, connection: &str) {
        let count = self.links.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            "🔗 [{}] Transport link '{}' opened ({} active)",
            self.role,
            connection,
            count
        );
    }

    pub(crate) fn on_link_closed(&self, connection: &str) {
        let remaining = self.links.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        tracing::info!(
            "🔌 [{}] Transport link '{}' closed ({} active)",
            self.role,
            connection,
            remaining
        );
        match self.role {
            RuntimeRole::Backend => {
                self.coordinator.apply(SignalKind::Release, connection);
            }
            RuntimeRole::Frontend if remaining == 0 => {
                self.coordinator.apply(SignalKind::Release, LOCAL_CONNECTION);
            }
            RuntimeRole::Frontend => {}
        }
    }

    /// Backend: apply a frontend's signal and confirm a hold it now has
    fn grant(&self, connection: &str, signal: AuthoritySignal) -> Option<TransportMessage> {
        self.coordinator.apply(signal.kind, connection);
        let seq = signal.seq?;
        let renewal = matches!(signal.kind, SignalKind::Acquire | SignalKind::Heartbeat);
        if renewal && self.coordinator.is_tracked(connection) {
            Some(TransportMessage::AuthorityGrant(AuthorityGrant { seq }))
        } else {
            None
        }
    }

    /// Frontend: renew the local hold as of the granted request's send time
    fn on_grant(&self, grant: AuthorityGrant) {
        if !self.wants_authority.load(Ordering::SeqCst) {
            tracing::debug!("💤 Ignoring grant {} for a withdrawn session", grant.seq);
            return;
        }
        let sent_at = {
            let mut pending = self.pending.lock();
            let Some(position) = pending.iter().position(|(seq, _)| *seq == grant.seq) else {
                tracing::debug!("💤 Ignoring grant for unknown request {}", grant.seq);
                return;
            };
            let sent_at = pending[position].1;
            pending.drain(..=position);
            sent_at
        };
        self.coordinator.apply_at(SignalKind::Acquire, LOCAL_CONNECTION, sent_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferDelta;
    use serde_json::json;
    use std::time::Duration;

    fn hub(role: RuntimeRole) -> TransportHub {
        TransportHub::new(
            Arc::new(BufferStore::new(role)),
            Arc::new(AuthorityCoordinator::new(role, Duration::from_secs(75))),
        )
    }

    #[tokio::test]
    async fn backend_applies_signals_per_connection() {
        let hub = hub(RuntimeRole::Backend);
        let acquire = TransportMessage::AuthoritySignal(AuthoritySignal {
            kind: SignalKind::Acquire,
            seq: Some(1),
            connection_id: Some("spoofed".to_string()),
        });
        let reply = hub.handle_incoming("ws-1", acquire);
        assert_eq!(reply, Some(TransportMessage::AuthorityGrant(AuthorityGrant { seq: 1 })));

        let status = hub.coordinator().status();
        assert_eq!(status.holder, RuntimeRole::Frontend);
        assert_eq!(status.frontend_connections, vec!["ws-1".to_string()]);

        hub.on_link_opened("ws-1");
        hub.on_link_closed("ws-1");
        assert_eq!(hub.coordinator().holder(), RuntimeRole::Backend);
    }

    #[tokio::test]
    async fn deltas_resolve_ties_against_current_holder() {
        let hub = hub(RuntimeRole::Backend);
        hub.buffer().set_at("scene", json!("evening"), 10);

        let tie = BufferDelta {
            key: "scene".to_string(),
            value: json!("movie"),
            writer: RuntimeRole::Frontend,
            ts: 10,
        };
        hub.handle_incoming("ws-1", TransportMessage::BufferDelta(tie.clone()));
        assert_eq!(hub.buffer().get("scene"), Some(json!("evening")));

        hub.handle_incoming("ws-1", AuthoritySignal::new(SignalKind::Acquire).into());
        hub.handle_incoming("ws-1", TransportMessage::BufferDelta(tie));
        assert_eq!(hub.buffer().get("scene"), Some(json!("movie")));
    }

    #[tokio::test]
    async fn signal_without_links_goes_nowhere() {
        let hub = hub(RuntimeRole::Frontend);
        assert!(!hub.send_signal(SignalKind::Heartbeat));
        let _rx = hub.subscribe_signals();
        assert!(hub.send_signal(SignalKind::Heartbeat));
    }

    #[tokio::test]
    async fn backend_grants_only_tracked_requests() {
        let hub = hub(RuntimeRole::Backend);
        let heartbeat = AuthoritySignal::with_seq(SignalKind::Heartbeat, 4);

        // Never acquired: nothing to confirm
        assert_eq!(hub.handle_incoming("ws-1", heartbeat.clone().into()), None);
        // Unnumbered signals are applied but not answered
        let unnumbered: TransportMessage = AuthoritySignal::new(SignalKind::Acquire).into();
        assert_eq!(hub.handle_incoming("ws-1", unnumbered), None);
        assert_eq!(
            hub.handle_incoming("ws-1", heartbeat.into()),
            Some(TransportMessage::AuthorityGrant(AuthorityGrant { seq: 4 }))
        );
        assert_eq!(
            hub.handle_incoming("ws-1", AuthoritySignal::with_seq(SignalKind::Release, 5).into()),
            None
        );
        assert_eq!(hub.coordinator().holder(), RuntimeRole::Backend);
    }

    #[tokio::test(start_paused = true)]
    async fn frontend_hold_counts_from_request_not_grant() {
        let hub = hub(RuntimeRole::Frontend);
        let mut outgoing = hub.subscribe_signals();

        assert!(hub.request_authority(SignalKind::Acquire));
        assert!(!hub.coordinator().may_actuate());
        let seq = outgoing.recv().await.unwrap().seq.unwrap();

        // Grant delivered late: the hold still ends a grace period after sending
        tokio::time::sleep(Duration::from_secs(50)).await;
        hub.handle_incoming("link", TransportMessage::AuthorityGrant(AuthorityGrant { seq }));
        assert!(hub.coordinator().may_actuate());
        tokio::time::sleep(Duration::from_secs(26)).await;
        assert!(!hub.coordinator().may_actuate());

        // Grants for withdrawn or unknown requests change nothing
        assert!(hub.request_authority(SignalKind::Acquire));
        let seq = outgoing.recv().await.unwrap().seq.unwrap();
        hub.withdraw_authority();
        hub.handle_incoming("link", TransportMessage::AuthorityGrant(AuthorityGrant { seq }));
        hub.handle_incoming("link", TransportMessage::AuthorityGrant(AuthorityGrant { seq: 999 }));
        assert!(!hub.coordinator().may_actuate());
    }
}
