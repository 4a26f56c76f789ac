//! Frontend side of the authority lease
//!
//! A [`FrontendSession`] asks the backend for the lease and keeps it alive
//! with heartbeats. The frontend's own view of the lease starts and is
//! renewed only by the backend's grant for a request, and counts from the
//! moment that request was sent. The backend therefore stops actuating
//! before the frontend starts, and a frontend that lost its backend stops
//! actuating no later than the backend takes over.

use crate::{
    authority::{AuthorityCoordinator, SignalKind},
    transport::TransportHub,
};
use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;

/// Connection id the frontend uses for its own hold
pub const LOCAL_CONNECTION: &str = "local";

#[derive(Debug)]
pub struct FrontendSession {
    hub: Arc<TransportHub>,
    heartbeat: JoinHandle<()>,
}

impl FrontendSession {
    /// Send `FrontendAcquire` and start heartbeating every `interval`
    ///
    /// The frontend may actuate once the backend's grant arrives.
    pub fn acquire(hub: Arc<TransportHub>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(anyhow::anyhow!("Heartbeat interval must be greater than zero"));
        }
        if !hub.request_authority(SignalKind::Acquire) {
            hub.withdraw_authority();
            return Err(anyhow::anyhow!("No backend link attached, cannot acquire authority"));
        }
        tracing::info!("🎛️ Frontend requested authority, heartbeat every {:?}", interval);

        let heartbeat = tokio::spawn(heartbeat_loop(Arc::clone(&hub), interval));
        Ok(Self { hub, heartbeat })
    }

    pub fn coordinator(&self) -> &Arc<AuthorityCoordinator> {
        self.hub.coordinator()
    }

    /// Give the lease back to the backend
    pub fn release(self) {
        self.hub.withdraw_authority();
        self.hub.coordinator().apply(SignalKind::Release, LOCAL_CONNECTION);
        if !self.hub.send_signal(SignalKind::Release) {
            tracing::debug!("💤 No backend link for release, backend will time out the hold");
        }
        tracing::info!("🎛️ Frontend released authority");
        // Drop stops the heartbeat
    }
}

impl Drop for FrontendSession {
    /// Stops heartbeating without releasing, like a closed tab
    fn drop(&mut self) {
        self.heartbeat.abort();
        self.hub.withdraw_authority();
    }
}

async fn heartbeat_loop(hub: Arc<TransportHub>, interval: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        // A hold the backend already dropped has to be acquired again
        let kind = if hub.coordinator().may_actuate() {
            SignalKind::Heartbeat
        } else {
            SignalKind::Acquire
        };
        if !hub.request_authority(kind) {
            tracing::warn!("⚠️ Heartbeat could not be sent, local authority view will lapse");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        buffer::BufferStore,
        role::RuntimeRole,
        transport::{AuthorityGrant, AuthoritySignal, TransportMessage},
    };
    use tokio::sync::broadcast;

    fn frontend_hub() -> Arc<TransportHub> {
        Arc::new(TransportHub::new(
            Arc::new(BufferStore::new(RuntimeRole::Frontend)),
            Arc::new(AuthorityCoordinator::new(RuntimeRole::Frontend, Duration::from_secs(75))),
        ))
    }

    /// Answer the next outgoing request the way a backend would
    async fn grant_next(
        hub: &TransportHub,
        outgoing: &mut broadcast::Receiver<AuthoritySignal>,
    ) -> SignalKind {
        let request = outgoing.recv().await.unwrap();
        if let Some(seq) = request.seq {
            hub.handle_incoming("link", TransportMessage::AuthorityGrant(AuthorityGrant { seq }));
        }
        request.kind
    }

    #[tokio::test]
    async fn acquire_requires_a_link() {
        let hub = frontend_hub();
        assert!(FrontendSession::acquire(Arc::clone(&hub), Duration::from_secs(30)).is_err());
        assert!(FrontendSession::acquire(Arc::clone(&hub), Duration::ZERO).is_err());
        assert!(!hub.coordinator().may_actuate());
    }

    #[tokio::test]
    async fn local_hold_waits_for_the_grant() {
        let hub = frontend_hub();
        let mut outgoing = hub.subscribe_signals();
        let session = FrontendSession::acquire(Arc::clone(&hub), Duration::from_secs(30)).unwrap();
        assert!(!session.coordinator().may_actuate());

        assert_eq!(grant_next(&hub, &mut outgoing).await, SignalKind::Acquire);
        assert!(session.coordinator().may_actuate());
    }

    #[tokio::test(start_paused = true)]
    async fn granted_heartbeats_keep_local_hold_until_grants_stop() {
        let hub = frontend_hub();
        let mut outgoing = hub.subscribe_signals();
        let session = FrontendSession::acquire(Arc::clone(&hub), Duration::from_secs(30)).unwrap();
        grant_next(&hub, &mut outgoing).await;

        for _ in 0..6 {
            assert_eq!(grant_next(&hub, &mut outgoing).await, SignalKind::Heartbeat);
        }
        assert!(hub.coordinator().may_actuate());

        // Heartbeats keep leaving but nothing confirms them: the hold lapses
        tokio::time::sleep(Duration::from_secs(76)).await;
        assert!(!hub.coordinator().may_actuate());

        // The next tick asks for the lease again
        while let Ok(request) = outgoing.try_recv() {
            assert_eq!(request.kind, SignalKind::Heartbeat);
        }
        assert_eq!(grant_next(&hub, &mut outgoing).await, SignalKind::Acquire);
        assert!(hub.coordinator().may_actuate());
        drop(session);
    }

    #[tokio::test]
    async fn release_returns_local_hold_and_ignores_late_grants() {
        let hub = frontend_hub();
        let mut outgoing = hub.subscribe_signals();
        let session = FrontendSession::acquire(Arc::clone(&hub), Duration::from_secs(30)).unwrap();
        let acquire = outgoing.recv().await.unwrap();
        assert_eq!(acquire.kind, SignalKind::Acquire);

        session.release();
        assert!(!hub.coordinator().may_actuate());
        assert_eq!(outgoing.recv().await.unwrap().kind, SignalKind::Release);

        let late = AuthorityGrant { seq: acquire.seq.unwrap() };
        hub.handle_incoming("link", TransportMessage::AuthorityGrant(late));
        assert!(!hub.coordinator().may_actuate());
    }
}
