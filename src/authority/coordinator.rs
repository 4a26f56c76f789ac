//! Authority coordinator
//!
//! Owns this runtime's view of the lease and answers the one question the
//! actuation gate asks: may this runtime touch real devices right now?
//! Every read expires stale frontend holds first, so a late or missed
//! watchdog tick still fails toward the backend.

use crate::{
    authority::lease::{AuthorityLease, LeaseStatus, SignalKind, Transition},
    role::RuntimeRole,
};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle, time::Instant};

#[derive(Debug)]
pub struct AuthorityCoordinator {
    /// Which runtime this coordinator belongs to
    role: RuntimeRole,
    lease: Mutex<AuthorityLease>,
    holder_tx: watch::Sender<RuntimeRole>,
}

impl AuthorityCoordinator {
    pub fn new(role: RuntimeRole, grace_period: Duration) -> Self {
        let (holder_tx, _) = watch::channel(RuntimeRole::Backend);
        Self {
            role,
            lease: Mutex::new(AuthorityLease::new(grace_period)),
            holder_tx,
        }
    }

    pub fn role(&self) -> RuntimeRole {
        self.role
    }

    /// Current holder, after expiring silent frontends
    pub fn holder(&self) -> RuntimeRole {
        self.expire_at(Instant::now());
        self.lease.lock().holder()
    }

    /// Whether device commands from this runtime may reach devices
    pub fn may_actuate(&self) -> bool {
        self.holder() == self.role
    }

    /// Apply an authority signal from `connection`
    pub fn apply(&self, kind: SignalKind, connection: &str) -> Option<Transition> {
        self.apply_at(kind, connection, Instant::now())
    }

    pub fn apply_at(&self, kind: SignalKind, connection: &str, now: Instant) -> Option<Transition> {
        // Expire first so a signal never extends an already dead hold
        self.expire_at(now);
        let transition = self.lease.lock().apply(kind, connection, now);
        tracing::debug!("📶 Authority signal {:?} from '{}'", kind, connection);
        self.publish(transition)
    }

    /// Whether `connection` currently holds part of a frontend lease
    pub fn is_tracked(&self, connection: &str) -> bool {
        self.expire_at(Instant::now());
        self.lease.lock().is_tracked(connection)
    }

    pub fn expire_at(&self, now: Instant) -> Option<Transition> {
        let transition = self.lease.lock().expire(now);
        self.publish(transition)
    }

    pub fn status(&self) -> LeaseStatus {
        let now = Instant::now();
        self.expire_at(now);
        self.lease.lock().status(now)
    }

    /// Watch holder changes
    pub fn subscribe(&self) -> watch::Receiver<RuntimeRole> {
        self.holder_tx.subscribe()
    }

    /// Periodically expire silent frontends so holder changes are published
    /// even when nobody asks
    pub fn spawn_watchdog(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                coordinator.expire_at(Instant::now());
            }
        })
    }

    fn publish(&self, transition: Option<Transition>) -> Option<Transition> {
        if let Some(t) = transition {
            tracing::info!(
                "👑 [{}] Authority lease {} -> {} ({})",
                self.role,
                t.from,
                t.to,
                t.reason
            );
            self.holder_tx.send_replace(t.to);
        }
        transition
    }
}
