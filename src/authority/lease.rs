//! Authority lease state machine.
//!
//! Pure state: every operation takes the current instant, so the transitions
//! are deterministic and testable without a clock. The backend is the default
//! holder; frontends borrow the lease and keep it alive with heartbeats.
//! Several frontend connections coalesce into one frontend hold that ends
//! when the last of them releases or goes silent.

use crate::role::RuntimeRole;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};
use tokio::time::Instant;

/// Authority signal carried by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Acquire,
    Heartbeat,
    Release,
}

/// A change of holder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: RuntimeRole,
    pub to: RuntimeRole,
    pub reason: &'static str,
}

#[derive(Debug, Clone)]
pub struct AuthorityLease {
    holder: RuntimeRole,
    acquired_at: Option<Instant>,
    last_heartbeat_at: Option<Instant>,
    /// Tracked frontend connections and when each was last heard from
    frontends: HashMap<String, Instant>,
    grace_period: Duration,
}

/// Serializable view of the lease
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaseStatus {
    pub holder: RuntimeRole,
    pub frontend_connections: Vec<String>,
    pub held_for_ms: Option<u64>,
    pub since_heartbeat_ms: Option<u64>,
    pub grace_period_ms: u64,
}

impl AuthorityLease {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            holder: RuntimeRole::Backend,
            acquired_at: None,
            last_heartbeat_at: None,
            frontends: HashMap::new(),
            grace_period,
        }
    }

    pub fn holder(&self) -> RuntimeRole {
        self.holder
    }

    pub fn acquired_at(&self) -> Option<Instant> {
        self.acquired_at
    }

    pub fn last_heartbeat_at(&self) -> Option<Instant> {
        self.last_heartbeat_at
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn is_tracked(&self, connection: &str) -> bool {
        self.frontends.contains_key(connection)
    }

    /// Apply a signal from a frontend connection
    ///
    /// Duplicate acquires and heartbeats are harmless. A heartbeat from a
    /// connection that never acquired (or already timed out) is ignored; it
    /// must acquire again.
    pub fn apply(
        &mut self,
        kind: SignalKind,
        connection: &str,
        now: Instant,
    ) -> Option<Transition> {
        match kind {
            SignalKind::Acquire => {
                self.frontends.insert(connection.to_string(), now);
                self.last_heartbeat_at = Some(now);
                if self.holder == RuntimeRole::Backend {
                    self.acquired_at = Some(now);
                    return self.transfer(RuntimeRole::Frontend, "frontend acquire");
                }
                None
            }
            SignalKind::Heartbeat => {
                match self.frontends.get_mut(connection) {
                    Some(seen) => {
                        *seen = now;
                        self.last_heartbeat_at = Some(now);
                    }
                    None => tracing::debug!(
                        "💤 Ignoring heartbeat from untracked connection '{}'",
                        connection
                    ),
                }
                None
            }
            SignalKind::Release => {
                self.frontends.remove(connection);
                if self.frontends.is_empty() && self.holder == RuntimeRole::Frontend {
                    return self.transfer(RuntimeRole::Backend, "last frontend released");
                }
                None
            }
        }
    }

    /// Drop connections silent for longer than the grace period
    pub fn expire(&mut self, now: Instant) -> Option<Transition> {
        let grace = self.grace_period;
        self.frontends.retain(|connection, seen| {
            let alive = now.saturating_duration_since(*seen) <= grace;
            if !alive {
                tracing::warn!(
                    "⏰ Frontend connection '{}' missed heartbeats for over {:?}",
                    connection,
                    grace
                );
            }
            alive
        });
        if self.frontends.is_empty() && self.holder == RuntimeRole::Frontend {
            return self.transfer(RuntimeRole::Backend, "heartbeat timeout");
        }
        None
    }

    pub fn status(&self, now: Instant) -> LeaseStatus {
        let mut connections: Vec<String> = self.frontends.keys().cloned().collect();
        connections.sort();
        let held = self.holder == RuntimeRole::Frontend;
        LeaseStatus {
            holder: self.holder,
            frontend_connections: connections,
            held_for_ms: self
                .acquired_at
                .filter(|_| held)
                .map(|at| now.saturating_duration_since(at).as_millis() as u64),
            since_heartbeat_ms: self
                .last_heartbeat_at
                .filter(|_| held)
                .map(|at| now.saturating_duration_since(at).as_millis() as u64),
            grace_period_ms: self.grace_period.as_millis() as u64,
        }
    }

    fn transfer(&mut self, to: RuntimeRole, reason: &'static str) -> Option<Transition> {
        let from = self.holder;
        self.holder = to;
        if to == RuntimeRole::Backend {
            self.acquired_at = None;
            self.last_heartbeat_at = None;
        }
        Some(Transition { from, to, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn acquire_heartbeat_release() {
        let t0 = Instant::now();
        let mut lease = AuthorityLease::new(secs(75));
        assert_eq!(lease.holder(), RuntimeRole::Backend);

        let transition = lease.apply(SignalKind::Acquire, "tab", t0).unwrap();
        assert_eq!((transition.from, transition.to), (RuntimeRole::Backend, RuntimeRole::Frontend));
        assert_eq!(lease.acquired_at(), Some(t0));

        assert!(lease.apply(SignalKind::Heartbeat, "tab", t0 + secs(30)).is_none());
        assert_eq!(lease.last_heartbeat_at(), Some(t0 + secs(30)));
        assert!(lease.expire(t0 + secs(100)).is_none());

        let transition = lease.apply(SignalKind::Release, "tab", t0 + secs(101)).unwrap();
        assert_eq!(transition.to, RuntimeRole::Backend);
        assert_eq!(transition.reason, "last frontend released");
    }

    #[test]
    fn silence_past_grace_falls_back_to_backend() {
        let t0 = Instant::now();
        let mut lease = AuthorityLease::new(secs(75));
        lease.apply(SignalKind::Acquire, "tab", t0);

        assert!(lease.expire(t0 + secs(75)).is_none());
        let transition = lease.expire(t0 + secs(76)).unwrap();
        assert_eq!(transition.to, RuntimeRole::Backend);
        assert_eq!(transition.reason, "heartbeat timeout");

        // A late heartbeat does not resurrect the lease
        assert!(lease.apply(SignalKind::Heartbeat, "tab", t0 + secs(77)).is_none());
        assert_eq!(lease.holder(), RuntimeRole::Backend);
    }

    #[test]
    fn multiple_frontends_coalesce() {
        let t0 = Instant::now();
        let mut lease = AuthorityLease::new(secs(75));
        lease.apply(SignalKind::Acquire, "tab-a", t0);
        assert!(lease.apply(SignalKind::Acquire, "tab-b", t0 + secs(1)).is_none());

        assert!(lease.apply(SignalKind::Release, "tab-a", t0 + secs(2)).is_none());
        assert_eq!(lease.holder(), RuntimeRole::Frontend);

        // tab-b keeps heartbeating while tab-a's record is gone
        lease.apply(SignalKind::Heartbeat, "tab-b", t0 + secs(60));
        assert!(lease.expire(t0 + secs(100)).is_none());
        assert!(lease.expire(t0 + secs(136)).is_some());
    }

    #[test]
    fn duplicate_signals_are_idempotent() {
        let t0 = Instant::now();
        let mut lease = AuthorityLease::new(secs(75));
        assert!(lease.apply(SignalKind::Acquire, "tab", t0).is_some());
        assert!(lease.apply(SignalKind::Acquire, "tab", t0).is_none());
        assert!(lease.apply(SignalKind::Heartbeat, "tab", t0 + secs(1)).is_none());
        assert!(lease.apply(SignalKind::Heartbeat, "tab", t0 + secs(1)).is_none());
        assert!(lease.apply(SignalKind::Release, "tab", t0 + secs(2)).is_some());
        assert!(lease.apply(SignalKind::Release, "tab", t0 + secs(2)).is_none());

        let status = lease.status(t0 + secs(3));
        assert_eq!(status.holder, RuntimeRole::Backend);
        assert!(status.frontend_connections.is_empty());
        assert_eq!(status.held_for_ms, None);
    }
}
