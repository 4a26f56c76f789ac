//! Buffer Store
//!
//! A small replicated key -> value table for scalar state both runtimes must
//! see (sliders, toggles, computed values). Each runtime owns one store.
//! Reads are always local. Every accepted write is published as a
//! [`BufferEvent`] that the transport forwards to the other runtime and the
//! evaluation loop uses to re-evaluate.
//!
//! Conflict policy is last-write-by-timestamp-wins. Equal timestamps from
//! different writers resolve in favor of the current authority lease holder.
//! Whole values are replaced; nothing is merged.

use crate::role::RuntimeRole;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 1024;

/// How far into the future a remote timestamp may be, in milliseconds
pub const MAX_CLOCK_SKEW_MS: i64 = 24 * 60 * 60 * 1000;

/// Current value of one key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferEntry {
    pub value: Value,
    /// Wall-clock milliseconds of the write
    pub ts: i64,
    pub writer: RuntimeRole,
}

/// A write as it travels between runtimes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferDelta {
    pub key: String,
    pub value: Value,
    pub writer: RuntimeRole,
    pub ts: i64,
}

/// An accepted write
#[derive(Debug, Clone, PartialEq)]
pub struct BufferEvent {
    pub delta: BufferDelta,
    /// Transport connection the write arrived on; `None` for local writes
    pub origin: Option<String>,
}

#[derive(Debug)]
pub struct BufferStore {
    local: RuntimeRole,
    entries: RwLock<HashMap<String, BufferEntry>>,
    events: broadcast::Sender<BufferEvent>,
}

impl BufferStore {
    pub fn new(local: RuntimeRole) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            local,
            entries: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Runtime whose writes this store stamps as local
    pub fn role(&self) -> RuntimeRole {
        self.local
    }

    /// Local write with a fresh timestamp
    ///
    /// The timestamp is at least one past the current entry's, so a local
    /// write always supersedes whatever this runtime has seen for the key.
    pub fn set(&self, key: &str, value: Value) -> BufferDelta {
        let now = chrono::Utc::now().timestamp_millis();
        self.write_local(key, value, |current| match current {
            Some(entry) => now.max(entry.ts.saturating_add(1)),
            None => now,
        })
    }

    /// Local write with an explicit timestamp
    pub fn set_at(&self, key: &str, value: Value, ts: i64) -> BufferDelta {
        self.write_local(key, value, |_| ts)
    }

    /// Apply a delta received from the other runtime
    ///
    /// Returns whether it was accepted. Stale and duplicate deltas are
    /// dropped silently; delivery is at-least-once. Deltas stamped further
    /// than [`MAX_CLOCK_SKEW_MS`] into the future are rejected.
    pub fn apply_remote(&self, delta: BufferDelta, holder: RuntimeRole, origin: &str) -> bool {
        let horizon = chrono::Utc::now()
            .timestamp_millis()
            .saturating_add(MAX_CLOCK_SKEW_MS);
        if delta.ts > horizon {
            tracing::warn!(
                "⚠️ Rejecting delta for '{}' from {}: ts {} is beyond the clock skew horizon",
                delta.key,
                delta.writer,
                delta.ts
            );
            return false;
        }

        {
            let mut entries = self.entries.write();
            if let Some(current) = entries.get(&delta.key) {
                if !supersedes(&delta, current, holder) {
                    tracing::debug!(
                        "🗑️ Dropping stale delta for '{}' (ts {} by {}, have ts {} by {})",
                        delta.key,
                        delta.ts,
                        delta.writer,
                        current.ts,
                        current.writer
                    );
                    return false;
                }
            }
            entries.insert(
                delta.key.clone(),
                BufferEntry {
                    value: delta.value.clone(),
                    ts: delta.ts,
                    writer: delta.writer,
                },
            );
            // Published under the lock so subscribers see writes in store order
            tracing::debug!(
                "📥 Buffer '{}' = {} (from {}, ts {})",
                delta.key,
                delta.value,
                delta.writer,
                delta.ts
            );
            self.publish(delta, Some(origin.to_string()));
        }
        true
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).map(|entry| entry.value.clone())
    }

    pub fn entry(&self, key: &str) -> Option<BufferEntry> {
        self.entries.read().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Every entry as a delta, for resynchronizing a new peer
    pub fn snapshot(&self) -> Vec<BufferDelta> {
        let mut deltas: Vec<BufferDelta> = self
            .entries
            .read()
            .iter()
            .map(|(key, entry)| BufferDelta {
                key: key.clone(),
                value: entry.value.clone(),
                writer: entry.writer,
                ts: entry.ts,
            })
            .collect();
        deltas.sort_by(|a, b| a.key.cmp(&b.key));
        deltas
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BufferEvent> {
        self.events.subscribe()
    }

    /// Stamp and insert a local write under a single write lock
    fn write_local(
        &self,
        key: &str,
        value: Value,
        stamp: impl FnOnce(Option<&BufferEntry>) -> i64,
    ) -> BufferDelta {
        let mut entries = self.entries.write();
        let ts = stamp(entries.get(key));
        let delta = BufferDelta {
            key: key.to_string(),
            value,
            writer: self.local,
            ts,
        };
        entries.insert(
            key.to_string(),
            BufferEntry {
                value: delta.value.clone(),
                ts,
                writer: self.local,
            },
        );
        tracing::debug!("📝 Buffer '{}' = {} (local, ts {})", key, delta.value, ts);
        self.publish(delta.clone(), None);
        delta
    }

    fn publish(&self, delta: BufferDelta, origin: Option<String>) {
        // No subscribers is fine: nothing to replicate to yet
        let _ = self.events.send(BufferEvent { delta, origin });
    }
}

/// Whether `incoming` replaces `current`
fn supersedes(incoming: &BufferDelta, current: &BufferEntry, holder: RuntimeRole) -> bool {
    match incoming.ts.cmp(&current.ts) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => incoming.writer != current.writer && incoming.writer == holder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delta(key: &str, value: Value, writer: RuntimeRole, ts: i64) -> BufferDelta {
        BufferDelta {
            key: key.to_string(),
            value,
            writer,
            ts,
        }
    }

    #[test]
    fn newer_remote_write_wins_older_is_dropped() {
        let store = BufferStore::new(RuntimeRole::Backend);
        store.set_at("dimmer", json!(40), 100);

        let backend = RuntimeRole::Backend;
        let stale = delta("dimmer", json!(10), RuntimeRole::Frontend, 99);
        assert!(!store.apply_remote(stale, backend, "c"));
        assert_eq!(store.get("dimmer"), Some(json!(40)));

        let newer = delta("dimmer", json!(70), RuntimeRole::Frontend, 101);
        assert!(store.apply_remote(newer, backend, "c"));
        assert_eq!(store.get("dimmer"), Some(json!(70)));
        assert_eq!(store.entry("dimmer").unwrap().writer, RuntimeRole::Frontend);
    }

    #[test]
    fn tie_goes_to_lease_holder() {
        let store = BufferStore::new(RuntimeRole::Backend);
        store.set_at("mode", json!("away"), 500);

        // Frontend does not hold the lease: backend's write stands
        let home = delta("mode", json!("home"), RuntimeRole::Frontend, 500);
        assert!(!store.apply_remote(home.clone(), RuntimeRole::Backend, "c"));
        // Frontend holds the lease: its write wins the tie
        assert!(store.apply_remote(home, RuntimeRole::Frontend, "c"));
        assert_eq!(store.get("mode"), Some(json!("home")));
    }

    #[test]
    fn duplicate_delta_is_idempotent() {
        let store = BufferStore::new(RuntimeRole::Frontend);
        let d = delta("temp", json!(21.5), RuntimeRole::Backend, 10);
        assert!(store.apply_remote(d.clone(), RuntimeRole::Backend, "c"));
        assert!(!store.apply_remote(d, RuntimeRole::Backend, "c"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn local_set_supersedes_future_stamped_remote() {
        let store = BufferStore::new(RuntimeRole::Backend);
        let far_future = chrono::Utc::now().timestamp_millis() + 60_000;
        let ahead = delta("k", json!(1), RuntimeRole::Frontend, far_future);
        store.apply_remote(ahead, RuntimeRole::Backend, "c");

        let written = store.set("k", json!(2));
        assert_eq!(written.ts, far_future + 1);
        assert_eq!(store.get("k"), Some(json!(2)));
    }

    #[tokio::test]
    async fn accepted_writes_are_published_with_origin() {
        let store = BufferStore::new(RuntimeRole::Backend);
        let mut events = store.subscribe();

        store.set("a", json!(true));
        let later = chrono::Utc::now().timestamp_millis() + 1_000;
        store.apply_remote(
            delta("b", json!(false), RuntimeRole::Frontend, later),
            RuntimeRole::Backend,
            "tab-1",
        );

        let local = events.recv().await.unwrap();
        assert_eq!(local.delta.key, "a");
        assert_eq!(local.origin, None);
        let remote = events.recv().await.unwrap();
        assert_eq!(remote.origin.as_deref(), Some("tab-1"));

        assert_eq!(store.keys(), vec!["a".to_string(), "b".to_string()]);
        assert!(!store.is_empty());
    }

    #[test]
    fn far_future_remote_timestamp_is_rejected() {
        let store = BufferStore::new(RuntimeRole::Backend);
        let frontend = RuntimeRole::Frontend;
        assert!(!store.apply_remote(delta("k", json!(1), frontend, i64::MAX), frontend, "c"));
        assert_eq!(store.get("k"), None);

        // A local write on top of the largest accepted timestamp cannot overflow
        let edge = chrono::Utc::now().timestamp_millis() + MAX_CLOCK_SKEW_MS - 1_000;
        assert!(store.apply_remote(delta("k", json!(1), frontend, edge), frontend, "c"));
        assert_eq!(store.set("k", json!(2)).ts, edge + 1);
        assert_eq!(store.set_at("k", json!(3), i64::MAX).ts, i64::MAX);
        assert_eq!(store.set("k", json!(4)).ts, i64::MAX);
    }

    #[test]
    fn concurrent_local_and_remote_writes_never_regress() {
        let store = std::sync::Arc::new(BufferStore::new(RuntimeRole::Backend));
        let mut events = store.subscribe();
        let base = chrono::Utc::now().timestamp_millis() + 60_000;

        let remote = {
            let store = std::sync::Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..400 {
                    store.apply_remote(
                        delta("k", json!(i), RuntimeRole::Frontend, base + i * 10),
                        RuntimeRole::Backend,
                        "c",
                    );
                }
            })
        };
        for i in 0..400 {
            store.set("k", json!(-i));
        }
        remote.join().unwrap();

        // Accepted writes are published in store order with rising timestamps
        let mut last = i64::MIN;
        while let Ok(event) = events.try_recv() {
            assert!(event.delta.ts > last, "ts {} after {}", event.delta.ts, last);
            last = event.delta.ts;
        }
        assert_eq!(store.entry("k").unwrap().ts, last);
    }
}
