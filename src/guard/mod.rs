//! Edge/Timer Guard Library
//!
//! The single place the actuation suppression policy lives. Nodes never keep
//! their own "last value" fields; they hold a [`TriggerGuard`] (edge detection
//! + settling window + debounce) and a [`Cycle`] for recurring work.
//!
//! Whenever guard state is missing, the defaults suppress: an unseen line has
//! no edge, a new settling window is open, a new debounce is armed.

pub mod cycle;
pub mod debounce;
pub mod edge;
pub mod settling;

pub use cycle::{Cycle, CycleSpec};
pub use debounce::Debounce;
pub use edge::{EdgeDetector, EdgeKind};
pub use settling::SettlingWindow;

use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Logical level of a raw socket value
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => {
            let s = s.trim();
            !(s.is_empty()
                || s.eq_ignore_ascii_case("off")
                || s.eq_ignore_ascii_case("false")
                || s == "0")
        }
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Edge detection gated by a settling window and per-direction debounce
#[derive(Debug, Clone)]
pub struct TriggerGuard {
    edges: EdgeDetector,
    settling: SettlingWindow,
    rising: Debounce,
    falling: Debounce,
}

impl TriggerGuard {
    pub fn new(now: Instant, settling_window: Duration, debounce: Duration) -> Self {
        Self {
            edges: EdgeDetector::new(),
            settling: SettlingWindow::new(now, settling_window),
            rising: Debounce::new(debounce, now),
            falling: Debounce::new(debounce, now),
        }
    }

    /// Record `value` on `key`; report an edge only if it may fire now
    ///
    /// Edges inside the settling window or the debounce window are consumed,
    /// not deferred.
    pub fn check(&mut self, key: &str, value: &Value, now: Instant) -> Option<EdgeKind> {
        let edge = self.edges.observe(key, value)?;
        if !self.settling.is_settled(now) {
            tracing::debug!(
                "🔇 {:?} edge on '{}' suppressed while settling ({:?} left)",
                edge,
                key,
                self.settling.remaining(now)
            );
            return None;
        }
        let debounce = match edge {
            EdgeKind::Rising => &mut self.rising,
            EdgeKind::Falling => &mut self.falling,
        };
        if !debounce.try_fire(now) {
            tracing::debug!("🔇 {:?} edge on '{}' debounced", edge, key);
            return None;
        }
        Some(edge)
    }

    pub fn rising(&mut self, key: &str, value: &Value, now: Instant) -> bool {
        self.check(key, value, now) == Some(EdgeKind::Rising)
    }

    pub fn is_settled(&self, now: Instant) -> bool {
        self.settling.is_settled(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_table() {
        let falsy_values = [
            json!(null),
            json!(false),
            json!(0),
            json!(""),
            json!("off"),
            json!("FALSE"),
            json!("0"),
            json!([]),
            json!({}),
        ];
        for falsy in falsy_values {
            assert!(!is_truthy(&falsy), "{falsy} should be falsy");
        }
        let truthy_values = [
            json!(true),
            json!(1),
            json!(-0.5),
            json!("on"),
            json!("home"),
            json!([0]),
            json!({ "a": 1 }),
        ];
        for truthy in truthy_values {
            assert!(is_truthy(&truthy), "{truthy} should be truthy");
        }
    }

    #[test]
    fn settling_window_suppresses_replayed_state() {
        let restored = Instant::now();
        let ms = Duration::from_millis;
        let mut guard = TriggerGuard::new(restored, ms(1_000), Duration::ZERO);

        // Already true at restore, replayed on load
        assert_eq!(guard.check("in", &json!(true), restored), None);
        // Toggling inside the window is recorded but never fires
        assert_eq!(guard.check("in", &json!(false), restored + ms(300)), None);
        assert_eq!(guard.check("in", &json!(true), restored + ms(600)), None);
        // Steady state after the window: still no edge
        assert_eq!(guard.check("in", &json!(true), restored + ms(1_200)), None);
        // A real transition after the window fires
        assert_eq!(guard.check("in", &json!(false), restored + ms(1_300)), Some(EdgeKind::Falling));
        assert!(guard.rising("in", &json!(true), restored + ms(1_400)));
    }

    #[test]
    fn debounce_consumes_rapid_retriggers() {
        let start = Instant::now();
        let ms = Duration::from_millis;
        let mut guard = TriggerGuard::new(start, Duration::ZERO, ms(500));

        guard.check("in", &json!(false), start + ms(500));
        assert!(guard.rising("in", &json!(true), start + ms(600)));
        guard.check("in", &json!(false), start + ms(700));
        assert!(!guard.rising("in", &json!(true), start + ms(800)));
        guard.check("in", &json!(false), start + ms(1_200));
        assert!(guard.rising("in", &json!(true), start + ms(1_300)));
    }
}
