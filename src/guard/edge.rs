//! Rising/falling edge detection keyed by input line.
//!
//! A line that has never been observed has no previous value, so its first
//! observation is recorded but never reported as an edge. Losing the detector
//! (e.g. after a reload) therefore defaults to "no edge yet seen".

use super::is_truthy;
use serde_json::Value;
use std::collections::HashMap;

/// Direction of a logical transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// falsy -> truthy
    Rising,
    /// truthy -> falsy
    Falling,
}

/// Per-node map of the last logical level seen on each named line
#[derive(Debug, Default, Clone)]
pub struct EdgeDetector {
    previous: HashMap<String, bool>,
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` on `key` and report the transition it completes, if any
    pub fn observe(&mut self, key: &str, value: &Value) -> Option<EdgeKind> {
        let level = is_truthy(value);
        match self.previous.insert(key.to_string(), level) {
            Some(false) if level => Some(EdgeKind::Rising),
            Some(true) if !level => Some(EdgeKind::Falling),
            _ => None,
        }
    }

    /// True exactly once per falsy -> truthy transition on `key`
    pub fn rising(&mut self, key: &str, value: &Value) -> bool {
        self.observe(key, value) == Some(EdgeKind::Rising)
    }

    /// True exactly once per truthy -> falsy transition on `key`
    pub fn falling(&mut self, key: &str, value: &Value) -> bool {
        self.observe(key, value) == Some(EdgeKind::Falling)
    }

    /// Last level recorded on `key`
    pub fn level(&self, key: &str) -> Option<bool> {
        self.previous.get(key).copied()
    }

    pub fn reset(&mut self) {
        self.previous.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rising_fires_once_per_transition() {
        let mut detector = EdgeDetector::new();
        let fired: Vec<usize> = [false, true, true, false, true]
            .iter()
            .enumerate()
            .filter(|(_, v)| detector.rising("in", &json!(v)))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(fired, vec![1, 4]);
    }

    #[test]
    fn first_observation_is_never_an_edge() {
        let mut detector = EdgeDetector::new();
        assert!(!detector.rising("in", &json!(true)));
        assert_eq!(detector.level("in"), Some(true));
        assert!(detector.falling("in", &json!("off")));
    }

    #[test]
    fn lines_are_tracked_independently() {
        let mut detector = EdgeDetector::new();
        detector.observe("a", &json!(0));
        detector.observe("b", &json!(1));
        assert_eq!(detector.observe("a", &json!(1)), Some(EdgeKind::Rising));
        assert_eq!(detector.observe("b", &json!(1)), None);

        detector.reset();
        assert_eq!(detector.observe("a", &json!(0)), None);
    }
}
