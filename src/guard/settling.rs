//! Post-restore settling window.
//!
//! Loading a graph replays every connected value at least once. While the
//! window is open, edges are still recorded but must not fire.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct SettlingWindow {
    until: Instant,
}

impl SettlingWindow {
    /// Open a window of `duration` starting at `now` (node construction/restore)
    pub fn new(now: Instant, duration: Duration) -> Self {
        Self { until: now + duration }
    }

    pub fn is_settled(&self, now: Instant) -> bool {
        now >= self.until
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.until.saturating_duration_since(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_only_after_duration() {
        let start = Instant::now();
        let window = SettlingWindow::new(start, Duration::from_millis(500));

        assert!(!window.is_settled(start));
        assert!(!window.is_settled(start + Duration::from_millis(499)));
        assert!(window.is_settled(start + Duration::from_millis(501)));
        assert_eq!(
            window.remaining(start + Duration::from_millis(200)),
            Duration::from_millis(300)
        );
    }
}
