//! Trailing-window trigger suppression.

use std::time::Duration;
use tokio::time::Instant;

/// Suppresses triggers arriving within `window` of the last accepted one
///
/// A new debounce starts armed: the window is open from construction, so a
/// node rebuilt after a restart cannot fire in its first window.
#[derive(Debug, Clone, Copy)]
pub struct Debounce {
    window: Duration,
    last: Instant,
}

impl Debounce {
    pub fn new(window: Duration, now: Instant) -> Self {
        Self { window, last: now }
    }

    /// Accept the trigger if the window since the last accepted one has passed
    pub fn try_fire(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) < self.window {
            return false;
        }
        self.last = now;
        true
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_inside_window() {
        let start = Instant::now();
        let ms = Duration::from_millis;
        let mut debounce = Debounce::new(ms(100), start);

        assert!(!debounce.try_fire(start + ms(50)));
        assert!(debounce.try_fire(start + ms(100)));
        assert!(!debounce.try_fire(start + ms(150)));
        assert!(debounce.try_fire(start + ms(250)));
    }

    #[test]
    fn zero_window_never_suppresses() {
        let start = Instant::now();
        let mut debounce = Debounce::new(Duration::ZERO, start);
        assert!(debounce.try_fire(start));
        assert!(debounce.try_fire(start));
    }
}
