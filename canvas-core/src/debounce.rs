//! Change Notification Debouncer.
//!
//! Coalesces a burst of committed mutations into a single export at the
//! burst tail. Each [`Debouncer::notify`] pushes the deadline out by the
//! configured window; [`Debouncer::take_if_due`] fires at most once per burst.

use std::time::{Duration, Instant};

/// Default quiet period before an export fires.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

/// Deadline-based trailing-edge debouncer.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
    coalesced: u32,
}

impl Debouncer {
    /// Create a debouncer with the given quiet period.
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
            coalesced: 0,
        }
    }

    /// Quiet period.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Record a change and restart the timer.
    pub fn notify(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
        self.coalesced = self.coalesced.saturating_add(1);
    }

    /// Whether a change is waiting to be exported.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// When the pending export becomes due.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fire if the window has elapsed. Returns how many notifications the
    /// export covers.
    pub fn take_if_due(&mut self, now: Instant) -> Option<u32> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Some(std::mem::take(&mut self.coalesced))
            }
            _ => None,
        }
    }

    /// Drop any pending export.
    pub fn cancel(&mut self) {
        self.deadline = None;
        self.coalesced = 0;
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_coalesces_into_one() {
        let start = Instant::now();
        let mut debouncer = Debouncer::default();
        for i in 0..10 {
            debouncer.notify(start + Duration::from_millis(i * 20));
        }
        // 180ms + 150ms window
        assert_eq!(debouncer.take_if_due(start + Duration::from_millis(300)), None);
        assert_eq!(
            debouncer.take_if_due(start + Duration::from_millis(330)),
            Some(10)
        );
        assert_eq!(debouncer.take_if_due(start + Duration::from_secs(5)), None);
    }

    #[test]
    fn test_spaced_changes_fire_separately() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        debouncer.notify(start);
        assert_eq!(
            debouncer.take_if_due(start + Duration::from_millis(100)),
            Some(1)
        );
        debouncer.notify(start + Duration::from_millis(500));
        assert!(debouncer.is_pending());
        assert_eq!(
            debouncer.take_if_due(start + Duration::from_millis(600)),
            Some(1)
        );
    }

    #[test]
    fn test_cancel_clears_pending() {
        let start = Instant::now();
        let mut debouncer = Debouncer::default();
        debouncer.notify(start);
        debouncer.cancel();
        assert!(!debouncer.is_pending());
        assert_eq!(debouncer.take_if_due(start + Duration::from_secs(1)), None);
    }
}
