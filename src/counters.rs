//! Process-wide signal counters.
//!
//! Owned by [`crate::state::AppState`] and passed explicitly to the
//! components that read or write them; there is no global counter state.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters feeding maintenance scheduling decisions.
#[derive(Debug, Default)]
pub struct SystemCounters {
    navigation_failures: AtomicU64,
}

impl SystemCounters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one navigation failure; returns the new total
    pub fn record_navigation_failure(&self) -> u64 {
        self.navigation_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Current navigation-failure count
    pub fn navigation_failures(&self) -> u64 {
        self.navigation_failures.load(Ordering::Relaxed)
    }

    /// Reset the navigation-failure count.
    ///
    /// Called only when a graph-repair maintenance task completes.
    pub fn reset_navigation_failures(&self) {
        self.navigation_failures.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_lifecycle() {
        let counters = SystemCounters::new();
        assert_eq!(counters.navigation_failures(), 0);
        assert_eq!(counters.record_navigation_failure(), 1);
        assert_eq!(counters.record_navigation_failure(), 2);
        assert_eq!(counters.navigation_failures(), 2);
        counters.reset_navigation_failures();
        assert_eq!(counters.navigation_failures(), 0);
    }
}
