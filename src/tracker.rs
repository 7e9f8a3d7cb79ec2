//! Consecutive-detection tracking.
//!
//! Every category keeps a streak counter: a frame with at least one qualifying
//! detection extends it, a frame without resets it. When any streak reaches the
//! threshold the tracker fires and clears every counter, not only the one that
//! fired, so the next alert needs a fresh streak.

/// Default streak length that triggers an alert.
pub const DEFAULT_ALERT_THRESHOLD: u32 = 5;

#[derive(Clone, Debug)]
pub struct DetectionTracker {
    categories: Vec<String>,
    counters: Vec<u32>,
    threshold: u32,
}

impl DetectionTracker {
    pub fn new(categories: Vec<String>, threshold: u32) -> Self {
        let counters = vec![0; categories.len()];
        Self {
            categories,
            counters,
            threshold: threshold.max(1),
        }
    }

    /// Record one processed frame. `hits[i]` tells whether category `i` had a
    /// qualifying detection; missing entries count as misses.
    ///
    /// Returns true when this frame completed a streak.
    pub fn observe(&mut self, hits: &[bool]) -> bool {
        for (i, counter) in self.counters.iter_mut().enumerate() {
            if hits.get(i).copied().unwrap_or(false) {
                *counter += 1;
            } else {
                *counter = 0;
            }
        }
        let fired = self.counters.iter().any(|&c| c == self.threshold);
        if fired {
            self.reset();
        }
        fired
    }

    /// Record a frame on which nothing was detected.
    pub fn observe_miss(&mut self) {
        self.reset();
    }

    pub fn reset(&mut self) {
        self.counters.iter_mut().for_each(|c| *c = 0);
    }

    /// Current streak for `category`.
    pub fn counter(&self, category: &str) -> Option<u32> {
        self.categories
            .iter()
            .position(|name| name == category)
            .map(|i| self.counters[i])
    }

    pub fn counters(&self) -> impl Iterator<Item = (&str, u32)> {
        self.categories
            .iter()
            .map(String::as_str)
            .zip(self.counters.iter().copied())
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> DetectionTracker {
        DetectionTracker::new(
            vec!["restricted-item".into(), "missing-safety-gear".into()],
            DEFAULT_ALERT_THRESHOLD,
        )
    }

    #[test]
    fn counter_tracks_consecutive_hits() {
        let mut t = tracker();
        for n in 1..=4 {
            assert!(!t.observe(&[true, false]));
            assert_eq!(t.counter("restricted-item"), Some(n));
        }
    }

    #[test]
    fn single_miss_resets_streak() {
        let mut t = tracker();
        for _ in 0..4 {
            t.observe(&[true, false]);
        }
        assert!(!t.observe(&[false, true]));
        assert_eq!(t.counter("restricted-item"), Some(0));
        assert_eq!(t.counter("missing-safety-gear"), Some(1));
    }

    #[test]
    fn observe_miss_clears_all_streaks() {
        let mut t = tracker();
        t.observe(&[true, true]);
        t.observe_miss();
        assert!(t.counters().all(|(_, c)| c == 0));
    }

    #[test]
    fn fires_exactly_at_threshold_then_restarts() {
        let mut t = tracker();
        let fired: Vec<bool> = (0..10).map(|_| t.observe(&[true, false])).collect();
        assert_eq!(
            fired,
            vec![false, false, false, false, true, false, false, false, false, true]
        );
        assert_eq!(t.counter("restricted-item"), Some(0));
    }

    #[test]
    fn fire_clears_concurrent_streak() {
        let mut t = tracker();
        t.observe(&[true, false]);
        t.observe(&[true, false]);
        t.observe(&[true, true]);
        t.observe(&[true, true]);
        assert!(t.observe(&[true, true]));
        assert_eq!(t.counter("missing-safety-gear"), Some(0));
        assert!(!t.observe(&[false, true]));
        assert_eq!(t.counter("missing-safety-gear"), Some(1));
    }

    #[test]
    fn unknown_category_has_no_counter() {
        assert_eq!(tracker().counter("vehicle"), None);
    }
}
