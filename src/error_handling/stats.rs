//! Admission statistics tracking.
//!
//! Thread-safe counters for admission events, shared between the controller
//! handle and its drain loop.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::IntoEnumIterator;

use super::types::AdmissionEvent;

/// Thread-safe admission statistics tracker.
///
/// Every [`AdmissionEvent`] is initialized to zero on creation, so counters
/// can be incremented from any task without locking.
pub struct AdmissionStats {
    events: HashMap<AdmissionEvent, AtomicUsize>,
}

impl AdmissionStats {
    pub fn new() -> Self {
        let mut events = HashMap::new();
        for event in AdmissionEvent::iter() {
            events.insert(event, AtomicUsize::new(0));
        }
        AdmissionStats { events }
    }

    /// Increment the counter for an event.
    pub fn increment(&self, event: AdmissionEvent) {
        self.add(event, 1);
    }

    /// Add `n` to the counter for an event.
    ///
    /// Returns `false` (and logs an error) if the event has no counter.
    pub fn add(&self, event: AdmissionEvent, n: usize) -> bool {
        match self.events.get(&event) {
            Some(counter) => {
                counter.fetch_add(n, Ordering::Relaxed);
                true
            }
            None => {
                log::error!(
                    "Attempted to add {} to admission counter for {:?} which is not in the map. \
                     This indicates a bug in AdmissionStats initialization.",
                    n,
                    event
                );
                false
            }
        }
    }

    /// Get the count for an event.
    pub fn get(&self, event: AdmissionEvent) -> usize {
        self.events
            .get(&event)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// All counters keyed by event name, in a stable order.
    pub fn snapshot(&self) -> BTreeMap<&'static str, usize> {
        AdmissionEvent::iter()
            .map(|event| (event.as_str(), self.get(event)))
            .collect()
    }

    /// Zero every counter.
    pub fn clear(&self) {
        for counter in self.events.values() {
            counter.store(0, Ordering::SeqCst);
        }
    }
}

impl Default for AdmissionStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_initialized_to_zero() {
        let stats = AdmissionStats::new();
        for event in AdmissionEvent::iter() {
            assert_eq!(stats.get(event), 0);
        }
    }

    #[test]
    fn test_stats_increment_and_add() {
        let stats = AdmissionStats::new();
        stats.increment(AdmissionEvent::Queued);
        stats.increment(AdmissionEvent::Queued);
        stats.add(AdmissionEvent::Discarded, 5);
        assert_eq!(stats.get(AdmissionEvent::Queued), 2);
        assert_eq!(stats.get(AdmissionEvent::Discarded), 5);
        assert_eq!(stats.get(AdmissionEvent::Drained), 0);
    }

    #[test]
    fn test_add_and_increment_report_missing_counter() {
        let stats = AdmissionStats {
            events: HashMap::new(),
        };
        assert!(!stats.add(AdmissionEvent::Discarded, 3));
        stats.increment(AdmissionEvent::Queued);
        assert_eq!(stats.get(AdmissionEvent::Discarded), 0);
        assert_eq!(stats.get(AdmissionEvent::Queued), 0);

        let seeded = AdmissionStats::new();
        assert!(seeded.add(AdmissionEvent::Discarded, 3));
    }

    #[test]
    fn test_snapshot_has_every_event() {
        let stats = AdmissionStats::new();
        stats.increment(AdmissionEvent::RateLimited);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.len(), AdmissionEvent::iter().count());
        assert_eq!(snapshot["rate_limited"], 1);
        assert_eq!(snapshot["rejected"], 0);
    }

    #[test]
    fn test_clear() {
        let stats = AdmissionStats::new();
        stats.increment(AdmissionEvent::Immediate);
        stats.clear();
        assert_eq!(stats.get(AdmissionEvent::Immediate), 0);
    }
}
