//! Per-namespace accounting of archived bytes.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Running total of rotated bytes per namespace, checked against one global
/// limit.
///
/// Usage only grows: eviction deletes archives but does not credit the
/// namespace back.
#[derive(Debug)]
pub struct BudgetTracker {
    limit: u64,
    usage: Mutex<HashMap<String, u64>>,
}

impl BudgetTracker {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            usage: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Add `bytes` to the namespace and return its new usage.
    pub fn add(&self, namespace: &str, bytes: u64) -> u64 {
        let mut usage = self.usage.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = usage.entry(namespace.to_string()).or_insert(0);
        *entry = entry.saturating_add(bytes);
        *entry
    }

    /// Bytes accounted for the namespace, zero when never seen.
    pub fn get(&self, namespace: &str) -> u64 {
        self.usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .copied()
            .unwrap_or(0)
    }

    /// True once usage strictly exceeds the limit.
    pub fn over_limit(&self, namespace: &str) -> bool {
        self.get(namespace) > self.limit
    }

    /// Set a namespace's usage outright, used when reconciling with disk.
    pub fn seed(&self, namespace: &str, bytes: u64) {
        self.usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(namespace.to_string(), bytes);
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_add_accumulates_per_namespace() {
        let tracker = BudgetTracker::new(100);
        assert_eq!(tracker.get("payments"), 0);
        assert_eq!(tracker.add("payments", 40), 40);
        assert_eq!(tracker.add("payments", 2), 42);
        assert_eq!(tracker.add("search", 7), 7);
        assert_eq!(tracker.get("payments"), 42);
    }

    #[test]
    fn test_over_limit_is_strict() {
        let tracker = BudgetTracker::new(100);
        tracker.add("payments", 100);
        assert!(!tracker.over_limit("payments"));
        tracker.add("payments", 1);
        assert!(tracker.over_limit("payments"));
        assert!(!tracker.over_limit("unknown"));
    }

    #[test]
    fn test_add_saturates() {
        let tracker = BudgetTracker::new(u64::MAX);
        tracker.add("payments", u64::MAX);
        assert_eq!(tracker.add("payments", 10), u64::MAX);
    }

    #[test]
    fn test_seed_replaces_usage() {
        let tracker = BudgetTracker::new(10);
        tracker.add("payments", 3);
        tracker.seed("payments", 50);
        assert_eq!(tracker.get("payments"), 50);
        assert_eq!(tracker.snapshot().len(), 1);
    }

    #[test]
    fn test_concurrent_adds_are_not_lost() {
        let tracker = Arc::new(BudgetTracker::new(u64::MAX));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        tracker.add("payments", 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.get("payments"), 8000);
    }
}
