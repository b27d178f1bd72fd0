use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Set of handler keys currently executing. Acquiring is insert-if-absent
/// under one lock; the returned guard releases the key on drop.
#[derive(Clone, Default)]
pub struct RunningSet {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl RunningSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set holds plain strings, so a poisoned lock is still consistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn try_acquire(&self, key: &str) -> Option<RunningGuard> {
        if !self.lock().insert(key.to_string()) {
            return None;
        }
        Some(RunningGuard {
            set: self.clone(),
            key: key.to_string(),
        })
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    pub fn running(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().iter().cloned().collect();
        keys.sort();
        keys
    }
}

pub struct RunningGuard {
    set: RunningSet,
    key: String,
}

impl RunningGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_is_exclusive_per_key() {
        let set = RunningSet::new();
        let guard = set.try_acquire("alert_evaluation").unwrap();
        assert!(set.try_acquire("alert_evaluation").is_none());
        assert!(set.try_acquire("pipeline_automation").is_some());
        assert!(set.is_running("alert_evaluation"));

        drop(guard);
        assert!(!set.is_running("alert_evaluation"));
        assert!(set.try_acquire("alert_evaluation").is_some());
    }

    #[test]
    fn test_concurrent_acquire_has_one_winner() {
        let set = RunningSet::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let set = set.clone();
                std::thread::spawn(move || set.try_acquire("job").map(std::mem::forget).is_some())
            })
            .collect();
        let winners: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(winners.iter().filter(|w| **w).count(), 1);
    }
}
