//! Row counters kept in step with inserts and deletes

use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug)]
pub struct CountMonitor {
    name: String,
    value: AtomicI64,
}

impl CountMonitor {
    pub fn new(name: impl Into<String>, initial: i64) -> Self {
        Self {
            name: name.into(),
            value: AtomicI64::new(initial),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn add(&self, delta: i64) -> i64 {
        self.value.fetch_add(delta, Ordering::Relaxed) + delta
    }

    pub fn increment(&self) -> i64 {
        self.add(1)
    }

    pub fn decrement(&self) -> i64 {
        self.add(-1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counts_across_threads() {
        let monitor = Arc::new(CountMonitor::new("mailing_lists.count", 3));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = Arc::clone(&monitor);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        m.increment();
                    }
                    m.decrement();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(monitor.get(), 3 + 4 * 99);
        assert_eq!(monitor.name(), "mailing_lists.count");
    }
}
