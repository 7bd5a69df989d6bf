use std::sync::atomic::{AtomicU64, Ordering};

/// Events requested downstream but not yet delivered.
///
/// Never negative: taking from zero is a no-op. Requests saturate at
/// `u64::MAX`, which reads as "unbounded".
#[derive(Debug, Default)]
pub struct Demand {
    outstanding: AtomicU64,
}

impl Demand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `n` to the outstanding demand and return the new total.
    pub fn add(&self, n: u64) -> u64 {
        let previous = self
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(n))
            })
            .unwrap_or_else(|current| current);
        previous.saturating_add(n)
    }

    /// Account for one delivered event. Returns false if nothing was outstanding.
    pub fn take_one(&self) -> bool {
        self.outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_sub(1)
            })
            .is_ok()
    }

    pub fn get(&self) -> u64 {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub fn is_satisfied(&self) -> bool {
        self.get() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn request_then_deliver_leaves_the_difference() {
        let demand = Demand::new();
        assert_eq!(demand.add(5), 5);
        for _ in 0..3 {
            assert!(demand.take_one());
        }
        assert_eq!(demand.get(), 2);
    }

    #[test]
    fn never_goes_negative() {
        let demand = Demand::new();
        assert!(!demand.take_one());
        assert_eq!(demand.get(), 0);
        assert!(demand.is_satisfied());
    }

    #[test]
    fn saturates_at_max() {
        let demand = Demand::new();
        demand.add(u64::MAX - 1);
        assert_eq!(demand.add(10), u64::MAX);
    }

    #[test]
    fn concurrent_updates_balance() {
        let demand = Arc::new(Demand::new());
        let producers: Vec<_> = (0..4)
            .map(|_| {
                let demand = Arc::clone(&demand);
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        demand.add(1);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let demand = Arc::clone(&demand);
                thread::spawn(move || (0..1_500).filter(|_| demand.take_one()).count())
            })
            .collect();
        let taken: usize = consumers.into_iter().map(|c| c.join().unwrap()).sum();

        assert_eq!(taken, 4_000);
        assert_eq!(demand.get(), 0);
    }
}
