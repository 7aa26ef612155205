//! Single-writer-per-customer discipline for overlapping sweeps.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

/// Table of customers currently held by a worker. Acquisition never waits:
/// a busy customer is left for the next sweep.
#[derive(Debug, Clone, Default)]
pub struct CustomerLocks {
    held: Arc<Mutex<HashSet<Uuid>>>,
}

/// Released on drop.
#[derive(Debug)]
pub struct CustomerLease {
    customer_id: Uuid,
    held: Arc<Mutex<HashSet<Uuid>>>,
}

impl CustomerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, customer_id: Uuid) -> Option<CustomerLease> {
        if !self.held.lock().insert(customer_id) {
            return None;
        }
        Some(CustomerLease {
            customer_id,
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_held(&self, customer_id: &Uuid) -> bool {
        self.held.lock().contains(customer_id)
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }
}

impl CustomerLease {
    pub fn customer_id(&self) -> Uuid {
        self.customer_id
    }
}

impl Drop for CustomerLease {
    fn drop(&mut self) {
        self.held.lock().remove(&self.customer_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let locks = CustomerLocks::new();
        let id = Uuid::new_v4();

        let lease = locks.try_acquire(id).unwrap();
        assert!(locks.try_acquire(id).is_none());
        assert!(locks.is_held(&id));
        assert!(locks.try_acquire(Uuid::new_v4()).is_some());

        drop(lease);
        assert!(!locks.is_held(&id));
        assert!(locks.try_acquire(id).is_some());
    }

    #[test]
    fn test_clones_share_the_table() {
        let locks = CustomerLocks::new();
        let other = locks.clone();
        let id = Uuid::new_v4();
        let _lease = locks.try_acquire(id).unwrap();
        assert!(other.try_acquire(id).is_none());
        assert_eq!(other.held_count(), 1);
    }
}
