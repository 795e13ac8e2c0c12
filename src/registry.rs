use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::connection::Connection;

/// Admitted connections, keyed by peer address, capped at `capacity`.
///
/// Admission reserves a slot with a compare-and-swap before inserting, so two
/// racing admits can never both take the last slot.
pub struct Registry {
    conns: DashMap<SocketAddr, Arc<Connection>>,
    slots: AtomicUsize,
    capacity: usize,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self {
            conns: DashMap::new(),
            slots: AtomicUsize::new(0),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn try_admit(&self, conn: Arc<Connection>) -> bool {
        let reserved = self
            .slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok();

        if !reserved {
            return false;
        }

        match self.conns.entry(conn.id()) {
            Entry::Occupied(_) => {
                self.slots.fetch_sub(1, Ordering::AcqRel);
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(conn);
                true
            }
        }
    }

    /// Unknown ids are ignored.
    pub fn remove(&self, id: &SocketAddr) -> Option<Arc<Connection>> {
        let removed = self.conns.remove(id).map(|(_, conn)| conn);
        if removed.is_some() {
            self.slots.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    /// Advisory; may be stale as soon as it is read.
    pub fn count(&self) -> usize {
        self.slots.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.conns.iter().map(|e| e.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::time::Duration;

    fn conn(port: u16) -> Arc<Connection> {
        let (ours, _theirs) = tokio::io::duplex(16);
        Connection::new(SocketAddr::from(([127, 0, 0, 1], port)), ours)
    }

    #[test]
    fn admits_up_to_capacity() {
        let registry = Registry::new(2);
        assert!(registry.try_admit(conn(1)));
        assert!(registry.try_admit(conn(2)));
        assert!(!registry.try_admit(conn(3)));
        assert_eq!(registry.count(), 2);
        let admitted: Vec<u16> = registry.snapshot().iter().map(|c| c.id().port()).collect();
        assert!(!admitted.contains(&3));
    }

    #[test]
    fn remove_frees_a_slot_and_is_idempotent() {
        let registry = Registry::new(1);
        let a = conn(1);
        assert!(registry.try_admit(a.clone()));
        assert!(!registry.try_admit(conn(2)));

        assert!(registry.remove(&a.id()).is_some());
        assert!(registry.remove(&a.id()).is_none());
        assert_eq!(registry.count(), 0);

        assert!(registry.try_admit(conn(2)));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn duplicate_id_is_refused_without_leaking_a_slot() {
        let registry = Registry::new(3);
        assert!(registry.try_admit(conn(7)));
        assert!(!registry.try_admit(conn(7)));
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_admits_never_exceed_capacity() {
        for capacity in [1usize, 3, 8] {
            let registry = Arc::new(Registry::new(capacity));
            let mut tasks = Vec::new();

            for port in 0..64u16 {
                let registry = registry.clone();
                let jitter = rand::thread_rng().gen_range(0..200u64);

                tasks.push(tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_micros(jitter)).await;
                    let c = conn(port);
                    let admitted = registry.try_admit(c.clone());
                    assert!(registry.count() <= registry.capacity());
                    if admitted && port % 2 == 0 {
                        tokio::task::yield_now().await;
                        registry.remove(&c.id());
                    }
                    admitted
                }));
            }

            for task in tasks {
                task.await.unwrap();
            }

            assert!(registry.count() <= capacity);
            assert_eq!(registry.count(), registry.snapshot().len());
        }
    }
}
