//! Concurrent buffer map with per-key locks
//!
//! Buffers are created lazily on first request; creation and refill each
//! have their own per-key critical section so a refill never blocks the
//! materialisation of an unrelated buffer. Lock entries are retained for
//! the life of the process; key cardinality is bounded by the number of
//! live (business, time) pairs.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use stride_core::{BufferKey, BufferKind};

use crate::segment::SegmentBuffer;

/// Map of every buffer a node holds, plus the per-key init/refill locks.
#[derive(Debug, Default)]
pub struct BufferMap {
    buffers: DashMap<BufferKey, Arc<SegmentBuffer>>,
    init_locks: DashMap<BufferKey, Arc<Mutex<()>>>,
    refill_locks: DashMap<BufferKey, Arc<Mutex<()>>>,
}

impl BufferMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a buffer.
    pub fn get(&self, key: &BufferKey) -> Option<Arc<SegmentBuffer>> {
        self.buffers.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Insert (or replace) a buffer.
    pub fn insert(&self, key: BufferKey, buffer: Arc<SegmentBuffer>) {
        self.buffers.insert(key, buffer);
    }

    /// Whether a buffer exists for the key.
    pub fn contains(&self, key: &BufferKey) -> bool {
        self.buffers.contains_key(key)
    }

    /// Remove one buffer. Returns it if present.
    pub fn remove(&self, key: &BufferKey) -> Option<Arc<SegmentBuffer>> {
        self.buffers.remove(key).map(|(_, buffer)| buffer)
    }

    /// Remove every buffer of one kind. Returns how many were dropped.
    pub fn remove_kind(&self, kind: BufferKind) -> usize {
        let before = self.buffers.len();
        self.buffers.retain(|key, _| key.kind != kind);
        before - self.buffers.len()
    }

    /// Number of held buffers.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether no buffers are held.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Number of held buffers of one kind.
    pub fn count_kind(&self, kind: BufferKind) -> usize {
        self.buffers.iter().filter(|entry| entry.key().kind == kind).count()
    }

    /// Snapshot of all entries, for status reports and admin sweeps.
    pub fn snapshot(&self) -> Vec<(BufferKey, Arc<SegmentBuffer>)> {
        self.buffers
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    /// The lazy-create critical section for a key.
    pub fn init_lock(&self, key: &BufferKey) -> Arc<Mutex<()>> {
        Arc::clone(
            self.init_locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// The refill critical section for a key.
    pub fn refill_lock(&self, key: &BufferKey) -> Arc<Mutex<()>> {
        Arc::clone(
            self.refill_locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stride_core::{Interval, Role};

    fn key(business: &str, role: Role, kind: BufferKind) -> BufferKey {
        BufferKey::new(business, "", role, kind)
    }

    fn buffer(role: Role) -> Arc<SegmentBuffer> {
        Arc::new(SegmentBuffer::with_interval(role, Interval { start: 1, end: 1000 }))
    }

    #[test]
    fn test_insert_get_remove() {
        let map = BufferMap::new();
        let k = key("order", Role::Odd, BufferKind::Own);
        assert!(map.get(&k).is_none());

        map.insert(k.clone(), buffer(Role::Odd));
        assert!(map.contains(&k));
        assert!(map.get(&k).is_some());

        assert!(map.remove(&k).is_some());
        assert!(map.get(&k).is_none());
    }

    #[test]
    fn test_remove_kind_only_touches_that_kind() {
        let map = BufferMap::new();
        map.insert(key("order", Role::Odd, BufferKind::Own), buffer(Role::Odd));
        map.insert(key("order", Role::Even, BufferKind::Proxy), buffer(Role::Even));
        map.insert(key("user", Role::Even, BufferKind::Proxy), buffer(Role::Even));

        assert_eq!(map.count_kind(BufferKind::Proxy), 2);
        assert_eq!(map.remove_kind(BufferKind::Proxy), 2);
        assert_eq!(map.len(), 1);
        assert!(map.contains(&key("order", Role::Odd, BufferKind::Own)));
    }

    #[test]
    fn test_same_lock_instance_per_key() {
        let map = BufferMap::new();
        let k = key("order", Role::Odd, BufferKind::Own);
        let a = map.init_lock(&k);
        let b = map.init_lock(&k);
        assert!(Arc::ptr_eq(&a, &b));

        // Init and refill sections are distinct.
        let c = map.refill_lock(&k);
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let map = BufferMap::new();
        map.insert(key("order", Role::Odd, BufferKind::Own), buffer(Role::Odd));
        let snap = map.snapshot();
        map.remove(&key("order", Role::Odd, BufferKind::Own));
        assert_eq!(snap.len(), 1);
        assert!(map.is_empty());
    }
}
