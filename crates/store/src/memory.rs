//! In-memory reference store
//!
//! Backs tests and single-node deployments. Row atomicity comes from
//! DashMap's shard locks: every mutation happens under the exclusive guard
//! of `entry`/`get_mut`, which is exactly the single-row atomic update the
//! core requires of a real store. Reads are read-your-writes by
//! construction.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use stride_core::{now_ms, NodeRecord, NodeStatus, Result, Role, Segment, SegmentKey};
use tracing::debug;

use crate::traits::{NodeStore, SegmentStore};

/// Process-local implementation of [`SegmentStore`] and [`NodeStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    segments: DashMap<(SegmentKey, Role), Segment>,
    nodes: DashMap<String, NodeRecord>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of segment rows (test helper).
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

impl SegmentStore for MemoryStore {
    fn get_segment(&self, key: &SegmentKey, role: Role) -> Result<Option<Segment>> {
        Ok(self
            .segments
            .get(&(key.clone(), role))
            .map(|row| row.value().clone()))
    }

    fn create_segment(
        &self,
        key: &SegmentKey,
        role: Role,
        initial_max: i64,
        step: u32,
    ) -> Result<bool> {
        match self.segments.entry((key.clone(), role)) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(Segment {
                    business_type: key.business_type.clone(),
                    time_key: key.time_key.clone(),
                    role,
                    max_value: initial_max,
                    step_size: step,
                    updated_at_ms: now_ms(),
                });
                debug!(segment = %key, %role, max_value = initial_max, step, "segment created");
                Ok(true)
            }
        }
    }

    fn advance_max_value(
        &self,
        key: &SegmentKey,
        role: Role,
        expected_max: i64,
        new_max: i64,
    ) -> Result<u64> {
        match self.segments.get_mut(&(key.clone(), role)) {
            Some(mut row) if row.max_value == expected_max => {
                row.max_value = new_max;
                row.updated_at_ms = now_ms();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn advance_max_value_and_step(
        &self,
        key: &SegmentKey,
        role: Role,
        expected_max: i64,
        new_max: i64,
        new_step: u32,
    ) -> Result<u64> {
        match self.segments.get_mut(&(key.clone(), role)) {
            Some(mut row) if row.max_value == expected_max => {
                row.max_value = new_max;
                row.step_size = new_step;
                row.updated_at_ms = now_ms();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn set_max_value(&self, key: &SegmentKey, role: Role, new_max: i64) -> Result<u64> {
        match self.segments.get_mut(&(key.clone(), role)) {
            Some(mut row) => {
                row.max_value = new_max;
                row.updated_at_ms = now_ms();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn set_max_value_and_step(
        &self,
        key: &SegmentKey,
        role: Role,
        new_max: i64,
        new_step: u32,
    ) -> Result<u64> {
        match self.segments.get_mut(&(key.clone(), role)) {
            Some(mut row) => {
                row.max_value = new_max;
                row.step_size = new_step;
                row.updated_at_ms = now_ms();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn list_segments(&self, business_type: &str, time_key: Option<&str>) -> Result<Vec<Segment>> {
        let mut rows: Vec<Segment> = self
            .segments
            .iter()
            .filter(|row| {
                row.business_type == business_type
                    && time_key.map_or(true, |t| row.time_key == t)
            })
            .map(|row| row.value().clone())
            .collect();
        rows.sort_by(|a, b| (&a.time_key, a.role).cmp(&(&b.time_key, b.role)));
        Ok(rows)
    }

    fn list_by_role(&self, role: Role) -> Result<Vec<Segment>> {
        let mut rows: Vec<Segment> = self
            .segments
            .iter()
            .filter(|row| row.role == role)
            .map(|row| row.value().clone())
            .collect();
        rows.sort_by(|a, b| {
            (&a.business_type, &a.time_key).cmp(&(&b.business_type, &b.time_key))
        });
        Ok(rows)
    }

    fn list_business_types(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .segments
            .iter()
            .map(|row| row.business_type.clone())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn delete_where_time_key_lt(&self, cutoff: &str) -> Result<u64> {
        let before = self.segments.len();
        self.segments
            .retain(|_, row| !(row.time_key.as_str() < cutoff));
        Ok((before - self.segments.len()) as u64)
    }

    fn sum_max_value(&self, role: Role) -> Result<i64> {
        Ok(self
            .segments
            .iter()
            .filter(|row| row.role == role)
            .map(|row| row.max_value)
            .sum())
    }
}

impl NodeStore for MemoryStore {
    fn upsert_online(&self, node_id: &str, role: Role, now_ms: i64) -> Result<()> {
        self.nodes.insert(
            node_id.to_string(),
            NodeRecord {
                node_id: node_id.to_string(),
                role,
                status: NodeStatus::Online,
                last_heartbeat_ms: now_ms,
            },
        );
        Ok(())
    }

    fn touch(&self, node_id: &str, now_ms: i64) -> Result<u64> {
        match self.nodes.get_mut(node_id) {
            Some(mut row) if row.status == NodeStatus::Online => {
                row.last_heartbeat_ms = now_ms;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn set_status(&self, node_id: &str, status: NodeStatus) -> Result<u64> {
        match self.nodes.get_mut(node_id) {
            Some(mut row) => {
                row.status = status;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn any_online(&self, role: Role) -> Result<bool> {
        Ok(self
            .nodes
            .iter()
            .any(|row| row.role == role && row.status == NodeStatus::Online))
    }

    fn mark_stale_offline(&self, cutoff_ms: i64) -> Result<u64> {
        let mut flipped = 0;
        for mut row in self.nodes.iter_mut() {
            if row.status == NodeStatus::Online && row.last_heartbeat_ms < cutoff_ms {
                row.status = NodeStatus::Offline;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    fn list_nodes(&self) -> Result<Vec<NodeRecord>> {
        let mut rows: Vec<NodeRecord> = self.nodes.iter().map(|row| row.value().clone()).collect();
        rows.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(business: &str, time: &str) -> SegmentKey {
        SegmentKey::new(business, time)
    }

    #[test]
    fn test_create_is_idempotent_under_unique_index() {
        let store = MemoryStore::new();
        let k = key("order", "");
        assert!(store.create_segment(&k, Role::Odd, 1000, 1000).unwrap());
        assert!(!store.create_segment(&k, Role::Odd, 2000, 1000).unwrap());

        let seg = store.get_segment(&k, Role::Odd).unwrap().unwrap();
        assert_eq!(seg.max_value, 1000);
    }

    #[test]
    fn test_roles_are_distinct_rows() {
        let store = MemoryStore::new();
        let k = key("order", "");
        store.create_segment(&k, Role::Odd, 1000, 1000).unwrap();
        store.create_segment(&k, Role::Even, 2000, 1000).unwrap();

        assert_eq!(store.get_segment(&k, Role::Odd).unwrap().unwrap().max_value, 1000);
        assert_eq!(store.get_segment(&k, Role::Even).unwrap().unwrap().max_value, 2000);
    }

    #[test]
    fn test_guarded_advance_detects_race() {
        let store = MemoryStore::new();
        let k = key("order", "");
        store.create_segment(&k, Role::Odd, 1000, 1000).unwrap();

        assert_eq!(store.advance_max_value(&k, Role::Odd, 1000, 3000).unwrap(), 1);
        // Stale expectation loses.
        assert_eq!(store.advance_max_value(&k, Role::Odd, 1000, 5000).unwrap(), 0);
        assert_eq!(store.get_segment(&k, Role::Odd).unwrap().unwrap().max_value, 3000);
    }

    #[test]
    fn test_guarded_advance_with_step() {
        let store = MemoryStore::new();
        let k = key("order", "");
        store.create_segment(&k, Role::Odd, 1000, 1000).unwrap();

        assert_eq!(
            store
                .advance_max_value_and_step(&k, Role::Odd, 1000, 6000, 2000)
                .unwrap(),
            1
        );
        let seg = store.get_segment(&k, Role::Odd).unwrap().unwrap();
        assert_eq!(seg.max_value, 6000);
        assert_eq!(seg.step_size, 2000);
    }

    #[test]
    fn test_unconditional_set_ignores_expectations() {
        let store = MemoryStore::new();
        let k = key("order", "");
        store.create_segment(&k, Role::Even, 2000, 1000).unwrap();

        assert_eq!(store.set_max_value(&k, Role::Even, 8000).unwrap(), 1);
        assert_eq!(store.set_max_value(&key("missing", ""), Role::Even, 1).unwrap(), 0);
    }

    #[test]
    fn test_list_segments_filters_and_sorts() {
        let store = MemoryStore::new();
        store.create_segment(&key("order", "20260801"), Role::Odd, 1000, 1000).unwrap();
        store.create_segment(&key("order", "20260801"), Role::Even, 2000, 1000).unwrap();
        store.create_segment(&key("order", "20260731"), Role::Odd, 1000, 1000).unwrap();
        store.create_segment(&key("user", ""), Role::Odd, 1000, 1000).unwrap();

        let all = store.list_segments("order", None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].time_key, "20260731");

        let one_day = store.list_segments("order", Some("20260801")).unwrap();
        assert_eq!(one_day.len(), 2);
        assert_eq!(one_day[0].role, Role::Even);
    }

    #[test]
    fn test_list_business_types_dedupes() {
        let store = MemoryStore::new();
        store.create_segment(&key("order", ""), Role::Odd, 1000, 1000).unwrap();
        store.create_segment(&key("order", "20260801"), Role::Odd, 1000, 1000).unwrap();
        store.create_segment(&key("user", ""), Role::Even, 2000, 1000).unwrap();

        assert_eq!(store.list_business_types().unwrap(), vec!["order", "user"]);
    }

    #[test]
    fn test_delete_expired_by_time_key() {
        let store = MemoryStore::new();
        store.create_segment(&key("order", "20260730"), Role::Odd, 1000, 1000).unwrap();
        store.create_segment(&key("order", "20260801"), Role::Odd, 1000, 1000).unwrap();
        // Empty time key sorts below any date and is swept by a date cutoff.
        store.create_segment(&key("order", ""), Role::Odd, 1000, 1000).unwrap();

        let deleted = store.delete_where_time_key_lt("20260801").unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.segment_count(), 1);
    }

    #[test]
    fn test_sum_max_value_per_role() {
        let store = MemoryStore::new();
        store.create_segment(&key("order", ""), Role::Odd, 1000, 1000).unwrap();
        store.create_segment(&key("user", ""), Role::Odd, 3000, 1000).unwrap();
        store.create_segment(&key("order", ""), Role::Even, 2000, 1000).unwrap();

        assert_eq!(store.sum_max_value(Role::Odd).unwrap(), 4000);
        assert_eq!(store.sum_max_value(Role::Even).unwrap(), 2000);
    }

    #[test]
    fn test_node_lifecycle() {
        let store = MemoryStore::new();
        store.upsert_online("a/127.0.0.1:8080/odd", Role::Odd, 100).unwrap();
        assert!(store.any_online(Role::Odd).unwrap());
        assert!(!store.any_online(Role::Even).unwrap());

        assert_eq!(store.touch("a/127.0.0.1:8080/odd", 200).unwrap(), 1);
        assert_eq!(store.touch("unknown", 200).unwrap(), 0);

        // Sweep with a cutoff past the heartbeat flips the node Offline.
        assert_eq!(store.mark_stale_offline(300).unwrap(), 1);
        assert!(!store.any_online(Role::Odd).unwrap());
        // Touch refuses an Offline row; re-registration is required.
        assert_eq!(store.touch("a/127.0.0.1:8080/odd", 400).unwrap(), 0);

        store.upsert_online("a/127.0.0.1:8080/odd", Role::Odd, 500).unwrap();
        assert!(store.any_online(Role::Odd).unwrap());
    }

    #[test]
    fn test_concurrent_guarded_advance_single_winner() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let k = key("order", "");
        store.create_segment(&k, Role::Odd, 1000, 1000).unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            let k = k.clone();
            handles.push(std::thread::spawn(move || {
                store
                    .advance_max_value(&k, Role::Odd, 1000, 3000 + i)
                    .unwrap()
            }));
        }

        let wins: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(wins, 1);
    }
}
