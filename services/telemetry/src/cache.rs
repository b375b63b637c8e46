use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;

use crate::observation::{Observation, VesselRecord};

/// Fixed arena of slots reused in place. `written` only ever grows; the next
/// slot is `written % capacity`, so the oldest entry is overwritten first.
pub struct RingBuffer<T> {
    buffer: Vec<Option<T>>,
    capacity: usize,
    written: u64,
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        let capacity = capacity.get();
        Self {
            buffer: vec![None; capacity],
            capacity,
            written: 0,
        }
    }

    /// Appends `item`, returning the entry it displaced once full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let slot = (self.written % self.capacity as u64) as usize;
        self.written += 1;
        self.buffer[slot].replace(item)
    }

    /// Entry `index` in arrival order, 0 being the oldest retained.
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len() {
            return None;
        }
        let oldest = self.written - self.len() as u64;
        let slot = ((oldest + index as u64) % self.capacity as u64) as usize;
        self.buffer[slot].as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        (0..self.len()).filter_map(move |index| self.get(index))
    }

    pub fn len(&self) -> usize {
        self.written.min(self.capacity as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total pushes since construction, evicted entries included.
    pub fn total_written(&self) -> u64 {
        self.written
    }
}

/// Bounded FIFO of raw observations shared by the ingestor and the query
/// handlers. The lock is held for one append or one snapshot copy only.
pub struct TelemetryCache {
    observations: Mutex<RingBuffer<Observation>>,
}

impl TelemetryCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            observations: Mutex::new(RingBuffer::new(capacity)),
        }
    }

    pub fn record(&self, observation: Observation) {
        let evicted = self.observations.lock().push(observation);
        if let Some(old) = evicted {
            tracing::trace!(vessel = %old.vessel_id, "evicted oldest observation");
        }
    }

    /// Copy of every cached observation, oldest first.
    pub fn snapshot(&self) -> Vec<Observation> {
        self.observations.lock().iter().cloned().collect()
    }

    /// Folds a snapshot into one record per vessel. Reconciliation runs
    /// after the lock is released.
    pub fn reconcile_all(&self) -> VesselIndex {
        let snapshot = self.snapshot();
        reconcile(&snapshot)
    }

    pub fn len(&self) -> usize {
        self.observations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.observations.lock().capacity()
    }

    pub fn total_recorded(&self) -> u64 {
        self.observations.lock().total_written()
    }
}

/// Reconciled vessels keyed by identifier, ordered by first appearance.
#[derive(Debug, Clone, Default)]
pub struct VesselIndex {
    records: Vec<VesselRecord>,
    positions: HashMap<String, usize>,
}

impl VesselIndex {
    pub fn get(&self, vessel_id: &str) -> Option<&VesselRecord> {
        self.positions.get(vessel_id).map(|&index| &self.records[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &VesselRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<VesselRecord> {
        self.records
    }

    fn fold(&mut self, observation: &Observation) {
        let index = match self.positions.get(&observation.vessel_id) {
            Some(&index) => index,
            None => {
                self.records.push(VesselRecord::new(observation.vessel_id.clone()));
                let index = self.records.len() - 1;
                self.positions.insert(observation.vessel_id.clone(), index);
                index
            }
        };
        self.records[index].merge(observation);
    }
}

/// Left fold of `observations` in order. Replaying the same sequence always
/// yields the same index.
pub fn reconcile(observations: &[Observation]) -> VesselIndex {
    let mut index = VesselIndex::default();
    for observation in observations {
        if observation.vessel_id.is_empty() {
            continue;
        }
        index.fold(observation);
    }
    index
}
