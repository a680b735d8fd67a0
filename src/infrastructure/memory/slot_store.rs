/// In-memory forced-matrix slot table
///
/// Rows are kept in a `BTreeMap` ordered by `(level, position)` so range
/// scans on one level and the top-slot lookup are ordered walks. A reverse
/// index keeps `slot_of` O(1) and enforces "one slot per distributor".
///
/// Both maps live under one `parking_lot::RwLock`; `occupy` does its
/// check-and-set under the write lock, which is what the `UNIQUE(level,
/// position)` constraint does for the relational table.

use crate::domain::error::{PlacementError, Result};
use crate::domain::ports::SlotStore;
use crate::domain::position::Coordinate;
use crate::domain::slot::Slot;
use crate::domain::DistributorId;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct SlotTable {
    rows: BTreeMap<Coordinate, Option<DistributorId>>,
    by_distributor: HashMap<DistributorId, Coordinate>,
}

#[derive(Default)]
pub struct InMemorySlotStore {
    table: RwLock<SlotTable>,
}

impl InMemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently occupied slots
    pub fn occupied_count(&self) -> usize {
        self.table.read().by_distributor.len()
    }

    /// Number of stored rows, vacated ones included
    pub fn row_count(&self) -> usize {
        self.table.read().rows.len()
    }
}

#[async_trait]
impl SlotStore for InMemorySlotStore {
    async fn occupant(&self, slot: Coordinate) -> Result<Option<DistributorId>> {
        Ok(self.table.read().rows.get(&slot).copied().flatten())
    }

    async fn slot_of(&self, distributor_id: DistributorId) -> Result<Option<Coordinate>> {
        Ok(self.table.read().by_distributor.get(&distributor_id).copied())
    }

    async fn occupy(&self, slot: Coordinate, distributor_id: DistributorId) -> Result<()> {
        let mut table = self.table.write();

        if let Some(&current) = table.by_distributor.get(&distributor_id) {
            if current == slot {
                return Ok(());
            }
            return Err(PlacementError::InvalidInput(format!(
                "distributor {} already occupies {}",
                distributor_id, current
            )));
        }

        if let Some(Some(occupant)) = table.rows.get(&slot) {
            return Err(PlacementError::SlotOccupied {
                slot,
                occupant: *occupant,
            });
        }

        table.rows.insert(slot, Some(distributor_id));
        table.by_distributor.insert(distributor_id, slot);
        Ok(())
    }

    async fn release(&self, slot: Coordinate) -> Result<Option<DistributorId>> {
        let mut table = self.table.write();
        let previous = match table.rows.get_mut(&slot) {
            Some(occupant) => occupant.take(),
            None => None,
        };
        if let Some(id) = previous {
            table.by_distributor.remove(&id);
        }
        Ok(previous)
    }

    async fn rows_in_range(&self, level: u32, first: u64, last: u64) -> Result<Vec<Slot>> {
        if first > last {
            return Ok(Vec::new());
        }
        let from = Coordinate::new(level, first)?;
        let to = Coordinate::new(level, last)?;
        let table = self.table.read();
        Ok(table
            .rows
            .range(from..=to)
            .map(|(&coordinate, &occupant)| Slot::new(coordinate, occupant))
            .collect())
    }

    async fn top_slot(&self) -> Result<Option<Slot>> {
        let table = self.table.read();
        Ok(table
            .rows
            .iter()
            .find(|(_, occupant)| occupant.is_some())
            .map(|(&coordinate, &occupant)| Slot::new(coordinate, occupant)))
    }
}
