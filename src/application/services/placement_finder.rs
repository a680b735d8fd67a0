/// Placement Finder - Forced Matrix Placement
///
/// Decides where a distributor lands in the forced matrix and commits it.
///
/// ## Spillover
/// `find_open_slot` widens breadth-first below the sponsor: all `2^d` slots
/// exactly `d` levels down are scanned in ascending position order, and the
/// first free one wins. When a level is full the search moves one level
/// deeper, up to `EngineConfig::max_search_depth` (and never past
/// `MAX_LEVEL`), after which it fails with `MatrixFull`.
///
/// ## Races
/// Two registrations under the same sponsor can pick the same free slot. The
/// store rejects the second `occupy` with `SlotOccupied`; an automatic
/// placement then searches again, an explicit one reports the conflict.
///
/// ## Audit
/// Placing writes no history. Vacating and moving append a
/// `PositionChange`, which is what compensation recalculation replays.

use crate::domain::error::{PlacementError, Result};
use crate::domain::ports::{ChangeAudit, SlotStore};
use crate::domain::position::{descendant_range, is_descendant, Coordinate, MAX_LEVEL};
use crate::domain::slot::{PositionChange, Slot};
use crate::domain::DistributorId;
use crate::shared::config::EngineConfig;
use crate::shared::deadline::bounded;
use crate::shared::metrics::METRICS;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct PlacementFinder<S: SlotStore, A: ChangeAudit> {
    slots: Arc<S>,
    audit: Arc<A>,
    config: EngineConfig,
    timeout: Duration,
}

impl<S: SlotStore, A: ChangeAudit> PlacementFinder<S, A> {
    pub fn new(slots: Arc<S>, audit: Arc<A>, config: EngineConfig) -> Self {
        let timeout = config.store_timeout();
        Self {
            slots,
            audit,
            config,
            timeout,
        }
    }

    /// Overrides the per-call store deadline taken from the config
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn occupant(&self, slot: Coordinate) -> Result<Option<DistributorId>> {
        bounded(self.timeout, "occupant", self.slots.occupant(slot)).await
    }

    pub async fn slot_of(&self, distributor_id: DistributorId) -> Result<Option<Coordinate>> {
        bounded(self.timeout, "slot_of", self.slots.slot_of(distributor_id)).await
    }

    async fn placed_slot(&self, distributor_id: DistributorId) -> Result<Coordinate> {
        self.slot_of(distributor_id)
            .await?
            .ok_or_else(|| PlacementError::not_placed(distributor_id))
    }

    async fn ensure_unplaced(&self, distributor_id: DistributorId) -> Result<()> {
        match self.slot_of(distributor_id).await? {
            Some(current) => Err(PlacementError::InvalidInput(format!(
                "distributor {} is already placed at {}",
                distributor_id, current
            ))),
            None => Ok(()),
        }
    }

    async fn occupy(&self, slot: Coordinate, distributor_id: DistributorId) -> Result<()> {
        bounded(self.timeout, "occupy", self.slots.occupy(slot, distributor_id)).await
    }

    /// True iff `target` is below the sponsor and currently free
    ///
    /// # Errors
    /// `NotFound` if the sponsor has never been placed.
    pub async fn can_place(&self, target: Coordinate, sponsor_id: DistributorId) -> Result<bool> {
        let sponsor_slot = self.placed_slot(sponsor_id).await?;
        if !is_descendant(sponsor_slot, target) {
            return Ok(false);
        }
        Ok(self.occupant(target).await?.is_none())
    }

    /// Shallowest, left-most free slot below the sponsor, starting
    /// `start_depth` levels down (values below 1 are treated as 1)
    pub async fn find_open_slot(
        &self,
        sponsor_id: DistributorId,
        start_depth: u32,
    ) -> Result<Coordinate> {
        let sponsor_slot = self.placed_slot(sponsor_id).await?;
        self.search_below(sponsor_slot, start_depth)
            .await
            .inspect_err(|e| METRICS.record_error(e))
    }

    async fn search_below(&self, sponsor_slot: Coordinate, start_depth: u32) -> Result<Coordinate> {
        let max_depth = self
            .config
            .max_search_depth
            .min(MAX_LEVEL - sponsor_slot.level());

        for depth in start_depth.max(1)..=max_depth {
            let level = sponsor_slot.level() + depth;
            let Some(range) = descendant_range(sponsor_slot, level) else {
                break;
            };
            let rows = bounded(
                self.timeout,
                "rows_in_range",
                self.slots.rows_in_range(level, *range.start(), *range.end()),
            )
            .await?;

            if let Some(position) = first_free_position(range, &rows) {
                METRICS
                    .search_depth
                    .with_label_values(&["found"])
                    .observe(depth as f64);
                return Coordinate::new(level, position);
            }
            debug!(sponsor = %sponsor_slot, depth, "level full, widening search");
        }

        METRICS
            .search_depth
            .with_label_values(&["exhausted"])
            .observe(max_depth as f64);
        Err(PlacementError::MatrixFull {
            sponsor_slot,
            max_depth,
        })
    }

    /// Places a distributor under a sponsor
    ///
    /// With an explicit position inside the sponsor's subtree that slot is
    /// taken or the call fails with `SlotOccupied`. An explicit position
    /// outside the subtree, or none at all, falls back to `find_open_slot`.
    ///
    /// # Errors
    /// - `NotFound`: sponsor never placed
    /// - `InvalidInput`: distributor already holds a slot
    /// - `SlotOccupied`: explicit target taken, or automatic retries exhausted
    /// - `MatrixFull`: no free slot within the search bound
    pub async fn place(
        &self,
        distributor_id: DistributorId,
        sponsor_id: DistributorId,
        explicit_position: Option<Coordinate>,
    ) -> Result<Coordinate> {
        self.place_inner(distributor_id, sponsor_id, explicit_position)
            .await
            .inspect_err(|e| METRICS.record_error(e))
    }

    async fn place_inner(
        &self,
        distributor_id: DistributorId,
        sponsor_id: DistributorId,
        explicit_position: Option<Coordinate>,
    ) -> Result<Coordinate> {
        let sponsor_slot = self.placed_slot(sponsor_id).await?;
        self.ensure_unplaced(distributor_id).await?;

        if let Some(target) = explicit_position {
            if is_descendant(sponsor_slot, target) {
                self.occupy(target, distributor_id).await?;
                METRICS.placements_total.with_label_values(&["explicit"]).inc();
                info!(distributor_id, sponsor_id, slot = %target, "placed at requested position");
                return Ok(target);
            }
            warn!(
                distributor_id,
                sponsor_id,
                requested = %target,
                "requested position is outside the sponsor's subtree, searching instead"
            );
        }

        let mut retries = 0;
        loop {
            let target = self.search_below(sponsor_slot, 1).await?;
            match self.occupy(target, distributor_id).await {
                Ok(()) => {
                    METRICS.placements_total.with_label_values(&["auto"]).inc();
                    info!(distributor_id, sponsor_id, slot = %target, retries, "placed by spillover");
                    return Ok(target);
                }
                Err(PlacementError::SlotOccupied { slot, occupant })
                    if retries < self.config.max_occupy_retries =>
                {
                    retries += 1;
                    METRICS
                        .occupy_retries_total
                        .with_label_values(&["matrix"])
                        .inc();
                    debug!(%slot, occupant, retries, "lost occupy race, searching again");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Admin placement at a fixed slot with no sponsor check (seeds the root)
    pub async fn place_at(&self, distributor_id: DistributorId, slot: Coordinate) -> Result<()> {
        let result = self.place_at_inner(distributor_id, slot).await;
        match &result {
            Ok(()) => {
                METRICS.placements_total.with_label_values(&["admin"]).inc();
                info!(distributor_id, %slot, "admin placement");
            }
            Err(e) => METRICS.record_error(e),
        }
        result
    }

    async fn place_at_inner(&self, distributor_id: DistributorId, slot: Coordinate) -> Result<()> {
        self.ensure_unplaced(distributor_id).await?;
        self.occupy(slot, distributor_id).await
    }

    /// Clears a slot and records the departure
    ///
    /// The slot is released first; if the audit row then cannot be written
    /// the occupant is put back, so a slot never empties without a
    /// `PositionChange`.
    ///
    /// # Errors
    /// - `NotFound`: the slot has no occupant
    /// - the audit store's error, after the occupant was restored
    pub async fn vacate(&self, slot: Coordinate, notes: &str) -> Result<DistributorId> {
        let released = bounded(self.timeout, "release", self.slots.release(slot)).await?;
        let Some(distributor_id) = released else {
            let err = PlacementError::NotFound(format!("slot {} is empty", slot));
            METRICS.record_error(&err);
            return Err(err);
        };

        let recorded = bounded(
            self.timeout,
            "record",
            self.audit
                .record(PositionChange::vacated(distributor_id, slot, notes)),
        )
        .await;
        if let Err(e) = recorded {
            error!(distributor_id, %slot, "audit write failed, restoring occupant: {}", e);
            self.restore(slot, distributor_id).await;
            METRICS.record_error(&e);
            return Err(e);
        }

        METRICS.vacates_total.with_label_values(&["matrix"]).inc();
        info!(distributor_id, %slot, "slot vacated");
        Ok(distributor_id)
    }

    /// Vacates whatever slot the distributor holds
    pub async fn remove_position(&self, distributor_id: DistributorId, notes: &str) -> Result<Coordinate> {
        let slot = self
            .placed_slot(distributor_id)
            .await
            .inspect_err(|e| METRICS.record_error(e))?;
        self.vacate(slot, notes).await?;
        Ok(slot)
    }

    /// Admin change of position: the old slot is vacated, `target` is
    /// occupied, and a single change row records both ends
    ///
    /// If `target` turns out to be taken the distributor is put back where
    /// it was and `SlotOccupied` is returned. A failed audit write undoes the
    /// move the same way and returns the audit error.
    pub async fn move_position(
        &self,
        distributor_id: DistributorId,
        target: Coordinate,
        notes: &str,
    ) -> Result<PositionChange> {
        self.move_inner(distributor_id, target, notes)
            .await
            .inspect_err(|e| METRICS.record_error(e))
    }

    async fn move_inner(
        &self,
        distributor_id: DistributorId,
        target: Coordinate,
        notes: &str,
    ) -> Result<PositionChange> {
        let current = self.placed_slot(distributor_id).await?;
        if current == target {
            return Err(PlacementError::InvalidInput(format!(
                "distributor {} is already at {}",
                distributor_id, target
            )));
        }
        if let Some(occupant) = self.occupant(target).await? {
            return Err(PlacementError::SlotOccupied {
                slot: target,
                occupant,
            });
        }

        bounded(self.timeout, "release", self.slots.release(current)).await?;
        if let Err(e) = self.occupy(target, distributor_id).await {
            self.restore(current, distributor_id).await;
            return Err(e);
        }

        let change = PositionChange::moved(distributor_id, current, target, notes);
        if let Err(e) = bounded(self.timeout, "record", self.audit.record(change.clone())).await {
            error!(distributor_id, from = %current, to = %target, "audit write failed, undoing move: {}", e);
            if let Err(release) = bounded(self.timeout, "release", self.slots.release(target)).await {
                error!(distributor_id, slot = %target, "could not release target after failed move: {}", release);
            }
            self.restore(current, distributor_id).await;
            return Err(e);
        }

        METRICS.moves_total.with_label_values(&["matrix"]).inc();
        info!(distributor_id, from = %current, to = %target, "position changed");
        Ok(change)
    }

    /// Puts a distributor back into a slot it was just taken out of
    async fn restore(&self, slot: Coordinate, distributor_id: DistributorId) {
        if let Err(e) = self.occupy(slot, distributor_id).await {
            error!(distributor_id, %slot, "could not restore slot: {}", e);
        }
    }

    /// The distributor's vacate/move trail, oldest first
    pub async fn history(&self, distributor_id: DistributorId) -> Result<Vec<PositionChange>> {
        bounded(self.timeout, "history", self.audit.history(distributor_id)).await
    }
}

/// First position in `range` with no occupied row; `rows` is sorted by position
fn first_free_position(range: RangeInclusive<u64>, rows: &[Slot]) -> Option<u64> {
    let (first, last) = range.into_inner();
    let mut candidate = first;
    for position in rows
        .iter()
        .filter(|row| row.is_occupied())
        .map(|row| row.coordinate.position())
    {
        if position > candidate {
            break;
        }
        if position == candidate {
            candidate += 1;
        }
    }
    (candidate <= last).then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory::{InMemoryChangeAudit, InMemorySlotStore};

    fn c(level: u32, position: u64) -> Coordinate {
        Coordinate::new(level, position).unwrap()
    }

    fn finder() -> PlacementFinder<InMemorySlotStore, InMemoryChangeAudit> {
        PlacementFinder::new(
            Arc::new(InMemorySlotStore::new()),
            Arc::new(InMemoryChangeAudit::new()),
            EngineConfig::default(),
        )
    }

    #[test]
    fn test_first_free_position() {
        let rows = vec![
            Slot::new(c(2, 1), Some(1)),
            Slot::new(c(2, 2), None),
            Slot::new(c(2, 3), Some(3)),
        ];
        assert_eq!(first_free_position(1..=4, &rows), Some(2));
        assert_eq!(first_free_position(1..=4, &[]), Some(1));

        let full: Vec<Slot> = (1..=4).map(|p| Slot::new(c(2, p), Some(p))).collect();
        assert_eq!(first_free_position(1..=4, &full), None);
        assert_eq!(first_free_position(3..=4, &full[2..]), None);
    }

    #[tokio::test]
    async fn test_leftmost_child_first() {
        let finder = finder();
        finder.place_at(1, c(2, 3)).await.unwrap();

        assert_eq!(finder.find_open_slot(1, 1).await.unwrap(), c(3, 5));
    }

    #[tokio::test]
    async fn test_start_depth_skips_levels() {
        let finder = finder();
        finder.place_at(1, Coordinate::ROOT).await.unwrap();

        assert_eq!(finder.find_open_slot(1, 2).await.unwrap(), c(2, 1));
        assert_eq!(finder.find_open_slot(1, 0).await.unwrap(), c(1, 1));
    }

    #[tokio::test]
    async fn test_unknown_sponsor_is_not_found() {
        let finder = finder();
        assert!(matches!(
            finder.find_open_slot(99, 1).await,
            Err(PlacementError::NotFound(_))
        ));
        assert!(matches!(
            finder.can_place(c(1, 1), 99).await,
            Err(PlacementError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_matrix_full_at_search_bound() {
        let finder = PlacementFinder::new(
            Arc::new(InMemorySlotStore::new()),
            Arc::new(InMemoryChangeAudit::new()),
            EngineConfig {
                max_search_depth: 1,
                ..Default::default()
            },
        );
        finder.place_at(1, Coordinate::ROOT).await.unwrap();
        finder.place(2, 1, None).await.unwrap();
        finder.place(3, 1, None).await.unwrap();

        let err = finder.place(4, 1, None).await.unwrap_err();
        assert_eq!(
            err,
            PlacementError::MatrixFull {
                sponsor_slot: Coordinate::ROOT,
                max_depth: 1
            }
        );
    }

    #[tokio::test]
    async fn test_sponsor_at_max_level_has_no_room() {
        let finder = finder();
        finder
            .place_at(1, c(MAX_LEVEL, 1))
            .await
            .unwrap();
        assert!(matches!(
            finder.find_open_slot(1, 1).await,
            Err(PlacementError::MatrixFull { max_depth: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_double_placement_rejected() {
        let finder = finder();
        finder.place_at(1, Coordinate::ROOT).await.unwrap();
        finder.place(2, 1, None).await.unwrap();

        assert!(matches!(
            finder.place(2, 1, None).await,
            Err(PlacementError::InvalidInput(_))
        ));
        assert!(matches!(
            finder.place_at(1, c(1, 2)).await,
            Err(PlacementError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_vacate_empty_slot_is_not_found() {
        let finder = finder();
        assert!(matches!(
            finder.vacate(c(3, 3), "nothing here").await,
            Err(PlacementError::NotFound(_))
        ));
    }

    /// Audit store whose writes always fail
    struct FailingAudit;

    #[async_trait::async_trait]
    impl ChangeAudit for FailingAudit {
        async fn record(&self, _change: PositionChange) -> Result<()> {
            Err(PlacementError::Storage("audit table unavailable".into()))
        }

        async fn history(&self, _distributor_id: DistributorId) -> Result<Vec<PositionChange>> {
            Ok(Vec::new())
        }
    }

    fn finder_with_failing_audit() -> PlacementFinder<InMemorySlotStore, FailingAudit> {
        PlacementFinder::new(
            Arc::new(InMemorySlotStore::new()),
            Arc::new(FailingAudit),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_vacate_keeps_occupant_when_audit_fails() {
        let finder = finder_with_failing_audit();
        finder.place_at(1, Coordinate::ROOT).await.unwrap();
        finder.place(2, 1, None).await.unwrap();

        let err = finder.vacate(c(1, 1), "left").await.unwrap_err();
        assert!(matches!(err, PlacementError::Storage(_)));
        assert_eq!(finder.occupant(c(1, 1)).await.unwrap(), Some(2));
        assert_eq!(finder.slot_of(2).await.unwrap(), Some(c(1, 1)));

        assert!(matches!(
            finder.remove_position(2, "left").await,
            Err(PlacementError::Storage(_))
        ));
        assert_eq!(finder.slot_of(2).await.unwrap(), Some(c(1, 1)));
    }

    #[tokio::test]
    async fn test_move_is_undone_when_audit_fails() {
        let finder = finder_with_failing_audit();
        finder.place_at(1, Coordinate::ROOT).await.unwrap();
        finder.place(2, 1, None).await.unwrap();

        let err = finder.move_position(2, c(2, 4), "").await.unwrap_err();
        assert!(matches!(err, PlacementError::Storage(_)));
        assert_eq!(finder.slot_of(2).await.unwrap(), Some(c(1, 1)));
        assert_eq!(finder.occupant(c(2, 4)).await.unwrap(), None);
    }
}
