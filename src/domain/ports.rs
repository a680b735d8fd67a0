/// Storage Ports - Domain Layer Abstractions
///
/// The placement services only talk to storage through these traits, so the
/// relational store, an in-memory adapter, or a test double can be swapped in
/// without touching placement logic.
///
/// ## Contract shared by every port
/// - Each method is a single atomic read or write. There is no multi-call
///   transaction; services are written so that a failure between two calls
///   leaves only already-committed rows behind.
/// - Uniqueness is the store's job: `occupy` and `insert_link` must reject a
///   conflicting writer with `SlotOccupied` / `LegOccupied` rather than
///   overwrite.
/// - Calls may be slow; services wrap every call in a deadline.

use crate::domain::distributor::DistributorProfile;
use crate::domain::dual_team::{DualTeamLink, LegStats, Side};
use crate::domain::error::Result;
use crate::domain::position::Coordinate;
use crate::domain::slot::{PositionChange, Slot};
use crate::domain::DistributorId;
use async_trait::async_trait;

/// Forced-matrix slot table
#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Current occupant of a slot (`None` for an empty or never-written row)
    async fn occupant(&self, slot: Coordinate) -> Result<Option<DistributorId>>;

    /// Where a distributor sits, `None` if never placed
    async fn slot_of(&self, distributor_id: DistributorId) -> Result<Option<Coordinate>>;

    /// Upsert `slot` with `distributor_id`
    ///
    /// # Errors
    /// - `SlotOccupied` if a different distributor holds the slot
    /// - `InvalidInput` if `distributor_id` already holds another slot
    async fn occupy(&self, slot: Coordinate, distributor_id: DistributorId) -> Result<()>;

    /// Clears the occupant and returns who was there; the row is kept
    async fn release(&self, slot: Coordinate) -> Result<Option<DistributorId>>;

    /// Stored rows on `level` with position in `first..=last`, ascending
    async fn rows_in_range(&self, level: u32, first: u64, last: u64) -> Result<Vec<Slot>>;

    /// Occupied slot with the smallest `(level, position)`
    async fn top_slot(&self) -> Result<Option<Slot>>;
}

/// Append-only `position_change` log
#[async_trait]
pub trait ChangeAudit: Send + Sync {
    async fn record(&self, change: PositionChange) -> Result<()>;

    /// A distributor's changes, oldest first
    async fn history(&self, distributor_id: DistributorId) -> Result<Vec<PositionChange>>;
}

/// Read-only view of the distributor directory
#[async_trait]
pub trait DistributorDirectory: Send + Sync {
    async fn by_id(&self, distributor_id: DistributorId) -> Result<Option<DistributorProfile>>;

    async fn by_login(&self, login: &str) -> Result<Option<DistributorProfile>>;
}

/// Dual-team link table plus its materialized leg data
#[async_trait]
pub trait DualTeamStore: Send + Sync {
    async fn link(&self, distributor_id: DistributorId) -> Result<Option<DualTeamLink>>;

    /// Child on `side` of `parent`
    async fn child(&self, parent: DistributorId, side: Side) -> Result<Option<DistributorId>>;

    /// Inserts a new link
    ///
    /// # Errors
    /// - `LegOccupied` if the parent's side is already taken
    /// - `InvalidInput` if the distributor already has a link
    async fn insert_link(&self, link: DualTeamLink) -> Result<()>;

    /// Rewrites an existing link (parent, side, policy or sequence)
    ///
    /// # Errors
    /// - `NotFound` if there is no link to update
    /// - `LegOccupied` if the new parent's side is taken by someone else
    async fn update_link(&self, link: DualTeamLink) -> Result<()>;

    /// Materialized leg data; all zeros for a node with no children
    async fn leg_stats(&self, distributor_id: DistributorId) -> Result<LegStats>;

    async fn save_leg_stats(&self, distributor_id: DistributorId, stats: LegStats) -> Result<()>;

    /// Next value of the placement sequence, strictly greater than any before
    async fn next_placement_seq(&self) -> Result<u64>;
}
