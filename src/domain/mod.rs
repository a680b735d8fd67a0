/// Domain Layer - Core Placement Rules
///
/// Pure business types and rules with no I/O. Storage is reached only
/// through the traits in `ports`, implemented by the infrastructure layer.
///
/// ## Modules
/// - `position`: forced-matrix coordinate math (parent, children, descendance, paths)
/// - `slot`: slot rows and position-change audit records
/// - `dual_team`: binary-plan links, sides, placement policies, leg data
/// - `distributor`: directory records used to annotate query results
/// - `ports`: storage abstractions
/// - `error`: `PlacementError` taxonomy

pub mod distributor;
pub mod dual_team;
pub mod error;
pub mod ports;
pub mod position;
pub mod slot;

/// Distributor identifier as issued by the directory
pub type DistributorId = u64;

// Re-export key types
pub use distributor::{DistributorProfile, Role};
pub use dual_team::{DualTeamLink, LegStats, PlacementPolicy, Side};
pub use error::{ErrorKind, PlacementError, Result};
pub use ports::{ChangeAudit, DistributorDirectory, DualTeamStore, SlotStore};
pub use position::{Coordinate, MAX_LEVEL};
pub use slot::{PositionChange, Slot};
