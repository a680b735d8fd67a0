/// Application Services
///
/// Services coordinate the domain ports to implement the placement workflows.
/// Each one is generic over its store traits and receives the stores through
/// `Arc`s at construction.
///
/// - `placement_finder`: forced-matrix placement, vacate and admin moves
/// - `tree_query`: access-checked, annotated reads of the matrix
/// - `dual_team`: binary Left/Right placement with spillover rules

pub mod dual_team;
pub mod placement_finder;
pub mod tree_query;

pub use dual_team::{DualTeamPlacement, DualTeamPlacer, DualTeamRequest, PlacementRule};
pub use placement_finder::PlacementFinder;
pub use tree_query::{OccupantInfo, PathNode, SubtreeNode, TreeQueryService};
