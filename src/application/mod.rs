/// Application Layer - Placement Services
///
/// Orchestrates the domain model against the storage ports. It depends on
/// the domain layer only; concrete stores are injected by the caller.
///
/// ## Modules
/// - `services`: PlacementFinder, TreeQueryService, DualTeamPlacer

pub mod services;

pub use services::{DualTeamPlacer, PlacementFinder, TreeQueryService};
