//! In-memory storage adapters
//!
//! Implement the domain storage ports with `parking_lot` locks. They enforce
//! the same uniqueness rules as the relational tables and back the CLI,
//! the tests and the benchmarks.

pub mod change_audit;
pub mod directory;
pub mod dual_team_store;
pub mod slot_store;

pub use change_audit::InMemoryChangeAudit;
pub use directory::InMemoryDirectory;
pub use dual_team_store::InMemoryDualTeamStore;
pub use slot_store::InMemorySlotStore;
