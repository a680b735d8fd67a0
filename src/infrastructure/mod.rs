/// Infrastructure Layer - Technical Implementations
///
/// Concrete adapters for the domain storage ports plus the observability
/// HTTP surface. The domain layer never depends on anything here.
///
/// ## Modules
/// - `memory`: in-memory implementations of every storage port
/// - `observability`: Prometheus metrics and health endpoints

pub mod memory;
pub mod observability;

pub use memory::{InMemoryChangeAudit, InMemoryDirectory, InMemoryDualTeamStore, InMemorySlotStore};
