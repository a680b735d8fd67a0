/// Interfaces Layer - External Entry Points
///
/// ## Modules
/// - `cli`: command-line entry point (main.rs logic)

pub mod cli;
