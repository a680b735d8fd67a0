/// Shared utilities used across all layers
///
/// - `config`: engine configuration
/// - `deadline`: per-call store timeouts
/// - `metrics`: Prometheus metrics

pub mod config;
pub mod deadline;
pub mod metrics;

pub use config::{ConfigError, EngineConfig};
pub use deadline::bounded;
pub use metrics::METRICS;
