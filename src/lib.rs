// Library interface for pitboard
// This allows integration tests to access internal modules

pub mod classifier;
pub mod config;
pub mod errors;
pub mod notifier;
pub mod pipeline;
pub mod telemetry;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::PitboardError;
pub use pipeline::{ConnectionState, DisplayField, DisplayUpdate, Pipeline};
pub use telemetry::{Driver, LapsRemaining, Snapshot};
