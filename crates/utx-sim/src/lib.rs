//! Projection and simulation tooling for the resource engine.

pub mod config;
pub mod logging;
pub mod projection;
pub mod simulation;

pub use config::{LoggingConfig, SimConfig, SimulationConfig};
pub use projection::{project, ProjectionRow, DEFAULT_MARKERS};
pub use simulation::{run_simulation, SimulationReport};
