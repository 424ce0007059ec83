pub mod config;
pub mod dump;
pub mod graph_file;
pub mod sim_params;
pub mod snapshot;

// Re-export key types for easier use by dependent crates
pub use config::{SimulationConfig, InputConfig, RunConfig, ParallelConfig, PhysicsConfig, OutputConfig, ExecutionModel, FrontierStrategy};
pub use dump::EpisodeDump;
pub use graph_file::{GraphFileError, GraphLayout};
pub use sim_params::SimParams;
pub use snapshot::EpisodeSnapshot;
