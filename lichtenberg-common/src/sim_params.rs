use serde::{Deserialize, Serialize};
use crate::config::{ExecutionModel, FrontierStrategy};

/// Simulation parameters derived from the configuration, read by the kernel on every episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    // Run
    pub episodes: u32,
    pub rng_seed: u64,

    // Parallelism
    pub model: ExecutionModel,
    pub workers: usize,

    // Physics
    pub boundary_memory_scale: f64, // Channel memory written into the source term after each episode
    pub discharge_hop_limit: usize, // Upper bound on a discharge walk along the path forest
    pub frontier: FrontierStrategy,
    pub warmup_sweeps: Option<usize>, // None = width + height
}

impl SimParams {
    /// Number of relaxation sweeps run before the first growth step.
    pub fn warmup_sweeps_for(&self, width: usize, height: usize) -> usize {
        self.warmup_sweeps.unwrap_or(width + height)
    }
}

impl Default for SimParams {
    fn default() -> Self {
        SimParams {
            episodes: 1,
            rng_seed: 1,
            model: ExecutionModel::Serial,
            workers: 1,
            boundary_memory_scale: 0.0001,
            discharge_hop_limit: 500,
            frontier: FrontierStrategy::Incremental,
            warmup_sweeps: None,
        }
    }
}
