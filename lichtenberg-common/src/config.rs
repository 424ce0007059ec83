use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::sim_params::SimParams;
use std::path::{Path, PathBuf};

// Where the seed layout comes from
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InputConfig {
    pub graph_file: PathBuf,
}

// Episode count and the seed of the coordinator-owned RNG
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RunConfig {
    pub episodes: u32,
    #[serde(default = "default_rng_seed")]
    pub rng_seed: u64,
}

/// Which parallelism substrate runs the kernel.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionModel {
    Serial,
    Threads,
    MessagePassing,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ParallelConfig {
    #[serde(default = "default_model")]
    pub model: ExecutionModel,
    #[serde(default = "default_workers")]
    pub workers: usize, // Thread-pool size or tile count
}

/// How the growth frontier is maintained between growth steps.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontierStrategy {
    Incremental,
    Rescan,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PhysicsConfig {
    #[serde(default = "default_boundary_memory_scale")]
    pub boundary_memory_scale: f64,
    #[serde(default = "default_discharge_hop_limit")]
    pub discharge_hop_limit: usize,
    #[serde(default = "default_frontier")]
    pub frontier: FrontierStrategy,
    /// Overrides the `width + height` warm-up sweep count.
    #[serde(default)]
    pub warmup_sweeps: Option<usize>,
}

// Configuration for output settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    #[serde(default = "default_dump")]
    pub dump: bool, // Plain-text grid dump, one block per episode
    pub format: Option<String>, // Snapshot format: "json", "bincode", "messagepack"
    #[serde(default)]
    pub save_stats: bool,
    #[serde(default)]
    pub save_charge: bool,
}

fn default_rng_seed() -> u64 {
    1
}

fn default_model() -> ExecutionModel {
    ExecutionModel::Threads
}

fn default_workers() -> usize {
    1
}

fn default_boundary_memory_scale() -> f64 {
    0.0001
}

fn default_discharge_hop_limit() -> usize {
    500
}

fn default_frontier() -> FrontierStrategy {
    FrontierStrategy::Incremental
}

fn default_dump() -> bool {
    true
}

impl Default for ParallelConfig {
    fn default() -> Self {
        ParallelConfig {
            model: default_model(),
            workers: default_workers(),
        }
    }
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        PhysicsConfig {
            boundary_memory_scale: default_boundary_memory_scale(),
            discharge_hop_limit: default_discharge_hop_limit(),
            frontier: default_frontier(),
            warmup_sweeps: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            base_filename: "lightning".to_string(),
            dump: true,
            format: None,
            save_stats: false,
            save_charge: false,
        }
    }
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub input: InputConfig,
    pub run: RunConfig,
    #[serde(default)]
    pub parallel: ParallelConfig,
    #[serde(default)]
    pub physics: PhysicsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))
    }

    /// Default settings for a single episode on `graph_file`, used when no config file exists.
    pub fn defaults_for(graph_file: PathBuf) -> Self {
        SimulationConfig {
            input: InputConfig { graph_file },
            run: RunConfig { episodes: 1, rng_seed: default_rng_seed() },
            parallel: ParallelConfig::default(),
            physics: PhysicsConfig::default(),
            output: OutputConfig::default(),
        }
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the kernel cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.parallel.workers == 0 {
            anyhow::bail!("parallel.workers must be at least 1.");
        }
        if !self.physics.boundary_memory_scale.is_finite() || self.physics.boundary_memory_scale < 0.0 {
            anyhow::bail!("physics.boundary_memory_scale must be a finite, non-negative number.");
        }
        if self.physics.discharge_hop_limit == 0 {
            anyhow::bail!("physics.discharge_hop_limit must be greater than 0.");
        }
        if let Some(format) = self.output.format.as_deref() {
            if !matches!(format, "json" | "bincode" | "messagepack") {
                anyhow::bail!("Unknown output.format '{}' (expected json, bincode or messagepack).", format);
            }
        }
        Ok(())
    }

    /// Converts the configuration into the parameters the kernel reads at runtime.
    pub fn get_sim_params(&self) -> SimParams {
        SimParams {
            episodes: self.run.episodes,
            rng_seed: self.run.rng_seed,
            model: self.parallel.model,
            workers: self.parallel.workers,
            boundary_memory_scale: self.physics.boundary_memory_scale,
            discharge_hop_limit: self.physics.discharge_hop_limit,
            frontier: self.physics.frontier,
            warmup_sweeps: self.physics.warmup_sweeps,
        }
    }
}
