//! Dielectric-breakdown growth of Lichtenberg figures on a 2D grid.
//!
//! Each growth step relaxes the potential field by one Jacobi sweep and then extends
//! the discharge channel by one cell, chosen at random with probability proportional
//! to `charge^eta`. The kernel runs serially, on a rayon thread pool, or split into
//! tiles that each run on their own thread and talk only through channels.

pub mod coordinator;
pub mod discharge;
pub mod exchange;
pub mod frontier;
pub mod generate;
pub mod grid;
pub mod output;
pub mod partition;
pub mod selector;
pub mod simulation;
pub mod solver;
pub mod worker;
pub mod zone;

pub use frontier::Frontier;
pub use grid::Grid;
pub use selector::{SiteSampler, WeightedSampler};
pub use simulation::{build_engine, build_engine_with, EpisodeReport, GrowthEngine, Phase, Simulation};
