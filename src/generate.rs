//! Synthetic seed layouts for square grids.

use anyhow::Result;
use lichtenberg_common::GraphLayout;
use rand::distr::Uniform;
use rand::Rng;

/// Shape of a generated layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum GenerateMode {
    /// One source at the top middle, one ground at the bottom middle.
    Point,
    /// One source at the top middle, one ground per column somewhere in the bottom quarter.
    Terrain,
    /// Five evenly spaced sources on the top row, one ground per column in the bottom fifth.
    Multi,
}

const MULTI_SOURCES: usize = 5;

/// Builds a `width` x `width` layout. All coordinates lie inside the grid.
pub fn generate_layout<R: Rng>(width: usize, mode: GenerateMode, power: i32, eta: f64, rng: &mut R) -> Result<GraphLayout> {
    let min_width = match mode {
        GenerateMode::Point | GenerateMode::Terrain => 2,
        GenerateMode::Multi => MULTI_SOURCES + 1,
    };
    if width < min_width {
        anyhow::bail!("{:?} layouts need a width of at least {}, got {}.", mode, min_width, width);
    }
    let mid = width / 2;
    let last = width - 1;

    let (positive, negative) = match mode {
        GenerateMode::Point => (vec![(0, mid)], vec![(last, mid)]),
        GenerateMode::Terrain => {
            let rows = Uniform::new_inclusive((width * 3 / 4).max(1), last)?;
            (vec![(0, mid)], (0..width).map(|col| (rng.sample(&rows), col)).collect())
        }
        GenerateMode::Multi => {
            let spacing = width / (MULTI_SOURCES + 1);
            let sources: Vec<(usize, usize)> = (1..=MULTI_SOURCES).map(|k| (0, k * spacing)).collect();
            let rows = Uniform::new_inclusive((width * 4 / 5).max(1), last)?;
            (sources, (0..width).map(|col| (rng.sample(&rows), col)).collect())
        }
    };

    Ok(GraphLayout { width, height: width, power, eta, positive, negative })
}
