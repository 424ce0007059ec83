use anyhow::Result;
use lichtenberg_common::GraphLayout;

/// Holds every per-cell array of the simulation grid.
///
/// All arrays are row-major with `width * height` entries. The grid is the single
/// point of mutation authority for `discharge_state` and `path`; tiles and threads
/// only ever see snapshots of them.
#[derive(Debug, Clone)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    /// Branch budget of one growth episode.
    pub power: i32,
    /// Exponent shaping the growth probability.
    pub eta: f64,

    // --- Ping-Pong Buffers for the relaxation sweep ---
    pub charge: Vec<f64>,
    pub charge_buffer: Vec<f64>,

    /// Source term of the Poisson equation (channel memory of earlier episodes).
    pub boundary: Vec<f64>,

    // Fixed seed placement: +1 source, -1 ground
    seed_state: Vec<i32>,

    /// 0 = neutral, < 0 = ground with remaining magnitude, >= 1 = channel with accumulated magnitude.
    pub discharge_state: Vec<i32>,

    /// Parent links of the discharge forest; `None` for roots and cells never reached.
    pub path: Vec<Option<usize>>,
}

impl Grid {
    /// Allocates a grid for the given layout with all fields at their run-start values.
    pub fn from_layout(layout: &GraphLayout) -> Result<Self> {
        if layout.width == 0 || layout.height == 0 {
            anyhow::bail!("Grid must be at least 1x1, got {}x{}.", layout.width, layout.height);
        }
        let cells = layout
            .width
            .checked_mul(layout.height)
            .ok_or_else(|| anyhow::anyhow!("Grid {}x{} is too large.", layout.width, layout.height))?;

        if let Some(&(row, col)) = layout
            .positive
            .iter()
            .chain(&layout.negative)
            .find(|&&(row, col)| row >= layout.height || col >= layout.width)
        {
            anyhow::bail!(
                "Seed ({}, {}) lies outside the {}x{} grid.",
                row,
                col,
                layout.width,
                layout.height
            );
        }

        let seed_state = layout.seed_state();
        Ok(Self {
            width: layout.width,
            height: layout.height,
            power: layout.power,
            eta: layout.eta,
            charge: vec![0.0; cells],
            charge_buffer: vec![0.0; cells],
            boundary: vec![0.0; cells],
            discharge_state: seed_state.clone(),
            seed_state,
            path: vec![None; cells],
        })
    }

    #[inline(always)]
    pub fn num_cells(&self) -> usize {
        self.width * self.height
    }

    #[inline(always)]
    pub fn idx(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    #[inline(always)]
    pub fn coords(&self, idx: usize) -> (usize, usize) {
        (idx / self.width, idx % self.width)
    }

    /// In-grid neighbours of `idx` in up, left, right, down order.
    pub fn neighbors(&self, idx: usize) -> impl Iterator<Item = usize> {
        neighbor_slots(idx, self.width, self.height).into_iter().flatten()
    }

    /// The immutable seed placement loaded from the graph file.
    pub fn seed_state(&self) -> &[i32] {
        &self.seed_state
    }

    /// True if the cell is part of the discharge channel.
    #[inline(always)]
    pub fn is_channel(&self, idx: usize) -> bool {
        self.discharge_state[idx] > 0
    }

    /// Number of channel cells.
    pub fn channel_len(&self) -> usize {
        self.discharge_state.iter().filter(|&&s| s > 0).count()
    }

    pub fn reset_charge(&mut self) {
        self.charge.iter_mut().for_each(|c| *c = 0.0);
        self.charge_buffer.iter_mut().for_each(|c| *c = 0.0);
    }

    pub fn reset_boundary(&mut self) {
        self.boundary.iter_mut().for_each(|b| *b = 0.0);
    }

    /// Restores the discharge state from the seed placement (start of every episode).
    pub fn reset_discharge(&mut self) {
        self.discharge_state.copy_from_slice(&self.seed_state);
    }

    pub fn reset_path(&mut self) {
        self.path.iter_mut().for_each(|p| *p = None);
    }

    /// Writes the channel memory of the finished episode into the source term.
    pub fn update_boundary(&mut self, scale: f64) {
        update_boundary_memory(&mut self.boundary, &self.discharge_state, scale);
    }
}

/// Up, left, right and down neighbour of `idx`, `None` past the grid edge.
#[inline(always)]
pub fn neighbor_slots(idx: usize, width: usize, height: usize) -> [Option<usize>; 4] {
    let (row, col) = (idx / width, idx % width);
    [
        (row > 0).then(|| idx - width),
        (col > 0).then(|| idx - 1),
        (col + 1 < width).then(|| idx + 1),
        (row + 1 < height).then(|| idx + width),
    ]
}

/// `boundary = state * scale` where the accumulated magnitude exceeds 1, zero elsewhere.
pub fn update_boundary_memory(boundary: &mut [f64], discharge_state: &[i32], scale: f64) {
    for (b, &state) in boundary.iter_mut().zip(discharge_state) {
        *b = if state > 1 { state as f64 * scale } else { 0.0 };
    }
}
