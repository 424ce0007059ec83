use crate::exchange::GhostBuffers;
use crate::grid::{update_boundary_memory, Grid};
use crate::partition::{Direction, TileDef};
use crate::selector::site_weight;
use crate::solver::stencil;
use anyhow::{Context, Result};

/// A worker's private copy of the per-cell arrays of its tile.
///
/// The zone owns `charge`, `charge_buffer` and `boundary` for its cells. Its
/// `discharge_state` is a snapshot refreshed from the coordinator before every step,
/// and the ghost buffers are snapshots of the neighbours' edges.
#[derive(Debug, Clone)]
pub struct Zone {
    tile: TileDef,
    eta: f64,
    charge: Vec<f64>,
    charge_buffer: Vec<f64>,
    boundary: Vec<f64>,
    discharge_state: Vec<i32>,
    /// `None` while lent to a pending exchange.
    ghosts: Option<GhostBuffers>,
}

impl Zone {
    /// Cuts the tile out of `grid`: seed placement from its discharge state, a zero field.
    pub fn new(tile: TileDef, grid: &Grid) -> Self {
        let cells = tile.num_cells();
        let ghosts = GhostBuffers::for_tile(&tile);
        Self {
            eta: grid.eta,
            charge: vec![0.0; cells],
            charge_buffer: vec![0.0; cells],
            boundary: vec![0.0; cells],
            discharge_state: tile.cut(grid.seed_state(), grid.width),
            ghosts: Some(ghosts),
            tile,
        }
    }

    pub fn tile(&self) -> &TileDef {
        &self.tile
    }

    pub fn charge(&self) -> &[f64] {
        &self.charge
    }

    pub fn charge_mut(&mut self) -> &mut [f64] {
        &mut self.charge
    }

    pub fn boundary(&self) -> &[f64] {
        &self.boundary
    }

    pub fn discharge_state(&self) -> &[i32] {
        &self.discharge_state
    }

    /// Replaces the discharge snapshot with the tile's part of the coordinator's state.
    pub fn set_state(&mut self, state: Vec<i32>) -> Result<()> {
        if state.len() != self.tile.num_cells() {
            anyhow::bail!(
                "Tile {} received {} states for {} cells.",
                self.tile.id,
                state.len(),
                self.tile.num_cells()
            );
        }
        self.discharge_state = state;
        Ok(())
    }

    /// Zeroes the field and the boundary memory, ghosts included (start of a run).
    pub fn reset_field(&mut self) {
        self.charge.iter_mut().for_each(|c| *c = 0.0);
        self.charge_buffer.iter_mut().for_each(|c| *c = 0.0);
        self.boundary.iter_mut().for_each(|b| *b = 0.0);
        self.ghosts = Some(GhostBuffers::for_tile(&self.tile));
    }

    /// Values along one side of the tile, in the order the neighbour stores them as ghosts.
    pub fn edge(&self, dir: Direction) -> Vec<f64> {
        let (w, h) = (self.tile.width, self.tile.height);
        match dir {
            Direction::Up => self.charge[..w].to_vec(),
            Direction::Down => self.charge[(h - 1) * w..].to_vec(),
            Direction::Left => (0..h).map(|r| self.charge[r * w]).collect(),
            Direction::Right => (0..h).map(|r| self.charge[r * w + w - 1]).collect(),
        }
    }

    pub(crate) fn take_ghosts(&mut self) -> Result<GhostBuffers> {
        self.ghosts
            .take()
            .with_context(|| format!("Tile {} started an exchange while another was pending.", self.tile.id))
    }

    pub fn install_ghosts(&mut self, ghosts: GhostBuffers) {
        self.ghosts = Some(ghosts);
    }

    /// One local sweep. In-tile neighbours come from `charge`, cross-tile ones from the ghosts.
    pub fn relax(&mut self) -> Result<()> {
        let ghosts = self
            .ghosts
            .as_ref()
            .with_context(|| format!("Tile {} relaxed before its exchange completed.", self.tile.id))?;
        let (w, h) = (self.tile.width, self.tile.height);
        let charge = &self.charge;

        for (idx, out) in self.charge_buffer.iter_mut().enumerate() {
            let (r, c) = (idx / w, idx % w);
            let up = if r > 0 { charge[idx - w] } else { ghosts.get(Direction::Up, c) };
            let left = if c > 0 { charge[idx - 1] } else { ghosts.get(Direction::Left, r) };
            let right = if c + 1 < w { charge[idx + 1] } else { ghosts.get(Direction::Right, r) };
            let down = if r + 1 < h { charge[idx + w] } else { ghosts.get(Direction::Down, c) };
            *out = stencil(self.discharge_state[idx], self.boundary[idx], up, left, right, down);
        }

        std::mem::swap(&mut self.charge, &mut self.charge_buffer);
        Ok(())
    }

    /// Growth weight of every listed tile-local cell, in list order.
    pub fn weights(&self, locals: &[usize], out: &mut Vec<f64>) {
        out.clear();
        out.extend(
            locals
                .iter()
                .map(|&l| site_weight(self.charge[l], self.discharge_state[l], self.eta)),
        );
    }

    pub fn update_boundary(&mut self, scale: f64) {
        update_boundary_memory(&mut self.boundary, &self.discharge_state, scale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::partition;
    use crate::solver;
    use lichtenberg_common::GraphLayout;

    fn grid() -> Grid {
        Grid::from_layout(&GraphLayout {
            width: 5,
            height: 4,
            power: 1,
            eta: 1.0,
            positive: vec![(0, 2)],
            negative: vec![(3, 0), (3, 4)],
        })
        .unwrap()
    }

    #[test]
    fn zone_cuts_its_part_of_the_seed_state() {
        let g = grid();
        let tiles = partition(5, 4, 2).unwrap();
        let right = Zone::new(tiles[1].clone(), &g);
        // columns 2..5
        assert_eq!(right.discharge_state(), &[1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, -1]);
    }

    #[test]
    fn single_zone_matches_global_sweep() {
        let mut g = grid();
        let tiles = partition(5, 4, 1).unwrap();
        let mut zone = Zone::new(tiles[0].clone(), &g);
        for _ in 0..6 {
            solver::relax(&mut g);
            zone.relax().unwrap();
        }
        assert_eq!(zone.charge(), g.charge.as_slice());
    }

    #[test]
    fn edges_are_read_along_each_side() {
        let g = grid();
        let tiles = partition(5, 4, 1).unwrap();
        let mut zone = Zone::new(tiles[0].clone(), &g);
        zone.charge_mut().iter_mut().enumerate().for_each(|(i, c)| *c = i as f64);
        assert_eq!(zone.edge(Direction::Up), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(zone.edge(Direction::Down), vec![15.0, 16.0, 17.0, 18.0, 19.0]);
        assert_eq!(zone.edge(Direction::Left), vec![0.0, 5.0, 10.0, 15.0]);
        assert_eq!(zone.edge(Direction::Right), vec![4.0, 9.0, 14.0, 19.0]);
    }

    #[test]
    fn relax_without_ghosts_is_refused() {
        let g = grid();
        let tiles = partition(5, 4, 1).unwrap();
        let mut zone = Zone::new(tiles[0].clone(), &g);
        let ghosts = zone.take_ghosts().unwrap();
        assert!(zone.relax().is_err());
        assert!(zone.take_ghosts().is_err());
        zone.install_ghosts(ghosts);
        assert!(zone.relax().is_ok());
    }

    #[test]
    fn state_of_wrong_size_is_rejected() {
        let g = grid();
        let tiles = partition(5, 4, 2).unwrap();
        let mut zone = Zone::new(tiles[0].clone(), &g);
        assert!(zone.set_state(vec![0; 3]).is_err());
        assert!(zone.set_state(vec![1; 8]).is_ok());
        assert!(zone.discharge_state().iter().all(|&s| s == 1));
    }
}
