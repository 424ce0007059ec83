//! Jacobi relaxation of the discretized Poisson equation.
//!
//! One sweep reads `charge` and writes `charge_buffer`, then swaps the two, so no
//! cell ever observes a value written during the same sweep. Grounds are held at
//! potential 1, channel cells at 0, and a neighbour outside the grid contributes 0.

use crate::grid::Grid;
use rayon::prelude::*;
use std::cmp::Ordering;

/// Potential of a single cell after one sweep.
///
/// Every relaxation path (serial, thread pool, tiles) goes through this function with
/// the neighbours in up, left, right, down order, so all of them produce bit-identical fields.
#[inline(always)]
pub fn stencil(state: i32, boundary: f64, up: f64, left: f64, right: f64, down: f64) -> f64 {
    match state.cmp(&0) {
        Ordering::Less => 1.0,
        Ordering::Greater => 0.0,
        Ordering::Equal => (boundary + up + left + right + down) / 4.0,
    }
}

#[inline(always)]
fn relax_row(row: usize, out: &mut [f64], charge: &[f64], state: &[i32], boundary: &[f64], width: usize, height: usize) {
    let base = row * width;
    for (col, value) in out.iter_mut().enumerate() {
        let idx = base + col;
        let up = if row > 0 { charge[idx - width] } else { 0.0 };
        let left = if col > 0 { charge[idx - 1] } else { 0.0 };
        let right = if col + 1 < width { charge[idx + 1] } else { 0.0 };
        let down = if row + 1 < height { charge[idx + width] } else { 0.0 };
        *value = stencil(state[idx], boundary[idx], up, left, right, down);
    }
}

/// One serial sweep over the whole grid.
pub fn relax(grid: &mut Grid) {
    let (width, height) = (grid.width, grid.height);
    let charge = &grid.charge;
    let state = &grid.discharge_state;
    let boundary = &grid.boundary;

    grid.charge_buffer
        .chunks_mut(width)
        .enumerate()
        .for_each(|(row, out)| relax_row(row, out, charge, state, boundary, width, height));

    std::mem::swap(&mut grid.charge, &mut grid.charge_buffer);
}

/// One data-parallel sweep on the current rayon pool.
///
/// Each task writes only its own rows of `charge_buffer`; the swap runs after the
/// parallel pass has joined, so it never overlaps a writer.
pub fn relax_parallel(grid: &mut Grid) {
    let (width, height) = (grid.width, grid.height);
    let charge = &grid.charge;
    let state = &grid.discharge_state;
    let boundary = &grid.boundary;

    grid.charge_buffer
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(row, out)| relax_row(row, out, charge, state, boundary, width, height));

    std::mem::swap(&mut grid.charge, &mut grid.charge_buffer);
}

/// Runs `sweeps` relaxation sweeps, serially or on the rayon pool.
pub fn warm_up(grid: &mut Grid, sweeps: usize, parallel: bool) {
    for _ in 0..sweeps {
        if parallel {
            relax_parallel(grid);
        } else {
            relax(grid);
        }
    }
}

/// Largest change a further sweep would make; used to judge how close the field is to its fixed point.
pub fn residual(grid: &Grid) -> f64 {
    let mut probe = grid.clone();
    relax(&mut probe);
    probe
        .charge
        .iter()
        .zip(&grid.charge)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lichtenberg_common::GraphLayout;

    fn grid(width: usize, height: usize, positive: Vec<(usize, usize)>, negative: Vec<(usize, usize)>) -> Grid {
        Grid::from_layout(&GraphLayout { width, height, power: 1, eta: 1.0, positive, negative }).unwrap()
    }

    #[test]
    fn seeds_are_clamped() {
        let mut g = grid(3, 3, vec![(0, 0)], vec![(2, 2)]);
        g.charge.iter_mut().for_each(|c| *c = 0.5);
        relax(&mut g);
        assert_eq!(g.charge[0], 0.0);
        assert_eq!(g.charge[8], 1.0);
    }

    #[test]
    fn free_cell_averages_neighbours_with_zero_outside() {
        let mut g = grid(3, 3, vec![], vec![]);
        g.charge.iter_mut().enumerate().for_each(|(i, c)| *c = i as f64);
        g.boundary[0] = 0.4;
        relax(&mut g);
        // corner (0,0): boundary + right(1) + down(3)
        assert!((g.charge[0] - (0.4 + 1.0 + 3.0) / 4.0).abs() < 1e-12);
        // centre: 1 + 3 + 5 + 7
        assert!((g.charge[4] - 16.0 / 4.0).abs() < 1e-12);
    }

    #[test]
    fn sweep_reads_only_previous_field() {
        // A ground next to a free cell: the free cell must see the old potential (0)
        // of the ground during the first sweep, not the freshly clamped 1.
        let mut g = grid(2, 1, vec![], vec![(0, 0)]);
        relax(&mut g);
        assert_eq!(g.charge[1], 0.0);
        relax(&mut g);
        assert!((g.charge[1] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn parallel_sweep_matches_serial() {
        let mut a = grid(17, 9, vec![(0, 8)], vec![(8, 0), (8, 16)]);
        a.boundary[40] = 0.01;
        let mut b = a.clone();
        warm_up(&mut a, 30, false);
        warm_up(&mut b, 30, true);
        assert_eq!(a.charge, b.charge);
    }

    #[test]
    fn empty_grid_stays_at_fixed_point() {
        let mut g = grid(8, 5, vec![], vec![]);
        warm_up(&mut g, 13, false);
        assert!(residual(&g) < 1e-12);
        assert!(g.charge.iter().all(|&c| c == 0.0));
    }
}
