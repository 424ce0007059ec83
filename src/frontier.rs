//! Growth frontier: the empty cells next to the channel that may join it next.
//!
//! The frontier keeps its members in admission order. That order defines the layout
//! of the cumulative distribution the selector draws from, so every execution model
//! that shares one frontier also shares one sequence of growth decisions.

use crate::grid::{neighbor_slots, Grid};
use lichtenberg_common::FrontierStrategy;

#[derive(Debug, Clone)]
pub struct Frontier {
    strategy: FrontierStrategy,
    /// Members in admission order.
    cells: Vec<usize>,
    /// Set once a cell has been admitted during the current episode.
    admitted: Vec<bool>,
}

impl Frontier {
    pub fn new(num_cells: usize, strategy: FrontierStrategy) -> Self {
        Self {
            strategy,
            cells: Vec::with_capacity(num_cells.min(4096)),
            admitted: vec![false; num_cells],
        }
    }

    pub fn strategy(&self) -> FrontierStrategy {
        self.strategy
    }

    /// Members in the order their weights are laid out for selection.
    pub fn cells(&self) -> &[usize] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, cell: usize) -> bool {
        self.admitted[cell] && self.cells.contains(&cell)
    }

    /// Forgets every member and admission flag.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.admitted.iter_mut().for_each(|a| *a = false);
    }

    /// Full scan: admits the free neighbours of every channel cell, in cell-index order.
    pub fn rebuild(&mut self, grid: &mut Grid) {
        self.clear();
        for idx in 0..grid.num_cells() {
            if grid.is_channel(idx) {
                self.admit_neighbors(grid, idx);
            }
        }
    }

    /// Admits the free, not yet admitted neighbours of channel cell `cell` and records
    /// `cell` as their parent unless they already have one.
    pub fn admit_neighbors(&mut self, grid: &mut Grid, cell: usize) {
        if !grid.is_channel(cell) {
            return;
        }
        for neighbor in neighbor_slots(cell, grid.width, grid.height).into_iter().flatten() {
            if self.admitted[neighbor] || grid.discharge_state[neighbor] > 0 {
                continue;
            }
            self.admitted[neighbor] = true;
            self.cells.push(neighbor);
            if grid.path[neighbor].is_none() {
                grid.path[neighbor] = Some(cell);
            }
        }
    }

    /// Brings the member list up to date before a growth step.
    /// Only the rescan strategy has work to do here.
    pub fn refresh(&mut self, grid: &mut Grid) {
        if self.strategy == FrontierStrategy::Rescan {
            self.rebuild(grid);
        }
    }

    /// Takes a newly claimed channel cell out of the frontier and, for the incremental
    /// strategy, admits its free neighbours.
    pub fn on_claimed(&mut self, grid: &mut Grid, cell: usize) {
        if let Some(pos) = self.cells.iter().position(|&c| c == cell) {
            self.cells.remove(pos);
        }
        if self.strategy == FrontierStrategy::Incremental {
            self.admit_neighbors(grid, cell);
        }
    }

    /// Checks the frontier invariants against the grid: no duplicates, no channel
    /// members, and every member touches the channel.
    pub fn is_consistent(&self, grid: &Grid) -> bool {
        let mut seen = vec![false; grid.num_cells()];
        self.cells.iter().all(|&cell| {
            let fresh = !std::mem::replace(&mut seen[cell], true);
            fresh && grid.discharge_state[cell] <= 0 && grid.neighbors(cell).any(|n| grid.is_channel(n))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lichtenberg_common::GraphLayout;
    use std::collections::BTreeSet;

    fn grid(positive: Vec<(usize, usize)>, negative: Vec<(usize, usize)>) -> Grid {
        Grid::from_layout(&GraphLayout { width: 5, height: 4, power: 1, eta: 1.0, positive, negative }).unwrap()
    }

    #[test]
    fn rebuild_admits_free_neighbours_of_channel() {
        let mut g = grid(vec![(0, 0), (0, 1)], vec![(1, 0)]);
        let mut frontier = Frontier::new(g.num_cells(), FrontierStrategy::Incremental);
        frontier.rebuild(&mut g);

        // (0,0) admits (1,0) the ground; (0,1) admits (0,2) and (1,1)
        assert_eq!(frontier.cells(), &[g.idx(1, 0), g.idx(0, 2), g.idx(1, 1)]);
        assert_eq!(g.path[g.idx(1, 0)], Some(g.idx(0, 0)));
        assert_eq!(g.path[g.idx(1, 1)], Some(g.idx(0, 1)));
        assert!(frontier.is_consistent(&g));
    }

    #[test]
    fn no_channel_means_empty_frontier() {
        let mut g = grid(vec![], vec![(3, 3)]);
        let mut frontier = Frontier::new(g.num_cells(), FrontierStrategy::Incremental);
        frontier.rebuild(&mut g);
        assert!(frontier.is_empty());
    }

    #[test]
    fn claim_removes_cell_and_never_duplicates() {
        let mut g = grid(vec![(1, 1)], vec![]);
        let mut frontier = Frontier::new(g.num_cells(), FrontierStrategy::Incremental);
        frontier.rebuild(&mut g);

        let claimed = g.idx(1, 2);
        g.discharge_state[claimed] = 1;
        frontier.on_claimed(&mut g, claimed);

        assert!(!frontier.contains(claimed));
        assert!(frontier.is_consistent(&g));
        // four around the seed, minus the claimed cell, plus (0,2), (1,3) and (2,2)
        assert_eq!(frontier.len(), 3 + 3);
    }

    #[test]
    fn parent_link_is_kept_from_first_discovery() {
        let mut g = grid(vec![(0, 0), (0, 2)], vec![]);
        let mut frontier = Frontier::new(g.num_cells(), FrontierStrategy::Incremental);
        frontier.rebuild(&mut g);
        // (0,1) is next to both seeds; it joined through (0,0)
        assert_eq!(g.path[g.idx(0, 1)], Some(g.idx(0, 0)));
        frontier.refresh(&mut g);
        assert_eq!(g.path[g.idx(0, 1)], Some(g.idx(0, 0)));
    }

    #[test]
    fn rescan_and_incremental_hold_the_same_set() {
        let mut a = grid(vec![(2, 2)], vec![]);
        let mut b = a.clone();
        let mut inc = Frontier::new(a.num_cells(), FrontierStrategy::Incremental);
        let mut scan = Frontier::new(b.num_cells(), FrontierStrategy::Rescan);
        inc.rebuild(&mut a);
        scan.rebuild(&mut b);

        for (row, col) in [(2, 3), (1, 3), (1, 4), (0, 4)] {
            let cell = a.idx(row, col);
            a.discharge_state[cell] = 1;
            b.discharge_state[cell] = 1;
            inc.on_claimed(&mut a, cell);
            scan.on_claimed(&mut b, cell);
            scan.refresh(&mut b);

            let set_a: BTreeSet<usize> = inc.cells().iter().copied().collect();
            let set_b: BTreeSet<usize> = scan.cells().iter().copied().collect();
            assert_eq!(set_a, set_b);
            assert!(inc.is_consistent(&a));
            assert!(scan.is_consistent(&b));
        }
    }
}
