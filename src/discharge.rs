use crate::frontier::Frontier;
use crate::grid::Grid;
use log::{trace, warn};

/// Hop bound of the discharge walk used when the configuration does not set one.
pub const DEFAULT_HOP_LIMIT: usize = 500;

/// Result of one discharge walk along the parent links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DischargeOutcome {
    /// Cells whose state was incremented, the start cell included.
    pub hops: usize,
    /// The walk stopped at the hop bound while the chain still continued.
    pub truncated: bool,
    pub magnitude: i32,
}

/// Adds `magnitude` to `start` and to every ancestor reachable through `path`,
/// visiting at most `hop_limit` cells.
pub fn discharge(
    state: &mut [i32],
    path: &[Option<usize>],
    start: usize,
    magnitude: i32,
    hop_limit: usize,
) -> DischargeOutcome {
    let mut hops = 0;
    let mut cursor = Some(start);
    while let Some(idx) = cursor {
        if hops == hop_limit {
            break;
        }
        state[idx] += magnitude;
        hops += 1;
        cursor = path[idx];
    }
    DischargeOutcome { hops, truncated: cursor.is_some(), magnitude }
}

/// What claiming a growth site did to the episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClaimOutcome {
    /// Power consumed by the claim; the seed magnitude when a ground was reached, else 0.
    pub consumed: i32,
    pub truncated: bool,
}

/// Turns `cell` into a channel cell.
///
/// A ground is discharged first: its magnitude flows back along the path toward the
/// channel root and is charged against the episode budget.
pub fn claim_site(grid: &mut Grid, frontier: &mut Frontier, cell: usize, hop_limit: usize) -> ClaimOutcome {
    let mut outcome = ClaimOutcome::default();
    let previous = grid.discharge_state[cell];
    if previous < 0 {
        let magnitude = -previous;
        let walk = discharge(&mut grid.discharge_state, &grid.path, cell, magnitude, hop_limit);
        if walk.truncated {
            warn!(
                "Discharge walk from cell {:?} stopped after {} hops.",
                grid.coords(cell),
                walk.hops
            );
        } else {
            trace!("Discharge of magnitude {} along {} cells.", magnitude, walk.hops);
        }
        outcome = ClaimOutcome { consumed: magnitude, truncated: walk.truncated };
    }
    grid.discharge_state[cell] = 1;
    frontier.on_claimed(grid, cell);
    outcome
}
