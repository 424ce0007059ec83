//! Per-tile worker of the message-passing model.
//!
//! A worker owns one [`Zone`] and its exchange links, and does nothing but answer
//! coordinator commands. It never decides growth on its own.

use crate::exchange::ExchangeLinks;
use crate::simulation::Phase;
use crate::zone::Zone;
use anyhow::{anyhow, Result};
use log::{debug, trace};
use std::sync::mpsc::{Receiver, Sender};

/// Coordinator to worker. Discharge states are the recipient tile's part only.
#[derive(Debug, Clone)]
pub enum Command {
    /// Reset the field and run `sweeps` exchange-and-relax rounds.
    Warmup { discharge_state: Vec<i32>, sweeps: usize },
    /// One growth step: exchange, relax, then weigh the listed tile-local candidates.
    Step { power: i32, discharge_state: Vec<i32>, candidates: Vec<usize> },
    /// End of an episode: record the channel memory.
    Finish { discharge_state: Vec<i32>, boundary_scale: f64 },
    /// Send the current field back.
    Collect,
    Shutdown,
}

/// Worker to coordinator.
#[derive(Debug, Clone)]
pub enum Report {
    /// Candidate weights, in the order the candidates were listed.
    Weights { zone: usize, weights: Vec<f64> },
    Ack { zone: usize },
    Charge { zone: usize, charge: Vec<f64> },
    /// The worker hit an error and is exiting.
    Failed { zone: usize, error: String },
}

/// One exchange-then-relax round. The exchange completes before the sweep reads any ghost.
fn exchange_and_relax(zone: &mut Zone, links: &ExchangeLinks) -> Result<()> {
    trace!("Tile {}: {:?}", zone.tile().id, Phase::Exchange);
    let pending = links.begin_exchange(zone)?;
    let ghosts = pending.complete()?;
    zone.install_ghosts(ghosts);

    trace!("Tile {}: {:?}", zone.tile().id, Phase::Relax);
    zone.relax()
}

fn run(zone: &mut Zone, links: &ExchangeLinks, commands: &Receiver<Command>, reports: &Sender<Report>) -> Result<()> {
    let id = zone.tile().id;
    let mut weights = Vec::new();
    let send = |report: Report| {
        reports
            .send(report)
            .map_err(|_| anyhow!("Tile {}: coordinator stopped listening.", id))
    };

    loop {
        let command = commands
            .recv()
            .map_err(|_| anyhow!("Tile {}: coordinator hung up without a shutdown.", id))?;
        match command {
            Command::Warmup { discharge_state, sweeps } => {
                zone.reset_field();
                zone.set_state(discharge_state)?;
                for _ in 0..sweeps {
                    exchange_and_relax(zone, links)?;
                }
                send(Report::Ack { zone: id })?;
            }
            Command::Step { power, discharge_state, candidates } => {
                trace!("Tile {}: step with power {} and {} candidates.", id, power, candidates.len());
                zone.set_state(discharge_state)?;
                exchange_and_relax(zone, links)?;
                zone.weights(&candidates, &mut weights);
                send(Report::Weights { zone: id, weights: weights.clone() })?;
            }
            Command::Finish { discharge_state, boundary_scale } => {
                zone.set_state(discharge_state)?;
                zone.update_boundary(boundary_scale);
                send(Report::Ack { zone: id })?;
            }
            Command::Collect => {
                send(Report::Charge { zone: id, charge: zone.charge().to_vec() })?;
            }
            Command::Shutdown => {
                debug!("Tile {} shutting down.", id);
                return Ok(());
            }
        }
    }
}

/// Thread body of a tile worker. A failure is reported to the coordinator before the
/// worker exits so that it never waits on a report that will not come.
pub fn serve(mut zone: Zone, links: ExchangeLinks, commands: Receiver<Command>, reports: Sender<Report>) -> Result<()> {
    let result = run(&mut zone, &links, &commands, &reports);
    if let Err(e) = &result {
        let _ = reports.send(Report::Failed { zone: zone.tile().id, error: format!("{:#}", e) });
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use crate::partition::partition;
    use lichtenberg_common::GraphLayout;
    use std::sync::mpsc::channel;
    use std::thread;

    #[test]
    fn single_worker_answers_every_command() {
        let grid = Grid::from_layout(&GraphLayout {
            width: 3,
            height: 3,
            power: 1,
            eta: 1.0,
            positive: vec![(0, 1)],
            negative: vec![(2, 2)],
        })
        .unwrap();
        let tiles = partition(3, 3, 1).unwrap();
        let links = ExchangeLinks::build(&tiles).remove(0);
        let zone = Zone::new(tiles[0].clone(), &grid);
        let (cmd_tx, cmd_rx) = channel();
        let (rep_tx, rep_rx) = channel();
        let handle = thread::spawn(move || serve(zone, links, cmd_rx, rep_tx));

        let state = grid.seed_state().to_vec();
        cmd_tx.send(Command::Warmup { discharge_state: state.clone(), sweeps: 6 }).unwrap();
        assert!(matches!(rep_rx.recv().unwrap(), Report::Ack { zone: 0 }));

        // (1,2) sits next to the ground, (0,0) next to the source
        cmd_tx.send(Command::Step { power: 1, discharge_state: state, candidates: vec![5, 0] }).unwrap();
        match rep_rx.recv().unwrap() {
            Report::Weights { zone, weights } => {
                assert_eq!(zone, 0);
                assert_eq!(weights.len(), 2);
                assert!(weights[0] > weights[1]);
            }
            other => panic!("unexpected report {:?}", other),
        }

        cmd_tx.send(Command::Collect).unwrap();
        assert!(matches!(rep_rx.recv().unwrap(), Report::Charge { zone: 0, ref charge } if charge[8] == 1.0));

        cmd_tx.send(Command::Shutdown).unwrap();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn bad_state_is_reported_as_failure() {
        let grid = Grid::from_layout(&GraphLayout {
            width: 2,
            height: 2,
            power: 1,
            eta: 1.0,
            positive: vec![],
            negative: vec![],
        })
        .unwrap();
        let tiles = partition(2, 2, 1).unwrap();
        let links = ExchangeLinks::build(&tiles).remove(0);
        let zone = Zone::new(tiles[0].clone(), &grid);
        let (cmd_tx, cmd_rx) = channel();
        let (rep_tx, rep_rx) = channel();
        let handle = thread::spawn(move || serve(zone, links, cmd_rx, rep_tx));

        cmd_tx.send(Command::Finish { discharge_state: vec![0], boundary_scale: 0.1 }).unwrap();
        assert!(matches!(rep_rx.recv().unwrap(), Report::Failed { zone: 0, .. }));
        assert!(handle.join().unwrap().is_err());
    }
}
