use crate::exchange::ExchangeLinks;
use crate::frontier::Frontier;
use crate::grid::Grid;
use crate::partition::{partition, TileDef};
use crate::simulation::FieldBackend;
use crate::worker::{self, Command, Report};
use crate::zone::Zone;
use anyhow::{anyhow, Context, Result};
use lichtenberg_common::SimParams;
use log::{debug, info, warn};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::{self, JoinHandle};

/// Field backend of the message-passing model.
///
/// The field is split across one worker thread per tile. The coordinator keeps the
/// authoritative discharge state and frontier (through [`crate::simulation::Simulation`])
/// and ships each worker its slice of the state on every step. Workers relax
/// their tile and report the weights of the frontier cells they own. The coordinator
/// stitches those back into frontier order, so the single draw sees exactly the
/// distribution a single-process run would.
pub struct Coordinator {
    tiles: Vec<TileDef>,
    grid_width: usize,
    commands: Vec<Sender<Command>>,
    reports: Receiver<Report>,
    handles: Vec<JoinHandle<Result<()>>>,
    /// Owning tile and tile-local index of every global cell.
    owner: Vec<(usize, usize)>,
    // Per-tile candidate lists, reused every step
    candidates: Vec<Vec<usize>>,
    positions: Vec<Vec<usize>>,
}

impl Coordinator {
    /// Partitions the grid into `params.workers` tiles and starts one worker per tile.
    pub fn spawn(grid: &Grid, params: &SimParams) -> Result<Self> {
        let tiles = partition(grid.width, grid.height, params.workers)?;
        let links = ExchangeLinks::build(&tiles);
        let (report_tx, reports) = channel();

        let mut owner = vec![(0, 0); grid.num_cells()];
        let mut commands = Vec::with_capacity(tiles.len());
        let mut handles = Vec::with_capacity(tiles.len());
        for (tile, link) in tiles.iter().zip(links) {
            for local in 0..tile.num_cells() {
                owner[tile.global_index(local, grid.width)] = (tile.id, local);
            }

            let (cmd_tx, cmd_rx) = channel();
            let zone = Zone::new(tile.clone(), grid);
            let report_tx = report_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("tile-{}", tile.id))
                .spawn(move || worker::serve(zone, link, cmd_rx, report_tx))
                .with_context(|| format!("Failed to start worker for tile {}", tile.id))?;
            commands.push(cmd_tx);
            handles.push(handle);
            debug!(
                "Tile {}: rows {}..{}, cols {}..{}",
                tile.id,
                tile.start_row,
                tile.start_row + tile.height,
                tile.start_col,
                tile.start_col + tile.width
            );
        }
        info!("Started {} tile workers.", tiles.len());

        let n = tiles.len();
        Ok(Self {
            tiles,
            grid_width: grid.width,
            commands,
            reports,
            handles,
            owner,
            candidates: vec![Vec::new(); n],
            positions: vec![Vec::new(); n],
        })
    }

    pub fn tiles(&self) -> &[TileDef] {
        &self.tiles
    }

    fn send(&self, zone: usize, command: Command) -> Result<()> {
        self.commands[zone]
            .send(command)
            .map_err(|_| anyhow!("Worker for tile {} is gone.", zone))
    }

    /// Sends every tile the command built from its slice of `state`.
    fn broadcast<F>(&self, state: &[i32], make: F) -> Result<()>
    where
        F: Fn(usize, Vec<i32>) -> Command,
    {
        for tile in &self.tiles {
            self.send(tile.id, make(tile.id, tile.cut(state, self.grid_width)))?;
        }
        Ok(())
    }

    fn recv(&self) -> Result<Report> {
        let report = self
            .reports
            .recv()
            .map_err(|_| anyhow!("All tile workers disconnected."))?;
        match report {
            Report::Failed { zone, error } => Err(anyhow!("Worker for tile {} failed: {}", zone, error)),
            report => Ok(report),
        }
    }

    fn await_acks(&self) -> Result<()> {
        for _ in 0..self.tiles.len() {
            match self.recv()? {
                Report::Ack { .. } => {}
                other => anyhow::bail!("Expected an acknowledgement, got {:?}", other),
            }
        }
        Ok(())
    }
}

impl FieldBackend for Coordinator {
    fn warm_up(&mut self, grid: &mut Grid, sweeps: usize) -> Result<()> {
        self.broadcast(&grid.discharge_state, |_, discharge_state| Command::Warmup { discharge_state, sweeps })?;
        self.await_acks()
    }

    fn relax_and_weigh(&mut self, grid: &mut Grid, frontier: &Frontier, power: i32, weights: &mut Vec<f64>) -> Result<()> {
        // --- Split the frontier by owning tile, remembering each candidate's global position ---
        self.candidates.iter_mut().for_each(Vec::clear);
        self.positions.iter_mut().for_each(Vec::clear);
        for (position, &cell) in frontier.cells().iter().enumerate() {
            let (zone, local) = self.owner[cell];
            self.candidates[zone].push(local);
            self.positions[zone].push(position);
        }

        for tile in &self.tiles {
            let command = Command::Step {
                power,
                discharge_state: tile.cut(&grid.discharge_state, self.grid_width),
                candidates: self.candidates[tile.id].clone(),
            };
            self.send(tile.id, command)?;
        }

        // --- Gather: reports arrive in any order, each lands in its frontier slots ---
        weights.clear();
        weights.resize(frontier.len(), 0.0);
        for _ in 0..self.tiles.len() {
            match self.recv()? {
                Report::Weights { zone, weights: local } => {
                    let slots = &self.positions[zone];
                    if local.len() != slots.len() {
                        anyhow::bail!("Tile {} reported {} weights for {} candidates.", zone, local.len(), slots.len());
                    }
                    for (&slot, w) in slots.iter().zip(local) {
                        weights[slot] = w;
                    }
                }
                other => anyhow::bail!("Expected candidate weights, got {:?}", other),
            }
        }
        Ok(())
    }

    fn finish_episode(&mut self, grid: &mut Grid, boundary_scale: f64) -> Result<()> {
        grid.update_boundary(boundary_scale);
        self.broadcast(&grid.discharge_state, |_, discharge_state| Command::Finish { discharge_state, boundary_scale })?;
        self.await_acks()
    }

    fn gather_charge(&mut self, grid: &mut Grid) -> Result<()> {
        for tile in &self.tiles {
            self.send(tile.id, Command::Collect)?;
        }
        for _ in 0..self.tiles.len() {
            match self.recv()? {
                Report::Charge { zone, charge } => self.tiles[zone].paste(&charge, &mut grid.charge, self.grid_width),
                other => anyhow::bail!("Expected a charge field, got {:?}", other),
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        for tx in &self.commands {
            // a worker that already exited reports its error through join below
            let _ = tx.send(Command::Shutdown);
        }
        let mut first_error = None;
        for (zone, handle) in self.handles.drain(..).enumerate() {
            let outcome = match handle.join() {
                Ok(result) => result.with_context(|| format!("Worker for tile {} failed", zone)),
                Err(_) => Err(anyhow!("Worker for tile {} panicked", zone)),
            };
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        if let Err(e) = self.shutdown() {
            warn!("Tile workers did not shut down cleanly: {:#}", e);
        }
    }
}
