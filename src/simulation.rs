use crate::coordinator::Coordinator;
use crate::discharge::claim_site;
use crate::frontier::Frontier;
use crate::grid::Grid;
use crate::selector::{build_cumulative, site_weight, SiteSampler, WeightedSampler};
use crate::solver;
use anyhow::{Context, Result};
use lichtenberg_common::{EpisodeSnapshot, ExecutionModel, GraphLayout, SimParams};
use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Phases of one growth step. Every phase completes on all participants before the next starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Tiles trade edge values with their neighbours (message-passing model only).
    Exchange,
    /// One relaxation sweep and the per-candidate weights.
    Relax,
    /// The single global growth decision, made by one owner while the others wait.
    Decide,
}

/// Summary of one growth episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeReport {
    pub episode: u32,
    /// Growth steps taken; each is one sweep plus one selection.
    pub steps: u32,
    pub channel_cells: u32,
    /// Budget left when the episode stopped.
    pub power_remaining: i32,
    /// The episode ended because no candidate had positive weight.
    pub exhausted: bool,
    /// Discharge walks cut short by the hop bound.
    pub truncated_walks: u32,
}

/// Common surface of the execution models.
pub trait GrowthEngine {
    /// Resets the field and runs the warm-up sweeps that precede the first episode.
    fn warm_up(&mut self) -> Result<()>;
    /// Grows one discharge pattern until the budget is spent or no candidate remains.
    fn run_episode(&mut self) -> Result<EpisodeReport>;
    fn discharge_state(&self) -> &[i32];
    /// Current potential field, gathered from the workers first where it is distributed.
    fn charge(&mut self) -> Result<&[f64]>;
    /// `(width, height)` of the grid.
    fn dimensions(&self) -> (usize, usize);
    /// Stops any worker threads. Further calls are errors.
    fn shutdown(&mut self) -> Result<()>;

    /// Captures the state after an episode for serialization.
    fn snapshot(&mut self, report: &EpisodeReport, with_charge: bool) -> Result<EpisodeSnapshot> {
        let (width, height) = self.dimensions();
        let charge = if with_charge { Some(self.charge()?.to_vec()) } else { None };
        Ok(EpisodeSnapshot {
            episode: report.episode,
            width,
            height,
            steps: report.steps,
            channel_cells: report.channel_cells,
            power_remaining: report.power_remaining,
            discharge_state: self.discharge_state().to_vec(),
            charge,
        })
    }
}

/// Where the potential field lives and how it is relaxed.
///
/// The episode loop in [`Simulation`] owns the grid, the frontier and the sampler; a
/// backend only keeps the field current and reports the growth weight of every
/// frontier member, in frontier order.
pub trait FieldBackend {
    fn warm_up(&mut self, grid: &mut Grid, sweeps: usize) -> Result<()>;

    /// Runs one sweep against the current channel and fills `weights` for the frontier.
    fn relax_and_weigh(&mut self, grid: &mut Grid, frontier: &Frontier, power: i32, weights: &mut Vec<f64>) -> Result<()>;

    /// Writes the boundary memory of the finished episode.
    fn finish_episode(&mut self, grid: &mut Grid, boundary_scale: f64) -> Result<()>;

    /// Copies the current field into `grid.charge`.
    fn gather_charge(&mut self, grid: &mut Grid) -> Result<()>;

    fn shutdown(&mut self) -> Result<()>;
}

/// Field held in the grid itself, relaxed on the calling thread or on a dedicated rayon pool.
pub struct LocalField {
    pool: Option<ThreadPool>,
}

impl LocalField {
    pub fn serial() -> Self {
        Self { pool: None }
    }

    /// Shared-memory model: sweeps run data-parallel on a pool of `workers` threads.
    pub fn threaded(workers: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("relax-{}", i))
            .build()
            .context("Failed to build relaxation thread pool")?;
        Ok(Self { pool: Some(pool) })
    }

    fn sweep(&self, grid: &mut Grid) {
        match &self.pool {
            // install() returns only after every row task has joined, so the swap inside
            // relax_parallel never overlaps a writer.
            Some(pool) => pool.install(|| solver::relax_parallel(grid)),
            None => solver::relax(grid),
        }
    }
}

impl FieldBackend for LocalField {
    fn warm_up(&mut self, grid: &mut Grid, sweeps: usize) -> Result<()> {
        match &self.pool {
            Some(pool) => pool.install(|| solver::warm_up(grid, sweeps, true)),
            None => solver::warm_up(grid, sweeps, false),
        }
        Ok(())
    }

    fn relax_and_weigh(&mut self, grid: &mut Grid, frontier: &Frontier, _power: i32, weights: &mut Vec<f64>) -> Result<()> {
        self.sweep(grid);
        weights.clear();
        weights.extend(
            frontier
                .cells()
                .iter()
                .map(|&c| site_weight(grid.charge[c], grid.discharge_state[c], grid.eta)),
        );
        Ok(())
    }

    fn finish_episode(&mut self, grid: &mut Grid, boundary_scale: f64) -> Result<()> {
        grid.update_boundary(boundary_scale);
        Ok(())
    }

    fn gather_charge(&mut self, _grid: &mut Grid) -> Result<()> {
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.pool = None;
        Ok(())
    }
}

/// Owns the authoritative grid and runs growth episodes against a field backend.
pub struct Simulation<S, B> {
    grid: Grid,
    frontier: Frontier,
    sampler: S,
    backend: B,
    params: SimParams,
    episode: u32,
    phase: Phase,
    // Reused per step
    weights: Vec<f64>,
    cumulative: Vec<f64>,
}

impl<S: SiteSampler, B: FieldBackend> Simulation<S, B> {
    pub fn new(grid: Grid, backend: B, sampler: S, params: SimParams) -> Self {
        let frontier = Frontier::new(grid.num_cells(), params.frontier);
        Self {
            grid,
            frontier,
            sampler,
            backend,
            params,
            episode: 0,
            phase: Phase::Decide,
            weights: Vec::new(),
            cumulative: Vec::new(),
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    /// Last phase the episode loop entered: `Relax` or `Decide`.
    /// `Exchange` happens inside tile workers and is never reported here.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// One growth step: relax, weigh the frontier, draw, claim.
    /// Returns `None` if no candidate had positive weight, else the power consumed.
    fn grow_once(&mut self, power: i32, truncated_walks: &mut u32) -> Result<Option<i32>> {
        self.phase = Phase::Relax;
        self.backend
            .relax_and_weigh(&mut self.grid, &self.frontier, power, &mut self.weights)?;

        self.phase = Phase::Decide;
        let total = build_cumulative(self.weights.iter().copied(), &mut self.cumulative);
        let Some(position) = self.sampler.pick(&self.cumulative) else {
            debug!("No candidate among {} frontier cells (total weight {}).", self.frontier.len(), total);
            return Ok(None);
        };

        let cell = self.frontier.cells()[position];
        trace!("Claiming cell {:?} with power {}.", self.grid.coords(cell), power);
        let outcome = claim_site(&mut self.grid, &mut self.frontier, cell, self.params.discharge_hop_limit);
        if outcome.truncated {
            *truncated_walks += 1;
        }
        Ok(Some(outcome.consumed))
    }
}

impl<S: SiteSampler, B: FieldBackend> GrowthEngine for Simulation<S, B> {
    fn warm_up(&mut self) -> Result<()> {
        self.grid.reset_discharge();
        self.grid.reset_charge();
        self.grid.reset_boundary();
        let sweeps = self.params.warmup_sweeps_for(self.grid.width, self.grid.height);
        debug!("Running {} warm-up sweeps.", sweeps);
        self.phase = Phase::Relax;
        self.backend.warm_up(&mut self.grid, sweeps)
    }

    fn run_episode(&mut self) -> Result<EpisodeReport> {
        let episode = self.episode;
        self.episode += 1;

        // --- Reset the channel and rebuild the frontier from the seeds ---
        let mut power = self.grid.power;
        self.grid.reset_discharge();
        self.grid.reset_path();
        self.frontier.rebuild(&mut self.grid);

        let mut steps = 0u32;
        let mut truncated_walks = 0u32;
        let mut exhausted = false;

        // --- Growth loop ---
        while power > 0 {
            self.frontier.refresh(&mut self.grid);
            if self.frontier.is_empty() {
                exhausted = true;
                break;
            }
            match self.grow_once(power, &mut truncated_walks)? {
                Some(consumed) => {
                    power -= consumed;
                    steps += 1;
                }
                None => {
                    exhausted = true;
                    break;
                }
            }
        }

        // --- Channel memory for the next episode ---
        self.backend
            .finish_episode(&mut self.grid, self.params.boundary_memory_scale)?;

        let report = EpisodeReport {
            episode,
            steps,
            channel_cells: self.grid.channel_len() as u32,
            power_remaining: power,
            exhausted,
            truncated_walks,
        };
        if exhausted && power > 0 {
            debug!("Episode {} ran out of candidates with power {} left.", episode, power);
        }
        Ok(report)
    }

    fn discharge_state(&self) -> &[i32] {
        &self.grid.discharge_state
    }

    fn charge(&mut self) -> Result<&[f64]> {
        self.backend.gather_charge(&mut self.grid)?;
        Ok(&self.grid.charge)
    }

    fn dimensions(&self) -> (usize, usize) {
        (self.grid.width, self.grid.height)
    }

    fn shutdown(&mut self) -> Result<()> {
        self.backend.shutdown()
    }
}

/// Builds the engine selected by `params.model` with a sampler seeded from `params.rng_seed`.
pub fn build_engine(layout: &GraphLayout, params: &SimParams) -> Result<Box<dyn GrowthEngine>> {
    let grid = Grid::from_layout(layout)?;
    let sampler = WeightedSampler::new(StdRng::seed_from_u64(params.rng_seed));
    build_engine_with(grid, sampler, params)
}

/// As [`build_engine`], with a caller-supplied sampler.
pub fn build_engine_with<S>(grid: Grid, sampler: S, params: &SimParams) -> Result<Box<dyn GrowthEngine>>
where
    S: SiteSampler + 'static,
{
    info!(
        "Building {:?} engine for a {}x{} grid with {} worker(s).",
        params.model, grid.width, grid.height, params.workers
    );
    let engine: Box<dyn GrowthEngine> = match params.model {
        ExecutionModel::Serial => Box::new(Simulation::new(grid, LocalField::serial(), sampler, params.clone())),
        ExecutionModel::Threads => {
            let backend = LocalField::threaded(params.workers)?;
            Box::new(Simulation::new(grid, backend, sampler, params.clone()))
        }
        ExecutionModel::MessagePassing => {
            let coordinator = Coordinator::spawn(&grid, params)?;
            Box::new(Simulation::new(grid, coordinator, sampler, params.clone()))
        }
    };
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lichtenberg_common::FrontierStrategy;

    fn layout(positive: Vec<(usize, usize)>, negative: Vec<(usize, usize)>, power: i32) -> GraphLayout {
        GraphLayout { width: 9, height: 7, power, eta: 1.0, positive, negative }
    }

    fn serial(layout: &GraphLayout, seed: u64, frontier: FrontierStrategy) -> Simulation<WeightedSampler<StdRng>, LocalField> {
        let params = SimParams { rng_seed: seed, frontier, ..SimParams::default() };
        Simulation::new(
            Grid::from_layout(layout).unwrap(),
            LocalField::serial(),
            WeightedSampler::new(StdRng::seed_from_u64(seed)),
            params,
        )
    }

    #[test]
    fn episode_spends_the_whole_budget() {
        let layout = layout(vec![(0, 4)], vec![(6, 1), (6, 7)], 2);
        let mut sim = serial(&layout, 3, FrontierStrategy::Incremental);
        sim.warm_up().unwrap();
        let report = sim.run_episode().unwrap();

        assert_eq!(report.episode, 0);
        assert_eq!(report.power_remaining, 0);
        assert!(!report.exhausted);
        assert_eq!(report.truncated_walks, 0);
        // both grounds were reached and turned into channel cells
        assert!(sim.grid().is_channel(sim.grid().idx(6, 1)));
        assert!(sim.grid().is_channel(sim.grid().idx(6, 7)));
        assert_eq!(report.channel_cells as usize, sim.grid().channel_len());
        assert!(sim.frontier().is_consistent(sim.grid()));
        assert_eq!(sim.phase(), Phase::Decide);
    }

    #[test]
    fn boundary_remembers_the_discharge_path() {
        let layout = layout(vec![(0, 4)], vec![(6, 4)], 1);
        let mut sim = serial(&layout, 11, FrontierStrategy::Incremental);
        sim.warm_up().unwrap();
        sim.run_episode().unwrap();

        let grid = sim.grid();
        for idx in 0..grid.num_cells() {
            if grid.discharge_state[idx] > 1 {
                assert!(grid.boundary[idx] > 0.0);
            } else {
                assert_eq!(grid.boundary[idx], 0.0);
            }
        }
        // the source lies on the path of the discharge
        assert_eq!(grid.discharge_state[grid.idx(0, 4)], 2);
    }

    #[test]
    fn rescan_strategy_keeps_frontier_valid() {
        let layout = layout(vec![(3, 0)], vec![(0, 8), (6, 8)], 2);
        let mut sim = serial(&layout, 5, FrontierStrategy::Rescan);
        sim.warm_up().unwrap();
        for episode in 0..3 {
            let report = sim.run_episode().unwrap();
            assert_eq!(report.episode, episode);
            assert_eq!(report.power_remaining, 0);
            assert!(sim.frontier().is_consistent(sim.grid()));
        }
    }

    #[test]
    fn phase_follows_the_episode_loop() {
        let layout = layout(vec![(0, 4)], vec![(6, 4)], 1);
        let mut sim = serial(&layout, 2, FrontierStrategy::Incremental);
        assert_eq!(sim.phase(), Phase::Decide);
        sim.warm_up().unwrap();
        assert_eq!(sim.phase(), Phase::Relax);
        sim.run_episode().unwrap();
        assert_eq!(sim.phase(), Phase::Decide);
    }

    #[test]
    fn no_ground_exhausts_the_frontier() {
        let layout = GraphLayout { width: 3, height: 2, power: 4, eta: 1.0, positive: vec![(0, 0)], negative: vec![] };
        let mut sim = serial(&layout, 1, FrontierStrategy::Incremental);
        sim.warm_up().unwrap();
        let report = sim.run_episode().unwrap();
        // with no ground every potential stays at zero
        assert!(report.exhausted);
        assert_eq!(report.steps, 0);
        assert_eq!(report.power_remaining, 4);
    }

    #[test]
    fn threaded_backend_matches_serial() {
        let layout = layout(vec![(0, 2), (0, 6)], vec![(6, 4)], 2);
        let params = SimParams { rng_seed: 9, model: ExecutionModel::Threads, workers: 3, ..SimParams::default() };
        let mut threaded = build_engine(&layout, &params).unwrap();
        let mut plain = serial(&layout, 9, FrontierStrategy::Incremental);
        threaded.warm_up().unwrap();
        plain.warm_up().unwrap();
        for _ in 0..2 {
            threaded.run_episode().unwrap();
            plain.run_episode().unwrap();
            assert_eq!(threaded.discharge_state(), plain.discharge_state());
        }
        assert_eq!(threaded.charge().unwrap(), plain.charge().unwrap());
        threaded.shutdown().unwrap();
    }
}
