use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use lichtenberg_common::graph_file::{read_graph, write_graph};
use lichtenberg_common::{ExecutionModel, SimulationConfig};
use lichtenberg_engine::generate::{generate_layout, GenerateMode};
use lichtenberg_engine::output::{save_snapshots, DumpWriter, SnapshotFormat, StatsWriter};
use lichtenberg_engine::build_engine;
use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(version, about = "Lichtenberg figure growth by dielectric breakdown")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run growth episodes and write their discharge patterns.
    Run(RunArgs),
    /// Write a synthetic graph file.
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
    /// Graph file, overriding input.graph_file.
    #[arg(short, long)]
    graph: Option<PathBuf>,
    /// Number of episodes.
    #[arg(short = 'n', long)]
    episodes: Option<u32>,
    /// Seed of the growth RNG.
    #[arg(short, long)]
    seed: Option<u64>,
    /// Thread-pool size or tile count.
    #[arg(short, long)]
    workers: Option<usize>,
    /// Execution model.
    #[arg(short, long, value_parser = parse_model)]
    model: Option<ExecutionModel>,
    /// Output base name; `-` dumps to stdout.
    #[arg(short, long)]
    output: Option<String>,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Graph file to write.
    output: PathBuf,
    /// Width and height of the square grid.
    width: usize,
    #[arg(long, value_enum, default_value_t = GenerateMode::Point)]
    mode: GenerateMode,
    #[arg(long, default_value_t = 1)]
    power: i32,
    #[arg(long, default_value_t = 1.0)]
    eta: f64,
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

fn parse_model(name: &str) -> Result<ExecutionModel, String> {
    match name {
        "serial" => Ok(ExecutionModel::Serial),
        "threads" => Ok(ExecutionModel::Threads),
        "message_passing" | "mpi" => Ok(ExecutionModel::MessagePassing),
        other => Err(format!("unknown model '{}' (serial, threads, message_passing)", other)),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args),
        Command::Generate(args) => generate(args),
    }
}

fn generate(args: GenerateArgs) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let layout = generate_layout(args.width, args.mode, args.power, args.eta, &mut rng)?;
    let file = File::create(&args.output)
        .with_context(|| format!("Error creating graph file '{}'", args.output.display()))?;
    write_graph(&layout, &mut BufWriter::new(file))?;
    info!(
        "Wrote {:?} layout {}x{} ({} sources, {} grounds) to {}",
        args.mode,
        layout.width,
        layout.height,
        layout.positive.len(),
        layout.negative.len(),
        args.output.display()
    );
    Ok(())
}

fn run(args: RunArgs) -> Result<()> {
    info!("Starting Lichtenberg engine...");

    // --- Load Configuration ---
    let mut config = if args.config.exists() {
        SimulationConfig::load(&args.config)?
    } else if let Some(graph) = &args.graph {
        warn!("Config file '{}' not found, running with defaults.", args.config.display());
        SimulationConfig::defaults_for(graph.clone())
    } else {
        anyhow::bail!("Config file '{}' not found and no graph file given.", args.config.display());
    };
    if let Some(graph) = args.graph {
        config.input.graph_file = graph;
    }
    if let Some(episodes) = args.episodes {
        config.run.episodes = episodes;
    }
    if let Some(seed) = args.seed {
        config.run.rng_seed = seed;
    }
    if let Some(workers) = args.workers {
        config.parallel.workers = workers;
    }
    if let Some(model) = args.model {
        config.parallel.model = model;
    }
    if let Some(output) = args.output {
        config.output.base_filename = output;
    }
    config.validate()?;
    let params = config.get_sim_params();
    debug!("Simulation Parameters: {:#?}", params);

    // --- Load Graph ---
    let layout = read_graph(&config.input.graph_file)
        .with_context(|| format!("Failed to load graph '{}'", config.input.graph_file.display()))?;
    info!(
        "Loaded {}x{} grid (power {}, eta {}) with {} sources and {} grounds.",
        layout.width,
        layout.height,
        layout.power,
        layout.eta,
        layout.positive.len(),
        layout.negative.len()
    );

    // --- Build Engine ---
    let mut engine = build_engine(&layout, &params)?;
    let (width, height) = engine.dimensions();

    let mut dump = if !config.output.dump {
        None
    } else if config.output.base_filename == "-" {
        Some(DumpWriter::stdout(width, height, params.episodes)?)
    } else {
        Some(DumpWriter::create(&config.output.base_filename, width, height, params.episodes)?)
    };
    let mut stats = if config.output.save_stats {
        Some(StatsWriter::create(format!("{}_stats.csv", config.output.base_filename))?)
    } else {
        None
    };
    let format = config.output.format.as_deref().map(SnapshotFormat::parse).transpose()?;
    let mut snapshots = Vec::new();

    let start_time = Instant::now();
    engine.warm_up()?;
    info!("Warm-up finished in {:.2} ms.", start_time.elapsed().as_secs_f64() * 1000.0);

    // --- Episode Loop ---
    info!("Running {} episodes...", params.episodes);
    for _ in 0..params.episodes {
        let episode_start = Instant::now();
        let report = engine.run_episode()?;
        let millis = episode_start.elapsed().as_secs_f64() * 1000.0;

        info!(
            "Episode [{}/{}] | Steps: {} | Channel: {} | Power left: {} | Time: {:6.2} ms",
            report.episode + 1,
            params.episodes,
            report.steps,
            report.channel_cells,
            report.power_remaining,
            millis
        );
        if report.truncated_walks > 0 {
            warn!("Episode {}: {} discharge walks hit the hop limit.", report.episode, report.truncated_walks);
        }
        trace!("Episode {} report: {:?}", report.episode, report);

        if let Some(dump) = dump.as_mut() {
            dump.write_episode(engine.discharge_state())?;
        }
        if let Some(stats) = stats.as_mut() {
            stats.record(&report, millis)?;
        }
        if format.is_some() {
            snapshots.push(engine.snapshot(&report, config.output.save_charge)?);
        }
    }

    let total_duration = start_time.elapsed();
    info!(
        "Simulation finished in {:.3} seconds ({:.3} ms per episode).",
        total_duration.as_secs_f64(),
        total_duration.as_secs_f64() * 1000.0 / params.episodes.max(1) as f64
    );
    engine.shutdown()?;

    // --- Save Recorded Data ---
    if let Some(dump) = dump {
        dump.finish()?;
    }
    if let Some(stats) = stats {
        stats.into_inner()?;
        info!("Episode statistics saved to {}_stats.csv", config.output.base_filename);
    }
    match format {
        Some(format) => {
            save_snapshots(&config.output.base_filename, format, &snapshots)?;
        }
        None => info!("Skipping snapshots (no output.format configured)."),
    }
    info!("Simulation Complete.");
    Ok(())
}
