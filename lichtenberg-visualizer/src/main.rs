use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use env_logger::Builder;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, ImageBuffer, Rgba, RgbaImage};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use lichtenberg_common::dump::parse_dump;
use lichtenberg_common::{EpisodeDump, EpisodeSnapshot};
use log::{info, warn, LevelFilter};
use palette::{FromColor, Hsv, Srgb};
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Command-line arguments for the visualizer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Episode dump (.out) or bincode snapshot file (.bin)
    #[arg(short, long)]
    input: PathBuf,

    /// Output animation (.gif)
    #[arg(short, long, default_value = "lightning.gif")]
    output: PathBuf,

    /// Pixels per grid cell
    #[arg(long, default_value_t = 1)]
    scale: u32,

    /// Display time of each episode in milliseconds
    #[arg(long, default_value_t = 500)]
    delay_ms: u32,

    /// Also write one PNG per episode into this directory
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// How channel magnitudes map to colors
    #[arg(long, value_enum, default_value_t = ColorMode::Gray)]
    color: ColorMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ColorMode {
    /// Brightness grows with the accumulated magnitude
    Gray,
    /// Blue for faint branches through red for the main channel
    Heat,
}

const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Gray level of a channel cell of magnitude `value`.
fn brightness(value: i32) -> u8 {
    ((value as f64 - 0.5) * 0.5 * 128.0).clamp(0.0, 255.0) as u8
}

/// HSV ramp from blue (magnitude 1) to red (`peak`).
fn heat_color(value: i32, peak: i32) -> Rgba<u8> {
    let t = if peak > 1 { (value - 1) as f32 / (peak - 1) as f32 } else { 1.0 };
    let hsv: Hsv = Hsv::new(240.0 * (1.0 - t.clamp(0.0, 1.0)), 1.0, 1.0);
    let rgb = Srgb::from_color(hsv);
    Rgba([
        (rgb.red * 255.0) as u8,
        (rgb.green * 255.0) as u8,
        (rgb.blue * 255.0) as u8,
        255,
    ])
}

fn cell_color(value: i32, peak: i32, mode: ColorMode) -> Rgba<u8> {
    if value <= 0 {
        return BACKGROUND;
    }
    match mode {
        ColorMode::Gray => {
            let l = brightness(value);
            Rgba([l, l, l, 255])
        }
        ColorMode::Heat => heat_color(value, peak),
    }
}

/// Renders one episode, each cell upscaled to a `scale` x `scale` block.
fn draw_frame(state: &[i32], width: usize, height: usize, scale: u32, mode: ColorMode) -> RgbaImage {
    let peak = state.iter().copied().max().unwrap_or(0);
    let scale = scale.max(1);
    ImageBuffer::from_fn(width as u32 * scale, height as u32 * scale, |x, y| {
        let (row, col) = ((y / scale) as usize, (x / scale) as usize);
        cell_color(state[row * width + col], peak, mode)
    })
}

/// Loads the episodes to render from a text dump or a bincode snapshot file.
fn load_episodes(path: &Path) -> Result<EpisodeDump> {
    if path.extension().is_some_and(|ext| ext == "bin") {
        let file = File::open(path).with_context(|| format!("Failed to open snapshot file '{}'", path.display()))?;
        let snapshots: Vec<EpisodeSnapshot> =
            bincode::deserialize_from(BufReader::new(file)).context("Failed to decode bincode snapshots")?;
        let first = snapshots.first().context("Snapshot file holds no episodes")?;
        let (width, height) = (first.width, first.height);
        if snapshots.iter().any(|s| s.width != width || s.height != height) {
            anyhow::bail!("Snapshots in '{}' disagree on the grid size", path.display());
        }
        return Ok(EpisodeDump {
            width,
            height,
            episodes: snapshots.into_iter().map(|s| s.discharge_state).collect(),
        });
    }

    let content = fs::read_to_string(path).with_context(|| format!("Failed to read dump '{}'", path.display()))?;
    parse_dump(&content)
}

fn main() -> Result<()> {
    let args = Args::parse();
    run_with_args(args)
}

fn run_with_args(args: Args) -> Result<()> {
    Builder::from_default_env().filter(None, LevelFilter::Info).init();

    info!("Starting Lichtenberg Visualizer...");
    info!("Input file: {}", args.input.display());
    info!("Output animation: {}", args.output.display());

    let dump = load_episodes(&args.input)?;
    info!(
        "Found {} episodes on a {}x{} grid",
        dump.episodes.len(),
        dump.width,
        dump.height
    );
    if dump.episodes.is_empty() {
        warn!("Nothing to render.");
        return Ok(());
    }

    // --- Render frames in parallel ---
    let start = Instant::now();
    let progress_bar = ProgressBar::new(dump.episodes.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({percent}%) [{eta}]")?
            .progress_chars("#>-"),
    );
    let images: Vec<RgbaImage> = dump
        .episodes
        .par_iter()
        .progress_with(progress_bar.clone())
        .map(|state| draw_frame(state, dump.width, dump.height, args.scale, args.color))
        .collect();
    progress_bar.finish_and_clear();
    info!("Rendered {} frames in {:.2} s", images.len(), start.elapsed().as_secs_f64());

    // --- Optional PNG frames ---
    if let Some(dir) = &args.frames_dir {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create '{}'", dir.display()))?;
        images.par_iter().enumerate().try_for_each(|(i, image)| {
            let path = dir.join(format!("episode_{:04}.png", i));
            image
                .save(&path)
                .with_context(|| format!("Failed to write frame '{}'", path.display()))
        })?;
        info!("Wrote {} PNG frames to {}", images.len(), dir.display());
    }

    // --- Encode looping GIF ---
    let file = File::create(&args.output).with_context(|| format!("Failed to create '{}'", args.output.display()))?;
    let mut encoder = GifEncoder::new(BufWriter::new(file));
    encoder.set_repeat(Repeat::Infinite)?;
    let delay = Delay::from_numer_denom_ms(args.delay_ms, 1);
    encoder
        .encode_frames(images.into_iter().map(|image| Frame::from_parts(image, 0, 0, delay)))
        .context("Failed to encode GIF")?;

    info!("Animation saved to {}", args.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brightness_follows_magnitude() {
        assert_eq!(brightness(1), 32);
        assert_eq!(brightness(2), 96);
        assert_eq!(brightness(100), 255);
    }

    #[test]
    fn only_channel_cells_are_lit() {
        assert_eq!(cell_color(0, 5, ColorMode::Gray), BACKGROUND);
        assert_eq!(cell_color(-1, 5, ColorMode::Heat), BACKGROUND);
        assert_ne!(cell_color(1, 5, ColorMode::Gray), BACKGROUND);
    }

    #[test]
    fn heat_runs_from_blue_to_red() {
        let faint = heat_color(1, 9);
        let hot = heat_color(9, 9);
        assert!(faint.0[2] > faint.0[0]);
        assert!(hot.0[0] > hot.0[2]);
    }

    #[test]
    fn frame_is_upscaled() {
        let state = [0, 2, 0, 1, 0, 0];
        let image = draw_frame(&state, 3, 2, 4, ColorMode::Gray);
        assert_eq!(image.dimensions(), (12, 8));
        assert_eq!(*image.get_pixel(5, 3), Rgba([96, 96, 96, 255]));
        assert_eq!(*image.get_pixel(0, 0), BACKGROUND);
        assert_eq!(*image.get_pixel(3, 7), Rgba([32, 32, 32, 255]));
    }
}
