//! Reader and writer for the line-oriented graph file that seeds a simulation.
//!
//! ```text
//! <width> <height> <power> <eta>
//! <num_positive_seeds>
//! <row> <col>
//! ...
//! <num_negative_seeds>
//! <row> <col>
//! ...
//! ```

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Errors while reading a graph file.
#[derive(Debug, Error)]
pub enum GraphFileError {
    #[error("Failed to read graph file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    FormatError { line: usize, message: String },

    #[error("Seed at line {line} ({row}, {col}) lies outside the {width}x{height} grid")]
    SeedOutOfBounds {
        line: usize,
        row: usize,
        col: usize,
        width: usize,
        height: usize,
    },
}

/// A seed layout as stored on disk: grid geometry, episode budget and seed cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLayout {
    pub width: usize,
    pub height: usize,
    pub power: i32,
    pub eta: f64,
    /// Source cells as `(row, col)`.
    pub positive: Vec<(usize, usize)>,
    /// Ground cells as `(row, col)`.
    pub negative: Vec<(usize, usize)>,
}

impl GraphLayout {
    /// Flattened row-major seed state: +1 for sources, -1 for grounds, 0 elsewhere.
    /// Grounds are applied after sources, so a cell listed in both ends up grounded.
    pub fn seed_state(&self) -> Vec<i32> {
        let mut state = vec![0; self.width * self.height];
        for &(row, col) in &self.positive {
            state[row * self.width + col] = 1;
        }
        for &(row, col) in &self.negative {
            state[row * self.width + col] = -1;
        }
        state
    }
}

struct LineCursor<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
}

impl<'a> LineCursor<'a> {
    fn new(content: &'a str) -> Self {
        Self { lines: content.lines().enumerate() }
    }

    /// Next line with its 1-based number; blank lines are skipped.
    fn next_line(&mut self, what: &str) -> Result<(usize, &'a str), GraphFileError> {
        for (idx, line) in self.lines.by_ref() {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok((idx + 1, trimmed));
            }
        }
        Err(GraphFileError::FormatError {
            line: 0,
            message: format!("Unexpected end of file while reading {}", what),
        })
    }
}

fn parse_field<T: std::str::FromStr>(token: Option<&str>, line: usize, name: &str) -> Result<T, GraphFileError> {
    let token = token.ok_or_else(|| GraphFileError::FormatError {
        line,
        message: format!("Missing {}", name),
    })?;
    token.parse().map_err(|_| GraphFileError::FormatError {
        line,
        message: format!("Invalid {}: '{}'", name, token),
    })
}

fn parse_seeds(
    cursor: &mut LineCursor<'_>,
    kind: &str,
    width: usize,
    height: usize,
) -> Result<Vec<(usize, usize)>, GraphFileError> {
    let (line, text) = cursor.next_line(&format!("{} seed count", kind))?;
    let count: usize = parse_field(text.split_whitespace().next(), line, &format!("{} seed count", kind))?;

    let mut seeds = Vec::with_capacity(count);
    for _ in 0..count {
        let (line, text) = cursor.next_line(&format!("{} seed", kind))?;
        let mut parts = text.split_whitespace();
        let row: usize = parse_field(parts.next(), line, "seed row")?;
        let col: usize = parse_field(parts.next(), line, "seed column")?;
        if row >= height || col >= width {
            return Err(GraphFileError::SeedOutOfBounds { line, row, col, width, height });
        }
        seeds.push((row, col));
    }
    Ok(seeds)
}

/// Parse a graph file held in memory.
pub fn parse_graph(content: &str) -> Result<GraphLayout, GraphFileError> {
    let mut cursor = LineCursor::new(content);

    let (line, header) = cursor.next_line("header")?;
    let mut parts = header.split_whitespace();
    let width: usize = parse_field(parts.next(), line, "width")?;
    let height: usize = parse_field(parts.next(), line, "height")?;
    let power: i32 = parse_field(parts.next(), line, "power")?;
    let eta: f64 = parse_field(parts.next(), line, "eta")?;

    if width == 0 || height == 0 {
        return Err(GraphFileError::FormatError {
            line,
            message: format!("Grid must be at least 1x1, got {}x{}", width, height),
        });
    }
    if !eta.is_finite() {
        return Err(GraphFileError::FormatError {
            line,
            message: "eta must be finite".into(),
        });
    }

    let positive = parse_seeds(&mut cursor, "positive", width, height)?;
    let negative = parse_seeds(&mut cursor, "negative", width, height)?;

    Ok(GraphLayout { width, height, power, eta, positive, negative })
}

/// Read and parse a graph file from disk.
pub fn read_graph<P: AsRef<Path>>(path: P) -> Result<GraphLayout, GraphFileError> {
    let content = std::fs::read_to_string(path)?;
    parse_graph(&content)
}

/// Write a layout in the graph file format.
pub fn write_graph<W: Write>(layout: &GraphLayout, out: &mut W) -> std::io::Result<()> {
    writeln!(out, "{} {} {} {}", layout.width, layout.height, layout.power, layout.eta)?;
    writeln!(out, "{}", layout.positive.len())?;
    for (row, col) in &layout.positive {
        writeln!(out, "{} {}", row, col)?;
    }
    writeln!(out, "{}", layout.negative.len())?;
    for (row, col) in &layout.negative {
        writeln!(out, "{} {}", row, col)?;
    }
    Ok(())
}
