//! Plain-text episode dump: a `<height> <width> <episode_count>` header followed by
//! one block of space-separated discharge states per episode, each block ending in a
//! blank line.

use anyhow::{Context, Result};
use std::io::Write;

/// An episode dump read back into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeDump {
    pub width: usize,
    pub height: usize,
    /// Row-major discharge state, one entry per episode.
    pub episodes: Vec<Vec<i32>>,
}

/// Writes the header line announcing grid size and episode count.
pub fn write_header<W: Write>(out: &mut W, height: usize, width: usize, episodes: u32) -> std::io::Result<()> {
    writeln!(out, "{} {} {}", height, width, episodes)
}

/// Writes one episode block followed by the separating blank line.
pub fn write_episode<W: Write>(out: &mut W, width: usize, state: &[i32]) -> std::io::Result<()> {
    for row in state.chunks(width) {
        let mut first = true;
        for value in row {
            if !first {
                out.write_all(b" ")?;
            }
            write!(out, "{}", value)?;
            first = false;
        }
        out.write_all(b"\n")?;
    }
    out.write_all(b"\n")
}

/// Parses a dump produced by [`write_header`] and [`write_episode`].
/// A dump cut short after complete episodes is accepted, with fewer episodes than announced.
pub fn parse_dump(content: &str) -> Result<EpisodeDump> {
    let mut lines = content.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    let (_, header) = lines.next().context("Dump is empty")?;
    let fields: Vec<usize> = header
        .split_whitespace()
        .map(|t| t.parse::<usize>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("Bad dump header '{}'", header))?;
    if fields.len() != 3 {
        anyhow::bail!("Dump header must hold height, width and episode count, got '{}'", header);
    }
    let (height, width, announced) = (fields[0], fields[1], fields[2]);

    let mut episodes = Vec::with_capacity(announced);
    'episodes: for episode in 0..announced {
        let mut state = Vec::with_capacity(width * height);
        for row in 0..height {
            let Some((line_no, line)) = lines.next() else {
                if row == 0 {
                    log::warn!("Dump announces {} episodes but holds {}", announced, episode);
                    break 'episodes;
                }
                anyhow::bail!("Episode {} ends after {} of {} rows", episode, row, height);
            };
            let before = state.len();
            for token in line.split_whitespace() {
                let value: i32 = token
                    .parse()
                    .with_context(|| format!("Bad value '{}' on line {}", token, line_no + 1))?;
                state.push(value);
            }
            if state.len() - before != width {
                anyhow::bail!(
                    "Line {} holds {} values, expected {}",
                    line_no + 1,
                    state.len() - before,
                    width
                );
            }
        }
        episodes.push(state);
    }

    Ok(EpisodeDump { width, height, episodes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_layout_matches_format() {
        let mut buf = Vec::new();
        write_header(&mut buf, 2, 3, 1).unwrap();
        write_episode(&mut buf, 3, &[0, 1, 0, -1, 2, 0]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "2 3 1\n0 1 0\n-1 2 0\n\n");
    }

    #[test]
    fn parses_two_episodes() {
        let dump = parse_dump("2 2 2\n1 0\n0 -1\n\n1 1\n0 2\n\n").unwrap();
        assert_eq!(dump.width, 2);
        assert_eq!(dump.height, 2);
        assert_eq!(dump.episodes, vec![vec![1, 0, 0, -1], vec![1, 1, 0, 2]]);
    }

    #[test]
    fn short_row_is_an_error() {
        assert!(parse_dump("2 2 1\n1 0\n0\n\n").is_err());
    }

    #[test]
    fn truncated_dump_keeps_complete_episodes() {
        let dump = parse_dump("1 2 3\n1 0\n\n").unwrap();
        assert_eq!(dump.episodes.len(), 1);
    }
}
