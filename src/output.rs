//! Result files of a run: the text dump, serialized snapshots and per-episode statistics.

use crate::simulation::EpisodeReport;
use anyhow::{Context, Result};
use lichtenberg_common::dump;
use lichtenberg_common::EpisodeSnapshot;
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Serialization format of the snapshot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Json,
    Bincode,
    MessagePack,
}

impl SnapshotFormat {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "json" => Ok(SnapshotFormat::Json),
            "bincode" => Ok(SnapshotFormat::Bincode),
            "messagepack" => Ok(SnapshotFormat::MessagePack),
            other => anyhow::bail!("Unknown snapshot format '{}'.", other),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            SnapshotFormat::Json => "json",
            SnapshotFormat::Bincode => "bin",
            SnapshotFormat::MessagePack => "msgpack",
        }
    }
}

/// Writes all snapshots to `<base>_snapshots.<ext>` and returns the path.
pub fn save_snapshots(base: &str, format: SnapshotFormat, snapshots: &[EpisodeSnapshot]) -> Result<PathBuf> {
    let path = PathBuf::from(format!("{}_snapshots.{}", base, format.extension()));
    let file = File::create(&path).with_context(|| format!("Error creating snapshot file '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    match format {
        SnapshotFormat::Json => serde_json::to_writer(&mut writer, snapshots).context("Error serializing snapshots to JSON")?,
        SnapshotFormat::Bincode => bincode::serialize_into(&mut writer, snapshots).context("Error serializing snapshots to bincode")?,
        SnapshotFormat::MessagePack => {
            rmp_serde::encode::write(&mut writer, snapshots).context("Error serializing snapshots to MessagePack")?
        }
    }
    writer.flush()?;
    info!("All snapshots saved to {} ({:?} format)", path.display(), format);
    Ok(path)
}

/// Streams the text dump: a header first, then one block per episode as it finishes.
pub struct DumpWriter {
    out: Box<dyn Write>,
    width: usize,
}

impl DumpWriter {
    /// Dump to `<base>.out`.
    pub fn create(base: &str, width: usize, height: usize, episodes: u32) -> Result<Self> {
        let path = format!("{}.out", base);
        let file = File::create(&path).with_context(|| format!("Error creating dump file '{}'", path))?;
        Self::new(Box::new(BufWriter::new(file)), width, height, episodes)
    }

    pub fn stdout(width: usize, height: usize, episodes: u32) -> Result<Self> {
        Self::new(Box::new(BufWriter::new(std::io::stdout())), width, height, episodes)
    }

    pub fn new(mut out: Box<dyn Write>, width: usize, height: usize, episodes: u32) -> Result<Self> {
        dump::write_header(&mut out, height, width, episodes)?;
        Ok(Self { out, width })
    }

    pub fn write_episode(&mut self, state: &[i32]) -> Result<()> {
        dump::write_episode(&mut self.out, self.width, state)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Per-episode statistics as CSV.
pub struct StatsWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl StatsWriter<File> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let writer = csv::Writer::from_path(path.as_ref())
            .with_context(|| format!("Error creating stats file '{}'", path.as_ref().display()))?;
        Self::from_writer(writer)
    }
}

impl<W: Write> StatsWriter<W> {
    pub fn from_writer(mut writer: csv::Writer<W>) -> Result<Self> {
        writer.write_record(["episode", "steps", "channel_cells", "power_remaining", "exhausted", "truncated_walks", "millis"])?;
        Ok(Self { writer })
    }

    pub fn record(&mut self, report: &EpisodeReport, millis: f64) -> Result<()> {
        self.writer.write_record(&[
            report.episode.to_string(),
            report.steps.to_string(),
            report.channel_cells.to_string(),
            report.power_remaining.to_string(),
            report.exhausted.to_string(),
            report.truncated_walks.to_string(),
            format!("{:.3}", millis),
        ])?;
        Ok(())
    }

    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        self.writer.into_inner().map_err(|e| anyhow::anyhow!("Error flushing stats: {}", e.error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_rows_follow_the_header() {
        let mut stats = StatsWriter::from_writer(csv::Writer::from_writer(Vec::new())).unwrap();
        let report = EpisodeReport {
            episode: 2,
            steps: 17,
            channel_cells: 19,
            power_remaining: 0,
            exhausted: false,
            truncated_walks: 0,
        };
        stats.record(&report, 1.5).unwrap();
        let text = String::from_utf8(stats.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "episode,steps,channel_cells,power_remaining,exhausted,truncated_walks,millis");
        assert_eq!(lines[1], "2,17,19,0,false,0,1.500");
    }

    #[test]
    fn snapshot_formats_are_named() {
        assert_eq!(SnapshotFormat::parse("bincode").unwrap(), SnapshotFormat::Bincode);
        assert_eq!(SnapshotFormat::parse("messagepack").unwrap().extension(), "msgpack");
        assert!(SnapshotFormat::parse("yaml").is_err());
    }

    fn snapshot(episode: u32, charge: Option<Vec<f64>>) -> EpisodeSnapshot {
        EpisodeSnapshot {
            episode,
            width: 2,
            height: 2,
            steps: 3,
            channel_cells: 2,
            power_remaining: 0,
            discharge_state: vec![2, 0, 1, -1],
            charge,
        }
    }

    #[test]
    fn binary_snapshots_without_charge_decode() {
        let base = std::env::temp_dir().join(format!("lichtenberg_output_{}", std::process::id()));
        let base = base.to_str().unwrap();
        let snapshots = vec![snapshot(0, None), snapshot(1, Some(vec![0.0, 0.5, 0.0, 1.0])), snapshot(2, None)];

        let path = save_snapshots(base, SnapshotFormat::Bincode, &snapshots).unwrap();
        let decoded: Vec<EpisodeSnapshot> = bincode::deserialize_from(File::open(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].charge, None);
        assert_eq!(decoded[1].charge.as_deref(), Some(&[0.0, 0.5, 0.0, 1.0][..]));
        assert_eq!(decoded[2].discharge_state, vec![2, 0, 1, -1]);

        let path = save_snapshots(base, SnapshotFormat::MessagePack, &snapshots).unwrap();
        let decoded: Vec<EpisodeSnapshot> = rmp_serde::from_read(File::open(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].charge, None);
        assert_eq!(decoded[2].episode, 2);
        assert!(decoded[1].charge.is_some());
    }

    #[test]
    fn dump_blocks_parse_back() {
        let buf = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        struct Shared(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);
        impl Write for Shared {
            fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
                self.0.borrow_mut().extend_from_slice(data);
                Ok(data.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut dump = DumpWriter::new(Box::new(Shared(buf.clone())), 3, 2, 2).unwrap();
        dump.write_episode(&[0, 1, 0, 0, 2, -1]).unwrap();
        dump.write_episode(&[0, 0, 0, 0, 0, -1]).unwrap();
        dump.finish().unwrap();

        let text = String::from_utf8(buf.borrow().clone()).unwrap();
        assert!(text.starts_with("2 3 2\n0 1 0\n0 2 -1\n\n"));
        let parsed = dump::parse_dump(&text).unwrap();
        assert_eq!(parsed.episodes.len(), 2);
        assert_eq!(parsed.episodes[1][5], -1);
    }
}
