use serde::{Serialize, Deserialize};

/// The discharge pattern and episode metrics recorded at the end of one growth episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeSnapshot {
    /// Zero-based episode index.
    pub episode: u32,
    pub width: usize,
    pub height: usize,
    /// Growth steps taken (one relaxation sweep plus one selection each).
    pub steps: u32,
    /// Number of cells with a positive discharge state.
    pub channel_cells: u32,
    /// Budget left when the episode stopped; positive only if the frontier ran dry.
    pub power_remaining: i32,
    /// Row-major discharge state at the end of the episode.
    pub discharge_state: Vec<i32>,
    /// Row-major potential field; `None` unless `output.save_charge` is set.
    /// Always written, since bincode and MessagePack encode fields by position.
    pub charge: Option<Vec<f64>>,
}
