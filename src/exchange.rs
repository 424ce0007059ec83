//! Point-to-point ghost exchange between neighbouring tiles.
//!
//! Every tile has one outgoing and one incoming channel per existing neighbour. An edge
//! sent toward `Up` lands in the upper tile's `Down` ghost buffer, and so on for the
//! other sides. Sends never block. [`PendingExchange::complete`] blocks until every
//! expected edge has arrived, and until then the ghost buffers belong to the pending
//! exchange rather than to the zone, so nothing can relax against half-received data.

use crate::partition::{Direction, TileDef};
use crate::zone::Zone;
use anyhow::{anyhow, Result};
use std::sync::mpsc::{channel, Receiver, Sender};

/// Most recently received edge values of each neighbour, indexed by [`Direction::index`].
/// A side without a neighbour is empty and reads as 0.
#[derive(Debug, Clone, PartialEq)]
pub struct GhostBuffers {
    sides: [Vec<f64>; 4],
}

impl GhostBuffers {
    pub fn for_tile(tile: &TileDef) -> Self {
        let len = |dir: Direction| match dir {
            Direction::Up | Direction::Down => tile.width,
            Direction::Left | Direction::Right => tile.height,
        };
        Self {
            sides: Direction::ALL.map(|dir| if tile.neighbor(dir).is_some() { vec![0.0; len(dir)] } else { Vec::new() }),
        }
    }

    /// Ghost value at position `k` along side `dir`.
    #[inline(always)]
    pub fn get(&self, dir: Direction, k: usize) -> f64 {
        self.sides[dir.index()].get(k).copied().unwrap_or(0.0)
    }

    pub fn side(&self, dir: Direction) -> &[f64] {
        &self.sides[dir.index()]
    }
}

/// The channel endpoints owned by one tile.
pub struct ExchangeLinks {
    tile: usize,
    outgoing: [Option<Sender<Vec<f64>>>; 4],
    incoming: [Option<Receiver<Vec<f64>>>; 4],
}

impl ExchangeLinks {
    /// Wires every pair of neighbouring tiles; the result is indexed by tile id.
    pub fn build(tiles: &[TileDef]) -> Vec<ExchangeLinks> {
        let mut links: Vec<ExchangeLinks> = tiles
            .iter()
            .map(|t| ExchangeLinks { tile: t.id, outgoing: Default::default(), incoming: Default::default() })
            .collect();

        for tile in tiles {
            for dir in Direction::ALL {
                if let Some(neighbor) = tile.neighbor(dir) {
                    let (tx, rx) = channel();
                    links[tile.id].outgoing[dir.index()] = Some(tx);
                    links[neighbor].incoming[dir.opposite().index()] = Some(rx);
                }
            }
        }
        links
    }

    pub fn tile(&self) -> usize {
        self.tile
    }

    /// Sends every edge of `zone` to its neighbours and takes its ghost buffers for the
    /// duration of the exchange.
    pub fn begin_exchange<'a>(&'a self, zone: &mut Zone) -> Result<PendingExchange<'a>> {
        for dir in Direction::ALL {
            if let Some(tx) = &self.outgoing[dir.index()] {
                tx.send(zone.edge(dir))
                    .map_err(|_| anyhow!("Tile {}: neighbour {:?} hung up before the ghost exchange.", self.tile, dir))?;
            }
        }
        let ghosts = zone.take_ghosts()?;
        Ok(PendingExchange { links: self, ghosts })
    }
}

/// An exchange whose edges have been sent but whose ghosts may not have arrived yet.
#[must_use = "an exchange must be completed before the zone can relax"]
pub struct PendingExchange<'a> {
    links: &'a ExchangeLinks,
    ghosts: GhostBuffers,
}

impl PendingExchange<'_> {
    /// Waits for every neighbour's edge and returns the filled ghost buffers.
    pub fn complete(mut self) -> Result<GhostBuffers> {
        let tile = self.links.tile;
        for dir in Direction::ALL {
            if let Some(rx) = &self.links.incoming[dir.index()] {
                let edge = rx
                    .recv()
                    .map_err(|_| anyhow!("Tile {}: neighbour {:?} disconnected during the ghost exchange.", tile, dir))?;
                let side = &mut self.ghosts.sides[dir.index()];
                if edge.len() != side.len() {
                    anyhow::bail!(
                        "Tile {}: {:?} ghost edge holds {} values, expected {}.",
                        tile,
                        dir,
                        edge.len(),
                        side.len()
                    );
                }
                *side = edge;
            }
        }
        Ok(self.ghosts)
    }
}
