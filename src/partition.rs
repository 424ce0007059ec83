//! Static tiling of the grid for the message-passing model.

use anyhow::Result;

/// Neighbour directions, in the order edges are exchanged and ghosts are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Left,
    Right,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::Up, Direction::Left, Direction::Right, Direction::Down];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Direction::Up => 0,
            Direction::Left => 1,
            Direction::Right => 2,
            Direction::Down => 3,
        }
    }

    /// The side on which the neighbour in this direction sees us.
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Down => Direction::Up,
        }
    }
}

/// Geometry of one tile and the ids of its neighbours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileDef {
    pub id: usize,
    pub start_row: usize,
    pub start_col: usize,
    pub height: usize,
    pub width: usize,
    /// Indexed by [`Direction::index`]; `None` at the grid edge.
    pub neighbors: [Option<usize>; 4],
}

impl TileDef {
    pub fn neighbor(&self, direction: Direction) -> Option<usize> {
        self.neighbors[direction.index()]
    }

    pub fn num_cells(&self) -> usize {
        self.width * self.height
    }

    /// Global row-major index of a tile-local cell.
    #[inline]
    pub fn global_index(&self, local: usize, grid_width: usize) -> usize {
        let (row, col) = (local / self.width, local % self.width);
        (self.start_row + row) * grid_width + self.start_col + col
    }

    /// Copies this tile's cells out of a global row-major array.
    pub fn cut<T: Copy>(&self, global: &[T], grid_width: usize) -> Vec<T> {
        let mut out = Vec::with_capacity(self.num_cells());
        for row in self.start_row..self.start_row + self.height {
            let start = row * grid_width + self.start_col;
            out.extend_from_slice(&global[start..start + self.width]);
        }
        out
    }

    /// Writes tile-local values back into a global row-major array.
    pub fn paste<T: Copy>(&self, local: &[T], global: &mut [T], grid_width: usize) {
        for (r, row) in local.chunks(self.width).enumerate() {
            let start = (self.start_row + r) * grid_width + self.start_col;
            global[start..start + self.width].copy_from_slice(row);
        }
    }
}

/// Splits `workers` into `(rows, cols)` as close to square as possible.
pub fn factor_workers(workers: usize) -> (usize, usize) {
    if workers == 0 {
        return (0, 0);
    }
    let mut rows = (workers as f64).sqrt() as usize;
    // guard the float rounding on large perfect squares
    while (rows + 1) * (rows + 1) <= workers {
        rows += 1;
    }
    while rows > 1 && workers % rows != 0 {
        rows -= 1;
    }
    (rows, workers / rows)
}

/// Cuts a `width` x `height` grid into `workers` tiles, row-major by tile position.
/// The last tile row and column absorb the division remainder.
pub fn partition(width: usize, height: usize, workers: usize) -> Result<Vec<TileDef>> {
    if workers == 0 {
        anyhow::bail!("Need at least one worker to partition the grid.");
    }
    let (rows, cols) = factor_workers(workers);
    let (tile_h, tile_w) = (height / rows, width / cols);
    if tile_h == 0 || tile_w == 0 {
        anyhow::bail!(
            "Cannot split a {}x{} grid into {} x {} tiles for {} workers.",
            width,
            height,
            rows,
            cols,
            workers
        );
    }

    let mut tiles = Vec::with_capacity(workers);
    for i in 0..rows {
        for j in 0..cols {
            let start_row = tile_h * i;
            let start_col = tile_w * j;
            let tile_height = if i == rows - 1 { height - start_row } else { tile_h };
            let tile_width = if j == cols - 1 { width - start_col } else { tile_w };
            tiles.push(TileDef {
                id: i * cols + j,
                start_row,
                start_col,
                height: tile_height,
                width: tile_width,
                neighbors: [
                    (i > 0).then(|| (i - 1) * cols + j),
                    (j > 0).then(|| i * cols + j - 1),
                    (j + 1 < cols).then(|| i * cols + j + 1),
                    (i + 1 < rows).then(|| (i + 1) * cols + j),
                ],
            });
        }
    }
    Ok(tiles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factors_are_near_square() {
        assert_eq!(factor_workers(1), (1, 1));
        assert_eq!(factor_workers(2), (1, 2));
        assert_eq!(factor_workers(4), (2, 2));
        assert_eq!(factor_workers(6), (2, 3));
        assert_eq!(factor_workers(7), (1, 7));
        assert_eq!(factor_workers(12), (3, 4));
        assert_eq!(factor_workers(16), (4, 4));
    }

    #[test]
    fn tiles_cover_grid_exactly_once() {
        let (width, height) = (11, 7);
        let tiles = partition(width, height, 6).unwrap();
        assert_eq!(tiles.len(), 6);
        let mut hits = vec![0; width * height];
        for tile in &tiles {
            for local in 0..tile.num_cells() {
                hits[tile.global_index(local, width)] += 1;
            }
        }
        assert!(hits.iter().all(|&h| h == 1));

        // 2 x 3 tiles: rows of 3 and 4, columns of 3, 3 and 5
        assert_eq!((tiles[0].height, tiles[0].width), (3, 3));
        assert_eq!((tiles[5].height, tiles[5].width), (4, 5));
        assert_eq!(tiles[5].global_index(tiles[5].num_cells() - 1, width), width * height - 1);
        assert_eq!((tiles[1].start_row, tiles[1].start_col), (0, 3));
    }

    #[test]
    fn neighbour_ids_follow_tile_positions() {
        let tiles = partition(12, 12, 6).unwrap();
        // tile 4 sits in row 1, column 1 of a 2 x 3 layout
        assert_eq!(tiles[4].neighbors, [Some(1), Some(3), Some(5), None]);
        assert_eq!(tiles[0].neighbors, [None, None, Some(1), Some(3)]);
        for tile in &tiles {
            for dir in Direction::ALL {
                if let Some(n) = tile.neighbor(dir) {
                    assert_eq!(tiles[n].neighbor(dir.opposite()), Some(tile.id));
                }
            }
        }
    }

    #[test]
    fn too_many_workers_is_an_error() {
        assert!(partition(3, 3, 4).is_ok());
        assert!(partition(2, 3, 3).is_err());
        assert!(partition(4, 4, 0).is_err());
    }

    #[test]
    fn global_index_offsets_by_tile_origin() {
        let tiles = partition(10, 6, 4).unwrap();
        let tile = &tiles[3];
        assert_eq!((tile.start_row, tile.start_col, tile.width), (3, 5, 5));
        // local (1, 2) of tile 3 is global (4, 7)
        assert_eq!(tile.global_index(5 + 2, 10), 4 * 10 + 7);
    }

    #[test]
    fn cut_and_paste_restore_the_grid() {
        let (width, height) = (7, 5);
        let tiles = partition(width, height, 6).unwrap();
        let global: Vec<i32> = (0..(width * height) as i32).collect();
        let mut rebuilt = vec![-1; width * height];
        for tile in &tiles {
            let part = tile.cut(&global, width);
            assert_eq!(part.len(), tile.num_cells());
            assert_eq!(part[0], global[tile.start_row * width + tile.start_col]);
            tile.paste(&part, &mut rebuilt, width);
        }
        assert_eq!(rebuilt, global);
    }
}
