//! Tiles, tilesets and tile maps.
//!
//! A tile map stores one [`Tile`] per cell. Serialisation uses tile-id
//! compression: tiles are grouped by owning tileset, the map header lists
//! `(tileset, start_id)` pairs and each cell is written as
//! `start_id + local_index`. The pairs are sorted by `start_id`, so decoding
//! a cell is a binary search for the greatest `start_id` at or below the
//! stored id.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::DataManager;
use crate::id::UniqueId;

/// Position of a tile (or vertex) on a map, in tile coordinates.
pub type TilePosition = (i32, i32);

#[derive(Debug, Error)]
pub enum TilesError {
    #[error("tileset {0} not found")]
    TilesetNotFound(UniqueId),
    #[error("tile does not belong to any known tileset")]
    TileNotFound,
    #[error("compressed tile id {0} is outside every tileset span")]
    BadTileId(u32),
    #[error("tile layer length {len} does not fill a map of width {width}")]
    BadLayerShape { len: usize, width: u32 },
}

/// A single drawable tile: a texture region plus gameplay tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub texture: UniqueId,
    pub left: u32,
    pub top: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<UniqueId>,
}

/// An ordered collection of tiles sharing a source texture.
#[derive(Debug, Clone, Default)]
pub struct Tileset {
    pub id: UniqueId,
    pub tiles: Vec<Tile>,
}

impl Tileset {
    /// Index of `tile` within this set.
    pub fn index_of(&self, tile: &Tile) -> Option<usize> {
        self.tiles.iter().position(|t| t == tile)
    }
}

/// Uncompressed tile layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileMap {
    pub width: u32,
    pub tiles: Vec<Tile>,
}

impl TileMap {
    pub fn filled(width: u32, height: u32, tile: Tile) -> Self {
        TileMap {
            width,
            tiles: vec![tile; (width * height) as usize],
        }
    }

    pub fn height(&self) -> u32 {
        if self.width == 0 {
            0
        } else {
            self.tiles.len() as u32 / self.width
        }
    }

    pub fn in_bounds(&self, (x, y): TilePosition) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height()
    }

    pub fn get(&self, pos: TilePosition) -> Option<&Tile> {
        if self.in_bounds(pos) {
            Some(&self.tiles[self.index(pos)])
        } else {
            None
        }
    }

    /// Write `tile` at `pos`; out-of-bounds positions are ignored.
    pub fn set(&mut self, pos: TilePosition, tile: Tile) {
        if self.in_bounds(pos) {
            let index = self.index(pos);
            self.tiles[index] = tile;
        }
    }

    fn index(&self, (x, y): TilePosition) -> usize {
        (y as u32 * self.width + x as u32) as usize
    }
}

/// Compressed tile layer, as stored in level files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMap {
    /// `(tileset, start_id)` pairs, strictly increasing in `start_id`.
    pub tilesets: Vec<(UniqueId, u32)>,
    pub tiles: Vec<u32>,
    pub width: u32,
}

/// Compress `map`, grouping tiles by their owning tileset.
///
/// Tilesets are assigned start ids in order of first appearance; each start
/// id is the running total of preceding tileset sizes.
pub fn to_raw_map(map: &TileMap, data: &DataManager) -> Result<RawMap, TilesError> {
    // (tileset id, start id, tiles) cache in first-appearance order
    let mut used: Vec<(UniqueId, u32, Vec<Tile>)> = Vec::new();
    let mut next_start = 0u32;
    let mut out = Vec::with_capacity(map.tiles.len());

    for tile in &map.tiles {
        let mut found = None;
        for (_, start, tiles) in &used {
            if let Some(index) = tiles.iter().position(|t| t == tile) {
                found = Some(start + index as u32);
                break;
            }
        }
        let id = match found {
            Some(id) => id,
            None => {
                // first tile from a new tileset; pull it from the graph
                let (set_id, tiles) = data
                    .find_tileset_for(tile)
                    .ok_or(TilesError::TileNotFound)?;
                let index = tiles
                    .iter()
                    .position(|t| t == tile)
                    .ok_or(TilesError::TileNotFound)?;
                let start = next_start;
                next_start += tiles.len() as u32;
                used.push((set_id, start, tiles));
                start + index as u32
            }
        };
        out.push(id);
    }

    let mut tilesets: Vec<(UniqueId, u32)> =
        used.into_iter().map(|(id, start, _)| (id, start)).collect();
    tilesets.sort_by_key(|&(_, start)| start);

    Ok(RawMap {
        tilesets,
        tiles: out,
        width: map.width,
    })
}

/// Decompress `raw` back into tiles.
pub fn to_tile_map(raw: &RawMap, data: &mut DataManager) -> Result<TileMap, TilesError> {
    if raw.width != 0 && raw.tiles.len() % raw.width as usize != 0 {
        return Err(TilesError::BadLayerShape {
            len: raw.tiles.len(),
            width: raw.width,
        });
    }

    // resolve every tileset up front, keeping the start-id order
    let mut spans: Vec<(u32, std::sync::Arc<Tileset>)> = Vec::with_capacity(raw.tilesets.len());
    for &(id, start) in &raw.tilesets {
        let tileset = data
            .get_tileset(id)
            .map_err(|_| TilesError::TilesetNotFound(id))?;
        spans.push((start, tileset));
    }
    spans.sort_by_key(|&(start, _)| start);

    let mut tiles = Vec::with_capacity(raw.tiles.len());
    for &id in &raw.tiles {
        // greatest start_id <= id
        let slot = spans.partition_point(|&(start, _)| start <= id);
        let (start, tileset) = slot
            .checked_sub(1)
            .map(|i| &spans[i])
            .ok_or(TilesError::BadTileId(id))?;
        let local = (id - start) as usize;
        let tile = tileset
            .tiles
            .get(local)
            .ok_or(TilesError::BadTileId(id))?;
        tiles.push(tile.clone());
    }

    Ok(TileMap {
        width: raw.width,
        tiles,
    })
}
