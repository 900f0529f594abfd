//! Vertex-corner terrain maps.
//!
//! Terrain lives on the vertices of a tile grid: a `W`×`H` map carries
//! `(W+1)`×`(H+1)` terrain pointers. The drawable layers are derived from
//! the four corners of each cell: for every terrain present at a corner, a
//! transition tile is selected by a 4-bit corner mask and painted in
//! terrainset order, back to front.
//!
//! See <http://www.cr31.co.uk/stagecast/wang/2corn.html> for the two-corner
//! transition scheme the mask ordering follows.

use std::sync::Arc;

use arrayvec::ArrayVec;
use thiserror::Error;

use crate::data::DataManager;
use crate::id::UniqueId;
use crate::tiles::{RawMap, Tile, TileMap, TilePosition, TilesError, to_raw_map, to_tile_map};

#[derive(Debug, Error)]
pub enum TerrainError {
    #[error("terrainset {0} is missing")]
    TerrainsetMissing(UniqueId),
    #[error("terrain {0} is missing")]
    TerrainMissing(UniqueId),
    #[error("vertex data does not match the map size")]
    BadVertexData,
    #[error("terrain layers do not match the terrainset")]
    Layers,
    #[error(transparent)]
    Tiles(#[from] TilesError),
}

/// Corners of a map cell, in mask-bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectCorner {
    TopLeft = 0,
    TopRight = 1,
    BottomRight = 2,
    BottomLeft = 3,
}

/// The sixteen corner subsets a cell can show for one terrain.
///
/// The discriminant order groups transitions by their non-top-left corners
/// first; it must match on both the writer and reader side of a map or tile
/// selection silently corrupts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum TransitionTileType {
    None = 0,
    TopRight,
    BottomRight,
    TopRightBottomRight,
    BottomLeft,
    TopRightBottomLeft,
    BottomLeftRight,
    TopRightBottomLeftRight,
    TopLeft,
    TopLeftRight,
    TopLeftBottomRight,
    TopLeftRightBottomRight,
    TopLeftBottomLeft,
    TopLeftRightBottomLeft,
    TopLeftBottomLeftRight,
    All = 15,
}

impl TransitionTileType {
    pub const COUNT: usize = 16;

    pub fn index(self) -> usize {
        self as usize
    }

    fn from_index(i: u8) -> Self {
        use TransitionTileType::*;
        const TABLE: [TransitionTileType; 16] = [
            None,
            TopRight,
            BottomRight,
            TopRightBottomRight,
            BottomLeft,
            TopRightBottomLeft,
            BottomLeftRight,
            TopRightBottomLeftRight,
            TopLeft,
            TopLeftRight,
            TopLeftBottomRight,
            TopLeftRightBottomRight,
            TopLeftBottomLeft,
            TopLeftRightBottomLeft,
            TopLeftBottomLeftRight,
            All,
        ];
        TABLE[i as usize]
    }
}

/// Map corner occupancy (indexed by [`RectCorner`]) to a transition type.
pub fn get_transition_type(corners: [bool; 4]) -> TransitionTileType {
    let mask = corners
        .iter()
        .enumerate()
        .fold(0u8, |m, (i, &c)| if c { m | (1 << i) } else { m });
    // rotate the top-left bit to the high position; this reproduces the
    // enumerator grouping above
    TransitionTileType::from_index((mask >> 1) | ((mask & 1) << 3))
}

/// A terrain: a tileset plus its transition tile groups.
#[derive(Debug, Clone)]
pub struct Terrain {
    pub id: UniqueId,
    /// Full-cell tiles, used for [`TransitionTileType::All`].
    pub tiles: Vec<Tile>,
    /// Tile groups indexed by [`TransitionTileType::index`]. Group 0 holds
    /// the empty tile, group 15 mirrors `tiles`.
    pub transitions: [Vec<Tile>; TransitionTileType::COUNT],
    pub tags: Vec<UniqueId>,
}

impl Default for Terrain {
    fn default() -> Self {
        Terrain {
            id: UniqueId::ZERO,
            tiles: Vec::new(),
            transitions: std::array::from_fn(|_| Vec::new()),
            tags: Vec::new(),
        }
    }
}

impl Terrain {
    pub fn get_transitions(&self, kind: TransitionTileType) -> &[Tile] {
        &self.transitions[kind.index()]
    }

    /// Every tile this terrain owns, transition groups flattened in group
    /// order. This is the terrain's tile list when it stands in for a
    /// tileset, so the order must be stable across serialise and parse.
    pub fn full_tile_list(&self) -> Vec<Tile> {
        self.transitions.iter().flatten().cloned().collect()
    }

    /// Uniformly random tile from the group for `kind`.
    pub fn get_random_tile(&self, kind: TransitionTileType) -> Tile {
        let group = self.get_transitions(kind);
        if group.is_empty() {
            return Tile::default();
        }
        group[fastrand::usize(..group.len())].clone()
    }
}

/// Ordered list of terrains; position encodes paint priority, earliest is
/// painted first.
#[derive(Debug, Clone, Default)]
pub struct Terrainset {
    pub id: UniqueId,
    pub terrain_ids: Vec<UniqueId>,
    /// Resolved by the resource loader, in `terrain_ids` order.
    pub terrains: Vec<Arc<Terrain>>,
}

/// Global tile/terrain configuration resource.
#[derive(Debug, Clone)]
pub struct TerrainSettings {
    pub tile_size: u32,
    pub empty_tile: Tile,
    pub empty_terrain: UniqueId,
    pub empty_terrainset: UniqueId,
    pub background_terrain: UniqueId,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        TerrainSettings {
            tile_size: 32,
            empty_tile: Tile::default(),
            empty_terrain: UniqueId::ZERO,
            empty_terrainset: UniqueId::ZERO,
            background_terrain: UniqueId::ZERO,
        }
    }
}

/// A resolved terrain map: vertex terrain plus the derived tile layers.
#[derive(Debug, Clone)]
pub struct TerrainMap {
    pub terrainset: Arc<Terrainset>,
    /// Row-major, `(width+1) * (height+1)` entries, all non-null.
    pub vertices: Vec<Arc<Terrain>>,
    /// One derived layer per terrainset entry, in terrainset order.
    pub terrain_layers: Vec<TileMap>,
    /// Literal tiles placed over the derived layers.
    pub tile_layer: TileMap,
    /// Map width in tiles.
    pub width: u32,
}

impl TerrainMap {
    /// Map size in tiles.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.tile_layer.height())
    }

    /// Vertex grid size.
    pub fn vertex_size(&self) -> (u32, u32) {
        let (w, h) = self.size();
        (w + 1, h + 1)
    }

    pub fn within_vertex(&self, (x, y): TilePosition) -> bool {
        let (w, h) = self.vertex_size();
        x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h
    }

    pub fn get_vertex(&self, pos: TilePosition) -> Option<&Arc<Terrain>> {
        if self.within_vertex(pos) {
            let (w, _) = self.vertex_size();
            Some(&self.vertices[(pos.1 as u32 * w + pos.0 as u32) as usize])
        } else {
            None
        }
    }

    fn set_vertex(&mut self, pos: TilePosition, terrain: Arc<Terrain>) {
        if self.within_vertex(pos) {
            let (w, _) = self.vertex_size();
            self.vertices[(pos.1 as u32 * w + pos.0 as u32) as usize] = terrain;
        }
    }
}

/// The four corner terrains of the cell at `pos`, indexed by [`RectCorner`].
pub fn get_terrain_at_tile(map: &TerrainMap, pos: TilePosition) -> Option<[Arc<Terrain>; 4]> {
    let (x, y) = pos;
    Some([
        map.get_vertex((x, y))?.clone(),
        map.get_vertex((x + 1, y))?.clone(),
        map.get_vertex((x + 1, y + 1))?.clone(),
        map.get_vertex((x, y + 1))?.clone(),
    ])
}

/// The distinct terrains touching the cell at `pos`.
pub fn distinct_corner_terrains(corners: &[Arc<Terrain>; 4]) -> ArrayVec<Arc<Terrain>, 4> {
    let mut out: ArrayVec<Arc<Terrain>, 4> = ArrayVec::new();
    for corner in corners {
        if !out.iter().any(|t| t.id == corner.id) {
            out.push(corner.clone());
        }
    }
    out
}

/// Tiles adjacent to the vertex at `pos`.
pub fn adjacent_tiles(pos: TilePosition) -> [TilePosition; 4] {
    let (x, y) = pos;
    [(x - 1, y - 1), (x, y - 1), (x - 1, y), (x, y)]
}

fn update_cell(map: &mut TerrainMap, pos: TilePosition) {
    let Some(corners) = get_terrain_at_tile(map, pos) else {
        return;
    };
    let terrainset = map.terrainset.clone();
    for (layer, terrain) in terrainset.terrains.iter().enumerate() {
        let occupancy = [
            corners[0].id == terrain.id,
            corners[1].id == terrain.id,
            corners[2].id == terrain.id,
            corners[3].id == terrain.id,
        ];
        let kind = get_transition_type(occupancy);
        let tile = terrain.get_random_tile(kind);
        map.terrain_layers[layer].set(pos, tile);
    }
}

fn update_all_cells(map: &mut TerrainMap) {
    let (w, h) = map.size();
    for y in 0..h as i32 {
        for x in 0..w as i32 {
            update_cell(map, (x, y));
        }
    }
}

/// Build a map of `size` tiles with every vertex set to `fill`.
pub fn make_map(
    size: (u32, u32),
    terrainset: Arc<Terrainset>,
    fill: Arc<Terrain>,
    empty_tile: Tile,
) -> TerrainMap {
    let (w, h) = size;
    let layers = terrainset
        .terrains
        .iter()
        .map(|_| TileMap::filled(w, h, empty_tile.clone()))
        .collect();
    let mut map = TerrainMap {
        terrainset,
        vertices: vec![fill; ((w + 1) * (h + 1)) as usize],
        terrain_layers: layers,
        tile_layer: TileMap::filled(w, h, empty_tile),
        width: w,
    };
    update_all_cells(&mut map);
    map
}

/// Write literal tiles into the free layer; no corner recompute.
pub fn place_tile(map: &mut TerrainMap, positions: &[TilePosition], tile: &Tile) {
    for &pos in positions {
        map.tile_layer.set(pos, tile.clone());
    }
}

/// Write vertex terrain and recompute every touched cell.
pub fn place_terrain(map: &mut TerrainMap, positions: &[TilePosition], terrain: &Arc<Terrain>) {
    let mut touched: Vec<TilePosition> = Vec::new();
    for &pos in positions {
        if !map.within_vertex(pos) {
            continue;
        }
        map.set_vertex(pos, terrain.clone());
        for tile in adjacent_tiles(pos) {
            if !touched.contains(&tile) {
                touched.push(tile);
            }
        }
    }
    for pos in touched {
        update_cell(map, pos);
    }
}

/// Resize to `size` tiles, placing the old content at `offset`. New
/// vertices take `fill`; new literal tiles take `empty_tile`.
pub fn resize_map(
    map: &mut TerrainMap,
    size: (u32, u32),
    offset: (i32, i32),
    fill: &Arc<Terrain>,
    empty_tile: &Tile,
) {
    let (w, h) = size;
    let (ox, oy) = offset;

    let mut vertices = vec![fill.clone(); ((w + 1) * (h + 1)) as usize];
    let (old_vw, old_vh) = map.vertex_size();
    for y in 0..old_vh as i32 {
        for x in 0..old_vw as i32 {
            let nx = x + ox;
            let ny = y + oy;
            if nx >= 0 && ny >= 0 && (nx as u32) < w + 1 && (ny as u32) < h + 1 {
                let old = map.get_vertex((x, y)).cloned();
                if let Some(old) = old {
                    vertices[(ny as u32 * (w + 1) + nx as u32) as usize] = old;
                }
            }
        }
    }

    let mut tile_layer = TileMap::filled(w, h, empty_tile.clone());
    let (old_w, old_h) = map.size();
    for y in 0..old_h as i32 {
        for x in 0..old_w as i32 {
            if let Some(tile) = map.tile_layer.get((x, y)).cloned() {
                tile_layer.set((x + ox, y + oy), tile);
            }
        }
    }

    map.vertices = vertices;
    map.tile_layer = tile_layer;
    map.width = w;
    map.terrain_layers = map
        .terrainset
        .terrains
        .iter()
        .map(|_| TileMap::filled(w, h, empty_tile.clone()))
        .collect();
    update_all_cells(map);
}

/// As [`resize_map`], with the new bounds given relative to the current
/// ones (`top_left` usually negative to grow).
pub fn resize_map_relative(
    map: &mut TerrainMap,
    top_left: (i32, i32),
    bottom_right: (i32, i32),
    fill: &Arc<Terrain>,
    empty_tile: &Tile,
) {
    let size = (
        (bottom_right.0 - top_left.0).max(0) as u32,
        (bottom_right.1 - top_left.1).max(0) as u32,
    );
    resize_map(map, size, (-top_left.0, -top_left.1), fill, empty_tile);
}

/// Gameplay tags visible at `pos`: the four corner terrains plus the
/// literal tile. May contain duplicates.
pub fn get_tags_at(map: &TerrainMap, pos: TilePosition) -> Vec<UniqueId> {
    let mut tags = Vec::new();
    if let Some(corners) = get_terrain_at_tile(map, pos) {
        for corner in &corners {
            tags.extend_from_slice(&corner.tags);
        }
    }
    if let Some(tile) = map.tile_layer.get(pos) {
        tags.extend_from_slice(&tile.tags);
    }
    tags
}

/// Serialised terrain map: vertex terrain stored as 1-based indices into
/// the terrainset (0 is the empty vertex), layers tile-id compressed.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RawTerrainMap {
    pub terrainset: UniqueId,
    pub terrain_vertex: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub terrain_layers: Vec<RawMap>,
    pub tile_layer: RawMap,
}

/// Structural validity of a raw map against a level size in pixels.
pub fn is_valid(
    raw: &RawTerrainMap,
    data: &DataManager,
    size_px: (i32, i32),
    tile_size: u32,
) -> bool {
    if tile_size == 0 || size_px.0 < 0 || size_px.1 < 0 {
        return false;
    }
    let w = size_px.0 as u32 / tile_size;
    let h = size_px.1 as u32 / tile_size;
    if raw.terrain_vertex.len() != ((w + 1) * (h + 1)) as usize {
        return false;
    }
    if raw.tile_layer.width != w {
        return false;
    }
    if raw.terrain_layers.iter().any(|layer| layer.width != w) {
        return false;
    }
    data.get_terrainset_no_load(raw.terrainset).is_ok()
}

/// Compress `map` for serialisation.
pub fn to_raw_terrain_map(
    map: &TerrainMap,
    data: &DataManager,
) -> Result<RawTerrainMap, TerrainError> {
    let mut terrain_vertex = Vec::with_capacity(map.vertices.len());
    for vertex in &map.vertices {
        let index = map
            .terrainset
            .terrains
            .iter()
            .position(|t| t.id == vertex.id)
            .map(|i| i as u32 + 1)
            .unwrap_or(0);
        terrain_vertex.push(index);
    }

    let mut terrain_layers = Vec::with_capacity(map.terrain_layers.len());
    for layer in &map.terrain_layers {
        terrain_layers.push(to_raw_map(layer, data)?);
    }

    Ok(RawTerrainMap {
        terrainset: map.terrainset.id,
        terrain_vertex,
        terrain_layers,
        tile_layer: to_raw_map(&map.tile_layer, data)?,
    })
}

/// Resolve `raw` back into a terrain map. Empty terrain layers are
/// regenerated from the vertex data.
pub fn to_terrain_map(
    raw: &RawTerrainMap,
    data: &mut DataManager,
) -> Result<TerrainMap, TerrainError> {
    let terrainset = data
        .get_terrainset(raw.terrainset)
        .map_err(|_| TerrainError::TerrainsetMissing(raw.terrainset))?;
    let settings = data.terrain_settings();
    let empty_terrain = data
        .get_terrain(settings.empty_terrain)
        .map_err(|_| TerrainError::TerrainMissing(settings.empty_terrain))?;

    let tile_layer = to_tile_map(&raw.tile_layer, data)?;
    let w = tile_layer.width;
    let h = tile_layer.height();
    if raw.terrain_vertex.len() != ((w + 1) * (h + 1)) as usize {
        return Err(TerrainError::BadVertexData);
    }

    let mut vertices = Vec::with_capacity(raw.terrain_vertex.len());
    for &index in &raw.terrain_vertex {
        let terrain = match index {
            0 => empty_terrain.clone(),
            i => terrainset
                .terrains
                .get(i as usize - 1)
                .cloned()
                .ok_or(TerrainError::Layers)?,
        };
        vertices.push(terrain);
    }

    let mut map = TerrainMap {
        terrainset: terrainset.clone(),
        vertices,
        terrain_layers: Vec::new(),
        tile_layer,
        width: w,
    };

    if raw.terrain_layers.is_empty() {
        map.terrain_layers = terrainset
            .terrains
            .iter()
            .map(|_| TileMap::filled(w, h, settings.empty_tile.clone()))
            .collect();
        update_all_cells(&mut map);
    } else {
        if raw.terrain_layers.len() != terrainset.terrains.len() {
            return Err(TerrainError::Layers);
        }
        for layer in &raw.terrain_layers {
            let decoded = to_tile_map(layer, data)?;
            if decoded.width != w {
                return Err(TerrainError::Layers);
            }
            map.terrain_layers.push(decoded);
        }
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_mask_order() {
        use TransitionTileType::*;
        // exhaustive over the sixteen corner subsets, TL TR BR BL
        let cases = [
            ([false, false, false, false], None),
            ([false, true, false, false], TopRight),
            ([false, false, true, false], BottomRight),
            ([false, true, true, false], TopRightBottomRight),
            ([false, false, false, true], BottomLeft),
            ([false, true, false, true], TopRightBottomLeft),
            ([false, false, true, true], BottomLeftRight),
            ([false, true, true, true], TopRightBottomLeftRight),
            ([true, false, false, false], TopLeft),
            ([true, true, false, false], TopLeftRight),
            ([true, false, true, false], TopLeftBottomRight),
            ([true, true, true, false], TopLeftRightBottomRight),
            ([true, false, false, true], TopLeftBottomLeft),
            ([true, true, false, true], TopLeftRightBottomLeft),
            ([true, false, true, true], TopLeftBottomLeftRight),
            ([true, true, true, true], All),
        ];
        for (corners, expected) in cases {
            assert_eq!(get_transition_type(corners), expected, "{corners:?}");
        }
    }

    fn make_terrain(name_tag: u32) -> Arc<Terrain> {
        let mut terrain = Terrain {
            id: UniqueId::new(),
            ..Terrain::default()
        };
        let texture = terrain.id;
        let tile = move |n: u32| Tile {
            texture,
            left: n * 8,
            top: name_tag,
            tags: Vec::new(),
        };
        terrain.tiles = vec![tile(15)];
        for (i, group) in terrain.transitions.iter_mut().enumerate() {
            *group = vec![tile(i as u32)];
        }
        Arc::new(terrain)
    }

    fn make_set(terrains: &[Arc<Terrain>]) -> Arc<Terrainset> {
        Arc::new(Terrainset {
            id: UniqueId::new(),
            terrain_ids: terrains.iter().map(|t| t.id).collect(),
            terrains: terrains.to_vec(),
        })
    }

    #[test]
    fn uniform_map_draws_full_tiles() {
        let t1 = make_terrain(0);
        let set = make_set(&[t1.clone()]);
        let map = make_map((2, 2), set, t1.clone(), Tile::default());
        let expected = t1.get_transitions(TransitionTileType::All)[0].clone();
        assert_eq!(map.terrain_layers[0].get((0, 0)), Some(&expected));
    }

    #[test]
    fn corner_paint_selects_transition() {
        let t1 = make_terrain(0);
        let t2 = make_terrain(1);
        let set = make_set(&[t1.clone(), t2.clone()]);
        let mut map = make_map((1, 1), set, t1.clone(), Tile::default());

        // paint the top-left vertex with t2
        place_terrain(&mut map, &[(0, 0)], &t2);

        let t2_tile = map.terrain_layers[1].get((0, 0)).unwrap();
        let expected = t2.get_transitions(TransitionTileType::TopLeft)[0].clone();
        assert_eq!(*t2_tile, expected);

        // t1 keeps the complementary corners
        let t1_tile = map.terrain_layers[0].get((0, 0)).unwrap();
        let expected = t1.get_transitions(TransitionTileType::TopRightBottomLeftRight)[0].clone();
        assert_eq!(*t1_tile, expected);
    }

    #[test]
    fn vertex_and_corner_queries_agree() {
        let t1 = make_terrain(0);
        let t2 = make_terrain(1);
        let set = make_set(&[t1.clone(), t2.clone()]);
        let mut map = make_map((3, 3), set, t1.clone(), Tile::default());
        place_terrain(&mut map, &[(1, 1)], &t2);

        for y in 0..3 {
            for x in 0..3 {
                let corners = get_terrain_at_tile(&map, (x, y)).unwrap();
                assert_eq!(corners[0].id, map.get_vertex((x, y)).unwrap().id);
                assert_eq!(corners[1].id, map.get_vertex((x + 1, y)).unwrap().id);
                assert_eq!(corners[2].id, map.get_vertex((x + 1, y + 1)).unwrap().id);
                assert_eq!(corners[3].id, map.get_vertex((x, y + 1)).unwrap().id);
            }
        }
    }

    #[test]
    fn resize_preserves_offset_content() {
        let t1 = make_terrain(0);
        let t2 = make_terrain(1);
        let set = make_set(&[t1.clone(), t2.clone()]);
        let mut map = make_map((2, 2), set, t1.clone(), Tile::default());
        place_terrain(&mut map, &[(0, 0)], &t2);

        resize_map(&mut map, (4, 4), (1, 1), &t1, &Tile::default());
        assert_eq!(map.size(), (4, 4));
        assert_eq!(map.get_vertex((1, 1)).unwrap().id, t2.id);
        assert_eq!(map.get_vertex((0, 0)).unwrap().id, t1.id);
    }

    #[test]
    fn place_terrain_ignores_out_of_bounds() {
        let t1 = make_terrain(0);
        let t2 = make_terrain(1);
        let set = make_set(&[t1.clone(), t2.clone()]);
        let mut map = make_map((1, 1), set, t1.clone(), Tile::default());
        place_terrain(&mut map, &[(9, 9), (-1, 0)], &t2);
        assert!(map.vertices.iter().all(|v| v.id == t1.id));
    }
}
