//! Terrain integration tests: corner-derived tiles, editing, tile-id
//! compression and level round trips through the resource graph.

use std::sync::Arc;

use serde_json::json;

use hades::data::resources::TRANSITION_GROUP_NAMES;
use hades::data::{DataManager, MemoryFiles};
use hades::id::IdRegistry;
use hades::level::{Background, Level, load_level, save_level};
use hades::terrain::{
    TransitionTileType, get_terrain_at_tile, is_valid, make_map, place_terrain,
    to_raw_terrain_map, to_terrain_map,
};
use hades::tiles::{TileMap, to_raw_map, to_tile_map};

/// A terrain document with one distinct tile per transition group, rows of
/// the texture keyed by `row`.
fn terrain_doc(row: u32) -> serde_json::Value {
    let mut transitions = serde_json::Map::new();
    for (index, name) in TRANSITION_GROUP_NAMES.iter().enumerate() {
        if index == 0 || index == 15 {
            continue;
        }
        transitions.insert(
            (*name).to_owned(),
            json!([{ "left": index as u32 * 8, "top": row }]),
        );
    }
    json!({
        "texture": "tex",
        "tiles": [ { "left": 120, "top": row } ],
        "transitions": transitions
    })
}

fn terrain_game() -> DataManager {
    let doc = json!({
        "mod": { "name": "Terrain Test" },
        "textures": { "tex": "t.png" },
        "terrain-settings": {
            "tile-size": 8,
            "empty-terrain": "empty",
            "empty-terrainset": "null-set",
            "background-terrain": "grass",
            "empty-tile": { "texture": "tex", "left": 999, "top": 999 }
        },
        "terrain": {
            "empty": { "texture": "tex", "tiles": [ { "left": 900, "top": 0 } ] },
            "grass": terrain_doc(0),
            "rock": terrain_doc(64)
        },
        "terrainsets": {
            "overworld": ["grass", "rock"],
            "null-set": ["empty"]
        }
    });
    let files = MemoryFiles::new();
    files.insert("terra", "game.json", doc.to_string());
    let mut data = DataManager::new(Arc::new(files), Arc::new(IdRegistry::new()));
    data.load_game("terra").unwrap();
    data.load();
    data
}

#[test]
fn uniform_cell_uses_the_full_tile() {
    let mut data = terrain_game();
    let overworld = data.get_terrainset(data.get_uid("overworld").unwrap()).unwrap();
    let grass = data.get_terrain(data.get_uid("grass").unwrap()).unwrap();
    let settings = data.terrain_settings();

    let map = make_map(
        (2, 2),
        overworld.clone(),
        grass.clone(),
        settings.empty_tile.clone(),
    );

    let expected = grass.get_transitions(TransitionTileType::All)[0].clone();
    assert_eq!(map.terrain_layers[0].get((0, 0)), Some(&expected));
    // the rock layer is empty everywhere
    let rock_empty = overworld.terrains[1].get_transitions(TransitionTileType::None)[0].clone();
    assert_eq!(map.terrain_layers[1].get((1, 1)), Some(&rock_empty));
}

#[test]
fn corner_paint_picks_matching_transitions() {
    let mut data = terrain_game();
    let overworld = data.get_terrainset(data.get_uid("overworld").unwrap()).unwrap();
    let grass = data.get_terrain(data.get_uid("grass").unwrap()).unwrap();
    let rock = data.get_terrain(data.get_uid("rock").unwrap()).unwrap();
    let settings = data.terrain_settings();

    let mut map = make_map(
        (2, 2),
        overworld,
        grass.clone(),
        settings.empty_tile.clone(),
    );
    // paint the shared top-left vertex of cell (0,0) with rock
    place_terrain(&mut map, &[(0, 0)], &rock);

    let rock_tile = map.terrain_layers[1].get((0, 0)).unwrap();
    let expected = rock.get_transitions(TransitionTileType::TopLeft)[0].clone();
    assert_eq!(*rock_tile, expected);

    let grass_tile = map.terrain_layers[0].get((0, 0)).unwrap();
    let expected = grass.get_transitions(TransitionTileType::TopRightBottomLeftRight)[0].clone();
    assert_eq!(*grass_tile, expected);

    // cells not touching the painted vertex keep their full grass tile
    let far = map.terrain_layers[0].get((1, 1)).unwrap();
    assert_eq!(*far, grass.get_transitions(TransitionTileType::All)[0]);
}

#[test]
fn tile_id_compression_round_trips() {
    let mut data = terrain_game();
    let grass = data.get_terrain(data.get_uid("grass").unwrap()).unwrap();
    let rock = data.get_terrain(data.get_uid("rock").unwrap()).unwrap();

    // a map mixing tiles from two terrains
    let mut map = TileMap::filled(3, 2, grass.get_transitions(TransitionTileType::All)[0].clone());
    map.set((1, 0), rock.get_transitions(TransitionTileType::TopLeft)[0].clone());
    map.set((2, 1), grass.get_transitions(TransitionTileType::BottomLeft)[0].clone());

    let raw = to_raw_map(&map, &data).unwrap();
    // the start-id table is strictly increasing
    assert!(raw.tilesets.windows(2).all(|w| w[0].1 < w[1].1));

    let decoded = to_tile_map(&raw, &mut data).unwrap();
    assert_eq!(map, decoded);
}

#[test]
fn terrain_map_round_trips_through_raw() {
    let mut data = terrain_game();
    let overworld = data.get_terrainset(data.get_uid("overworld").unwrap()).unwrap();
    let grass = data.get_terrain(data.get_uid("grass").unwrap()).unwrap();
    let rock = data.get_terrain(data.get_uid("rock").unwrap()).unwrap();
    let settings = data.terrain_settings();

    let mut map = make_map((4, 3), overworld, grass, settings.empty_tile.clone());
    place_terrain(&mut map, &[(1, 1), (2, 2), (4, 0)], &rock);

    let raw = to_raw_terrain_map(&map, &data).unwrap();
    let rebuilt = to_terrain_map(&raw, &mut data).unwrap();

    assert_eq!(map.size(), rebuilt.size());
    let vertex_ids: Vec<_> = map.vertices.iter().map(|v| v.id).collect();
    let rebuilt_ids: Vec<_> = rebuilt.vertices.iter().map(|v| v.id).collect();
    assert_eq!(vertex_ids, rebuilt_ids);
    assert_eq!(map.terrain_layers, rebuilt.terrain_layers);
    assert_eq!(map.tile_layer, rebuilt.tile_layer);
}

#[test]
fn level_documents_round_trip() {
    let mut data = terrain_game();
    let registry = Arc::clone(data.ids());
    let overworld = data.get_terrainset(data.get_uid("overworld").unwrap()).unwrap();
    let grass = data.get_terrain(data.get_uid("grass").unwrap()).unwrap();
    let rock = data.get_terrain(data.get_uid("rock").unwrap()).unwrap();
    let settings = data.terrain_settings();

    // a one-cell map whose corners alternate grass/rock
    let mut map = make_map((1, 1), overworld, grass, settings.empty_tile.clone());
    place_terrain(&mut map, &[(1, 0), (0, 1)], &rock);

    let level = Level {
        name: "test level".to_owned(),
        description: "round trip".to_owned(),
        map_x: 8,
        map_y: 8,
        player_input_script: registry.make_uid("player-script"),
        ai_input_script: hades::id::UniqueId::ZERO,
        on_load: hades::id::UniqueId::ZERO,
        background: Background::default(),
        terrain: to_raw_terrain_map(&map, &data).unwrap(),
    };

    let text = save_level(&level, &registry).unwrap();
    let reread = load_level(&text, &registry).unwrap();

    assert_eq!(reread.name, "test level");
    assert_eq!(reread.terrain.terrain_vertex, level.terrain.terrain_vertex);
    assert_eq!(reread.terrain.tile_layer, level.terrain.tile_layer);
    assert_eq!(
        reread.player_input_script,
        registry.get_uid("player-script").unwrap()
    );

    // and the re-read raw map resolves to the same terrain
    let rebuilt = to_terrain_map(&reread.terrain, &mut data).unwrap();
    let vertex_ids: Vec<_> = map.vertices.iter().map(|v| v.id).collect();
    let rebuilt_ids: Vec<_> = rebuilt.vertices.iter().map(|v| v.id).collect();
    assert_eq!(vertex_ids, rebuilt_ids);
    assert_eq!(map.terrain_layers, rebuilt.terrain_layers);
}

#[test]
fn validity_checks_vertex_and_layer_shapes() {
    let mut data = terrain_game();
    let overworld = data.get_terrainset(data.get_uid("overworld").unwrap()).unwrap();
    let grass = data.get_terrain(data.get_uid("grass").unwrap()).unwrap();
    let settings = data.terrain_settings();

    let map = make_map((2, 2), overworld, grass, settings.empty_tile.clone());
    let raw = to_raw_terrain_map(&map, &data).unwrap();

    // tile size 8, so a 2x2-tile map is 16x16 pixels
    assert!(is_valid(&raw, &data, (16, 16), 8));
    assert!(!is_valid(&raw, &data, (24, 16), 8));

    let mut bad_vertex = raw.clone();
    bad_vertex.terrain_vertex.pop();
    assert!(!is_valid(&bad_vertex, &data, (16, 16), 8));

    let mut bad_set = raw.clone();
    bad_set.terrainset = hades::id::UniqueId::new();
    assert!(!is_valid(&bad_set, &data, (16, 16), 8));
}

#[test]
fn corner_queries_match_vertices() {
    let mut data = terrain_game();
    let overworld = data.get_terrainset(data.get_uid("overworld").unwrap()).unwrap();
    let grass = data.get_terrain(data.get_uid("grass").unwrap()).unwrap();
    let rock = data.get_terrain(data.get_uid("rock").unwrap()).unwrap();
    let settings = data.terrain_settings();

    let mut map = make_map((3, 3), overworld, grass, settings.empty_tile.clone());
    place_terrain(&mut map, &[(2, 2)], &rock);

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
