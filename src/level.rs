//! Level and mission documents.
//!
//! A level file is a JSON document with a top-level `level` key. Resource
//! references are written as interned names (numeric ids are process
//! local) and resolved through the id registry on load; the terrain data
//! uses the tile-id compression from [`crate::tiles`]. Saving and loading
//! are symmetric, so an edited level round-trips losslessly.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::curve::Vec2f;
use crate::id::{IdRegistry, UniqueId};
use crate::terrain::RawTerrainMap;
use crate::tiles::RawMap;

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("level parse error: {0}")]
    Parse(String),
    #[error("mission parse error: {0}")]
    Mission(String),
}

/// One parallax-scrolled background animation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundLayer {
    pub animation: String,
    pub parallax: Vec2f,
}

/// Level backdrop: a fill colour under layered animations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Background {
    /// RGBA fill colour.
    pub colour: [u8; 4],
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<BackgroundLayer>,
}

/// A compressed tile layer with tileset references by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMapDoc {
    pub tilesets: Vec<(String, u32)>,
    pub tiles: Vec<u32>,
    pub width: u32,
}

impl RawMapDoc {
    fn from_raw(raw: &RawMap, reg: &IdRegistry) -> Self {
        RawMapDoc {
            tilesets: raw
                .tilesets
                .iter()
                .map(|&(id, start)| (reg.as_string(id), start))
                .collect(),
            tiles: raw.tiles.clone(),
            width: raw.width,
        }
    }

    fn to_raw(&self, reg: &IdRegistry) -> RawMap {
        RawMap {
            tilesets: self
                .tilesets
                .iter()
                .map(|(name, start)| (reg.make_uid(name), *start))
                .collect(),
            tiles: self.tiles.clone(),
            width: self.width,
        }
    }
}

/// The serialised shape of a level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelDoc {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Level size in pixels.
    pub map_x: i32,
    pub map_y: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_input_script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_input_script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_load: Option<String>,
    #[serde(default)]
    pub background: Background,
    pub terrainset: String,
    /// Row-major vertex terrain, `(W+1) * (H+1)` entries.
    pub terrain_vertex: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub terrain_layers: Vec<RawMapDoc>,
    pub tile_map_layer: RawMapDoc,
}

#[derive(Debug, Serialize, Deserialize)]
struct LevelFile {
    level: LevelDoc,
}

/// A level with its references resolved to ids.
#[derive(Debug, Clone)]
pub struct Level {
    pub name: String,
    pub description: String,
    pub map_x: i32,
    pub map_y: i32,
    pub player_input_script: UniqueId,
    pub ai_input_script: UniqueId,
    pub on_load: UniqueId,
    pub background: Background,
    pub terrain: RawTerrainMap,
}

fn optional_uid(name: &Option<String>, reg: &IdRegistry) -> UniqueId {
    name.as_deref()
        .map(|n| reg.make_uid(n))
        .unwrap_or(UniqueId::ZERO)
}

fn optional_name(id: UniqueId, reg: &IdRegistry) -> Option<String> {
    id.is_some().then(|| reg.as_string(id))
}

/// Parse a level document.
pub fn load_level(text: &str, reg: &IdRegistry) -> Result<Level, LevelError> {
    let file: LevelFile =
        serde_json::from_str(text).map_err(|e| LevelError::Parse(e.to_string()))?;
    Ok(level_from_doc(file.level, reg))
}

fn level_from_doc(doc: LevelDoc, reg: &IdRegistry) -> Level {
    Level {
        name: doc.name,
        description: doc.description,
        map_x: doc.map_x,
        map_y: doc.map_y,
        player_input_script: optional_uid(&doc.player_input_script, reg),
        ai_input_script: optional_uid(&doc.ai_input_script, reg),
        on_load: optional_uid(&doc.on_load, reg),
        background: doc.background,
        terrain: RawTerrainMap {
            terrainset: reg.make_uid(&doc.terrainset),
            terrain_vertex: doc.terrain_vertex,
            terrain_layers: doc.terrain_layers.iter().map(|l| l.to_raw(reg)).collect(),
            tile_layer: doc.tile_map_layer.to_raw(reg),
        },
    }
}

/// Serialise a level document.
pub fn save_level(level: &Level, reg: &IdRegistry) -> Result<String, LevelError> {
    let file = LevelFile {
        level: level_to_doc(level, reg),
    };
    serde_json::to_string_pretty(&file).map_err(|e| LevelError::Parse(e.to_string()))
}

fn level_to_doc(level: &Level, reg: &IdRegistry) -> LevelDoc {
    LevelDoc {
        name: level.name.clone(),
        description: level.description.clone(),
        map_x: level.map_x,
        map_y: level.map_y,
        player_input_script: optional_name(level.player_input_script, reg),
        ai_input_script: optional_name(level.ai_input_script, reg),
        on_load: optional_name(level.on_load, reg),
        background: level.background.clone(),
        terrainset: reg.as_string(level.terrain.terrainset),
        terrain_vertex: level.terrain.terrain_vertex.clone(),
        terrain_layers: level
            .terrain
            .terrain_layers
            .iter()
            .map(|l| RawMapDoc::from_raw(l, reg))
            .collect(),
        tile_map_layer: RawMapDoc::from_raw(&level.terrain.tile_layer, reg),
    }
}

/// A mission player slot: a name bound to a player object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub object: String,
}

/// A mission's constituent level: inline or by path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MissionLevel {
    Path { path: String },
    Inline { level: LevelDoc },
}

/// The serialised shape of a mission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub players: Vec<Player>,
    /// Ordered list of levels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub levels: Vec<MissionLevel>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MissionFile {
    mission: MissionDoc,
}

/// Parse a mission document.
pub fn load_mission(text: &str) -> Result<MissionDoc, LevelError> {
    let file: MissionFile =
        serde_json::from_str(text).map_err(|e| LevelError::Mission(e.to_string()))?;
    Ok(file.mission)
}

/// Serialise a mission document.
pub fn save_mission(mission: &MissionDoc) -> Result<String, LevelError> {
    let file = MissionFile {
        mission: mission.clone(),
    };
    serde_json::to_string_pretty(&file).map_err(|e| LevelError::Mission(e.to_string()))
}

/// Parse a raw level value already read from a mission document.
pub fn level_from_value(value: &Value, reg: &IdRegistry) -> Result<Level, LevelError> {
    let doc: LevelDoc =
        serde_json::from_value(value.clone()).map_err(|e| LevelError::Parse(e.to_string()))?;
    Ok(level_from_doc(doc, reg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mission_levels_parse_both_shapes() {
        let text = r#"{
            "mission": {
                "name": "campaign",
                "players": [{"name": "one", "object": "player-object"}],
                "levels": [
                    {"path": "levels/first.json"},
                    {"level": {
                        "name": "inline",
                        "map_x": 32, "map_y": 32,
                        "terrainset": "overworld",
                        "terrain_vertex": [1, 1, 1, 1],
                        "tile_map_layer": {"tilesets": [], "tiles": [0], "width": 1}
                    }}
                ]
            }
        }"#;
        let mission = load_mission(text).unwrap();
        assert_eq!(mission.name, "campaign");
        assert_eq!(mission.players.len(), 1);
        assert!(matches!(mission.levels[0], MissionLevel::Path { .. }));
        assert!(matches!(mission.levels[1], MissionLevel::Inline { .. }));

        let saved = save_mission(&mission).unwrap();
        let reparsed = load_mission(&saved).unwrap();
        assert_eq!(mission, reparsed);
    }
}
