//! Resource representation.
//!
//! Every engine asset is one alternative of the closed [`ResourceKind`]
//! sum, wrapped in a [`Resource`] carrying its id, owning mod, load state
//! and generation. Typed access goes through the [`ResourcePayload`] trait
//! so `DataManager::get::<Terrain>` and friends stay strongly typed.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::curve::CurveKind;
use crate::data::files::FileError;
use crate::id::{IdRegistry, UniqueId};
use crate::state::systems::{RenderBehaviour, SystemBehaviour};
use crate::terrain::{Terrain, TerrainSettings, Terrainset, TransitionTileType};
use crate::tiles::{Tile, Tileset};

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("no resource with id {0}")]
    Null(UniqueId),
    #[error("resource {0} is not a {1}")]
    WrongType(UniqueId, &'static str),
    #[error("data manager not available")]
    ProviderUnavailable,
    #[error("parse error in {0}: {1}")]
    Parse(String, String),
    #[error(transparent)]
    File(#[from] FileError),
}

/// Value type a variable declaration can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveValueType {
    Int,
    Float,
    Vec2,
    Bool,
    String,
    ObjectRef,
    Unique,
    CollectionInt,
    CollectionFloat,
}

impl CurveValueType {
    pub fn name(self) -> &'static str {
        match self {
            CurveValueType::Int => "int32",
            CurveValueType::Float => "float",
            CurveValueType::Vec2 => "vec2_float",
            CurveValueType::Bool => "bool",
            CurveValueType::String => "string",
            CurveValueType::ObjectRef => "obj_ref",
            CurveValueType::Unique => "unique",
            CurveValueType::CollectionInt => "collection_int",
            CurveValueType::CollectionFloat => "collection_float",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "int32" | "int" => CurveValueType::Int,
            "float" => CurveValueType::Float,
            "vec2_float" | "vec2" => CurveValueType::Vec2,
            "bool" => CurveValueType::Bool,
            "string" => CurveValueType::String,
            "obj_ref" | "object_ref" => CurveValueType::ObjectRef,
            "unique" => CurveValueType::Unique,
            "collection_int" => CurveValueType::CollectionInt,
            "collection_float" => CurveValueType::CollectionFloat,
            _ => return None,
        })
    }

    /// Whether a linear curve over this type can interpolate.
    pub fn lerpable(self) -> bool {
        matches!(
            self,
            CurveValueType::Int
                | CurveValueType::Float
                | CurveValueType::Vec2
                | CurveValueType::CollectionInt
                | CurveValueType::CollectionFloat
        )
    }
}

/// Mod header resource.
#[derive(Debug, Clone, Default)]
pub struct ModInfo {
    pub id: UniqueId,
    /// Archive or directory name the mod was read from.
    pub source: String,
    pub name: String,
    pub dependencies: Vec<UniqueId>,
}

/// Texture resource; pixel data is owned by the render layer, the graph
/// only tracks the path and whether it resolves.
#[derive(Debug, Clone, Default)]
pub struct Texture {
    pub id: UniqueId,
    pub path: String,
}

/// A named variable declaration: which curve flavour it uses, its value
/// type, and whether keyframes are exported to render clients.
#[derive(Debug, Clone)]
pub struct CurveDecl {
    pub id: UniqueId,
    pub kind: CurveKind,
    pub value_type: CurveValueType,
    pub sync: bool,
    pub save: bool,
    pub default: Option<Value>,
}

impl Default for CurveDecl {
    fn default() -> Self {
        CurveDecl {
            id: UniqueId::ZERO,
            kind: CurveKind::Step,
            value_type: CurveValueType::Int,
            sync: false,
            save: true,
            default: None,
        }
    }
}

/// Game system resource: a name bound to registered tick behaviour.
#[derive(Debug, Clone, Default)]
pub struct SystemDecl {
    pub id: UniqueId,
    pub behaviour: Option<SystemBehaviour>,
}

/// Render-side system resource.
#[derive(Debug, Clone, Default)]
pub struct RenderSystemDecl {
    pub id: UniqueId,
    pub behaviour: Option<RenderBehaviour>,
}

/// The closed set of resource categories.
#[derive(Clone)]
pub enum ResourceKind {
    Mod(ModInfo),
    Texture(Texture),
    Tileset(Arc<Tileset>),
    Terrain(Arc<Terrain>),
    Terrainset(Arc<Terrainset>),
    TerrainSettings(Arc<TerrainSettings>),
    Curve(CurveDecl),
    System(SystemDecl),
    RenderSystem(RenderSystemDecl),
}

impl ResourceKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ResourceKind::Mod(_) => "mod",
            ResourceKind::Texture(_) => "texture",
            ResourceKind::Tileset(_) => "tileset",
            ResourceKind::Terrain(_) => "terrain",
            ResourceKind::Terrainset(_) => "terrainset",
            ResourceKind::TerrainSettings(_) => "terrain-settings",
            ResourceKind::Curve(_) => "curve",
            ResourceKind::System(_) => "system",
            ResourceKind::RenderSystem(_) => "render-system",
        }
    }
}

/// A resource instance: one `(id, mod)` entry on the shadow stack.
#[derive(Clone)]
pub struct Resource {
    pub id: UniqueId,
    pub mod_id: UniqueId,
    pub loaded: bool,
    pub generation: u32,
    pub kind: ResourceKind,
}

impl Resource {
    pub fn new(id: UniqueId, mod_id: UniqueId, kind: ResourceKind) -> Self {
        Resource {
            id,
            mod_id,
            loaded: false,
            generation: 0,
            kind,
        }
    }
}

/// Typed access into [`ResourceKind`].
pub trait ResourcePayload: Sized + 'static {
    /// What lookups hand out: `Arc<Self>` for shared payloads, a clone for
    /// small declarations.
    type Handle: Clone;

    const KIND_NAME: &'static str;

    /// A fresh kind for `find_or_create`.
    fn empty(id: UniqueId) -> ResourceKind;
    /// Extract a handle, if the kind matches.
    fn handle(kind: &ResourceKind) -> Option<Self::Handle>;
    /// Mutable payload access, if the kind matches.
    fn payload_mut(kind: &mut ResourceKind) -> Option<&mut Self>;
}

impl ResourcePayload for ModInfo {
    type Handle = ModInfo;
    const KIND_NAME: &'static str = "mod";

    fn empty(id: UniqueId) -> ResourceKind {
        ResourceKind::Mod(ModInfo {
            id,
            ..ModInfo::default()
        })
    }
    fn handle(kind: &ResourceKind) -> Option<ModInfo> {
        match kind {
            ResourceKind::Mod(m) => Some(m.clone()),
            _ => None,
        }
    }
    fn payload_mut(kind: &mut ResourceKind) -> Option<&mut Self> {
        match kind {
            ResourceKind::Mod(m) => Some(m),
            _ => None,
        }
    }
}

impl ResourcePayload for Texture {
    type Handle = Texture;
    const KIND_NAME: &'static str = "texture";

    fn empty(id: UniqueId) -> ResourceKind {
        ResourceKind::Texture(Texture {
            id,
            ..Texture::default()
        })
    }
    fn handle(kind: &ResourceKind) -> Option<Texture> {
        match kind {
            ResourceKind::Texture(t) => Some(t.clone()),
            _ => None,
        }
    }
    fn payload_mut(kind: &mut ResourceKind) -> Option<&mut Self> {
        match kind {
            ResourceKind::Texture(t) => Some(t),
            _ => None,
        }
    }
}

impl ResourcePayload for Tileset {
    type Handle = Arc<Tileset>;
    const KIND_NAME: &'static str = "tileset";

    fn empty(id: UniqueId) -> ResourceKind {
        ResourceKind::Tileset(Arc::new(Tileset {
            id,
            ..Tileset::default()
        }))
    }
    fn handle(kind: &ResourceKind) -> Option<Arc<Tileset>> {
        match kind {
            ResourceKind::Tileset(t) => Some(t.clone()),
            _ => None,
        }
    }
    fn payload_mut(kind: &mut ResourceKind) -> Option<&mut Self> {
        match kind {
            ResourceKind::Tileset(t) => Some(Arc::make_mut(t)),
            _ => None,
        }
    }
}

impl ResourcePayload for Terrain {
    type Handle = Arc<Terrain>;
    const KIND_NAME: &'static str = "terrain";

    fn empty(id: UniqueId) -> ResourceKind {
        ResourceKind::Terrain(Arc::new(Terrain {
            id,
            ..Terrain::default()
        }))
    }
    fn handle(kind: &ResourceKind) -> Option<Arc<Terrain>> {
        match kind {
            ResourceKind::Terrain(t) => Some(t.clone()),
            _ => None,
        }
    }
    fn payload_mut(kind: &mut ResourceKind) -> Option<&mut Self> {
        match kind {
            ResourceKind::Terrain(t) => Some(Arc::make_mut(t)),
            _ => None,
        }
    }
}

impl ResourcePayload for Terrainset {
    type Handle = Arc<Terrainset>;
    const KIND_NAME: &'static str = "terrainset";

    fn empty(id: UniqueId) -> ResourceKind {
        ResourceKind::Terrainset(Arc::new(Terrainset {
            id,
            ..Terrainset::default()
        }))
    }
    fn handle(kind: &ResourceKind) -> Option<Arc<Terrainset>> {
        match kind {
            ResourceKind::Terrainset(t) => Some(t.clone()),
            _ => None,
        }
    }
    fn payload_mut(kind: &mut ResourceKind) -> Option<&mut Self> {
        match kind {
            ResourceKind::Terrainset(t) => Some(Arc::make_mut(t)),
            _ => None,
        }
    }
}

impl ResourcePayload for TerrainSettings {
    type Handle = Arc<TerrainSettings>;
    const KIND_NAME: &'static str = "terrain-settings";

    fn empty(_id: UniqueId) -> ResourceKind {
        ResourceKind::TerrainSettings(Arc::new(TerrainSettings::default()))
    }
    fn handle(kind: &ResourceKind) -> Option<Arc<TerrainSettings>> {
        match kind {
            ResourceKind::TerrainSettings(t) => Some(t.clone()),
            _ => None,
        }
    }
    fn payload_mut(kind: &mut ResourceKind) -> Option<&mut Self> {
        match kind {
            ResourceKind::TerrainSettings(t) => Some(Arc::make_mut(t)),
            _ => None,
        }
    }
}

impl ResourcePayload for CurveDecl {
    type Handle = CurveDecl;
    const KIND_NAME: &'static str = "curve";

    fn empty(id: UniqueId) -> ResourceKind {
        ResourceKind::Curve(CurveDecl {
            id,
            ..CurveDecl::default()
        })
    }
    fn handle(kind: &ResourceKind) -> Option<CurveDecl> {
        match kind {
            ResourceKind::Curve(c) => Some(c.clone()),
            _ => None,
        }
    }
    fn payload_mut(kind: &mut ResourceKind) -> Option<&mut Self> {
        match kind {
            ResourceKind::Curve(c) => Some(c),
            _ => None,
        }
    }
}

impl ResourcePayload for SystemDecl {
    type Handle = SystemDecl;
    const KIND_NAME: &'static str = "system";

    fn empty(id: UniqueId) -> ResourceKind {
        ResourceKind::System(SystemDecl {
            id,
            behaviour: None,
        })
    }
    fn handle(kind: &ResourceKind) -> Option<SystemDecl> {
        match kind {
            ResourceKind::System(s) => Some(s.clone()),
            _ => None,
        }
    }
    fn payload_mut(kind: &mut ResourceKind) -> Option<&mut Self> {
        match kind {
            ResourceKind::System(s) => Some(s),
            _ => None,
        }
    }
}

impl ResourcePayload for RenderSystemDecl {
    type Handle = RenderSystemDecl;
    const KIND_NAME: &'static str = "render-system";

    fn empty(id: UniqueId) -> ResourceKind {
        ResourceKind::RenderSystem(RenderSystemDecl {
            id,
            behaviour: None,
        })
    }
    fn handle(kind: &ResourceKind) -> Option<RenderSystemDecl> {
        match kind {
            ResourceKind::RenderSystem(s) => Some(s.clone()),
            _ => None,
        }
    }
    fn payload_mut(kind: &mut ResourceKind) -> Option<&mut Self> {
        match kind {
            ResourceKind::RenderSystem(s) => Some(s),
            _ => None,
        }
    }
}

fn tile_value(tile: &Tile, reg: &IdRegistry) -> Value {
    let mut map = Map::new();
    map.insert("left".into(), json!(tile.left));
    map.insert("top".into(), json!(tile.top));
    if !tile.tags.is_empty() {
        let tags: Vec<String> = tile.tags.iter().map(|&t| reg.as_string(t)).collect();
        map.insert("tags".into(), json!(tags));
    }
    Value::Object(map)
}

fn tiles_value(tiles: &[Tile], reg: &IdRegistry) -> Value {
    Value::Array(tiles.iter().map(|t| tile_value(t, reg)).collect())
}

/// Transition group names as they appear in resource documents, indexed by
/// [`TransitionTileType::index`].
pub const TRANSITION_GROUP_NAMES: [&str; 16] = [
    "none",
    "top_right",
    "bottom_right",
    "top_right_bottom_right",
    "bottom_left",
    "top_right_bottom_left",
    "bottom_left_right",
    "top_right_bottom_left_right",
    "top_left",
    "top_left_right",
    "top_left_bottom_right",
    "top_left_right_bottom_right",
    "top_left_bottom_left",
    "top_left_right_bottom_left",
    "top_left_bottom_left_right",
    "all",
];

/// Name of a transition group in resource documents.
pub fn transition_group_name(kind: TransitionTileType) -> &'static str {
    TRANSITION_GROUP_NAMES[kind.index()]
}

/// Index of a named transition group.
pub fn transition_group_index(name: &str) -> Option<usize> {
    TRANSITION_GROUP_NAMES.iter().position(|&n| n == name)
}

/// Write a resource into the right top-level group of a mod document.
/// The inverse of the registered parsers.
pub fn serialise_into(
    kind: &ResourceKind,
    name: &str,
    reg: &IdRegistry,
    out: &mut Map<String, Value>,
) {
    let (group, value) = match kind {
        ResourceKind::Mod(_) => return, // written by the caller as the header
        ResourceKind::Texture(texture) => ("textures", json!({ "path": texture.path })),
        ResourceKind::Tileset(tileset) => {
            let texture = tileset.tiles.first().map(|t| reg.as_string(t.texture));
            (
                "tilesets",
                json!({
                    "texture": texture.unwrap_or_default(),
                    "tiles": tiles_value(&tileset.tiles, reg),
                }),
            )
        }
        ResourceKind::Terrain(terrain) => {
            let texture = terrain.tiles.first().map(|t| reg.as_string(t.texture));
            let mut map = Map::new();
            map.insert("texture".into(), json!(texture.unwrap_or_default()));
            map.insert("tiles".into(), tiles_value(&terrain.tiles, reg));
            if !terrain.tags.is_empty() {
                let tags: Vec<String> = terrain.tags.iter().map(|&t| reg.as_string(t)).collect();
                map.insert("tags".into(), json!(tags));
            }
            let mut transitions = Map::new();
            for (index, group) in terrain.transitions.iter().enumerate() {
                // the full-tile and empty groups are implied by `tiles` and
                // the terrain settings
                if index == 0 || index == TRANSITION_GROUP_NAMES.len() - 1 || group.is_empty() {
                    continue;
                }
                transitions.insert(
                    TRANSITION_GROUP_NAMES[index].to_owned(),
                    tiles_value(group, reg),
                );
            }
            map.insert("transitions".into(), Value::Object(transitions));
            ("terrain", Value::Object(map))
        }
        ResourceKind::Terrainset(set) => {
            let names: Vec<String> = set.terrain_ids.iter().map(|&t| reg.as_string(t)).collect();
            ("terrainsets", json!(names))
        }
        ResourceKind::TerrainSettings(settings) => (
            "terrain-settings",
            json!({
                "tile-size": settings.tile_size,
                "empty-terrain": reg.as_string(settings.empty_terrain),
                "empty-terrainset": reg.as_string(settings.empty_terrainset),
                "background-terrain": reg.as_string(settings.background_terrain),
                "empty-tile": tile_value(&settings.empty_tile, reg),
            }),
        ),
        ResourceKind::Curve(curve) => {
            let kind = match curve.kind {
                CurveKind::Step => "step",
                CurveKind::Linear => "linear",
                CurveKind::Pulse => "pulse",
            };
            let mut map = Map::new();
            map.insert("type".into(), json!(kind));
            map.insert("value".into(), json!(curve.value_type.name()));
            map.insert("sync".into(), json!(curve.sync));
            map.insert("save".into(), json!(curve.save));
            if let Some(default) = &curve.default {
                map.insert("default".into(), default.clone());
            }
            ("curves", Value::Object(map))
        }
        ResourceKind::System(_) => ("systems", json!({})),
        ResourceKind::RenderSystem(_) => ("render-systems", json!({})),
    };

    let entry = out
        .entry(group.to_owned())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(entries) = entry {
        entries.insert(name.to_owned(), value);
    }
}
