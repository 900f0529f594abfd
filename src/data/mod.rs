//! Resource graph.
//!
//! Mods are JSON documents whose top-level keys dispatch to registered
//! parsers. Parsed resources land on a per-id shadow stack (one entry per
//! mod, later mods on top) and are queued for deferred loading. `get`
//! style lookups return the top-of-stack entry, loading it on demand.

pub mod files;
pub mod parse;
pub mod resources;

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value, json};

use crate::curve::CurveKind;
use crate::id::{IdRegistry, UniqueId};
use crate::state::systems::{RenderBehaviour, SystemBehaviour};
use crate::terrain::{Terrain, TerrainSettings, Terrainset};
use crate::tiles::{Tile, Tileset};

pub use files::{DirectoryFiles, FileError, FileProvider, FileProviderHandle, MemoryFiles};
pub use resources::{
    CurveDecl, CurveValueType, ModInfo, RenderSystemDecl, Resource, ResourceError, ResourceKind,
    ResourcePayload, SystemDecl, Texture,
};

/// Mod header file of the base game.
pub const GAME_FILE: &str = "game.json";
/// Mod header file of overlay mods.
pub const MOD_FILE: &str = "mod.json";
/// Interned name of the terrain settings resource.
pub const TERRAIN_SETTINGS_NAME: &str = "terrain-settings";

/// A registered resource parser: `(mod, node, manager)`.
pub type ParserFn = Arc<dyn Fn(UniqueId, &Value, &mut DataManager) + Send + Sync>;

/// The resource manager. Not internally synchronised; the process instance
/// sits behind a `RwLock` (see [`set_data_manager`]) with parse/load as
/// writer operations and lookups as reader operations.
pub struct DataManager {
    parsers: FxHashMap<String, ParserFn>,
    files: FileProviderHandle,
    ids: Arc<IdRegistry>,
    game: UniqueId,
    game_loaded: bool,
    mods: Vec<UniqueId>,
    resources: FxHashMap<UniqueId, Vec<Resource>>,
    load_queue: Vec<(UniqueId, UniqueId)>,
    system_behaviours: FxHashMap<String, SystemBehaviour>,
    render_behaviours: FxHashMap<String, RenderBehaviour>,
}

impl DataManager {
    pub fn new(files: FileProviderHandle, ids: Arc<IdRegistry>) -> Self {
        let mut manager = DataManager {
            parsers: FxHashMap::default(),
            files,
            ids,
            game: UniqueId::ZERO,
            game_loaded: false,
            mods: Vec::new(),
            resources: FxHashMap::default(),
            load_queue: Vec::new(),
            system_behaviours: FxHashMap::default(),
            render_behaviours: FxHashMap::default(),
        };
        register_core_resource_types(&mut manager);
        manager
    }

    // ---- ids ----

    pub fn make_uid(&self, name: &str) -> UniqueId {
        self.ids.make_uid(name)
    }

    pub fn get_uid(&self, name: &str) -> Option<UniqueId> {
        self.ids.get_uid(name)
    }

    pub fn get_as_string(&self, id: UniqueId) -> String {
        self.ids.as_string(id)
    }

    pub fn ids(&self) -> &Arc<IdRegistry> {
        &self.ids
    }

    // ---- registration ----

    pub fn register_resource_type(
        &mut self,
        key: &str,
        parser: impl Fn(UniqueId, &Value, &mut DataManager) + Send + Sync + 'static,
    ) {
        self.parsers.insert(key.to_owned(), Arc::new(parser));
    }

    /// Bind tick behaviour to a system name before mods are parsed.
    pub fn register_system_behaviour(&mut self, name: &str, behaviour: SystemBehaviour) {
        self.system_behaviours.insert(name.to_owned(), behaviour);
    }

    pub fn register_render_behaviour(&mut self, name: &str, behaviour: RenderBehaviour) {
        self.render_behaviours.insert(name.to_owned(), behaviour);
    }

    // ---- mod loading ----

    /// Load the base game from `<game>/game.json`. A second call is
    /// ignored.
    pub fn load_game(&mut self, game: &str) -> Result<(), ResourceError> {
        if self.game_loaded {
            log::info!("tried to load {game}, a game is already loaded, skipping");
            return Ok(());
        }
        self.add_mod(game, true, GAME_FILE)?;
        self.game_loaded = true;
        Ok(())
    }

    /// Load a mod over the current stack. With `auto_load`, unmet
    /// dependencies are loaded recursively; otherwise they must already be
    /// loaded and are reported when missing.
    pub fn add_mod(&mut self, source: &str, auto_load: bool, file: &str) -> Result<(), ResourceError> {
        let text = self.files.as_string(source, file)?;
        let root: Value = serde_json::from_str(&text)
            .map_err(|e| ResourceError::Parse(format!("{source}/{file}"), e.to_string()))?;

        self.parse_mod(source, &root, auto_load)?;

        let uid = self.make_uid(source);
        if file == GAME_FILE {
            self.game = uid;
        } else if !self.mods.contains(&uid) {
            self.mods.push(uid);
        }
        Ok(())
    }

    fn parse_mod(&mut self, source: &str, root: &Value, auto_load: bool) -> Result<(), ResourceError> {
        let header = root
            .get("mod")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                ResourceError::Parse(source.to_owned(), "mod header missing".to_owned())
            })?;
        let name = parse::get_str(header, "name").ok_or_else(|| {
            ResourceError::Parse(source.to_owned(), "mod name missing".to_owned())
        })?;
        let name = name.to_owned();

        let dependency_names = header
            .get("depends")
            .map(|deps| parse::merge_sequence(deps, &[]))
            .unwrap_or_default();

        let mut dependencies = Vec::with_capacity(dependency_names.len());
        for dep in &dependency_names {
            if auto_load {
                if let Err(e) = self.add_mod(dep, true, MOD_FILE) {
                    log::error!("failed to load dependency {dep} of {source}: {e}");
                }
            } else if !self.loaded(dep) {
                log::error!("dependency {dep} of {source} is not loaded");
            }
            dependencies.push(self.make_uid(dep));
        }

        let mod_id = self.make_uid(source);
        let info = self.find_or_create::<ModInfo>(mod_id, mod_id);
        info.source = source.to_owned();
        info.name = name;
        info.dependencies = dependencies;

        let mut visited = FxHashSet::default();
        self.parse_document(mod_id, source, root, &mut visited);
        Ok(())
    }

    fn parse_document(
        &mut self,
        mod_id: UniqueId,
        source: &str,
        root: &Value,
        visited: &mut FxHashSet<String>,
    ) {
        let Some(entries) = root.as_object() else {
            log::error!("mod document in {source} is not a map");
            return;
        };

        for (key, value) in entries {
            match key.as_str() {
                "mod" => {}
                "include" => {
                    let Some(path) = value.as_str() else {
                        log::warn!("include in {source} is not a path");
                        continue;
                    };
                    if !visited.insert(path.to_owned()) {
                        log::warn!("repeated include of {path} in {source}, skipping");
                        continue;
                    }
                    match self.files.as_string(source, path) {
                        Ok(text) => match serde_json::from_str::<Value>(&text) {
                            Ok(included) => {
                                self.parse_document(mod_id, source, &included, visited)
                            }
                            Err(e) => log::error!("failed to parse {source}/{path}: {e}"),
                        },
                        Err(e) => log::error!("{e}"),
                    }
                }
                _ => match self.parsers.get(key).cloned() {
                    Some(parser) => (*parser)(mod_id, value, self),
                    // unknown top level keys are not an error
                    None => log::debug!("no parser registered for {key:?}"),
                },
            }
        }
    }

    /// True if a mod with this source name has been parsed.
    pub fn loaded(&self, source: &str) -> bool {
        let Some(id) = self.get_uid(source) else {
            return false;
        };
        self.top(id)
            .map(|r| matches!(r.kind, ResourceKind::Mod(_)))
            .unwrap_or(false)
    }

    /// Re-read every mod, game first, in original load order.
    pub fn reparse(&mut self) -> Result<(), ResourceError> {
        let game = self.get_no_load::<ModInfo>(self.game)?.source;
        let mods: Vec<String> = self
            .mods
            .iter()
            .filter_map(|&m| self.get_no_load::<ModInfo>(m).ok().map(|i| i.source))
            .collect();

        self.mods.clear();
        self.add_mod(&game, true, GAME_FILE)?;
        for source in mods {
            self.add_mod(&source, false, MOD_FILE)?;
        }
        Ok(())
    }

    // ---- resource access ----

    fn top(&self, id: UniqueId) -> Option<&Resource> {
        self.resources.get(&id).and_then(|stack| stack.last())
    }

    fn entry_mut(&mut self, id: UniqueId, mod_id: UniqueId) -> Option<&mut Resource> {
        self.resources
            .get_mut(&id)
            .and_then(|stack| stack.iter_mut().find(|r| r.mod_id == mod_id))
    }

    pub fn exists(&self, id: UniqueId) -> bool {
        self.top(id).is_some()
    }

    pub fn game(&self) -> UniqueId {
        self.game
    }

    pub fn mods(&self) -> &[UniqueId] {
        &self.mods
    }

    /// Fetch or create the `(id, mod)` entry as a `T`, replacing a
    /// conflicting declaration of another kind.
    pub fn find_or_create<T: ResourcePayload>(&mut self, id: UniqueId, mod_id: UniqueId) -> &mut T {
        let name = self.ids.as_string(id);
        let stack = self.resources.entry(id).or_default();
        let index = match stack.iter().position(|r| r.mod_id == mod_id) {
            Some(i) => {
                if T::payload_mut(&mut stack[i].kind).is_none() {
                    log::warn!(
                        "resource {name} redeclared as {}, was {}",
                        T::KIND_NAME,
                        stack[i].kind.kind_name()
                    );
                    stack[i].kind = T::empty(id);
                    stack[i].loaded = false;
                }
                i
            }
            None => {
                stack.push(Resource::new(id, mod_id, T::empty(id)));
                stack.len() - 1
            }
        };
        T::payload_mut(&mut stack[index].kind).expect("kind was just ensured")
    }

    /// Queue a resource for (re)loading.
    pub fn queue_load(&mut self, id: UniqueId, mod_id: UniqueId) {
        if !self.load_queue.contains(&(id, mod_id)) {
            self.load_queue.push((id, mod_id));
        }
    }

    /// Typed lookup of the top-of-stack entry, loading it on demand.
    pub fn get<T: ResourcePayload>(&mut self, id: UniqueId) -> Result<T::Handle, ResourceError> {
        let (loaded, mod_id) = {
            let top = self.top(id).ok_or(ResourceError::Null(id))?;
            (top.loaded, top.mod_id)
        };
        if !loaded {
            if let Err(e) = self.load_one(id, mod_id) {
                log::warn!("failed to load {}: {e}", self.get_as_string(id));
            }
        }
        let top = self.top(id).ok_or(ResourceError::Null(id))?;
        T::handle(&top.kind).ok_or(ResourceError::WrongType(id, T::KIND_NAME))
    }

    /// Typed lookup without triggering a load; for editors and inspection.
    pub fn get_no_load<T: ResourcePayload>(&self, id: UniqueId) -> Result<T::Handle, ResourceError> {
        let top = self.top(id).ok_or(ResourceError::Null(id))?;
        T::handle(&top.kind).ok_or(ResourceError::WrongType(id, T::KIND_NAME))
    }

    /// Non-loading lookup; the `Result` carries the failure kind.
    pub fn try_get<T: ResourcePayload>(&self, id: UniqueId) -> Result<T::Handle, ResourceError> {
        self.get_no_load::<T>(id)
    }

    // ---- load queue ----

    /// Drain the whole load queue. Per-resource failures are logged and do
    /// not stop the drain.
    pub fn load(&mut self) {
        let queue = std::mem::take(&mut self.load_queue);
        for (id, mod_id) in queue {
            if let Err(e) = self.load_one(id, mod_id) {
                log::error!("failed to load {}: {e}", self.get_as_string(id));
            }
        }
    }

    /// Load at most `count` queued resources.
    pub fn load_count(&mut self, count: usize) {
        let take = count.min(self.load_queue.len());
        let queue: Vec<_> = self.load_queue.drain(..take).collect();
        for (id, mod_id) in queue {
            if let Err(e) = self.load_one(id, mod_id) {
                log::error!("failed to load {}: {e}", self.get_as_string(id));
            }
        }
    }

    /// Load `id` now, if it is queued.
    pub fn load_id(&mut self, id: UniqueId) {
        let mut queued = Vec::new();
        self.load_queue.retain(|&(qid, qmod)| {
            if qid == id {
                queued.push((qid, qmod));
                false
            } else {
                true
            }
        });
        for (id, mod_id) in queued {
            if let Err(e) = self.load_one(id, mod_id) {
                log::error!("failed to load {}: {e}", self.get_as_string(id));
            }
        }
    }

    /// Queue every known resource for reload.
    pub fn refresh(&mut self) {
        let entries: Vec<(UniqueId, UniqueId)> = self
            .resources
            .values()
            .flatten()
            .map(|r| (r.id, r.mod_id))
            .collect();
        for (id, mod_id) in entries {
            self.queue_load(id, mod_id);
        }
    }

    /// Queue one resource for reload.
    pub fn refresh_id(&mut self, id: UniqueId) {
        if let Some(mod_id) = self.top(id).map(|r| r.mod_id) {
            self.queue_load(id, mod_id);
        }
    }

    fn load_one(&mut self, id: UniqueId, mod_id: UniqueId) -> Result<(), ResourceError> {
        let kind = self
            .entry_mut(id, mod_id)
            .ok_or(ResourceError::Null(id))?
            .kind
            .clone();
        let kind = self.load_kind(kind, mod_id)?;
        let entry = self.entry_mut(id, mod_id).ok_or(ResourceError::Null(id))?;
        entry.kind = kind;
        entry.loaded = true;
        entry.generation += 1;
        Ok(())
    }

    fn load_kind(&mut self, kind: ResourceKind, mod_id: UniqueId) -> Result<ResourceKind, ResourceError> {
        Ok(match kind {
            ResourceKind::Texture(texture) => {
                let source = self
                    .get_no_load::<ModInfo>(mod_id)
                    .map(|m| m.source)
                    .unwrap_or_default();
                if !texture.path.is_empty() && !self.files.exists(&source, &texture.path) {
                    log::warn!("texture file {} missing from {source}", texture.path);
                }
                ResourceKind::Texture(texture)
            }
            ResourceKind::Terrain(terrain) => {
                let settings = self.terrain_settings();
                let mut terrain = (*terrain).clone();
                let last = terrain.transitions.len() - 1;
                if terrain.transitions[last].is_empty() {
                    terrain.transitions[last] = terrain.tiles.clone();
                }
                if terrain.transitions[0].is_empty() {
                    terrain.transitions[0] = vec![settings.empty_tile.clone()];
                }
                for index in 1..last {
                    if terrain.transitions[index].is_empty() {
                        log::warn!(
                            "terrain {} has no {} tiles, using the empty tile",
                            self.get_as_string(terrain.id),
                            resources::TRANSITION_GROUP_NAMES[index]
                        );
                        terrain.transitions[index] = vec![settings.empty_tile.clone()];
                    }
                }
                ResourceKind::Terrain(Arc::new(terrain))
            }
            ResourceKind::Terrainset(set) => {
                let mut set = (*set).clone();
                set.terrains.clear();
                for &terrain_id in &set.terrain_ids.clone() {
                    match self.get::<Terrain>(terrain_id) {
                        Ok(terrain) => set.terrains.push(terrain),
                        Err(e) => log::error!(
                            "terrainset {}: {e}",
                            self.get_as_string(set.id)
                        ),
                    }
                }
                ResourceKind::Terrainset(Arc::new(set))
            }
            ResourceKind::Curve(mut decl) => {
                if decl.kind == CurveKind::Linear && !decl.value_type.lerpable() {
                    log::warn!(
                        "curve {} is linear over {}, which cannot interpolate; demoting to step",
                        self.get_as_string(decl.id),
                        decl.value_type.name()
                    );
                    decl.kind = CurveKind::Step;
                }
                ResourceKind::Curve(decl)
            }
            ResourceKind::System(decl) => {
                if decl.behaviour.is_none() {
                    log::warn!(
                        "system {} has no registered behaviour",
                        self.get_as_string(decl.id)
                    );
                }
                ResourceKind::System(decl)
            }
            ResourceKind::RenderSystem(decl) => {
                if decl.behaviour.is_none() {
                    log::warn!(
                        "render system {} has no registered behaviour",
                        self.get_as_string(decl.id)
                    );
                }
                ResourceKind::RenderSystem(decl)
            }
            other => other,
        })
    }

    // ---- typed conveniences ----

    /// The tileset for `id`; a terrain id resolves to its full tile list,
    /// so terrain tiles can appear in compressed maps.
    pub fn get_tileset(&mut self, id: UniqueId) -> Result<Arc<Tileset>, ResourceError> {
        match self.get::<Tileset>(id) {
            Ok(set) => Ok(set),
            Err(ResourceError::WrongType(..)) => {
                let terrain = self.get::<Terrain>(id)?;
                Ok(Arc::new(Tileset {
                    id,
                    tiles: terrain.full_tile_list(),
                }))
            }
            Err(e) => Err(e),
        }
    }

    pub fn get_terrain(&mut self, id: UniqueId) -> Result<Arc<Terrain>, ResourceError> {
        self.get::<Terrain>(id)
    }

    pub fn get_terrainset(&mut self, id: UniqueId) -> Result<Arc<Terrainset>, ResourceError> {
        self.get::<Terrainset>(id)
    }

    pub fn get_terrainset_no_load(&self, id: UniqueId) -> Result<Arc<Terrainset>, ResourceError> {
        self.get_no_load::<Terrainset>(id)
    }

    pub fn get_curve(&self, id: UniqueId) -> Result<CurveDecl, ResourceError> {
        self.get_no_load::<CurveDecl>(id)
    }

    /// The terrain settings resource, or defaults when no mod declared one.
    pub fn terrain_settings(&self) -> Arc<TerrainSettings> {
        self.get_uid(TERRAIN_SETTINGS_NAME)
            .and_then(|id| self.get_no_load::<TerrainSettings>(id).ok())
            .unwrap_or_default()
    }

    /// The tileset (or terrain) whose tile list contains `tile`, with its
    /// tiles; used when compressing maps.
    pub fn find_tileset_for(&self, tile: &Tile) -> Option<(UniqueId, Vec<Tile>)> {
        for stack in self.resources.values() {
            let Some(top) = stack.last() else { continue };
            match &top.kind {
                ResourceKind::Tileset(set) if set.tiles.contains(tile) => {
                    return Some((top.id, set.tiles.clone()));
                }
                ResourceKind::Terrain(terrain) => {
                    let tiles = terrain.full_tile_list();
                    if tiles.contains(tile) {
                        return Some((top.id, tiles));
                    }
                }
                _ => {}
            }
        }
        None
    }

    // ---- serialisation ----

    /// Write a mod (header plus every resource it declares) back out as a
    /// document; the inverse of parsing.
    pub fn serialise_mod(&self, mod_id: UniqueId) -> Result<Value, ResourceError> {
        let info = self.get_no_load::<ModInfo>(mod_id)?;
        let mut out = Map::new();

        let depends: Vec<String> = info
            .dependencies
            .iter()
            .map(|&d| self.get_as_string(d))
            .collect();
        let mut header = Map::new();
        header.insert("name".into(), json!(info.name));
        if !depends.is_empty() {
            header.insert("depends".into(), json!(depends));
        }
        out.insert("mod".into(), Value::Object(header));

        for (&id, stack) in &self.resources {
            for resource in stack.iter().filter(|r| r.mod_id == mod_id) {
                resources::serialise_into(
                    &resource.kind,
                    &self.get_as_string(id),
                    &self.ids,
                    &mut out,
                );
            }
        }
        Ok(Value::Object(out))
    }
}

// ---- core parsers ----

fn parse_tiles(
    data: &mut DataManager,
    value: Option<&Value>,
    texture: UniqueId,
    resource_type: &str,
    name: &str,
) -> Vec<Tile> {
    let Some(value) = value else {
        return Vec::new();
    };
    let Some(items) = value.as_array() else {
        parse::property_warning(resource_type, name, "tiles", "array");
        return Vec::new();
    };

    let mut tiles = Vec::with_capacity(items.len());
    for item in items {
        let Some(map) = item.as_object() else {
            parse::property_warning(resource_type, name, "tiles", "array of maps");
            continue;
        };
        let tags = map
            .get("tags")
            .map(|t| parse::merge_sequence(t, &[]))
            .unwrap_or_default()
            .iter()
            .map(|tag| data.make_uid(tag))
            .collect();
        tiles.push(Tile {
            texture,
            left: parse::u32_or(map, "left", resource_type, name, 0),
            top: parse::u32_or(map, "top", resource_type, name, 0),
            tags,
        });
    }
    tiles
}

fn parse_textures(mod_id: UniqueId, node: &Value, data: &mut DataManager) {
    let Some(entries) = node.as_object() else {
        log::warn!("textures section is not a map");
        return;
    };
    for (name, value) in entries {
        let path = match value {
            Value::String(path) => path.clone(),
            Value::Object(map) => parse::string_or(map, "path", "texture", name, ""),
            _ => {
                parse::property_warning("texture", name, "path", "string");
                continue;
            }
        };
        let id = data.make_uid(name);
        let texture = data.find_or_create::<Texture>(id, mod_id);
        texture.path = path;
        data.queue_load(id, mod_id);
    }
}

fn parse_tilesets(mod_id: UniqueId, node: &Value, data: &mut DataManager) {
    let Some(entries) = node.as_object() else {
        log::warn!("tilesets section is not a map");
        return;
    };
    for (name, value) in entries {
        let Some(map) = value.as_object() else {
            parse::property_warning("tileset", name, "value", "map");
            continue;
        };
        let id = data.make_uid(name);
        let texture = match parse::get_str(map, "texture") {
            Some(texture) => data.make_uid(texture),
            None => UniqueId::ZERO,
        };
        let tiles = parse_tiles(data, map.get("tiles"), texture, "tileset", name);
        let tileset = data.find_or_create::<Tileset>(id, mod_id);
        tileset.tiles = tiles;
        data.queue_load(id, mod_id);
    }
}

fn parse_terrain(mod_id: UniqueId, node: &Value, data: &mut DataManager) {
    let Some(entries) = node.as_object() else {
        log::warn!("terrain section is not a map");
        return;
    };
    for (name, value) in entries {
        let Some(map) = value.as_object() else {
            parse::property_warning("terrain", name, "value", "map");
            continue;
        };
        let id = data.make_uid(name);
        let texture = match parse::get_str(map, "texture") {
            Some(texture) => data.make_uid(texture),
            None => UniqueId::ZERO,
        };
        let tiles = parse_tiles(data, map.get("tiles"), texture, "terrain", name);
        let tags: Vec<UniqueId> = map
            .get("tags")
            .map(|t| parse::merge_sequence(t, &[]))
            .unwrap_or_default()
            .iter()
            .map(|tag| data.make_uid(tag))
            .collect();

        let mut transitions: Vec<(usize, Vec<Tile>)> = Vec::new();
        if let Some(groups) = map.get("transitions").and_then(Value::as_object) {
            for (group_name, group_value) in groups {
                match resources::transition_group_index(group_name) {
                    Some(index) => {
                        let group =
                            parse_tiles(data, Some(group_value), texture, "terrain", name);
                        transitions.push((index, group));
                    }
                    None => {
                        parse::property_warning("terrain", name, group_name, "transition group")
                    }
                }
            }
        }

        let terrain = data.find_or_create::<Terrain>(id, mod_id);
        terrain.tiles = tiles;
        terrain.tags = tags;
        for (index, group) in transitions {
            terrain.transitions[index] = group;
        }
        data.queue_load(id, mod_id);
    }
}

fn parse_terrainsets(mod_id: UniqueId, node: &Value, data: &mut DataManager) {
    let Some(entries) = node.as_object() else {
        log::warn!("terrainsets section is not a map");
        return;
    };
    for (name, value) in entries {
        let id = data.make_uid(name);
        let previous: Vec<String> = data
            .get_no_load::<Terrainset>(id)
            .map(|set| {
                set.terrain_ids
                    .iter()
                    .map(|&t| data.get_as_string(t))
                    .collect()
            })
            .unwrap_or_default();
        let names = parse::merge_sequence(value, &previous);
        let terrain_ids: Vec<UniqueId> = names.iter().map(|n| data.make_uid(n)).collect();

        let set = data.find_or_create::<Terrainset>(id, mod_id);
        set.terrain_ids = terrain_ids;
        data.queue_load(id, mod_id);
    }
}

fn parse_terrain_settings(mod_id: UniqueId, node: &Value, data: &mut DataManager) {
    let Some(map) = node.as_object() else {
        log::warn!("terrain-settings section is not a map");
        return;
    };
    let id = data.make_uid(TERRAIN_SETTINGS_NAME);
    let empty_terrain = match parse::get_str(map, "empty-terrain") {
        Some(name) => data.make_uid(name),
        None => UniqueId::ZERO,
    };
    let empty_terrainset = match parse::get_str(map, "empty-terrainset") {
        Some(name) => data.make_uid(name),
        None => UniqueId::ZERO,
    };
    let background_terrain = match parse::get_str(map, "background-terrain") {
        Some(name) => data.make_uid(name),
        None => empty_terrain,
    };
    let tile_size = parse::u32_or(map, "tile-size", "terrain-settings", "", 32);
    let empty_tile = map
        .get("empty-tile")
        .and_then(Value::as_object)
        .map(|tile| {
            let texture = match parse::get_str(tile, "texture") {
                Some(name) => data.make_uid(name),
                None => UniqueId::ZERO,
            };
            Tile {
                texture,
                left: parse::u32_or(tile, "left", "terrain-settings", "", 0),
                top: parse::u32_or(tile, "top", "terrain-settings", "", 0),
                tags: Vec::new(),
            }
        })
        .unwrap_or_default();

    let settings = data.find_or_create::<TerrainSettings>(id, mod_id);
    settings.tile_size = tile_size;
    settings.empty_tile = empty_tile;
    settings.empty_terrain = empty_terrain;
    settings.empty_terrainset = empty_terrainset;
    settings.background_terrain = background_terrain;
    data.queue_load(id, mod_id);
}

fn parse_curves(mod_id: UniqueId, node: &Value, data: &mut DataManager) {
    let Some(entries) = node.as_object() else {
        log::warn!("curves section is not a map");
        return;
    };
    for (name, value) in entries {
        let Some(map) = value.as_object() else {
            parse::property_warning("curve", name, "value", "map");
            continue;
        };
        let kind = match parse::string_or(map, "type", "curve", name, "step").as_str() {
            "step" => CurveKind::Step,
            "linear" => CurveKind::Linear,
            "pulse" => CurveKind::Pulse,
            other => {
                log::warn!("curve {name:?} has unknown type {other:?}, using step");
                CurveKind::Step
            }
        };
        let value_name = parse::string_or(map, "value", "curve", name, "int32");
        let Some(value_type) = CurveValueType::from_name(&value_name) else {
            log::warn!("curve {name:?} has unknown value type {value_name:?}, skipping");
            continue;
        };
        let sync = parse::bool_or(map, "sync", "curve", name, false);
        let save = parse::bool_or(map, "save", "curve", name, true);
        let default = map.get("default").cloned();

        let id = data.make_uid(name);
        let decl = data.find_or_create::<CurveDecl>(id, mod_id);
        decl.kind = kind;
        decl.value_type = value_type;
        decl.sync = sync;
        decl.save = save;
        decl.default = default;
        data.queue_load(id, mod_id);
    }
}

fn parse_systems(mod_id: UniqueId, node: &Value, data: &mut DataManager) {
    let Some(entries) = node.as_object() else {
        log::warn!("systems section is not a map");
        return;
    };
    for name in entries.keys() {
        let Some(&behaviour) = data.system_behaviours.get(name) else {
            log::error!("system {name:?} failed to attach: no registered behaviour");
            continue;
        };
        let id = data.make_uid(name);
        let decl = data.find_or_create::<SystemDecl>(id, mod_id);
        decl.behaviour = Some(behaviour);
        data.queue_load(id, mod_id);
    }
}

fn parse_render_systems(mod_id: UniqueId, node: &Value, data: &mut DataManager) {
    let Some(entries) = node.as_object() else {
        log::warn!("render-systems section is not a map");
        return;
    };
    for name in entries.keys() {
        let Some(&behaviour) = data.render_behaviours.get(name) else {
            log::error!("render system {name:?} failed to attach: no registered behaviour");
            continue;
        };
        let id = data.make_uid(name);
        let decl = data.find_or_create::<RenderSystemDecl>(id, mod_id);
        decl.behaviour = Some(behaviour);
        data.queue_load(id, mod_id);
    }
}

/// Register the engine's built-in resource types.
pub fn register_core_resource_types(data: &mut DataManager) {
    data.register_resource_type("textures", parse_textures);
    data.register_resource_type("tilesets", parse_tilesets);
    data.register_resource_type("terrain", parse_terrain);
    data.register_resource_type("terrainsets", parse_terrainsets);
    data.register_resource_type("terrain-settings", parse_terrain_settings);
    data.register_resource_type("curves", parse_curves);
    data.register_resource_type("systems", parse_systems);
    data.register_resource_type("render-systems", parse_render_systems);
}

// ---- process-wide access ----

static DATA_MANAGER: RwLock<Option<Arc<RwLock<DataManager>>>> = RwLock::new(None);

/// Install or clear the process data manager.
pub fn set_data_manager(manager: Option<Arc<RwLock<DataManager>>>) {
    *DATA_MANAGER.write() = manager;
}

/// The installed manager handle.
pub fn data_manager() -> Result<Arc<RwLock<DataManager>>, ResourceError> {
    DATA_MANAGER
        .read()
        .clone()
        .ok_or(ResourceError::ProviderUnavailable)
}

/// Run `f` under the manager's reader lock.
pub fn with_data<R>(f: impl FnOnce(&DataManager) -> R) -> Result<R, ResourceError> {
    let manager = data_manager()?;
    let guard = manager.read();
    Ok(f(&guard))
}

/// Run `f` under the manager's writer lock.
pub fn with_data_mut<R>(f: impl FnOnce(&mut DataManager) -> R) -> Result<R, ResourceError> {
    let manager = data_manager()?;
    let mut guard = manager.write();
    Ok(f(&mut guard))
}
