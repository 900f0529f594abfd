//! Game state: entities, their time-indexed variables and the live object
//! table.
//!
//! The saveable state is a set of typed colonies, one per value type, each
//! holding `StateField`s (owner entity, variable id, curve). The live
//! [`GameObj`] table is derived, non-saved state: objects index into the
//! colonies through arena keys. An [`ObjectRef`] may carry a stale key, so
//! everything that accepts one re-resolves through the object arena first.

pub mod arena;
pub mod systems;

use std::any::Any;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::curve::{Curve, CurveKind, CurveValue, Vec2f};
use crate::id::UniqueId;
use crate::time::TimePoint;

pub use arena::{Arena, ArenaKey};

/// Strong entity id; zero is reserved as "no entity".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(pub u32);

pub const BAD_ENTITY: EntityId = EntityId(0);

impl EntityId {
    pub fn is_bad(self) -> bool {
        self == BAD_ENTITY
    }
}

/// Variables are identified the same way resources are.
pub type VariableId = UniqueId;

/// Reference to a live object. The arena key is a hint that may be stale;
/// resolve through [`state_api::get_object`] before trusting it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectRef {
    pub id: EntityId,
    pub key: ArenaKey,
}

impl ObjectRef {
    pub fn new(id: EntityId, key: ArenaKey) -> Self {
        ObjectRef { id, key }
    }

    pub fn is_bad(self) -> bool {
        self.id.is_bad()
    }
}

impl CurveValue for ObjectRef {}

// only the entity id travels; keys are rebuilt by the receiver
impl Serialize for ObjectRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.id.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ObjectRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = EntityId::deserialize(deserializer)?;
        Ok(ObjectRef {
            id,
            key: ArenaKey::default(),
        })
    }
}

/// Name assignments over time; a step curve so names can be reassigned.
pub type NameMap = FxHashMap<String, ObjectRef>;

impl CurveValue for NameMap {}

/// One saved variable: its owner, identity and curve.
pub struct StateField<T> {
    pub object: EntityId,
    pub id: VariableId,
    pub data: Curve<T>,
}

#[derive(Debug, Clone, Copy)]
pub struct VarEntry {
    pub id: VariableId,
    pub field: ArenaKey,
}

type VarList = SmallVec<[VarEntry; 4]>;

/// Per-object index of its variables, one list per value type.
#[derive(Debug, Clone, Default)]
pub struct VarTable {
    pub ints: VarList,
    pub floats: VarList,
    pub vec2s: VarList,
    pub bools: VarList,
    pub strings: VarList,
    pub object_refs: VarList,
    pub uniques: VarList,
    pub int_vectors: VarList,
    pub float_vectors: VarList,
}

/// A live game object.
#[derive(Debug, Clone, Default)]
pub struct GameObj {
    pub id: EntityId,
    /// Resource describing this object's archetype; zero for ad-hoc
    /// objects.
    pub object_type: UniqueId,
    pub vars: VarTable,
}

type Colony<T> = Mutex<Arena<StateField<T>>>;

/// Selects the typed colony and var list for a value type.
pub trait StateValue: CurveValue + Send + 'static {
    fn colony(state: &GameState) -> &Colony<Self>;
    fn var_list(table: &VarTable) -> &VarList;
    fn var_list_mut(table: &mut VarTable) -> &mut VarList;
}

macro_rules! impl_state_value {
    ($ty:ty, $field:ident) => {
        impl StateValue for $ty {
            fn colony(state: &GameState) -> &Colony<Self> {
                &state.$field
            }
            fn var_list(table: &VarTable) -> &VarList {
                &table.$field
            }
            fn var_list_mut(table: &mut VarTable) -> &mut VarList {
                &mut table.$field
            }
        }
    };
}

impl_state_value!(i32, ints);
impl_state_value!(f32, floats);
impl_state_value!(Vec2f, vec2s);
impl_state_value!(bool, bools);
impl_state_value!(String, strings);
impl_state_value!(ObjectRef, object_refs);
impl_state_value!(UniqueId, uniques);
impl_state_value!(Vec<i32>, int_vectors);
impl_state_value!(Vec<f32>, float_vectors);

/// The saveable game data. Each colony sits behind its own mutex so tick
/// jobs can touch different value types without contending.
#[derive(Default)]
pub struct GameState {
    pub ints: Colony<i32>,
    pub floats: Colony<f32>,
    pub vec2s: Colony<Vec2f>,
    pub bools: Colony<bool>,
    pub strings: Colony<String>,
    pub object_refs: Colony<ObjectRef>,
    pub uniques: Colony<UniqueId>,
    pub int_vectors: Colony<Vec<i32>>,
    pub float_vectors: Colony<Vec<f32>>,
    next: AtomicU32,
    /// Name assignments over time.
    pub names: Mutex<Curve<NameMap>>,
}

impl GameState {
    pub fn new() -> Self {
        GameState {
            next: AtomicU32::new(1),
            ..GameState::default()
        }
    }

    /// Allocate the next entity id.
    pub fn next_entity(&self) -> EntityId {
        EntityId(self.next.fetch_add(1, Ordering::Relaxed).max(1))
    }
}

/// Untyped per-level scratch storage, keyed by id.
#[derive(Default)]
pub struct AnyMap {
    map: FxHashMap<UniqueId, Box<dyn Any + Send>>,
}

impl AnyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Any + Send>(&mut self, key: UniqueId, value: T) {
        self.map.insert(key, Box::new(value));
    }

    pub fn get<T: Any + Send>(&self, key: UniqueId) -> Option<&T> {
        self.map.get(&key).and_then(|v| v.downcast_ref())
    }

    pub fn get_mut<T: Any + Send>(&mut self, key: UniqueId) -> Option<&mut T> {
        self.map.get_mut(&key).and_then(|v| v.downcast_mut())
    }

    pub fn remove<T: Any + Send>(&mut self, key: UniqueId) -> Option<T> {
        let value = self.map.remove(&key)?;
        match value.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(value) => {
                // wrong type requested; put it back
                self.map.insert(key, value);
                None
            }
        }
    }

    pub fn contains(&self, key: UniqueId) -> bool {
        self.map.contains_key(&key)
    }
}

/// Non-saved derived state: the live object table, system attachments and
/// level-local scratch data.
#[derive(Default)]
pub struct ExtraState {
    pub objects: Mutex<Arena<GameObj>>,
    pub systems: Mutex<systems::SystemBehaviours<crate::data::resources::SystemDecl>>,
    pub level_locals: Mutex<AnyMap>,
}

impl ExtraState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The full mutable state a simulation tick works against.
#[derive(Default)]
pub struct GameInterface {
    pub state: GameState,
    pub extra: ExtraState,
}

impl GameInterface {
    pub fn new() -> Self {
        GameInterface {
            state: GameState::new(),
            extra: ExtraState::new(),
        }
    }
}

/// Initial value for one variable of a new object.
#[derive(Debug, Clone)]
pub enum VarInit {
    Int(VariableId, CurveKind, i32),
    Float(VariableId, CurveKind, f32),
    Vec2(VariableId, CurveKind, Vec2f),
    Bool(VariableId, CurveKind, bool),
    String(VariableId, CurveKind, String),
    ObjectRef(VariableId, CurveKind, ObjectRef),
    Unique(VariableId, CurveKind, UniqueId),
    IntVector(VariableId, CurveKind, Vec<i32>),
    FloatVector(VariableId, CurveKind, Vec<f32>),
}

/// Archetype plus initial variables for a new object.
#[derive(Debug, Clone, Default)]
pub struct ObjectInstance {
    pub object_type: UniqueId,
    pub vars: Vec<VarInit>,
}

/// Functions for mutating game state. All are time-indexed: mutation takes
/// effect at the given point on each variable's curve.
pub mod state_api {
    use super::*;

    fn install<T: StateValue>(
        state: &GameState,
        obj: &mut GameObj,
        id: VariableId,
        kind: CurveKind,
        value: T,
        at: TimePoint,
    ) {
        let mut curve = Curve::with_default(kind, value.clone());
        curve.set(at, value);
        let field = T::colony(state).lock().insert(StateField {
            object: obj.id,
            id,
            data: curve,
        });
        T::var_list_mut(&mut obj.vars).push(VarEntry { id, field });
    }

    /// Allocate an object and install its variable curves at `at`.
    pub fn make_object(
        instance: &ObjectInstance,
        state: &GameState,
        extra: &ExtraState,
        at: TimePoint,
    ) -> ObjectRef {
        let id = state.next_entity();
        let mut obj = GameObj {
            id,
            object_type: instance.object_type,
            vars: VarTable::default(),
        };
        for var in &instance.vars {
            match var.clone() {
                VarInit::Int(vid, kind, v) => install(state, &mut obj, vid, kind, v, at),
                VarInit::Float(vid, kind, v) => install(state, &mut obj, vid, kind, v, at),
                VarInit::Vec2(vid, kind, v) => install(state, &mut obj, vid, kind, v, at),
                VarInit::Bool(vid, kind, v) => install(state, &mut obj, vid, kind, v, at),
                VarInit::String(vid, kind, v) => install(state, &mut obj, vid, kind, v, at),
                VarInit::ObjectRef(vid, kind, v) => install(state, &mut obj, vid, kind, v, at),
                VarInit::Unique(vid, kind, v) => install(state, &mut obj, vid, kind, v, at),
                VarInit::IntVector(vid, kind, v) => install(state, &mut obj, vid, kind, v, at),
                VarInit::FloatVector(vid, kind, v) => install(state, &mut obj, vid, kind, v, at),
            }
        }
        let key = extra.objects.lock().insert(obj);
        ObjectRef { id, key }
    }

    fn remove_fields<T: StateValue>(state: &GameState, vars: &VarList) {
        let mut colony = T::colony(state).lock();
        for entry in vars {
            colony.remove(entry.field);
        }
    }

    /// Remove an object and every variable it owns.
    pub fn destroy_object(reference: ObjectRef, state: &GameState, extra: &ExtraState) {
        let Some(reference) = get_object(reference, extra) else {
            return;
        };
        let Some(obj) = extra.objects.lock().remove(reference.key) else {
            return;
        };
        remove_fields::<i32>(state, &obj.vars.ints);
        remove_fields::<f32>(state, &obj.vars.floats);
        remove_fields::<Vec2f>(state, &obj.vars.vec2s);
        remove_fields::<bool>(state, &obj.vars.bools);
        remove_fields::<String>(state, &obj.vars.strings);
        remove_fields::<ObjectRef>(state, &obj.vars.object_refs);
        remove_fields::<UniqueId>(state, &obj.vars.uniques);
        remove_fields::<Vec<i32>>(state, &obj.vars.int_vectors);
        remove_fields::<Vec<f32>>(state, &obj.vars.float_vectors);
    }

    /// Assign `name` to an object from `at` onward. Returns false if the
    /// name is currently taken.
    pub fn name_object(name: &str, reference: ObjectRef, state: &GameState, at: TimePoint) -> bool {
        let mut names = state.names.lock();
        let mut map = names.get(at);
        if map.contains_key(name) {
            return false;
        }
        map.insert(name.to_owned(), reference);
        names.set(at, map);
        true
    }

    /// Resolve a name through the name curve and the live object table.
    pub fn get_object_ref(
        name: &str,
        at: TimePoint,
        state: &GameState,
        extra: &ExtraState,
    ) -> Option<ObjectRef> {
        let reference = *state.names.lock().get(at).get(name)?;
        get_object(reference, extra)
    }

    /// Re-resolve a possibly stale reference against the object arena.
    pub fn get_object(reference: ObjectRef, extra: &ExtraState) -> Option<ObjectRef> {
        if reference.is_bad() {
            return None;
        }
        let objects = extra.objects.lock();
        if let Some(obj) = objects.get(reference.key) {
            if obj.id == reference.id {
                return Some(reference);
            }
        }
        // stale key; fall back to scanning for the id
        objects
            .iter()
            .find(|(_, obj)| obj.id == reference.id)
            .map(|(key, obj)| ObjectRef { id: obj.id, key })
    }

    /// Run `f` against the resolved object.
    pub fn with_object<R>(
        reference: ObjectRef,
        extra: &ExtraState,
        f: impl FnOnce(&GameObj) -> R,
    ) -> Option<R> {
        let reference = get_object(reference, extra)?;
        let objects = extra.objects.lock();
        objects.get(reference.key).map(f)
    }

    /// Find the colony key of `variable` on an object.
    pub fn object_var_key<T: StateValue>(
        reference: ObjectRef,
        extra: &ExtraState,
        variable: VariableId,
    ) -> Option<ArenaKey> {
        with_object(reference, extra, |obj| {
            T::var_list(&obj.vars)
                .iter()
                .find(|entry| entry.id == variable)
                .map(|entry| entry.field)
        })
        .flatten()
    }

    /// Direct access to the curve behind a state field. The guard holds the
    /// colony lock; keep it short-lived inside tick jobs.
    pub fn get_object_property<T: StateValue>(
        state: &GameState,
        field: ArenaKey,
    ) -> Option<MappedMutexGuard<'_, Curve<T>>> {
        let guard = T::colony(state).lock();
        MutexGuard::try_map(guard, |colony| {
            colony.get_mut(field).map(|field| &mut field.data)
        })
        .ok()
    }

    /// Convenience: read a variable of an object at `at`.
    pub fn get_value<T: StateValue>(
        reference: ObjectRef,
        variable: VariableId,
        at: TimePoint,
        state: &GameState,
        extra: &ExtraState,
    ) -> Option<T> {
        let field = object_var_key::<T>(reference, extra, variable)?;
        let curve = get_object_property::<T>(state, field)?;
        Some(curve.get(at))
    }

    /// Convenience: write a keyframe on a variable of an object.
    pub fn set_value<T: StateValue>(
        reference: ObjectRef,
        variable: VariableId,
        at: TimePoint,
        value: T,
        state: &GameState,
        extra: &ExtraState,
    ) -> bool {
        let Some(field) = object_var_key::<T>(reference, extra, variable) else {
            return false;
        };
        match get_object_property::<T>(state, field) {
            Some(mut curve) => {
                curve.set(at, value);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::state_api::*;
    use super::*;

    fn ms(v: i64) -> TimePoint {
        TimePoint::from_millis(v)
    }

    fn health_instance(health_var: VariableId) -> ObjectInstance {
        ObjectInstance {
            object_type: UniqueId::ZERO,
            vars: vec![VarInit::Int(health_var, CurveKind::Step, 100)],
        }
    }

    #[test]
    fn object_variables_are_time_indexed() {
        let interface = GameInterface::new();
        let health = UniqueId::new();
        let obj = make_object(
            &health_instance(health),
            &interface.state,
            &interface.extra,
            ms(0),
        );

        assert!(set_value(
            obj,
            health,
            ms(10),
            75i32,
            &interface.state,
            &interface.extra
        ));
        assert_eq!(
            get_value::<i32>(obj, health, ms(5), &interface.state, &interface.extra),
            Some(100)
        );
        assert_eq!(
            get_value::<i32>(obj, health, ms(10), &interface.state, &interface.extra),
            Some(75)
        );
    }

    #[test]
    fn names_resolve_and_reject_duplicates() {
        let interface = GameInterface::new();
        let var = UniqueId::new();
        let a = make_object(
            &health_instance(var),
            &interface.state,
            &interface.extra,
            ms(0),
        );
        let b = make_object(
            &health_instance(var),
            &interface.state,
            &interface.extra,
            ms(0),
        );

        assert!(name_object("player", a, &interface.state, ms(0)));
        assert!(!name_object("player", b, &interface.state, ms(5)));
        let found = get_object_ref("player", ms(10), &interface.state, &interface.extra);
        assert_eq!(found.map(|r| r.id), Some(a.id));
    }

    #[test]
    fn stale_refs_re_resolve_by_id() {
        let interface = GameInterface::new();
        let var = UniqueId::new();
        let obj = make_object(
            &health_instance(var),
            &interface.state,
            &interface.extra,
            ms(0),
        );
        // forge a ref with a bad key but the right id
        let stale = ObjectRef {
            id: obj.id,
            key: ArenaKey::default(),
        };
        let resolved = get_object(stale, &interface.extra);
        assert_eq!(resolved.map(|r| r.id), Some(obj.id));
    }

    #[test]
    fn destroy_removes_fields() {
        let interface = GameInterface::new();
        let var = UniqueId::new();
        let obj = make_object(
            &health_instance(var),
            &interface.state,
            &interface.extra,
            ms(0),
        );
        destroy_object(obj, &interface.state, &interface.extra);
        assert!(get_object(obj, &interface.extra).is_none());
        assert_eq!(interface.state.ints.lock().len(), 0);
    }
}
