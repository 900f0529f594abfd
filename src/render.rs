//! Render-side state mirror.
//!
//! The render instance ingests [`ExportedCurves`] bundles from the
//! simulation and rebuilds per-variable curves keyed by `(entity,
//! variable)`. Frames materialise through attached render systems into a
//! [`RenderInterface`]; sprite batching, cameras and drawing itself live
//! outside the core. Consumers keep the mirror at least one tick behind
//! the simulation so interpolation always has a bracketing pair.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::curve::{Curve, CurveKind, CurveValue, Vec2f};
use crate::data;
use crate::data::resources::RenderSystemDecl;
use crate::id::UniqueId;
use crate::sim::{ExportSet, ExportedCurves};
use crate::state::systems::SystemBehaviours;
use crate::state::{AnyMap, EntityId, ObjectRef, VariableId};
use crate::time::TimePoint;

/// Drawable sink filled by render systems each frame. Implemented by the
/// drawing layer.
pub trait RenderInterface {
    /// Place or update a sprite for `entity`.
    fn set_sprite(&mut self, entity: EntityId, texture: UniqueId, position: Vec2f, layer: i32);
    /// Remove everything drawn for `entity`.
    fn remove_entity(&mut self, entity: EntityId);
}

/// Everything a render system callback gets for one entity of one frame.
pub struct RenderJobData<'a> {
    pub entity: EntityId,
    pub system: UniqueId,
    pub mirror: &'a RenderMirror,
    pub time: TimePoint,
    pub output: &'a mut dyn RenderInterface,
    /// Per-instance scratch storage shared by render systems.
    pub system_data: &'a Mutex<AnyMap>,
}

/// A render system callback. Errors are logged per entity.
pub type RenderFn = fn(&mut RenderJobData<'_>) -> Result<(), String>;

type CurveMap<T> = FxHashMap<(EntityId, VariableId), Curve<T>>;

/// Selects the mirror's curve table for a value type.
pub trait MirrorValue: CurveValue {
    fn curves(mirror: &RenderMirror) -> &CurveMap<Self>;
    fn curves_mut(mirror: &mut RenderMirror) -> &mut CurveMap<Self>;
}

macro_rules! impl_mirror_value {
    ($ty:ty, $field:ident) => {
        impl MirrorValue for $ty {
            fn curves(mirror: &RenderMirror) -> &CurveMap<Self> {
                &mirror.$field
            }
            fn curves_mut(mirror: &mut RenderMirror) -> &mut CurveMap<Self> {
                &mut mirror.$field
            }
        }
    };
}

impl_mirror_value!(i32, ints);
impl_mirror_value!(f32, floats);
impl_mirror_value!(Vec2f, vec2s);
impl_mirror_value!(bool, bools);
impl_mirror_value!(String, strings);
impl_mirror_value!(ObjectRef, object_refs);
impl_mirror_value!(UniqueId, uniques);
impl_mirror_value!(Vec<i32>, int_vectors);
impl_mirror_value!(Vec<f32>, float_vectors);

/// Reconstructed curve store on the render side.
#[derive(Default)]
pub struct RenderMirror {
    ints: CurveMap<i32>,
    floats: CurveMap<f32>,
    vec2s: CurveMap<Vec2f>,
    bools: CurveMap<bool>,
    strings: CurveMap<String>,
    object_refs: CurveMap<ObjectRef>,
    uniques: CurveMap<UniqueId>,
    int_vectors: CurveMap<Vec<i32>>,
    float_vectors: CurveMap<Vec<f32>>,
    entity_names: FxHashMap<EntityId, String>,
}

fn merge_type<T: MirrorValue>(mirror: &mut RenderMirror, sets: &[ExportSet<T>]) {
    for set in sets {
        let Some(first) = set.frames.first() else {
            continue;
        };
        // the declared curve kind decides how queries interpolate
        let kind = data::with_data(|d| {
            d.get_curve(set.variable)
                .map(|c| c.kind)
                .unwrap_or(CurveKind::Step)
        })
        .unwrap_or(CurveKind::Step);

        let curve = T::curves_mut(mirror)
            .entry((set.entity, set.variable))
            .or_insert_with(|| Curve::with_default(kind, first.value.clone()));
        for frame in &set.frames {
            // set() keeps ordering and dedupes repeated keys
            curve.set(frame.time, frame.value.clone());
        }
    }
}

impl RenderMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one exported bundle.
    pub fn input_updates(&mut self, input: &ExportedCurves) {
        merge_type(self, &input.int_curves);
        merge_type(self, &input.float_curves);
        merge_type(self, &input.vec2_curves);
        merge_type(self, &input.bool_curves);
        merge_type(self, &input.string_curves);
        merge_type(self, &input.object_ref_curves);
        merge_type(self, &input.unique_curves);
        merge_type(self, &input.int_vector_curves);
        merge_type(self, &input.float_vector_curves);
        for (entity, name) in &input.entity_names {
            self.entity_names.insert(*entity, name.clone());
        }
    }

    /// Query a mirrored variable at `time`.
    pub fn get<T: MirrorValue>(
        &self,
        entity: EntityId,
        variable: VariableId,
        time: TimePoint,
    ) -> Option<T> {
        T::curves(self)
            .get(&(entity, variable))
            .map(|curve| curve.get(time))
    }

    /// The curve behind a mirrored variable.
    pub fn curve<T: MirrorValue>(
        &self,
        entity: EntityId,
        variable: VariableId,
    ) -> Option<&Curve<T>> {
        T::curves(self).get(&(entity, variable))
    }

    pub fn entity_name(&self, entity: EntityId) -> Option<&str> {
        self.entity_names.get(&entity).map(String::as_str)
    }

    /// Every entity with at least one mirrored variable.
    pub fn entities(&self) -> Vec<EntityId> {
        let mut out: Vec<EntityId> = Vec::new();
        let mut push = |id: EntityId| {
            if !out.contains(&id) {
                out.push(id);
            }
        };
        self.ints.keys().for_each(|k| push(k.0));
        self.floats.keys().for_each(|k| push(k.0));
        self.vec2s.keys().for_each(|k| push(k.0));
        self.bools.keys().for_each(|k| push(k.0));
        self.strings.keys().for_each(|k| push(k.0));
        self.object_refs.keys().for_each(|k| push(k.0));
        self.uniques.keys().for_each(|k| push(k.0));
        self.int_vectors.keys().for_each(|k| push(k.0));
        self.float_vectors.keys().for_each(|k| push(k.0));
        out
    }
}

/// Render-side counterpart of the game instance: the mirror plus attached
/// render systems.
pub struct RenderInstance {
    mirror: RenderMirror,
    systems: SystemBehaviours<RenderSystemDecl>,
    system_data: Mutex<AnyMap>,
    prev_frame: TimePoint,
}

impl Default for RenderInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderInstance {
    pub fn new() -> Self {
        RenderInstance {
            mirror: RenderMirror::new(),
            systems: SystemBehaviours::new(),
            system_data: Mutex::new(AnyMap::new()),
            prev_frame: TimePoint::from_nanos(-1),
        }
    }

    pub fn mirror(&self) -> &RenderMirror {
        &self.mirror
    }

    /// Merge received keyframes into the mirror.
    pub fn input_updates(&mut self, input: &ExportedCurves) {
        self.mirror.input_updates(input);
    }

    /// Attach an entity to a render system; `on_create` runs before its
    /// first frame.
    pub fn attach_system(&mut self, decl: &RenderSystemDecl, entity: EntityId) {
        let reference = ObjectRef {
            id: entity,
            ..ObjectRef::default()
        };
        self.systems.attach(decl, reference, self.prev_frame, true);
    }

    pub fn detach_system(&mut self, system: UniqueId, entity: EntityId) {
        let reference = ObjectRef {
            id: entity,
            ..ObjectRef::default()
        };
        self.systems.detach(system, reference);
    }

    /// Materialise the frame at `time` into `output` by running every
    /// attached render system.
    pub fn make_frame_at(&mut self, time: TimePoint, output: &mut dyn RenderInterface) {
        // staged attachments take effect now; on_create runs first,
        // on_destroy covers detached entities
        for events in self.systems.apply_pending() {
            let Some(behaviour) = events.decl.behaviour else {
                continue;
            };
            if let Some(on_create) = behaviour.on_create {
                for attached in &events.created {
                    let mut job = RenderJobData {
                        entity: attached.entity.id,
                        system: events.decl.id,
                        mirror: &self.mirror,
                        time,
                        output: &mut *output,
                        system_data: &self.system_data,
                    };
                    if let Err(e) = on_create(&mut job) {
                        log::error!("render system create failed for {}: {e}", attached.entity.id.0);
                    }
                }
            }
            if let Some(on_destroy) = behaviour.on_destroy {
                for attached in &events.disconnected {
                    let mut job = RenderJobData {
                        entity: attached.entity.id,
                        system: events.decl.id,
                        mirror: &self.mirror,
                        time,
                        output: &mut *output,
                        system_data: &self.system_data,
                    };
                    if let Err(e) = on_destroy(&mut job) {
                        log::error!("render system destroy failed for {}: {e}", attached.entity.id.0);
                    }
                }
            }
        }

        for work in self.systems.snapshot(time) {
            let Some(behaviour) = work.decl.behaviour else {
                continue;
            };
            let Some(tick) = behaviour.tick else {
                continue;
            };
            for attached in work.entities {
                let mut job = RenderJobData {
                    entity: attached.entity.id,
                    system: work.decl.id,
                    mirror: &self.mirror,
                    time,
                    output: &mut *output,
                    system_data: &self.system_data,
                };
                if let Err(e) = tick(&mut job) {
                    log::error!(
                        "render system {} failed for {}: {e}",
                        crate::id::as_string(work.decl.id),
                        attached.entity.id.0
                    );
                }
            }
        }
        self.prev_frame = time;
    }
}
