//! Simulation loop.
//!
//! A [`GameInstance`] wraps the level state with timekeeping. Each tick
//! snapshots the system attachments, fans per-entity jobs onto the shared
//! thread pool, waits for them, then applies staged attach/detach
//! callbacks and advances the clock. Work inside a tick is parallel; ticks
//! themselves are strictly ordered.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::curve::{Curve, CurveKind, Keyframe, Vec2f};
use crate::data;
use crate::id::UniqueId;
use crate::input::Action;
use crate::jobs;
use crate::state::systems::{SystemBehaviour, SystemJobData};
use crate::state::{EntityId, GameInterface, ObjectInstance, ObjectRef, StateValue, VariableId, state_api};
use crate::time::{TimeDuration, TimePoint};

/// Keyframes of one variable of one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSet<T> {
    pub entity: EntityId,
    pub variable: VariableId,
    pub frames: Vec<Keyframe<T>>,
}

/// A flat bundle of new keyframes, ready to stream to render clients.
///
/// Only variables whose declaration carries the `sync` flag are included.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportedCurves {
    /// Entity names assigned since the previous export.
    pub entity_names: Vec<(EntityId, String)>,
    /// Keyframe counts per value type, in field order.
    pub sizes: [usize; 9],
    pub int_curves: Vec<ExportSet<i32>>,
    pub float_curves: Vec<ExportSet<f32>>,
    pub vec2_curves: Vec<ExportSet<Vec2f>>,
    pub bool_curves: Vec<ExportSet<bool>>,
    pub string_curves: Vec<ExportSet<String>>,
    pub object_ref_curves: Vec<ExportSet<ObjectRef>>,
    pub unique_curves: Vec<ExportSet<UniqueId>>,
    pub int_vector_curves: Vec<ExportSet<Vec<i32>>>,
    pub float_vector_curves: Vec<ExportSet<Vec<f32>>>,
}

fn frame_count<T>(sets: &[ExportSet<T>]) -> usize {
    sets.iter().map(|s| s.frames.len()).sum()
}

impl ExportedCurves {
    pub fn clear(&mut self) {
        self.entity_names.clear();
        self.sizes = [0; 9];
        self.int_curves.clear();
        self.float_curves.clear();
        self.vec2_curves.clear();
        self.bool_curves.clear();
        self.string_curves.clear();
        self.object_ref_curves.clear();
        self.unique_curves.clear();
        self.int_vector_curves.clear();
        self.float_vector_curves.clear();
    }

    fn update_sizes(&mut self) {
        self.sizes = [
            frame_count(&self.int_curves),
            frame_count(&self.float_curves),
            frame_count(&self.vec2_curves),
            frame_count(&self.bool_curves),
            frame_count(&self.string_curves),
            frame_count(&self.object_ref_curves),
            frame_count(&self.unique_curves),
            frame_count(&self.int_vector_curves),
            frame_count(&self.float_vector_curves),
        ];
    }
}

/// Per-player input script, run as staged input drains at the head of a
/// tick. A failure aborts the tick and propagates to the caller.
pub type InputScriptFn =
    fn(&GameInterface, UniqueId, &[Action], TimePoint) -> Result<(), String>;

struct StagedInput {
    player: UniqueId,
    actions: Vec<Action>,
    time: TimePoint,
}

/// The level simulation with its clock.
pub struct GameInstance {
    interface: Arc<GameInterface>,
    current_time: TimePoint,
    prev_time: TimePoint,
    input_send: Sender<StagedInput>,
    input_recv: Receiver<StagedInput>,
    /// Per-player action history as a step curve of action vectors.
    player_input: Mutex<FxHashMap<UniqueId, Curve<Vec<Action>>>>,
    input_script: Option<InputScriptFn>,
    staged_names: Mutex<Vec<(EntityId, String)>>,
    /// Cached `sync` flags per variable declaration.
    sync_cache: Mutex<FxHashMap<VariableId, bool>>,
}

impl Default for GameInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl GameInstance {
    pub fn new() -> Self {
        let (input_send, input_recv) = unbounded();
        GameInstance {
            interface: Arc::new(GameInterface::new()),
            current_time: TimePoint::ZERO,
            prev_time: TimePoint::ZERO,
            input_send,
            input_recv,
            player_input: Mutex::new(FxHashMap::default()),
            input_script: None,
            staged_names: Mutex::new(Vec::new()),
            sync_cache: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn set_input_script(&mut self, script: Option<InputScriptFn>) {
        self.input_script = script;
    }

    pub fn get_interface(&self) -> &Arc<GameInterface> {
        &self.interface
    }

    /// The simulation clock, optionally offset for mission-relative time.
    pub fn get_time(&self, mission_offset: TimePoint) -> TimePoint {
        self.current_time + mission_offset.since_epoch()
    }

    /// Create an object at the current time.
    pub fn make_object(&self, instance: &ObjectInstance) -> ObjectRef {
        state_api::make_object(
            instance,
            &self.interface.state,
            &self.interface.extra,
            self.current_time,
        )
    }

    /// Name an object at the current time; the assignment is included in
    /// the next export.
    pub fn name_object(&self, name: &str, reference: ObjectRef) -> bool {
        let named = state_api::name_object(name, reference, &self.interface.state, self.current_time);
        if named {
            self.staged_names
                .lock()
                .push((reference.id, name.to_owned()));
        }
        named
    }

    /// Attach an entity to a system, effective at the end of the current
    /// tick.
    pub fn attach_system(
        &self,
        decl: &data::resources::SystemDecl,
        reference: ObjectRef,
        created: bool,
    ) {
        self.interface
            .extra
            .systems
            .lock()
            .attach(decl, reference, self.current_time, created);
    }

    pub fn detach_system(&self, system: UniqueId, reference: ObjectRef) {
        self.interface.extra.systems.lock().detach(system, reference);
    }

    /// Stage a player's action set; drained at the head of the next tick.
    pub fn add_input(&self, player: UniqueId, actions: Vec<Action>, time: TimePoint) {
        let _ = self.input_send.send(StagedInput {
            player,
            actions,
            time,
        });
    }

    /// A player's recorded input at `time`.
    pub fn player_input_at(&self, player: UniqueId, time: TimePoint) -> Vec<Action> {
        self.player_input
            .lock()
            .get(&player)
            .map(|curve| curve.get(time))
            .unwrap_or_default()
    }

    /// Advance the simulation by `dt`.
    pub fn tick(&mut self, dt: TimeDuration) -> Result<(), String> {
        let now = self.current_time;

        // drain staged input into the history curves and the input script
        while let Ok(staged) = self.input_recv.try_recv() {
            self.player_input
                .lock()
                .entry(staged.player)
                .or_insert_with(|| Curve::with_default(CurveKind::Step, Vec::new()))
                .set(staged.time, staged.actions.clone());
            if let Some(script) = self.input_script {
                script(&self.interface, staged.player, &staged.actions, staged.time)?;
            }
        }

        // snapshot attachments; changes made during the tick stage for the
        // next one
        let work = self.interface.extra.systems.lock().snapshot(now);

        let mut handles = Vec::new();
        for item in work {
            let Some(behaviour) = item.decl.behaviour else {
                continue;
            };
            let Some(tick_fn) = behaviour.tick else {
                continue;
            };
            for attached in item.entities {
                let job = SystemJobData {
                    entity: attached.entity,
                    system: item.decl.id,
                    interface: Arc::clone(&self.interface),
                    time: now,
                    dt,
                };
                handles.push(jobs::spawn(move || run_system_job(tick_fn, &job)));
            }
        }
        // wait on the whole tick's worth of jobs
        for handle in handles {
            handle.get();
        }

        self.apply_pending(now, dt);

        self.prev_time = now;
        self.current_time = now + dt;
        Ok(())
    }

    fn apply_pending(&self, now: TimePoint, dt: TimeDuration) {
        let pending = self.interface.extra.systems.lock().apply_pending();
        for events in pending {
            let Some(behaviour) = events.decl.behaviour else {
                continue;
            };
            let run = |callback: Option<crate::state::systems::SystemFn>,
                       entities: &[crate::state::systems::AttachedEntity]| {
                let Some(callback) = callback else { return };
                for attached in entities {
                    let job = SystemJobData {
                        entity: attached.entity,
                        system: events.decl.id,
                        interface: Arc::clone(&self.interface),
                        time: now,
                        dt,
                    };
                    run_system_job(callback, &job);
                }
            };
            run(behaviour.on_connect, &events.connected);
            run(behaviour.on_create, &events.created);
            run(behaviour.on_disconnect, &events.disconnected);
        }
    }

    fn is_synced(&self, variable: VariableId) -> bool {
        if let Some(&synced) = self.sync_cache.lock().get(&variable) {
            return synced;
        }
        let synced = data::with_data(|d| d.get_curve(variable).map(|c| c.sync).unwrap_or(false))
            .unwrap_or(false);
        self.sync_cache.lock().insert(variable, synced);
        synced
    }

    fn export_type<T: StateValue>(&self, out: &mut Vec<ExportSet<T>>, since: TimePoint) {
        let colony = T::colony(&self.interface.state).lock();
        for (_, field) in colony.iter() {
            if !self.is_synced(field.id) {
                continue;
            }
            let frames = field.data.events_between(since, TimePoint::MAX);
            if frames.is_empty() {
                continue;
            }
            out.push(ExportSet {
                entity: field.object,
                variable: field.id,
                frames: frames.to_vec(),
            });
        }
    }

    /// Export every synced keyframe newer than `since`, plus entity-name
    /// assignments made since the previous export.
    pub fn get_changes(&self, out: &mut ExportedCurves, since: TimePoint) {
        out.clear();
        self.export_type(&mut out.int_curves, since);
        self.export_type(&mut out.float_curves, since);
        self.export_type(&mut out.vec2_curves, since);
        self.export_type(&mut out.bool_curves, since);
        self.export_type(&mut out.string_curves, since);
        self.export_type(&mut out.object_ref_curves, since);
        self.export_type(&mut out.unique_curves, since);
        self.export_type(&mut out.int_vector_curves, since);
        self.export_type(&mut out.float_vector_curves, since);
        out.update_sizes();
        out.entity_names = std::mem::take(&mut *self.staged_names.lock());
    }
}

/// Run one system callback, catching both error returns and panics at the
/// job boundary so a bad system cannot take down the tick.
fn run_system_job(callback: crate::state::systems::SystemFn, job: &SystemJobData) {
    let outcome = catch_unwind(AssertUnwindSafe(|| callback(job)));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::error!(
            "system {} failed for entity {}: {e}",
            crate::id::as_string(job.system),
            job.entity.id.0
        ),
        Err(_) => log::error!(
            "system {} panicked for entity {}",
            crate::id::as_string(job.system),
            job.entity.id.0
        ),
    }
}

/// Convenience for systems: a behaviour with only a tick callback.
pub fn tick_only(tick: crate::state::systems::SystemFn) -> SystemBehaviour {
    SystemBehaviour {
        tick: Some(tick),
        ..SystemBehaviour::default()
    }
}
