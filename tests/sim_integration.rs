//! Simulation loop integration tests: system attachment staging, parallel
//! entity jobs, input injection, change export and the render mirror.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use hades::curve::{CurveKind, Vec2f};
use hades::data::resources::{RenderSystemDecl, SystemDecl};
use hades::data::{self, DataManager, MemoryFiles};
use hades::id::{IdRegistry, UniqueId};
use hades::input::Action;
use hades::jobs::{self, ThreadPool};
use hades::render::{RenderInstance, RenderInterface, RenderJobData};
use hades::sim::{ExportedCurves, GameInstance, tick_only};
use hades::state::systems::{SystemBehaviour, SystemJobData};
use hades::state::{EntityId, ObjectInstance, VarInit, state_api};
use hades::time::{TimeDuration, TimePoint};

fn ms(v: i64) -> TimeDuration {
    TimeDuration::from_millis(v)
}

fn at(v: i64) -> TimePoint {
    TimePoint::from_millis(v)
}

static HEALTH: OnceLock<UniqueId> = OnceLock::new();

fn health() -> UniqueId {
    *HEALTH.get_or_init(UniqueId::new)
}

static CONNECTED: AtomicUsize = AtomicUsize::new(0);
static CREATED: AtomicUsize = AtomicUsize::new(0);

fn on_connect(_job: &SystemJobData) -> Result<(), String> {
    CONNECTED.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

fn on_create(_job: &SystemJobData) -> Result<(), String> {
    CREATED.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

fn decay_tick(job: &SystemJobData) -> Result<(), String> {
    let interface = &job.interface;
    let current: i32 = state_api::get_value(
        job.entity,
        health(),
        job.time,
        &interface.state,
        &interface.extra,
    )
    .ok_or("entity has no health variable")?;
    state_api::set_value(
        job.entity,
        health(),
        job.time + job.dt,
        current - 1,
        &interface.state,
        &interface.extra,
    );
    Ok(())
}

fn failing_tick(_job: &SystemJobData) -> Result<(), String> {
    Err("deliberate failure".to_owned())
}

fn health_instance(value: i32) -> ObjectInstance {
    ObjectInstance {
        object_type: UniqueId::ZERO,
        vars: vec![VarInit::Int(health(), CurveKind::Step, value)],
    }
}

#[test]
fn attachments_stage_until_the_tick_ends() {
    let mut instance = GameInstance::new();
    let decl = SystemDecl {
        id: UniqueId::new(),
        behaviour: Some(SystemBehaviour {
            on_connect: Some(on_connect),
            on_create: Some(on_create),
            tick: Some(decay_tick),
            ..SystemBehaviour::default()
        }),
    };

    let obj = instance.make_object(&health_instance(100));
    instance.attach_system(&decl, obj, true);

    // the attachment is staged; the first tick runs no jobs but applies it
    instance.tick(ms(30)).unwrap();
    assert!(CONNECTED.load(Ordering::Relaxed) >= 1);
    assert!(CREATED.load(Ordering::Relaxed) >= 1);

    let interface = instance.get_interface().clone();
    let before: i32 =
        state_api::get_value(obj, health(), at(30), &interface.state, &interface.extra).unwrap();
    assert_eq!(before, 100);

    // the second tick runs the system for the entity
    instance.tick(ms(30)).unwrap();
    let after: i32 =
        state_api::get_value(obj, health(), at(60), &interface.state, &interface.extra).unwrap();
    assert_eq!(after, 99);
}

#[test]
fn system_failures_are_contained() {
    let mut instance = GameInstance::new();
    let bad = SystemDecl {
        id: UniqueId::new(),
        behaviour: Some(tick_only(failing_tick)),
    };
    let good = SystemDecl {
        id: UniqueId::new(),
        behaviour: Some(tick_only(decay_tick)),
    };

    let obj = instance.make_object(&health_instance(10));
    instance.attach_system(&bad, obj, false);
    instance.attach_system(&good, obj, false);

    instance.tick(ms(30)).unwrap(); // applies attachments
    // the failing system is logged, the good one still runs
    instance.tick(ms(30)).unwrap();

    let interface = instance.get_interface();
    let value: i32 =
        state_api::get_value(obj, health(), at(60), &interface.state, &interface.extra).unwrap();
    assert_eq!(value, 9);
}

#[test]
fn entity_jobs_fan_out_on_the_pool() {
    let pool = Arc::new(ThreadPool::with_threads(4));
    jobs::set_shared_pool(Some(Arc::clone(&pool)));

    let mut instance = GameInstance::new();
    let decl = SystemDecl {
        id: UniqueId::new(),
        behaviour: Some(tick_only(decay_tick)),
    };
    let objects: Vec<_> = (0..64)
        .map(|_| {
            let obj = instance.make_object(&health_instance(100));
            instance.attach_system(&decl, obj, false);
            obj
        })
        .collect();

    instance.tick(ms(30)).unwrap();
    instance.tick(ms(30)).unwrap();
    instance.tick(ms(30)).unwrap();

    let interface = instance.get_interface();
    for obj in objects {
        let value: i32 =
            state_api::get_value(obj, health(), at(90), &interface.state, &interface.extra)
                .unwrap();
        // ticked twice after the staged attach merged
        assert_eq!(value, 98);
    }

    jobs::set_shared_pool(None);
}

#[test]
fn input_staging_feeds_history() {
    let mut instance = GameInstance::new();
    let player = UniqueId::new();
    let fire = UniqueId::new();

    instance.add_input(player, vec![Action::pressed(fire)], at(0));
    instance.tick(ms(30)).unwrap();
    instance.add_input(player, vec![Action::new(fire)], at(30));
    instance.tick(ms(30)).unwrap();

    // the history is a step curve over the staged sets
    let held = instance.player_input_at(player, at(10));
    assert_eq!(held.len(), 1);
    assert!(held[0].active);
    let released = instance.player_input_at(player, at(40));
    assert!(!released[0].active);
}

#[test]
fn export_is_filtered_and_monotonic() {
    // declarations provide the sync flags; health exports, secret does not
    let files = MemoryFiles::new();
    files.insert(
        "simgame",
        "game.json",
        r#"{
            "mod": { "name": "Sim Game" },
            "curves": {
                "sync-health": { "type": "step", "value": "int32", "sync": true },
                "secret": { "type": "step", "value": "int32", "sync": false }
            }
        }"#,
    );
    let mut manager = DataManager::new(Arc::new(files), Arc::new(IdRegistry::new()));
    manager.load_game("simgame").unwrap();
    manager.load();
    let health_id = manager.get_uid("sync-health").unwrap();
    let secret_id = manager.get_uid("secret").unwrap();
    data::set_data_manager(Some(Arc::new(RwLock::new(manager))));

    let mut instance = GameInstance::new();
    let obj = instance.make_object(&ObjectInstance {
        object_type: UniqueId::ZERO,
        vars: vec![
            VarInit::Int(health_id, CurveKind::Step, 100),
            VarInit::Int(secret_id, CurveKind::Step, 5),
        ],
    });
    assert!(instance.name_object("hero", obj));

    let interface = instance.get_interface().clone();
    state_api::set_value(obj, health_id, at(10), 75i32, &interface.state, &interface.extra);
    state_api::set_value(obj, health_id, at(20), 50i32, &interface.state, &interface.extra);
    state_api::set_value(obj, secret_id, at(20), 6i32, &interface.state, &interface.extra);

    let mut first = ExportedCurves::default();
    instance.get_changes(&mut first, at(-1));

    assert_eq!(first.int_curves.len(), 1, "only the synced variable exports");
    let set = &first.int_curves[0];
    assert_eq!(set.variable, health_id);
    assert_eq!(set.frames.len(), 3);
    assert_eq!(first.sizes[0], 3);
    assert_eq!(first.entity_names, vec![(obj.id, "hero".to_owned())]);

    // a later export from t=10 only carries strictly newer keyframes
    let mut second = ExportedCurves::default();
    instance.get_changes(&mut second, at(10));
    assert_eq!(second.int_curves.len(), 1);
    assert!(second.int_curves[0].frames.iter().all(|f| f.time > at(10)));
    assert_eq!(second.int_curves[0].frames.len(), 1);
    // name deltas were consumed by the first export
    assert!(second.entity_names.is_empty());

    data::set_data_manager(None);
}

// ---- render mirror ----

static POSITION: OnceLock<UniqueId> = OnceLock::new();

fn position_var() -> UniqueId {
    *POSITION.get_or_init(UniqueId::new)
}

static SPRITE_TEXTURE: OnceLock<UniqueId> = OnceLock::new();

fn sprite_texture() -> UniqueId {
    *SPRITE_TEXTURE.get_or_init(UniqueId::new)
}

fn draw_position(job: &mut RenderJobData<'_>) -> Result<(), String> {
    let position: Vec2f = job
        .mirror
        .get(job.entity, position_var(), job.time)
        .ok_or("no mirrored position")?;
    job.output.set_sprite(job.entity, sprite_texture(), position, 0);
    Ok(())
}

#[derive(Default)]
struct TestSink {
    sprites: Vec<(EntityId, Vec2f)>,
}

impl RenderInterface for TestSink {
    fn set_sprite(&mut self, entity: EntityId, _texture: UniqueId, position: Vec2f, _layer: i32) {
        self.sprites.push((entity, position));
    }
    fn remove_entity(&mut self, entity: EntityId) {
        self.sprites.retain(|(e, _)| *e != entity);
    }
}

#[test]
fn render_mirror_rebuilds_and_draws() {
    use hades::curve::Keyframe;
    use hades::sim::ExportSet;

    let entity = EntityId(7);
    let mut exported = ExportedCurves::default();
    exported.vec2_curves.push(ExportSet {
        entity,
        variable: position_var(),
        frames: vec![
            Keyframe {
                time: at(0),
                value: Vec2f::new(0.0, 0.0),
            },
            Keyframe {
                time: at(100),
                value: Vec2f::new(10.0, 0.0),
            },
        ],
    });
    exported.entity_names.push((entity, "hero".to_owned()));

    let mut render = RenderInstance::new();
    render.input_updates(&exported);
    assert_eq!(render.mirror().entity_name(entity), Some("hero"));

    let decl = RenderSystemDecl {
        id: UniqueId::new(),
        behaviour: Some(hades::state::systems::RenderBehaviour {
            tick: Some(draw_position),
            ..Default::default()
        }),
    };
    render.attach_system(&decl, entity);

    let mut sink = TestSink::default();
    render.make_frame_at(at(50), &mut sink);

    assert_eq!(sink.sprites.len(), 1);
    let (drawn, position) = sink.sprites[0];
    assert_eq!(drawn, entity);
    // without a declaration the mirror defaults to a step curve
    assert_eq!(position, Vec2f::new(0.0, 0.0));

    // merging the same bundle twice dedupes repeated keys
    render.input_updates(&exported);
    let curve = render
        .mirror()
        .curve::<Vec2f>(entity, position_var())
        .unwrap();
    assert_eq!(curve.len(), 2);
}
