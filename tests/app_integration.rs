//! Whole-app lifecycle: init installs the providers and config, post-init
//! consumes boot commands, run drives fixed-dt updates, clean-up tears the
//! providers back down.
//!
//! Everything lives in one test because the providers are process-wide.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use hades::app::{
    App, AppEvent, EventSource, RenderTarget, State, StateManager, exitcode, parse_command_line,
};
use hades::console::properties;
use hades::console::{Command, commands};
use hades::cvars;
use hades::data::{DataManager, MemoryFiles};
use hades::input::{ActionSet, InputSystem};
use hades::time::TimeDuration;

static UPDATES: AtomicUsize = AtomicUsize::new(0);
static DRAWS: AtomicUsize = AtomicUsize::new(0);

struct CountingState;

impl State for CountingState {
    fn init(&mut self) {}
    fn update(&mut self, _dt: TimeDuration, _input: &ActionSet) {
        UPDATES.fetch_add(1, Ordering::Relaxed);
    }
    fn draw(&mut self, _target: &mut dyn RenderTarget, _dt: TimeDuration) {
        DRAWS.fetch_add(1, Ordering::Relaxed);
    }
}

/// Feeds a few empty frames, then closes the window.
struct ScriptedEvents {
    frames_left: usize,
}

impl EventSource for ScriptedEvents {
    fn poll(&mut self) -> Vec<AppEvent> {
        // stand in for real frame time so the fixed-dt loop accrues ticks
        std::thread::sleep(Duration::from_millis(15));
        if self.frames_left == 0 {
            return vec![AppEvent::Closed];
        }
        self.frames_left -= 1;
        Vec::new()
    }
}

struct NullTarget;

impl RenderTarget for NullTarget {
    fn size(&self) -> (u32, u32) {
        (800, 600)
    }
    fn present(&mut self) {}
}

fn register_nothing(_data: &mut DataManager) {}

fn push_counting_state(
    states: &mut StateManager,
    _input: &mut InputSystem<AppEvent>,
    _commands: &[Command],
) {
    states.push(Box::new(CountingState));
}

#[test]
fn app_lifecycle() {
    let files = MemoryFiles::new();
    files.insert(
        "mygame",
        "game.json",
        r#"{ "mod": { "name": "App Test Game" } }"#,
    );
    // the config file is a flat list of console commands
    files.insert("", "config.cfg", "set c_tickrate 10\n# comment line\n");

    let mut app = App::new(Arc::new(files));
    app.init("mygame", register_nothing).unwrap();

    // core variables exist and the config file was applied over defaults
    let tick = properties::get_int(cvars::CLIENT_TICK_TIME).unwrap();
    assert_eq!(tick.load(), 10);
    assert_eq!(
        properties::get_int(cvars::CLIENT_MAX_TICK).unwrap().load(),
        cvars::defaults::CLIENT_MAX_TICK
    );

    // boot commands run through the console; unknown ones just warn
    let boot = parse_command_line(&[
        "-set".to_owned(),
        "vid_width".to_owned(),
        "1024".to_owned(),
    ]);
    app.post_init(boot, push_counting_state);
    assert_eq!(
        properties::get_int(cvars::VIDEO_WIDTH).unwrap().load(),
        1024
    );
    assert!(
        commands::command_history()
            .iter()
            .any(|c| c.request == "set")
    );

    // a few frames of the main loop, then the window closes
    let mut events = ScriptedEvents { frames_left: 4 };
    let mut target = NullTarget;
    let code = app.run(&mut events, &mut target);
    assert_eq!(code, exitcode::SUCCESS);
    assert!(UPDATES.load(Ordering::Relaxed) >= 1);
    assert!(DRAWS.load(Ordering::Relaxed) >= 1);

    app.clean_up();
    assert!(properties::get_int(cvars::CLIENT_TICK_TIME).is_err());
    assert!(hades::data::data_manager().is_err());
}
