//! Application skeleton.
//!
//! `init` installs the console, id, property and data providers and loads
//! the game; `post_init` runs boot commands and builds the starting state;
//! `run` drives the event → input → update → draw loop with the
//! `c_tickrate` budget; `clean_up` tears everything down. Windowing is an
//! external collaborator behind [`EventSource`] and [`RenderTarget`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use thiserror::Error;

use crate::console::commands::{self, Command, CommandSystem};
use crate::console::logging::{self, ConsoleLog, Verbosity};
use crate::console::properties::{self, Properties, PropertyError};
use crate::cvars;
use crate::data::{self, DataManager, FileError, FileProviderHandle, ResourceError};
use crate::id::{self, IdRegistry};
use crate::input::{ActionSet, CheckedEvent, InputSystem};
use crate::jobs::{self, ThreadPool};
use crate::time::TimeDuration;
use crate::timers::TimerSystem;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Property(#[from] PropertyError),
    #[error(transparent)]
    File(#[from] FileError),
}

/// Events the engine consumes; produced by the windowing layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppEvent {
    Closed,
    Resized { width: u32, height: u32 },
    FocusLost,
    FocusGained,
    KeyPressed { code: u32 },
    KeyReleased { code: u32 },
    TextEntered { character: char },
    MouseMoved { x: i32, y: i32 },
    MouseButtonPressed { button: u32, x: i32, y: i32 },
    MouseButtonReleased { button: u32, x: i32, y: i32 },
}

/// Source of the per-frame event stream.
pub trait EventSource {
    fn poll(&mut self) -> Vec<AppEvent>;
}

/// Where states draw; the presentation side of the window.
pub trait RenderTarget {
    fn size(&self) -> (u32, u32);
    fn present(&mut self);
}

/// A screen of the application (game, menu, editor...).
///
/// The manager owns focus: pushing a state pauses the one below, popping
/// resumes and reinitialises the new top.
pub trait State {
    fn init(&mut self);
    /// Return true to mark the event handled before input folding.
    fn handle_event(&mut self, _event: &AppEvent) -> bool {
        false
    }
    fn update(&mut self, dt: TimeDuration, input: &ActionSet);
    fn draw(&mut self, target: &mut dyn RenderTarget, dt: TimeDuration);
    /// Called when the state regains the top of the stack.
    fn reinit(&mut self) {}
    fn pause(&mut self) {}
    fn resume(&mut self) {}
    /// A dead state is removed the next time it reaches the top.
    fn is_alive(&self) -> bool {
        true
    }
}

struct StateEntry {
    state: Box<dyn State>,
    initialised: bool,
}

/// Stack of application states; the top holds focus.
#[derive(Default)]
pub struct StateManager {
    states: Vec<StateEntry>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, state: Box<dyn State>) {
        if let Some(top) = self.states.last_mut() {
            top.state.pause();
        }
        self.states.push(StateEntry {
            state,
            initialised: false,
        });
    }

    pub fn pop(&mut self) {
        self.states.pop();
        if let Some(top) = self.states.last_mut() {
            top.state.resume();
            top.state.reinit();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// The live top of the stack, initialising it on first access and
    /// dropping dead states.
    pub fn active_state(&mut self) -> Option<&mut dyn State> {
        while let Some(top) = self.states.last() {
            if top.state.is_alive() {
                break;
            }
            self.pop();
        }
        let top = self.states.last_mut()?;
        if !top.initialised {
            top.state.init();
            top.initialised = true;
        }
        Some(top.state.as_mut())
    }

    /// Drop every state, top first.
    pub fn drop_all(&mut self) {
        while self.states.pop().is_some() {}
    }
}

/// Registers app resource types on the fresh data manager during init.
pub type RegisterResourceTypesFn = fn(&mut DataManager);
/// Builds the starting state(s) after boot commands ran.
pub type AppMainFn = fn(&mut StateManager, &mut InputSystem<AppEvent>, &[Command]);

/// Main application object.
pub struct App {
    console_log: Arc<ConsoleLog>,
    properties: Arc<Properties>,
    commands: Arc<CommandSystem>,
    ids: Arc<IdRegistry>,
    files: FileProviderHandle,
    data: Option<Arc<RwLock<DataManager>>>,
    pool: Option<Arc<ThreadPool>>,
    input: InputSystem<AppEvent>,
    states: StateManager,
    timers: TimerSystem,
    quit: Arc<AtomicBool>,
}

impl App {
    pub fn new(files: FileProviderHandle) -> Self {
        App {
            console_log: Arc::new(ConsoleLog::new()),
            properties: Arc::new(Properties::new()),
            commands: Arc::new(CommandSystem::new()),
            ids: Arc::new(IdRegistry::new()),
            files,
            data: None,
            pool: None,
            input: InputSystem::new(),
            states: StateManager::new(),
            timers: TimerSystem::new(),
            quit: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn input(&mut self) -> &mut InputSystem<AppEvent> {
        &mut self.input
    }

    pub fn timers(&self) -> &TimerSystem {
        &self.timers
    }

    pub fn data(&self) -> Option<&Arc<RwLock<DataManager>>> {
        self.data.as_ref()
    }

    /// Install providers, read the config file, start the pool and load
    /// the game.
    pub fn init(&mut self, game: &str, register: RegisterResourceTypesFn) -> Result<(), AppError> {
        id::set_id_registry(Some(Arc::clone(&self.ids)));
        logging::set_log_sink(Some(Arc::clone(&self.console_log)));
        properties::set_property_provider(Some(Arc::clone(&self.properties)));
        commands::set_command_system(Some(Arc::clone(&self.commands)));

        cvars::create_core_console_variables()?;
        self.register_console_commands();
        self.run_config_file();

        // worker pool sized by s_threads: -1 auto, 0/1 serial
        let threads = properties::get_int_or(cvars::SERVER_THREADCOUNT, -1)?.load();
        let pool = match threads {
            i32::MIN..=-1 => ThreadPool::new(),
            0 | 1 => ThreadPool::with_threads(1),
            n => ThreadPool::with_threads(n as usize),
        };
        let pool = Arc::new(pool);
        jobs::set_shared_pool(Some(Arc::clone(&pool)));
        self.pool = Some(pool);

        let mut manager = DataManager::new(Arc::clone(&self.files), Arc::clone(&self.ids));
        register(&mut manager);
        manager.load_game(game)?;
        manager.load();
        let manager = Arc::new(RwLock::new(manager));
        data::set_data_manager(Some(Arc::clone(&manager)));
        self.data = Some(manager);
        Ok(())
    }

    /// Execute boot commands, then hand the remainder to `app_main` to
    /// build the starting state.
    pub fn post_init(&mut self, mut boot_commands: Vec<Command>, app_main: AppMainFn) {
        let files = Arc::clone(&self.files);
        commands::handle_command(&mut boot_commands, "compress", |args| {
            let Some(dir) = args.first() else {
                logging::log("compress expects a single directory", Verbosity::Error);
                return false;
            };
            match files.compress(dir) {
                Ok(()) => true,
                Err(e) => {
                    logging::log(format!("{e}"), Verbosity::Error);
                    false
                }
            }
        });
        let files = Arc::clone(&self.files);
        commands::handle_command(&mut boot_commands, "uncompress", |args| {
            let Some(archive) = args.first() else {
                logging::log("uncompress expects a single archive", Verbosity::Error);
                return false;
            };
            match files.uncompress(archive) {
                Ok(()) => true,
                Err(e) => {
                    logging::log(format!("{e}"), Verbosity::Error);
                    false
                }
            }
        });

        // anything else is forwarded to the console
        let mut remaining = Vec::new();
        for command in boot_commands {
            if !self.commands.run_command(&command) {
                logging::log(format!("command failed: {command}"), Verbosity::Warning);
            }
            remaining.push(command);
        }

        app_main(&mut self.states, &mut self.input, &remaining);
    }

    /// The main loop: events → input fold → fixed-dt updates → draw.
    ///
    /// Each frame consumes real elapsed time in `c_tickrate`-sized steps,
    /// hard capped at `c_maxframetime`; a capped frame gets one immediate
    /// catch-up tick and a logged warning.
    pub fn run(&mut self, events: &mut dyn EventSource, target: &mut dyn RenderTarget) -> i32 {
        let pacing = (
            properties::get_int_or(cvars::CLIENT_TICK_TIME, cvars::defaults::CLIENT_TICK_TIME),
            properties::get_int_or(cvars::CLIENT_MAX_TICK, cvars::defaults::CLIENT_MAX_TICK),
            properties::get_float_or(
                cvars::CLIENT_PREVIOUS_FRAMETIME,
                cvars::defaults::CLIENT_PREVIOUS_FRAMETIME,
            ),
            properties::get_int_or(cvars::CLIENT_TICK_COUNT, cvars::defaults::CLIENT_TICK_COUNT),
        );
        let (Ok(tick_time), Ok(max_tick), Ok(prev_frametime), Ok(ticks_per_frame)) = pacing
        else {
            log::error!("pacing variables hold the wrong types; cannot run");
            return exitcode::FAILURE;
        };

        let mut clock = Instant::now();
        let mut accumulator = TimeDuration::ZERO;

        while !self.quit.load(Ordering::Relaxed) {
            if self.states.active_state().is_none() {
                break;
            }

            // pump events, let the active state claim them first
            let raw = events.poll();
            let mut checked: Vec<CheckedEvent<AppEvent>> = Vec::with_capacity(raw.len());
            for event in raw {
                if event == AppEvent::Closed {
                    self.quit.store(true, Ordering::Relaxed);
                }
                let handled = self
                    .states
                    .active_state()
                    .map(|s| s.handle_event(&event))
                    .unwrap_or(false);
                checked.push((handled, event));
            }
            self.input.generate_state(&checked);

            let dt = TimeDuration::from_millis(tick_time.load().max(1) as i64);
            let cap = TimeDuration::from_millis(max_tick.load().max(1) as i64);

            let frame_time = TimeDuration::from_nanos(clock.elapsed().as_nanos() as i64);
            clock = Instant::now();
            prev_frametime.store(frame_time.as_nanos() as f32 / 1e6);

            accumulator += frame_time;
            if accumulator > cap {
                // keep one catch-up tick beyond the cap and shed the rest
                log::warn!(
                    "frame took {}ms, over the {}ms budget; dropping time",
                    frame_time.as_millis(),
                    cap.as_millis()
                );
                accumulator = cap + dt;
            }

            let mut ticks = 0;
            while accumulator >= dt {
                accumulator -= dt;
                ticks += 1;
                self.timers.update(dt);
                let Some(state) = self.states.active_state() else {
                    break;
                };
                state.update(dt, self.input.input_state());
            }
            ticks_per_frame.store(ticks);

            if let Some(state) = self.states.active_state() {
                state.draw(target, frame_time);
            }
            target.present();
        }

        exitcode::SUCCESS
    }

    /// Drop states top-down and uninstall every provider.
    pub fn clean_up(&mut self) {
        self.states.drop_all();
        self.timers.drop_all();

        data::set_data_manager(None);
        self.data = None;
        jobs::set_shared_pool(None);
        self.pool = None;

        commands::set_command_system(None);
        properties::set_property_provider(None);
        logging::set_log_sink(None);
        id::set_id_registry(None);
    }

    /// The engine's built-in console commands.
    fn register_console_commands(&mut self) {
        let quit = Arc::clone(&self.quit);
        self.commands.add_function_no_args(
            "quit",
            move || {
                quit.store(true, Ordering::Relaxed);
                true
            },
            true,
            false,
        );

        let props = Arc::clone(&self.properties);
        self.commands.add_function(
            "set",
            move |args| {
                let Some((name, value)) = args.split_first() else {
                    logging::log("set expects: set <name> <value>", Verbosity::Error);
                    return false;
                };
                match props.set_parsed(name, &value.join(" ")) {
                    Ok(()) => true,
                    Err(e) => {
                        logging::log(format!("{e}"), Verbosity::Error);
                        false
                    }
                }
            },
            true,
            false,
        );

        let props = Arc::clone(&self.properties);
        self.commands.add_function(
            "get",
            move |args| {
                let Some(name) = args.first() else {
                    logging::log("get expects: get <name>", Verbosity::Error);
                    return false;
                };
                match props.get_as_string(name) {
                    Ok(value) => {
                        logging::log(format!("{name} = {value}"), Verbosity::Normal);
                        true
                    }
                    Err(e) => {
                        logging::log(format!("{e}"), Verbosity::Error);
                        false
                    }
                }
            },
            true,
            false,
        );

        self.commands.add_function_no_args(
            "commands",
            || {
                for name in commands::get_function_names() {
                    logging::log(name, Verbosity::Normal);
                }
                true
            },
            true,
            true,
        );

        self.commands.add_function_no_args(
            "reparse",
            || {
                let outcome = data::with_data_mut(|d| {
                    d.reparse()?;
                    d.refresh();
                    d.load();
                    Ok::<(), ResourceError>(())
                });
                match outcome {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) | Err(e) => {
                        logging::log(format!("reparse failed: {e}"), Verbosity::Error);
                        false
                    }
                }
            },
            true,
            false,
        );
    }

    /// The config file is a flat list of console commands (`set key
    /// value`), run before anything else reads properties.
    fn run_config_file(&self) {
        let Ok(text) = self.files.as_string("", "config.cfg") else {
            return;
        };
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let command = commands::make_command(line);
            if !self.commands.run_command(&command) {
                logging::log(format!("config command failed: {line}"), Verbosity::Warning);
            }
        }
    }
}

/// Exit codes mirrored from the platform's conventions.
pub mod exitcode {
    pub const SUCCESS: i32 = 0;
    pub const FAILURE: i32 = 1;
}

/// Split a raw command line into console commands: a token starting with
/// `-` opens a new command, following tokens are its arguments.
pub fn parse_command_line(args: &[String]) -> Vec<Command> {
    let mut commands: Vec<Command> = Vec::new();
    for arg in args {
        if let Some(request) = arg.strip_prefix('-') {
            commands.push(Command::new(request));
        } else if let Some(current) = commands.last_mut() {
            current.arguments.push(arg.clone());
        }
    }
    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_grouping() {
        let args: Vec<String> = ["-compress", "my_game", "-vid_width", "1280"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let commands = parse_command_line(&args);
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].request, "compress");
        assert_eq!(commands[0].arguments, vec!["my_game"]);
        assert_eq!(commands[1].request, "vid_width");
        assert_eq!(commands[1].arguments, vec!["1280"]);
    }

    #[test]
    fn leading_loose_tokens_are_dropped() {
        let args: Vec<String> = ["game", "-run"].iter().map(|s| s.to_string()).collect();
        let commands = parse_command_line(&args);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].request, "run");
    }

    struct CountingState {
        updates: usize,
        alive: bool,
    }

    impl State for CountingState {
        fn init(&mut self) {}
        fn update(&mut self, _dt: TimeDuration, _input: &ActionSet) {
            self.updates += 1;
        }
        fn draw(&mut self, _target: &mut dyn RenderTarget, _dt: TimeDuration) {}
        fn is_alive(&self) -> bool {
            self.alive
        }
    }

    #[test]
    fn dead_states_are_dropped_from_the_top() {
        let mut manager = StateManager::new();
        manager.push(Box::new(CountingState {
            updates: 0,
            alive: true,
        }));
        manager.push(Box::new(CountingState {
            updates: 0,
            alive: false,
        }));
        assert!(manager.active_state().is_some());
        // the dead top was removed, one live state remains
        manager.pop();
        assert!(manager.is_empty());
    }
}
