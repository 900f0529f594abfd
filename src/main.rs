//! Hades engine entry point.
//!
//! The engine core is windowless; this binary wires the console, resource
//! graph and thread pool together, runs boot commands
//! (`-compress`/`-uncompress` and anything the console understands) and
//! drives the app loop against whichever event/render backends the build
//! links in. Without a windowing backend it still serves as the batch
//! front end for mod validation and archive maintenance.
//!
//! # Running
//!
//! ```sh
//! cargo run --release -- --game my_game -compress my_game
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use hades::app::{
    App, AppEvent, EventSource, RenderTarget, exitcode, parse_command_line,
};
use hades::data::{DataManager, DirectoryFiles, FileProviderHandle};

/// Hades 2D engine
#[derive(Parser)]
#[command(version, about = "Hades 2D game engine")]
struct Cli {
    /// Game directory (containing game.json) to load.
    #[arg(long, default_value = "game")]
    game: String,

    /// Engine commands: tokens starting with `-` open a command, the rest
    /// are its arguments, e.g. `-compress my_game`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    commands: Vec<String>,
}

/// Event source for builds without a window backend: the app shuts down on
/// its first frame.
struct NoWindow;

impl EventSource for NoWindow {
    fn poll(&mut self) -> Vec<AppEvent> {
        vec![AppEvent::Closed]
    }
}

impl RenderTarget for NoWindow {
    fn size(&self) -> (u32, u32) {
        (0, 0)
    }
    fn present(&mut self) {}
}

fn register_app_resources(_data: &mut DataManager) {}

fn app_main(
    _states: &mut hades::app::StateManager,
    _input: &mut hades::input::InputSystem<AppEvent>,
    commands: &[hades::console::Command],
) {
    if !commands.is_empty() {
        log::info!("unconsumed boot commands: {}", commands.len());
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut commands = parse_command_line(&cli.commands);

    // archive commands run without starting the app
    let files: FileProviderHandle = Arc::new(DirectoryFiles::working_directory());
    let before = commands.len();
    hades::console::handle_command(&mut commands, "compress", |args| match args.first() {
        Some(dir) => match files.compress(dir) {
            Ok(()) => true,
            Err(e) => {
                log::error!("{e}");
                false
            }
        },
        None => {
            log::error!("compress expects a single directory");
            false
        }
    });
    hades::console::handle_command(&mut commands, "uncompress", |args| match args.first() {
        Some(archive) => match files.uncompress(archive) {
            Ok(()) => true,
            Err(e) => {
                log::error!("{e}");
                false
            }
        },
        None => {
            log::error!("uncompress expects a single archive");
            false
        }
    });
    if commands.len() != before {
        // invoked as a command line tool; don't open the app
        return ExitCode::SUCCESS;
    }

    let mut app = App::new(files);
    if let Err(e) = app.init(&cli.game, register_app_resources) {
        log::error!("failed to initialise: {e}");
        app.clean_up();
        return ExitCode::FAILURE;
    }

    app.post_init(commands, app_main);

    let mut backend = NoWindow;
    let mut target = NoWindow;
    let code = app.run(&mut backend, &mut target);

    app.clean_up();
    if code == exitcode::SUCCESS {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
