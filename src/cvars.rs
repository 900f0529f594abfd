//! Engine console variables.
//!
//! Naming convention: `c_*` client/game-loop pacing, `s_*` server,
//! `file_*` resource i/o, `vid_*` render target, `con_*` console overlay.

use crate::console::properties::{self, PropertyError};

/// Worker threads for the simulation pool. −1 = auto, 0/1 = serial.
pub const SERVER_THREADCOUNT: &str = "s_threads";

/// Milliseconds of simulation per tick.
pub const CLIENT_TICK_TIME: &str = "c_tickrate";
/// Hard cap on the time spent in a single frame, in milliseconds.
pub const CLIENT_MAX_TICK: &str = "c_maxframetime";
/// Time taken to generate the previous frame.
pub const CLIENT_PREVIOUS_FRAMETIME: &str = "c_previous_frametime";
/// Ticks taken by the previous frame.
pub const CLIENT_TICK_COUNT: &str = "c_ticks_per_frame";

/// Store saves and configs beside the binary instead of the user directory.
pub const FILE_PORTABLE: &str = "file_portable";
/// Compress saves and configs on write.
pub const FILE_DEFLATE: &str = "file_deflate";

pub const CONSOLE_CHARSIZE: &str = "con_charsize";
pub const CONSOLE_FADE: &str = "con_fade";

pub const VIDEO_FULLSCREEN: &str = "vid_fullscreen";
pub const VIDEO_RESIZABLE: &str = "vid_resizable";
pub const VIDEO_WIDTH: &str = "vid_width";
pub const VIDEO_HEIGHT: &str = "vid_height";
pub const VIDEO_DEPTH: &str = "vid_depth";

pub mod defaults {
    pub const SERVER_THREADCOUNT: i32 = -1;

    pub const CLIENT_TICK_TIME: i32 = 30;
    pub const CLIENT_MAX_TICK: i32 = 150;
    pub const CLIENT_PREVIOUS_FRAMETIME: f32 = -1.0;
    pub const CLIENT_TICK_COUNT: i32 = 0;

    pub const FILE_PORTABLE: bool = false;
    pub const FILE_DEFLATE: bool = true;

    pub const CONSOLE_CHARSIZE: i32 = 15;
    pub const CONSOLE_FADE: i32 = 180;

    pub const VIDEO_FULLSCREEN: bool = false;
    pub const VIDEO_RESIZABLE: bool = false;
    pub const VIDEO_WIDTH: i32 = 800;
    pub const VIDEO_HEIGHT: i32 = 600;
    pub const VIDEO_DEPTH: i32 = 32;
}

/// Create every engine variable on the installed property provider.
pub fn create_core_console_variables() -> Result<(), PropertyError> {
    properties::create_property(SERVER_THREADCOUNT, defaults::SERVER_THREADCOUNT, false)?;

    properties::create_property(CLIENT_TICK_TIME, defaults::CLIENT_TICK_TIME, false)?;
    properties::create_property(CLIENT_MAX_TICK, defaults::CLIENT_MAX_TICK, false)?;
    properties::create_property(
        CLIENT_PREVIOUS_FRAMETIME,
        defaults::CLIENT_PREVIOUS_FRAMETIME,
        false,
    )?;
    properties::create_property(CLIENT_TICK_COUNT, defaults::CLIENT_TICK_COUNT, false)?;

    properties::create_property(FILE_PORTABLE, defaults::FILE_PORTABLE, false)?;
    properties::create_property(FILE_DEFLATE, defaults::FILE_DEFLATE, false)?;

    properties::create_property(CONSOLE_CHARSIZE, defaults::CONSOLE_CHARSIZE, false)?;
    properties::create_property(CONSOLE_FADE, defaults::CONSOLE_FADE, false)?;

    properties::create_property(VIDEO_FULLSCREEN, defaults::VIDEO_FULLSCREEN, false)?;
    properties::create_property(VIDEO_RESIZABLE, defaults::VIDEO_RESIZABLE, false)?;
    properties::create_property(VIDEO_WIDTH, defaults::VIDEO_WIDTH, false)?;
    properties::create_property(VIDEO_HEIGHT, defaults::VIDEO_HEIGHT, false)?;
    properties::create_property(VIDEO_DEPTH, defaults::VIDEO_DEPTH, false)?;
    Ok(())
}
