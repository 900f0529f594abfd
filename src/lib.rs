//! Hades engine core.
//!
//! A 2D game engine substrate: a mod-stacked resource graph with deferred
//! loading, a console of typed properties and commands, an input state
//! machine, time-indexed curve storage with a fixed-dt simulation loop, a
//! work-stealing thread pool, a vertex-corner terrain model and the glue
//! that holds an application together.
//!
//! Windowing, drawing, audio and archive i/o are external collaborators;
//! the engine consumes them through the traits in [`app`], [`render`] and
//! [`data::files`].
//!
//! # Module Map
//!
//! - [`id`] – process-wide unique ids and name interning
//! - [`console`] – properties, commands and the log sink
//! - [`jobs`] – the cooperative work-stealing thread pool
//! - [`time`] / [`curve`] – game time and keyframe containers
//! - [`data`] – mods, parsers and the typed resource graph
//! - [`input`] – interpreter registry and per-tick event folding
//! - [`tiles`] / [`terrain`] – tile maps and corner-based terrain
//! - [`level`] – level and mission documents
//! - [`state`] / [`sim`] – entities, variables and the tick loop
//! - [`render`] – the render-side curve mirror
//! - [`timers`] – the timer wheel
//! - [`app`] – init/run/cleanup and the state stack

pub mod app;
pub mod console;
pub mod curve;
pub mod cvars;
pub mod data;
pub mod id;
pub mod input;
pub mod jobs;
pub mod level;
pub mod render;
pub mod sim;
pub mod state;
pub mod terrain;
pub mod tiles;
pub mod time;
pub mod timers;
