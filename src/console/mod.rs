//! Console subsystem: globally reachable properties, commands and the log
//! sink.
//!
//! Each piece is a plain type installed behind a process-wide pointer at app
//! startup (see [`crate::app`]). The free functions in the submodules work
//! through those pointers so engine code can reach the console from
//! anywhere; behaviour when a provider is absent follows the rules in each
//! submodule.

pub mod commands;
pub mod logging;
pub mod properties;

pub use commands::{Command, CommandSystem, handle_command, make_command};
pub use logging::{ConsoleLog, LogEntry, Verbosity};
pub use properties::{Properties, Property, PropertyError};
