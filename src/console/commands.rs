//! Console command system.
//!
//! Commands are whitespace-separated strings: the first token is the
//! request, the rest are arguments. Registered callbacks return `bool` to
//! report success and are invokable from any thread through the installed
//! system.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use super::logging;
use super::logging::Verbosity;

/// A parsed console command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    pub request: String,
    pub arguments: Vec<String>,
}

impl Command {
    pub fn new(request: impl Into<String>) -> Self {
        Command {
            request: request.into(),
            arguments: Vec::new(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.request)?;
        for arg in &self.arguments {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Split a command line into request and arguments.
pub fn make_command(line: &str) -> Command {
    let mut tokens = line.split_whitespace();
    let request = tokens.next().unwrap_or_default().to_owned();
    Command {
        request,
        arguments: tokens.map(str::to_owned).collect(),
    }
}

enum CommandFn {
    NoArgs(Box<dyn Fn() -> bool + Send + Sync>),
    Args(Box<dyn Fn(&[String]) -> bool + Send + Sync>),
}

#[derive(Clone)]
struct Entry {
    func: Arc<CommandFn>,
    silent: bool,
}

/// Registry of named command callbacks plus the command history.
#[derive(Default)]
pub struct CommandSystem {
    functions: Mutex<FxHashMap<String, Entry>>,
    history: Mutex<Vec<Command>>,
}

impl CommandSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `func` under `name`. Fails if the name is taken and
    /// `replace` is false. Silent functions are not recorded in history.
    pub fn add_function(
        &self,
        name: &str,
        func: impl Fn(&[String]) -> bool + Send + Sync + 'static,
        replace: bool,
        silent: bool,
    ) -> bool {
        self.add_entry(name, CommandFn::Args(Box::new(func)), replace, silent)
    }

    /// As [`CommandSystem::add_function`] for callbacks taking no arguments.
    /// Invoking such a function with arguments fails the command.
    pub fn add_function_no_args(
        &self,
        name: &str,
        func: impl Fn() -> bool + Send + Sync + 'static,
        replace: bool,
        silent: bool,
    ) -> bool {
        self.add_entry(name, CommandFn::NoArgs(Box::new(func)), replace, silent)
    }

    fn add_entry(&self, name: &str, func: CommandFn, replace: bool, silent: bool) -> bool {
        let mut functions = self.functions.lock();
        if functions.contains_key(name) && !replace {
            return false;
        }
        functions.insert(
            name.to_owned(),
            Entry {
                func: Arc::new(func),
                silent,
            },
        );
        true
    }

    pub fn erase_function(&self, name: &str) {
        self.functions.lock().remove(name);
    }

    /// Run a command. Returns false for unknown names, argument mismatches
    /// and callback failure.
    pub fn run_command(&self, command: &Command) -> bool {
        // take the entry out of the lock so callbacks can reach the system
        let entry = self.functions.lock().get(&command.request).cloned();
        let Some(entry) = entry else {
            logging::log(
                format!("unknown command: {}", command.request),
                Verbosity::Warning,
            );
            return false;
        };

        let result = match &*entry.func {
            CommandFn::NoArgs(_) if !command.arguments.is_empty() => false,
            CommandFn::NoArgs(f) => f(),
            CommandFn::Args(f) => f(&command.arguments),
        };
        let silent = entry.silent;

        if !silent {
            let mut history = self.history.lock();
            if history.last() != Some(command) {
                history.push(command.clone());
            }
        }
        result
    }

    pub fn get_function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Past commands, oldest first. Consecutive repeats are collapsed.
    pub fn command_history(&self) -> Vec<Command> {
        self.history.lock().clone()
    }
}

static SYSTEM: RwLock<Option<Arc<CommandSystem>>> = RwLock::new(None);

/// Install or clear the process command system.
pub fn set_command_system(system: Option<Arc<CommandSystem>>) {
    *SYSTEM.write() = system;
}

/// The installed command system, if any.
pub fn command_system() -> Option<Arc<CommandSystem>> {
    SYSTEM.read().clone()
}

/// Register through the installed system; false if none is installed.
pub fn add_function(
    name: &str,
    func: impl Fn(&[String]) -> bool + Send + Sync + 'static,
    replace: bool,
    silent: bool,
) -> bool {
    command_system()
        .map(|s| s.add_function(name, func, replace, silent))
        .unwrap_or(false)
}

/// Run through the installed system; false if none is installed.
pub fn run_command(command: &Command) -> bool {
    command_system()
        .map(|s| s.run_command(command))
        .unwrap_or(false)
}

pub fn erase_function(name: &str) {
    if let Some(s) = command_system() {
        s.erase_function(name);
    }
}

pub fn get_function_names() -> Vec<String> {
    command_system()
        .map(|s| s.get_function_names())
        .unwrap_or_default()
}

pub fn command_history() -> Vec<Command> {
    command_system()
        .map(|s| s.command_history())
        .unwrap_or_default()
}

/// Run `func` for every entry in `commands` matching `name`, removing the
/// handled entries. Returns the result of the last invocation.
///
/// Used for boot-time command-line processing, where some commands are
/// consumed by the app before the console exists.
pub fn handle_command(
    commands: &mut Vec<Command>,
    name: &str,
    mut func: impl FnMut(&[String]) -> bool,
) -> bool {
    let mut result = false;
    commands.retain(|command| {
        if command.request == name {
            result = func(&command.arguments);
            false
        } else {
            true
        }
    });
    result
}
