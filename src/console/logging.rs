//! Console log sink.
//!
//! A bounded ring of verbosity-tagged messages with a "new since last read"
//! cursor, used to feed the console overlay. The sink also implements
//! [`log::Log`] so it can double as the backend for the `log` facade.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};

/// Hard cap on retained entries.
const HIGH_WATER: usize = 800;
/// Entries kept after a trim.
const RETAIN: usize = 500;

/// Message importance, in display-filter order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Normal,
    Error,
    Warning,
    Debug,
}

impl From<log::Level> for Verbosity {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Verbosity::Error,
            log::Level::Warn => Verbosity::Warning,
            log::Level::Info => Verbosity::Normal,
            log::Level::Debug | log::Level::Trace => Verbosity::Debug,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub text: String,
    pub verbosity: Verbosity,
    pub time: SystemTime,
    /// Source location, `file:line` where known.
    pub location: String,
}

struct LogBuffer {
    entries: VecDeque<LogEntry>,
    /// Absolute index of `entries.front()`.
    start: usize,
    /// Absolute index of the first entry not yet returned by `new_output`.
    cursor: usize,
}

/// Append-only bounded log buffer.
pub struct ConsoleLog {
    buffer: Mutex<LogBuffer>,
}

impl Default for ConsoleLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleLog {
    pub fn new() -> Self {
        ConsoleLog {
            buffer: Mutex::new(LogBuffer {
                entries: VecDeque::new(),
                start: 0,
                cursor: 0,
            }),
        }
    }

    /// Append a message.
    pub fn echo(&self, entry: LogEntry) {
        let mut buf = self.buffer.lock();
        buf.entries.push_back(entry);
        if buf.entries.len() > HIGH_WATER {
            let drop = buf.entries.len() - RETAIN;
            buf.entries.drain(..drop);
            buf.start += drop;
            buf.cursor = buf.cursor.max(buf.start);
        }
    }

    /// Entries since the previous call, filtered to `max` verbosity, and
    /// advance the cursor.
    pub fn new_output(&self, max: Verbosity) -> Vec<LogEntry> {
        let mut buf = self.buffer.lock();
        let skip = buf.cursor - buf.start;
        let out: Vec<LogEntry> = buf
            .entries
            .iter()
            .skip(skip)
            .filter(|e| e.verbosity <= max)
            .cloned()
            .collect();
        buf.cursor = buf.start + buf.entries.len();
        out
    }

    /// The currently retained window, filtered to `max` verbosity.
    pub fn output(&self, max: Verbosity) -> Vec<LogEntry> {
        self.buffer
            .lock()
            .entries
            .iter()
            .filter(|e| e.verbosity <= max)
            .cloned()
            .collect()
    }
}

impl log::Log for ConsoleLog {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let location = match (record.file(), record.line()) {
            (Some(file), Some(line)) => format!("{file}:{line}"),
            (Some(file), None) => file.to_owned(),
            _ => String::new(),
        };
        self.echo(LogEntry {
            text: record.args().to_string(),
            verbosity: record.level().into(),
            time: SystemTime::now(),
            location,
        });
    }

    fn flush(&self) {}
}

static LOG_SINK: RwLock<Option<Arc<ConsoleLog>>> = RwLock::new(None);

/// Install or clear the process log sink. With no sink installed the free
/// logging functions are no-ops.
pub fn set_log_sink(sink: Option<Arc<ConsoleLog>>) {
    *LOG_SINK.write() = sink;
}

/// The installed sink, if any.
pub fn log_sink() -> Option<Arc<ConsoleLog>> {
    LOG_SINK.read().clone()
}

/// Log `text` to the console sink and mirror it onto the `log` facade.
pub fn log(text: impl Into<String>, verbosity: Verbosity) {
    let text = text.into();
    let level = match verbosity {
        Verbosity::Normal => log::Level::Info,
        Verbosity::Error => log::Level::Error,
        Verbosity::Warning => log::Level::Warn,
        Verbosity::Debug => log::Level::Debug,
    };
    log::log!(level, "{text}");
    if let Some(sink) = log_sink() {
        sink.echo(LogEntry {
            text,
            verbosity,
            time: SystemTime::now(),
            location: String::new(),
        });
    }
}

/// Console-sink messages since the last call; empty with no sink installed.
pub fn new_output(max: Verbosity) -> Vec<LogEntry> {
    log_sink().map(|s| s.new_output(max)).unwrap_or_default()
}

/// The console sink's retained window; empty with no sink installed.
pub fn output(max: Verbosity) -> Vec<LogEntry> {
    log_sink().map(|s| s.output(max)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str, verbosity: Verbosity) -> LogEntry {
        LogEntry {
            text: text.to_owned(),
            verbosity,
            time: SystemTime::now(),
            location: String::new(),
        }
    }

    #[test]
    fn cursor_advances() {
        let sink = ConsoleLog::new();
        sink.echo(entry("one", Verbosity::Normal));
        sink.echo(entry("two", Verbosity::Normal));
        assert_eq!(sink.new_output(Verbosity::Debug).len(), 2);
        assert_eq!(sink.new_output(Verbosity::Debug).len(), 0);
        sink.echo(entry("three", Verbosity::Normal));
        let fresh = sink.new_output(Verbosity::Debug);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].text, "three");
    }

    #[test]
    fn verbosity_filter() {
        let sink = ConsoleLog::new();
        sink.echo(entry("info", Verbosity::Normal));
        sink.echo(entry("oops", Verbosity::Error));
        sink.echo(entry("dbg", Verbosity::Debug));
        let shown = sink.output(Verbosity::Error);
        assert_eq!(shown.len(), 2);
        assert_eq!(sink.output(Verbosity::Debug).len(), 3);
    }

    #[test]
    fn buffer_trims_at_high_water() {
        let sink = ConsoleLog::new();
        for i in 0..(HIGH_WATER + 1) {
            sink.echo(entry(&format!("m{i}"), Verbosity::Normal));
        }
        let window = sink.output(Verbosity::Debug);
        assert_eq!(window.len(), RETAIN);
        assert_eq!(window.last().unwrap().text, format!("m{HIGH_WATER}"));
    }
}
