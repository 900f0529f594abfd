//! Console integration tests: properties, commands and the log sink
//! working together the way the app wires them.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use hades::console::logging::{ConsoleLog, LogEntry, Verbosity};
use hades::console::properties::{Properties, PropertyError};
use hades::console::{CommandSystem, make_command};

#[test]
fn property_round_trip_keeps_value_on_type_error() {
    let props = Properties::new();
    props.create("a", 3i32, false).unwrap();

    props.set("a", 7i32).unwrap();
    assert_eq!(props.get::<i32>("a").unwrap().load(), 7);

    // a write of the wrong type fails and leaves the value untouched
    let result = props.set("a", "foo".to_owned());
    assert!(matches!(result, Err(PropertyError::WrongType(_))));
    assert_eq!(props.get::<i32>("a").unwrap().load(), 7);

    // the handle keeps working without another lookup
    let handle = props.get::<i32>("a").unwrap();
    handle.store(12);
    assert_eq!(props.get::<i32>("a").unwrap().load(), 12);
    assert_eq!(handle.load_default(), 3);
}

#[test]
fn spawn_command_records_one_history_entry() {
    let sys = CommandSystem::new();
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    sys.add_function(
        "spawn",
        move |args| {
            sink.lock().extend(args.iter().cloned());
            true
        },
        false,
        false,
    );

    let command = make_command("spawn enemy 3 4");
    assert_eq!(command.request, "spawn");
    assert_eq!(command.arguments, vec!["enemy", "3", "4"]);

    assert!(sys.run_command(&command));
    assert_eq!(*seen.lock(), vec!["enemy", "3", "4"]);
    assert_eq!(sys.command_history().len(), 1);

    // running the same command again only re-executes; the history entry
    // dedupes against the most recent one
    assert!(sys.run_command(&command));
    assert_eq!(sys.command_history().len(), 1);
}

#[test]
fn console_set_parses_against_stored_type() {
    let props = Properties::new();
    props.create("c_tickrate", 30i32, false).unwrap();

    props.set_parsed("c_tickrate", "60").unwrap();
    assert_eq!(props.get::<i32>("c_tickrate").unwrap().load(), 60);

    assert!(matches!(
        props.set_parsed("c_tickrate", "fast"),
        Err(PropertyError::WrongType(_))
    ));
    assert_eq!(props.get::<i32>("c_tickrate").unwrap().load(), 60);
}

#[test]
fn command_counter_sees_every_invocation() {
    let sys = CommandSystem::new();
    let count = Arc::new(AtomicUsize::new(0));
    let inner = Arc::clone(&count);
    sys.add_function_no_args(
        "tick",
        move || {
            inner.fetch_add(1, Ordering::Relaxed);
            true
        },
        false,
        false,
    );
    for _ in 0..5 {
        sys.run_command(&make_command("tick"));
    }
    assert_eq!(count.load(Ordering::Relaxed), 5);
    // five runs, one deduplicated history entry
    assert_eq!(sys.command_history().len(), 1);
}

#[test]
fn log_sink_filters_and_advances() {
    let sink = ConsoleLog::new();
    let entry = |text: &str, verbosity| LogEntry {
        text: text.to_owned(),
        verbosity,
        time: std::time::SystemTime::now(),
        location: String::new(),
    };

    sink.echo(entry("loading", Verbosity::Normal));
    sink.echo(entry("missing texture", Verbosity::Warning));
    sink.echo(entry("bad mod", Verbosity::Error));

    // the overlay reads errors-and-below first
    let errors_only = sink.new_output(Verbosity::Error);
    assert_eq!(errors_only.len(), 2);

    // the cursor advanced past everything, including filtered entries
    assert!(sink.new_output(Verbosity::Debug).is_empty());
    // but the retained window still holds all three
    assert_eq!(sink.output(Verbosity::Debug).len(), 3);
}
