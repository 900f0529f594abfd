//! Input state machine.
//!
//! Raw windowing events are folded once per tick into a frame-stable set of
//! named [`Action`]s. Actions are bound to named *interpreters*: poll
//! interpreters read device state each tick, event interpreters claim
//! matching events as they stream past. The windowing layer registers the
//! concrete keyboard/mouse interpreters; any `(is_match, event_check)` pair
//! is enough to add a new input source.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::id::UniqueId;
use crate::time::{TimeDuration, TimePoint};

pub type ActionId = UniqueId;

/// One named input channel for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    pub id: ActionId,
    pub active: bool,
    /// Stick axes hold 0–100; mouse position interpreters use raw window
    /// coordinates instead.
    pub x_axis: i32,
    pub y_axis: i32,
}

impl Action {
    pub fn new(id: ActionId) -> Self {
        Action {
            id,
            active: false,
            x_axis: 0,
            y_axis: 0,
        }
    }

    pub fn pressed(id: ActionId) -> Self {
        Action {
            id,
            active: true,
            x_axis: 100,
            y_axis: 100,
        }
    }

    /// Fold another interpreter's contribution into this action.
    ///
    /// Active-ness ORs; when both sides are active each axis takes the
    /// maximum, clamped to stick range. Axes are never averaged, so two
    /// devices pushing opposite directions both saturate.
    pub fn merge(&mut self, other: &Action) {
        if !self.active && other.active {
            let id = self.id;
            *self = *other;
            self.id = id;
        } else if self.active && other.active {
            self.x_axis = self.x_axis.max(other.x_axis).clamp(0, 100);
            self.y_axis = self.y_axis.max(other.y_axis).clamp(0, 100);
        }
    }
}

/// The folded result of one tick's input.
pub type ActionSet = FxHashMap<ActionId, Action>;

type PollFn = Box<dyn Fn() -> Action + Send>;
type MatchFn<E> = Box<dyn Fn(&E) -> bool + Send>;
type EventFn<E> = Box<dyn Fn(bool, &E) -> Action + Send>;

struct Interpreter<E> {
    poll: Option<PollFn>,
    is_match: Option<MatchFn<E>>,
    event_check: Option<EventFn<E>>,
}

/// Events paired with a "already handled elsewhere" flag.
pub type CheckedEvent<E> = (bool, E);

/// Interpreter registry and per-tick event fold, generic over the
/// windowing layer's event type.
pub struct InputSystem<E> {
    interpreters: FxHashMap<UniqueId, Interpreter<E>>,
    interpreter_names: FxHashMap<String, UniqueId>,
    bindings: FxHashMap<ActionId, SmallVec<[UniqueId; 2]>>,
    bindable: FxHashMap<ActionId, bool>,
    previous: ActionSet,
}

impl<E> Default for InputSystem<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> InputSystem<E> {
    pub fn new() -> Self {
        InputSystem {
            interpreters: FxHashMap::default(),
            interpreter_names: FxHashMap::default(),
            bindings: FxHashMap::default(),
            bindable: FxHashMap::default(),
            previous: ActionSet::default(),
        }
    }

    /// Register an action. Non-rebindable actions only accept their default
    /// binding.
    pub fn create_action(&mut self, action: ActionId, rebindable: bool) {
        self.bindable.insert(action, rebindable);
        self.bindings.entry(action).or_default();
    }

    /// Register an action with a default interpreter, which binds even when
    /// the action is not rebindable.
    pub fn create_action_with_default(
        &mut self,
        action: ActionId,
        rebindable: bool,
        default_binding: &str,
    ) -> bool {
        self.bindable.insert(action, rebindable);
        let Some(&interpreter) = self.interpreter_names.get(default_binding) else {
            log::error!("unknown default interpreter {default_binding:?}");
            self.bindings.entry(action).or_default();
            return false;
        };
        self.bindings.entry(action).or_default().push(interpreter);
        true
    }

    /// Register a poll interpreter, called once per tick.
    pub fn add_interpreter(&mut self, name: &str, poll: impl Fn() -> Action + Send + 'static) {
        self.insert_interpreter(
            name,
            Interpreter {
                poll: Some(Box::new(poll)),
                is_match: None,
                event_check: None,
            },
        );
    }

    /// Register an event interpreter. `is_match` filters the event stream;
    /// `event_check` turns a claimed event into an action contribution.
    pub fn add_event_interpreter(
        &mut self,
        name: &str,
        is_match: impl Fn(&E) -> bool + Send + 'static,
        event_check: impl Fn(bool, &E) -> Action + Send + 'static,
    ) {
        self.insert_interpreter(
            name,
            Interpreter {
                poll: None,
                is_match: Some(Box::new(is_match)),
                event_check: Some(Box::new(event_check)),
            },
        );
    }

    /// Event interpreter that also polls device state between events.
    pub fn add_event_interpreter_with_poll(
        &mut self,
        name: &str,
        is_match: impl Fn(&E) -> bool + Send + 'static,
        event_check: impl Fn(bool, &E) -> Action + Send + 'static,
        poll: impl Fn() -> Action + Send + 'static,
    ) {
        self.insert_interpreter(
            name,
            Interpreter {
                poll: Some(Box::new(poll)),
                is_match: Some(Box::new(is_match)),
                event_check: Some(Box::new(event_check)),
            },
        );
    }

    fn insert_interpreter(&mut self, name: &str, interpreter: Interpreter<E>) {
        let id = UniqueId::new();
        self.interpreter_names.insert(name.to_owned(), id);
        self.interpreters.insert(id, interpreter);
    }

    /// Bind `action` to the named interpreter. Rejected for unknown
    /// actions, unknown interpreters and non-rebindable actions.
    pub fn bind(&mut self, action: ActionId, interpreter: &str) -> bool {
        match self.bindable.get(&action).copied() {
            None | Some(false) => return false,
            Some(true) => {}
        }
        let Some(&id) = self.interpreter_names.get(interpreter) else {
            return false;
        };
        let bound = self.bindings.entry(action).or_default();
        if !bound.contains(&id) {
            bound.push(id);
        }
        true
    }

    /// Remove one named binding from `action`.
    pub fn unbind(&mut self, action: ActionId, interpreter: &str) {
        let Some(&id) = self.interpreter_names.get(interpreter) else {
            return;
        };
        if let Some(bound) = self.bindings.get_mut(&action) {
            bound.retain(|b| *b != id);
        }
    }

    /// Remove every binding from `action`.
    pub fn unbind_all(&mut self, action: ActionId) {
        if let Some(bound) = self.bindings.get_mut(&action) {
            bound.clear();
        }
    }

    /// Fold this tick's events into a fresh action set and make it
    /// current.
    pub fn generate_state(&mut self, events: &[CheckedEvent<E>]) {
        let mut set = ActionSet::default();
        for (&action_id, bound) in &self.bindings {
            let mut aggregate = Action::new(action_id);
            for interpreter_id in bound {
                let Some(interpreter) = self.interpreters.get(interpreter_id) else {
                    continue;
                };
                if let (Some(is_match), Some(event_check)) =
                    (&interpreter.is_match, &interpreter.event_check)
                {
                    for (handled, event) in events {
                        if is_match(event) {
                            aggregate.merge(&event_check(*handled, event));
                        }
                    }
                }
                if let Some(poll) = &interpreter.poll {
                    aggregate.merge(&poll());
                }
            }
            aggregate.id = action_id;
            set.insert(action_id, aggregate);
        }
        self.previous = set;
    }

    /// The action set produced by the last [`InputSystem::generate_state`].
    pub fn input_state(&self) -> &ActionSet {
        &self.previous
    }
}

/// Window for a second press to count as a double tap.
pub const DOUBLE_TAP_WINDOW: TimeDuration = TimeDuration::from_millis(300);
/// How long a press must last to count as held.
pub const HOLD_THRESHOLD: TimeDuration = TimeDuration::from_millis(500);

/// Tracks presses, double taps and holds for one action across ticks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionState {
    down: bool,
    just_pressed: bool,
    double_tapped: bool,
    press_start: TimePoint,
    previous_press: Option<TimePoint>,
}

impl ActionState {
    /// Feed this tick's action and time.
    pub fn update(&mut self, action: &Action, time: TimePoint) {
        let was_down = self.down;
        self.down = action.active;
        self.just_pressed = self.down && !was_down;
        if self.just_pressed {
            self.double_tapped = self
                .previous_press
                .map(|previous| time - previous <= DOUBLE_TAP_WINDOW)
                .unwrap_or(false);
            self.previous_press = Some(time);
            self.press_start = time;
        } else if !self.down {
            self.double_tapped = false;
        }
    }

    /// True only on the tick the press started.
    pub fn pressed(&self) -> bool {
        self.just_pressed
    }

    pub fn down(&self) -> bool {
        self.down
    }

    pub fn double_tap(&self) -> bool {
        self.double_tapped
    }

    /// True once the press has lasted [`HOLD_THRESHOLD`].
    pub fn held(&self, time: TimePoint) -> bool {
        self.down && time - self.press_start >= HOLD_THRESHOLD
    }

    pub fn hold_start_time(&self) -> TimePoint {
        self.press_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy)]
    enum TestEvent {
        KeyDown(char),
    }

    fn key_interpreter(system: &mut InputSystem<TestEvent>, name: &str, key: char) {
        let id = UniqueId::new();
        system.add_event_interpreter(
            name,
            move |TestEvent::KeyDown(k)| *k == key,
            move |_, _| Action {
                id,
                active: true,
                x_axis: 100,
                y_axis: 0,
            },
        );
    }

    #[test]
    fn merge_takes_max_of_axes() {
        let id = UniqueId::new();
        let mut a = Action {
            id,
            active: true,
            x_axis: 100,
            y_axis: 0,
        };
        let b = Action {
            id,
            active: true,
            x_axis: 0,
            y_axis: 100,
        };
        a.merge(&b);
        // opposing pushes both saturate, they do not cancel
        assert!(a.active);
        assert_eq!((a.x_axis, a.y_axis), (100, 100));
    }

    #[test]
    fn merge_adopts_the_active_side() {
        let id = UniqueId::new();
        let mut a = Action::new(id);
        let b = Action {
            id,
            active: true,
            x_axis: 640,
            y_axis: 480,
        };
        a.merge(&b);
        // a single active contribution is adopted unclamped (mouse coords)
        assert_eq!((a.x_axis, a.y_axis), (640, 480));

        let mut c = Action::new(id);
        c.merge(&Action::new(id));
        assert!(!c.active);
    }

    #[test]
    fn generate_state_folds_events() {
        let mut system: InputSystem<TestEvent> = InputSystem::new();
        key_interpreter(&mut system, "key_w", 'w');
        let jump = UniqueId::new();
        system.create_action(jump, true);
        assert!(system.bind(jump, "key_w"));

        system.generate_state(&[(false, TestEvent::KeyDown('w'))]);
        assert!(system.input_state()[&jump].active);

        system.generate_state(&[]);
        assert!(!system.input_state()[&jump].active);
    }

    #[test]
    fn generate_state_is_idempotent() {
        let mut system: InputSystem<TestEvent> = InputSystem::new();
        key_interpreter(&mut system, "key_w", 'w');
        let jump = UniqueId::new();
        system.create_action(jump, true);
        system.bind(jump, "key_w");

        let events = [(false, TestEvent::KeyDown('w'))];
        system.generate_state(&events);
        let first = system.input_state().clone();
        system.generate_state(&events);
        assert_eq!(&first, system.input_state());
    }

    #[test]
    fn non_rebindable_actions_reject_bind() {
        let mut system: InputSystem<TestEvent> = InputSystem::new();
        key_interpreter(&mut system, "key_w", 'w');
        let locked = UniqueId::new();
        system.create_action(locked, false);
        assert!(!system.bind(locked, "key_w"));
        // unknown action and unknown interpreter are rejected too
        assert!(!system.bind(UniqueId::new(), "key_w"));
        let open = UniqueId::new();
        system.create_action(open, true);
        assert!(!system.bind(open, "key_q"));
    }

    #[test]
    fn unbind_stops_contributions() {
        let mut system: InputSystem<TestEvent> = InputSystem::new();
        key_interpreter(&mut system, "key_w", 'w');
        key_interpreter(&mut system, "key_space", ' ');
        let jump = UniqueId::new();
        system.create_action(jump, true);
        system.bind(jump, "key_w");
        system.bind(jump, "key_space");

        system.unbind(jump, "key_w");
        system.generate_state(&[(false, TestEvent::KeyDown('w'))]);
        assert!(!system.input_state()[&jump].active);
        system.generate_state(&[(false, TestEvent::KeyDown(' '))]);
        assert!(system.input_state()[&jump].active);
    }

    #[test]
    fn action_state_tracks_presses() {
        let id = UniqueId::new();
        let mut state = ActionState::default();
        let on = Action {
            id,
            active: true,
            x_axis: 0,
            y_axis: 0,
        };
        let off = Action::new(id);
        let ms = TimePoint::from_millis;

        state.update(&on, ms(0));
        assert!(state.pressed());
        assert!(state.down());
        assert!(!state.double_tap());

        state.update(&on, ms(30));
        assert!(!state.pressed());
        assert!(state.down());
        assert!(state.held(ms(600)));

        state.update(&off, ms(60));
        state.update(&on, ms(100));
        assert!(state.double_tap());

        state.update(&off, ms(130));
        state.update(&on, ms(900));
        assert!(!state.double_tap());
    }
}
