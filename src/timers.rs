//! Timer wheel.
//!
//! Named callbacks fired once their target time passes, with optional
//! repeat and pause. Creation and removal stage through channels and merge
//! during [`TimerSystem::update`], so timer callbacks can freely create and
//! drop timers without re-entering the wheel's lock.

use std::sync::atomic::{AtomicI32, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::time::{TimeDuration, TimePoint};

pub type TimerId = i32;

/// Never returned by [`TimerSystem::create_timer`].
pub const INVALID_TIMER: TimerId = 0;

/// A timer callback; returning false removes the timer.
pub type TimerFn = Box<dyn FnMut() -> bool + Send>;

struct TimeEvent {
    function: TimerFn,
    duration: TimeDuration,
    /// Time left to the target when the timer was paused.
    remaining_on_pause: TimeDuration,
    target: TimePoint,
    repeating: bool,
    paused: bool,
}

/// Thread safe timer wheel.
pub struct TimerSystem {
    time: Mutex<TimePoint>,
    timers: Mutex<FxHashMap<TimerId, TimeEvent>>,
    add_send: Sender<(TimerId, TimeEvent)>,
    add_recv: Receiver<(TimerId, TimeEvent)>,
    remove_send: Sender<TimerId>,
    remove_recv: Receiver<TimerId>,
    next_id: AtomicI32,
}

impl Default for TimerSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerSystem {
    pub fn new() -> Self {
        let (add_send, add_recv) = unbounded();
        let (remove_send, remove_recv) = unbounded();
        TimerSystem {
            time: Mutex::new(TimePoint::ZERO),
            timers: Mutex::new(FxHashMap::default()),
            add_send,
            add_recv,
            remove_send,
            remove_recv,
            next_id: AtomicI32::new(INVALID_TIMER),
        }
    }

    /// Register a callback to fire after `duration`. The timer becomes
    /// active at the next [`TimerSystem::update`].
    pub fn create_timer(
        &self,
        duration: TimeDuration,
        repeating: bool,
        function: impl FnMut() -> bool + Send + 'static,
    ) -> TimerId {
        let now = *self.time.lock();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let event = TimeEvent {
            function: Box::new(function),
            duration,
            remaining_on_pause: TimeDuration::ZERO,
            target: now + duration,
            repeating,
            paused: false,
        };
        let _ = self.add_send.send((id, event));
        id
    }

    /// Stage a removal; merged at the next update.
    pub fn drop_timer(&self, id: TimerId) {
        let _ = self.remove_send.send(id);
    }

    /// Remove every timer, active and staged.
    pub fn drop_all(&self) {
        self.timers.lock().clear();
        while self.add_recv.try_recv().is_ok() {}
    }

    /// Advance the wheel and fire everything due. Repeating timers whose
    /// callback returns true re-arm at `now + duration`; all other fired
    /// timers are removed.
    pub fn update(&self, dt: TimeDuration) {
        let now = {
            let mut time = self.time.lock();
            *time += dt;
            *time
        };

        let mut expired = Vec::new();
        let mut timers = self.timers.lock();
        for (&id, event) in timers.iter_mut() {
            if event.paused || event.target > now {
                continue;
            }
            let keep = (event.function)();
            if keep && event.repeating {
                event.target = now + event.duration;
            } else {
                expired.push(id);
            }
        }

        for id in self.remove_recv.try_iter() {
            timers.remove(&id);
        }
        for id in expired {
            timers.remove(&id);
        }
        for (id, event) in self.add_recv.try_iter() {
            timers.insert(id, event);
        }
    }

    /// Pause a timer, keeping its remaining time. Pausing an already
    /// paused timer is a no-op.
    pub fn pause(&self, id: TimerId) {
        let now = *self.time.lock();
        let mut timers = self.timers.lock();
        if let Some(event) = timers.get_mut(&id) {
            if !event.paused {
                event.paused = true;
                event.remaining_on_pause = event.target - now;
            }
        }
    }

    /// Resume a paused timer with the time it had left.
    pub fn resume(&self, id: TimerId) {
        let now = *self.time.lock();
        let mut timers = self.timers.lock();
        if let Some(event) = timers.get_mut(&id) {
            if event.paused {
                event.paused = false;
                event.target = now + event.remaining_on_pause;
            }
        }
    }

    /// Unpause and re-arm a timer with its full duration.
    pub fn restart(&self, id: TimerId) {
        let now = *self.time.lock();
        let mut timers = self.timers.lock();
        if let Some(event) = timers.get_mut(&id) {
            event.paused = false;
            event.target = now + event.duration;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() -> bool + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move || {
            inner.fetch_add(1, Ordering::Relaxed);
            true
        })
    }

    fn ms(v: i64) -> TimeDuration {
        TimeDuration::from_millis(v)
    }

    #[test]
    fn one_shot_fires_once() {
        let timers = TimerSystem::new();
        let (count, f) = counter();
        let id = timers.create_timer(ms(100), false, f);
        assert_ne!(id, INVALID_TIMER);

        timers.update(ms(50)); // merges the staged add, not yet due
        assert_eq!(count.load(Ordering::Relaxed), 0);
        timers.update(ms(60));
        assert_eq!(count.load(Ordering::Relaxed), 1);
        timers.update(ms(200));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn repeating_rearms_until_false() {
        let timers = TimerSystem::new();
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        timers.create_timer(ms(10), true, move || {
            inner.fetch_add(1, Ordering::Relaxed) < 2
        });
        timers.update(ms(5));
        for _ in 0..10 {
            timers.update(ms(10));
        }
        // fired three times, removed after returning false
        assert_eq!(count.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn pause_keeps_remaining_time() {
        let timers = TimerSystem::new();
        let (count, f) = counter();
        let id = timers.create_timer(ms(100), false, f);
        timers.update(ms(40)); // 60 remaining
        timers.pause(id);
        // paused timers ignore the clock
        timers.update(ms(500));
        assert_eq!(count.load(Ordering::Relaxed), 0);
        // a second pause must not reset the remainder
        timers.pause(id);
        timers.resume(id);
        timers.update(ms(50));
        assert_eq!(count.load(Ordering::Relaxed), 0);
        timers.update(ms(20));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn drop_timer_is_staged() {
        let timers = TimerSystem::new();
        let (count, f) = counter();
        let id = timers.create_timer(ms(10), true, f);
        timers.update(ms(5));
        timers.drop_timer(id);
        timers.update(ms(10));
        timers.update(ms(10));
        // the drop merged before the timer could fire again
        assert!(count.load(Ordering::Relaxed) <= 1);
    }

    #[test]
    fn callbacks_can_create_timers() {
        let timers = Arc::new(TimerSystem::new());
        let (count, f) = counter();
        let inner = Arc::clone(&timers);
        let mut f = Some(f);
        timers.create_timer(ms(10), false, move || {
            let f = f.take().unwrap();
            inner.create_timer(ms(10), false, f);
            false
        });
        timers.update(ms(5));
        timers.update(ms(10));
        timers.update(ms(10));
        timers.update(ms(10));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn restart_rearms_full_duration() {
        let timers = TimerSystem::new();
        let (count, f) = counter();
        let id = timers.create_timer(ms(100), false, f);
        timers.update(ms(90));
        timers.restart(id);
        timers.update(ms(90));
        assert_eq!(count.load(Ordering::Relaxed), 0);
        timers.update(ms(20));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
