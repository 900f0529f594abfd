//! Cooperative work-stealing thread pool.
//!
//! Fixed worker set, one deque per worker behind its own mutex. A worker
//! with an empty queue steals the front half of a rotating victim's queue.
//! [`JobHandle::get`] does not block the OS thread: it repeatedly runs
//! stolen tasks until its own result is complete, which keeps a pool task
//! that waits on another pool task from deadlocking, at the cost of stack
//! growth when jobs spawn jobs recursively.

use std::cell::Cell;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};

type Task = Box<dyn FnOnce() + Send + 'static>;

thread_local! {
    /// `(pool tag, worker index)` of the pool this thread works for.
    static WORKER: Cell<(usize, usize)> = const { Cell::new((usize::MAX, usize::MAX)) };
    /// Rotating victim index for stealing.
    static STEAL_INDEX: Cell<usize> = const { Cell::new(0) };
}

static POOL_TAG: AtomicUsize = AtomicUsize::new(0);

struct PoolShared {
    tag: usize,
    queues: Vec<Mutex<VecDeque<Task>>>,
    work_count: AtomicUsize,
    stop: AtomicBool,
    idle_mutex: Mutex<()>,
    idle_condition: Condvar,
    round_robin: AtomicUsize,
}

impl PoolShared {
    /// Try to run one queued task. Can return without doing any work.
    fn help(&self) {
        let task = {
            let index = STEAL_INDEX.with(|i| {
                let v = i.get();
                i.set(v.wrapping_add(1));
                v
            });
            let mut queue = self.queues[index % self.queues.len()].lock();
            match queue.pop_front() {
                Some(task) => task,
                None => return,
            }
        };
        self.work_count.fetch_sub(1, Ordering::Relaxed);
        task();
    }

    fn submit(&self, task: Task) {
        let index = {
            let (tag, worker) = WORKER.with(Cell::get);
            if tag == self.tag {
                worker
            } else {
                self.round_robin.fetch_add(1, Ordering::Relaxed) % self.queues.len()
            }
        };
        self.queues[index].lock().push_back(task);
        self.work_count.fetch_add(1, Ordering::Release);
        self.idle_condition.notify_one();
    }
}

fn worker_loop(shared: &PoolShared, id: usize) {
    WORKER.with(|w| w.set((shared.tag, id)));

    while !shared.stop.load(Ordering::SeqCst) {
        if shared.work_count.load(Ordering::Acquire) == 0 {
            let mut guard = shared.idle_mutex.lock();
            // timed wait covers the submit-before-wait race
            shared
                .idle_condition
                .wait_for(&mut guard, Duration::from_millis(10));
            continue;
        }

        let mut task = shared.queues[id].lock().pop_front();

        if task.is_none() {
            // nothing of our own, steal half of a victim's queue
            let victim = STEAL_INDEX.with(|i| {
                let mut v = i.get();
                if v % shared.queues.len() == id {
                    v += 1;
                }
                i.set(v.wrapping_add(1));
                v % shared.queues.len()
            });
            if victim == id {
                continue;
            }

            // lock in index order to keep lock acquisition consistent
            let (first, second) = if id < victim { (id, victim) } else { (victim, id) };
            let mut first_guard = shared.queues[first].lock();
            let mut second_guard = shared.queues[second].lock();
            let (ours, theirs) = if id < victim {
                (&mut *first_guard, &mut *second_guard)
            } else {
                (&mut *second_guard, &mut *first_guard)
            };

            let count = theirs.len();
            if count == 0 {
                continue;
            }
            let steal_count = (count + 1) / 2;
            ours.extend(theirs.drain(..steal_count));
            task = ours.pop_front();
        }

        if let Some(task) = task {
            self_decrement(shared);
            task();
        }
    }
}

fn self_decrement(shared: &PoolShared) {
    shared.work_count.fetch_sub(1, Ordering::Release);
}

struct JobState<R> {
    value: Mutex<Option<std::thread::Result<R>>>,
    complete: AtomicBool,
}

/// Handle to a submitted job's eventual result.
pub struct JobHandle<R> {
    state: Arc<JobState<R>>,
    pool: Option<Arc<PoolShared>>,
}

impl<R> JobHandle<R> {
    pub fn ready(&self) -> bool {
        self.state.complete.load(Ordering::Acquire)
    }

    /// Wait for the result by helping the pool run tasks. Panics raised by
    /// the job are resumed here.
    pub fn get(self) -> R {
        while !self.state.complete.load(Ordering::Acquire) {
            match &self.pool {
                Some(pool) => pool.help(),
                None => std::hint::spin_loop(),
            }
        }
        let result = self
            .state
            .value
            .lock()
            .take()
            .expect("job completed without a result");
        match result {
            Ok(value) => value,
            Err(payload) => resume_unwind(payload),
        }
    }
}

/// Fixed-size work-stealing pool. Dropping the pool stops the workers and
/// joins them; still-queued work is discarded.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    threads: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Pool sized to the machine.
    pub fn new() -> Self {
        let count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_threads(count)
    }

    /// Pool with an explicit worker count (minimum one).
    pub fn with_threads(count: usize) -> Self {
        let count = count.max(1);
        let shared = Arc::new(PoolShared {
            tag: POOL_TAG.fetch_add(1, Ordering::Relaxed),
            queues: (0..count).map(|_| Mutex::new(VecDeque::new())).collect(),
            work_count: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
            idle_mutex: Mutex::new(()),
            idle_condition: Condvar::new(),
            round_robin: AtomicUsize::new(0),
        });

        let threads = (0..count)
            .map(|id| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("hades-worker-{id}"))
                    .spawn(move || worker_loop(&shared, id))
                    .expect("failed to spawn pool worker")
            })
            .collect();

        ThreadPool { shared, threads }
    }

    pub fn thread_count(&self) -> usize {
        self.shared.queues.len()
    }

    /// Submit `func` and return a handle to its result.
    pub fn spawn<R, F>(&self, func: F) -> JobHandle<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let state = Arc::new(JobState {
            value: Mutex::new(None),
            complete: AtomicBool::new(false),
        });
        let weak = Arc::downgrade(&state);
        self.shared.submit(Box::new(move || {
            // an abandoned handle lets the task be skipped entirely
            let Some(state) = weak.upgrade() else { return };
            let result = catch_unwind(AssertUnwindSafe(func));
            *state.value.lock() = Some(result);
            state.complete.store(true, Ordering::Release);
        }));
        JobHandle {
            state,
            pool: Some(Arc::clone(&self.shared)),
        }
    }

    /// Submit `func` with no handle. A panic is caught and logged rather
    /// than tearing down the worker.
    pub fn spawn_detached<F>(&self, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.submit(Box::new(move || {
            if catch_unwind(AssertUnwindSafe(func)).is_err() {
                log::error!("detached pool task panicked");
            }
        }));
    }

    /// Opportunistically run one queued task on the calling thread.
    pub fn help(&self) {
        self.shared.help();
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.idle_condition.notify_all();
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

static SHARED_POOL: RwLock<Option<Arc<ThreadPool>>> = RwLock::new(None);

/// Install or clear the shared process pool.
pub fn set_shared_pool(pool: Option<Arc<ThreadPool>>) {
    *SHARED_POOL.write() = pool;
}

/// The shared process pool, if installed.
pub fn shared_pool() -> Option<Arc<ThreadPool>> {
    SHARED_POOL.read().clone()
}

/// Submit to the shared pool, or run synchronously when none is installed.
pub fn spawn<R, F>(func: F) -> JobHandle<R>
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    match shared_pool() {
        Some(pool) => pool.spawn(func),
        None => JobHandle {
            state: Arc::new(JobState {
                value: Mutex::new(Some(catch_unwind(AssertUnwindSafe(func)))),
                complete: AtomicBool::new(true),
            }),
            pool: None,
        },
    }
}

/// Detached submit to the shared pool, or run synchronously.
pub fn spawn_detached<F>(func: F)
where
    F: FnOnce() + Send + 'static,
{
    match shared_pool() {
        Some(pool) => pool.spawn_detached(func),
        None => func(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_all_complete_exactly_once() {
        let pool = ThreadPool::with_threads(4);
        let counter = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..1000)
            .map(|_| {
                let counter = Arc::clone(&counter);
                pool.spawn(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                })
            })
            .collect();
        for handle in handles {
            handle.get();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 1000);
    }

    #[test]
    fn results_come_back() {
        let pool = ThreadPool::with_threads(2);
        let sum: i64 = (0i64..100)
            .map(|i| pool.spawn(move || i * 2))
            .map(JobHandle::get)
            .sum();
        assert_eq!(sum, 9900);
    }

    #[test]
    fn nested_jobs_make_progress() {
        // a pool of one worker still completes a job that waits on a job
        let pool = ThreadPool::with_threads(1);
        let pool = Arc::new(pool);
        let inner_pool = Arc::clone(&pool);
        let outer = pool.spawn(move || {
            let inner = inner_pool.spawn(|| 21);
            inner.get() * 2
        });
        assert_eq!(outer.get(), 42);
    }

    #[test]
    fn panic_is_resumed_on_get() {
        let pool = ThreadPool::with_threads(2);
        let handle = pool.spawn(|| panic!("boom"));
        let result = catch_unwind(AssertUnwindSafe(move || handle.get()));
        assert!(result.is_err());
    }

    #[test]
    fn serial_fallback_without_shared_pool() {
        set_shared_pool(None);
        let handle = spawn(|| 7);
        assert!(handle.ready());
        assert_eq!(handle.get(), 7);
    }
}
