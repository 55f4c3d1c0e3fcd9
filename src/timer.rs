use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error};

use crate::error::{Error, TimerError};
use crate::id::ItemId;
use crate::Clock;

/// Once the heap holds more than this many entries, cancelled ones are swept
/// out whenever they outnumber the armed timers.
const COMPACT_THRESHOLD: usize = 64;

/// Deadlines that would overflow `Instant` are pinned this far out instead.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// One armed timer. An item has at most one live handle at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    item: ItemId,
    seq: u64,
}

impl TimerHandle {
    pub fn item(self) -> ItemId {
        self.item
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.item, self.seq)
    }
}

struct Deadline {
    at: Instant,
    handle: TimerHandle,
}
impl Ord for Deadline {
    // Larger element is the one that fires first, so that a max-heap pops the earliest deadline
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .cmp(&other.at)
            .then_with(|| self.handle.seq.cmp(&other.handle.seq))
            .reverse()
    }
}
impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Deadline) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for Deadline {
    fn eq(&self, other: &Deadline) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Deadline {}

/// Deadline index behind the scheduler thread.
///
/// Cancelling only forgets the handle in `armed`; the heap entry stays until it
/// surfaces or a compaction sweeps it.
#[derive(Default)]
pub(crate) struct TimerQueue {
    next_seq: u64,
    armed: HashMap<ItemId, u64>,
    index: BinaryHeap<Deadline>,
}

impl TimerQueue {
    /// Arms a timer for `item`, replacing any timer it already had.
    pub fn arm(&mut self, item: ItemId, at: Instant) -> TimerHandle {
        self.next_seq += 1;
        let handle = TimerHandle {
            item,
            seq: self.next_seq,
        };
        self.armed.insert(item, handle.seq);
        self.index.push(Deadline { at, handle });
        self.compact();
        handle
    }

    /// Returns false if `handle` already fired, was cancelled, or was replaced.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.armed.entry(handle.item) {
            Entry::Occupied(occ) if *occ.get() == handle.seq => {
                occ.remove();
                self.compact();
                true
            }
            _ => false,
        }
    }

    pub fn rearm(&mut self, handle: TimerHandle, at: Instant) -> Result<TimerHandle, TimerError> {
        if !self.cancel(handle) {
            return Err(TimerError::NotArmed(handle));
        }
        Ok(self.arm(handle.item, at))
    }

    /// Earliest live deadline. Cancelled entries found on top are discarded.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(top) = self.index.peek() {
            if self.is_live(&top.handle) {
                return Some(top.at);
            }
            self.index.pop();
        }
        None
    }

    /// Takes every live timer due at `now`, earliest first. Once taken, a
    /// timer can no longer be cancelled.
    pub fn expire(&mut self, now: Instant) -> Vec<TimerHandle> {
        let mut due = Vec::new();
        while let Some(at) = self.next_deadline() {
            if at > now {
                break;
            }
            if let Some(Deadline { handle, .. }) = self.index.pop() {
                self.armed.remove(&handle.item);
                due.push(handle);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_live(&self, handle: &TimerHandle) -> bool {
        self.armed.get(&handle.item) == Some(&handle.seq)
    }

    fn compact(&mut self) {
        if self.index.len() > COMPACT_THRESHOLD && self.index.len() > 2 * self.armed.len() {
            let armed = &self.armed;
            self.index
                .retain(|d| armed.get(&d.handle.item) == Some(&d.handle.seq));
        }
    }
}

struct State {
    queue: TimerQueue,
    shutdown: bool,
}

struct Shared<C> {
    state: Mutex<State>,
    wakeup: Condvar,
    clock: C,
}

impl<C> Shared<C> {
    /// Makes the timer thread re-read the clock.
    fn poke(&self) {
        // Taken so the notify cannot slip between the thread's check and its wait.
        let _state = self.state.lock();
        self.wakeup.notify_all();
    }
}

/// Owns the background thread that fires timers out of a [`TimerQueue`].
///
/// The thread sleeps until the earliest deadline, takes every due timer under
/// the lock, then hands them to the fire hook with the lock released.
pub(crate) struct Scheduler<C: Clock> {
    shared: Arc<Shared<C>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(clock: C) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: TimerQueue::default(),
                shutdown: false,
            }),
            wakeup: Condvar::new(),
            clock,
        });
        let weak = Arc::downgrade(&shared);
        shared.clock.on_advance(Box::new(move || match weak.upgrade() {
            Some(shared) => {
                shared.poke();
                true
            }
            None => false,
        }));
        Scheduler {
            shared,
            thread: Mutex::new(None),
        }
    }

    /// Spawns the timer thread. `on_fire` runs on that thread, once per fired timer.
    pub fn start<F>(&self, name: &str, on_fire: F) -> Result<(), Error>
    where
        F: Fn(TimerHandle) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let thread = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || run(&shared, on_fire))
            .map_err(|source| Error::Spawn {
                name: name.to_owned(),
                source,
            })?;
        *self.thread.lock() = Some(thread);
        Ok(())
    }

    pub fn now(&self) -> Instant {
        self.shared.clock.now()
    }

    fn deadline(&self, delay: Duration) -> Instant {
        let now = self.shared.clock.now();
        now.checked_add(delay).unwrap_or_else(|| now.checked_add(FAR_FUTURE).unwrap_or(now))
    }

    pub fn arm(&self, item: ItemId, delay: Duration) -> (TimerHandle, Instant) {
        let mut state = self.shared.state.lock();
        let at = self.deadline(delay);
        let wake = state.queue.next_deadline().is_none_or(|next| at < next);
        let handle = state.queue.arm(item, at);
        if wake {
            self.shared.wakeup.notify_one();
        }
        (handle, at)
    }

    pub fn cancel(&self, handle: TimerHandle) -> bool {
        self.shared.state.lock().queue.cancel(handle)
    }

    pub fn rearm(
        &self,
        handle: TimerHandle,
        delay: Duration,
    ) -> Result<(TimerHandle, Instant), TimerError> {
        let mut state = self.shared.state.lock();
        let at = self.deadline(delay);
        let wake = state.queue.next_deadline().is_none_or(|next| at < next);
        let handle = state.queue.rearm(handle, at)?;
        if wake {
            self.shared.wakeup.notify_one();
        }
        Ok((handle, at))
    }

    pub fn is_armed(&self, handle: TimerHandle) -> bool {
        self.shared.state.lock().queue.is_live(&handle)
    }

    /// Number of armed timers.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.len()
    }
}

impl<C: Clock> Drop for Scheduler<C> {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.wakeup.notify_all();
        if let Some(thread) = self.thread.get_mut().take() {
            // Dropped from inside a fire hook; the thread exits on its own.
            if thread.thread().id() == thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                error!("timer thread panicked");
            }
        }
    }
}

fn run<C: Clock, F: Fn(TimerHandle)>(shared: &Shared<C>, on_fire: F) {
    debug!("timer thread started");
    let mut state = shared.state.lock();
    while !state.shutdown {
        let now = shared.clock.now();
        let due = state.queue.expire(now);
        if !due.is_empty() {
            MutexGuard::unlocked(&mut state, || {
                for handle in due {
                    on_fire(handle);
                }
            });
            continue;
        }
        match state.queue.next_deadline() {
            Some(at) => {
                shared
                    .wakeup
                    .wait_for(&mut state, at.saturating_duration_since(now));
            }
            None => shared.wakeup.wait(&mut state),
        }
    }
    debug!("timer thread stopped");
}
