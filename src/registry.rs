use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, trace};

use crate::config::{Builder, Config};
use crate::error::Error;
use crate::id::{IdAllocator, ItemId};
use crate::timer::{Scheduler, TimerHandle};
use crate::{Clock, SystemClock};

pub(crate) type ExpireFn<T> = Box<dyn Fn(ItemId, T) + Send + Sync>;

struct Item<T> {
    value: T,
    timer: TimerHandle,
    deadline: Instant,
}

struct Inner<T, C: Clock> {
    items: Mutex<HashMap<ItemId, Item<T>>>,
    ids: IdAllocator,
    timers: Scheduler<C>,
    on_expire: Option<ExpireFn<T>>,
    min_delay: Duration,
}

/// Registry of values that expire after a time-to-live.
///
/// Every item is either pending or retired. An item retires exactly once,
/// through [`remove`](Ttl::remove) or by expiring, and only an expiring item
/// reaches the callback. The race between the two is settled by the scheduler
/// thread taking the item's timer: after that, `remove` and `reset` report the
/// item as gone and the callback is delivered.
///
/// Callbacks run on the scheduler thread with no registry lock held, so they
/// may call back into the registry (see [`Ttl::downgrade`]). Dropping the last
/// handle stops the scheduler and discards pending items without callbacks.
pub struct Ttl<T, C: Clock = SystemClock> {
    inner: Arc<Inner<T, C>>,
}

/// Non-owning handle to a [`Ttl`], for callbacks that need to reach the registry
/// that invokes them.
pub struct WeakTtl<T, C: Clock = SystemClock> {
    inner: Weak<Inner<T, C>>,
}

impl<T: Send + 'static> Ttl<T> {
    /// Creates a registry that passes expired items to `on_expire`.
    pub fn new<F>(on_expire: F) -> Result<Self, Error>
    where
        F: Fn(ItemId, T) + Send + Sync + 'static,
    {
        Self::builder().on_expire(on_expire).build()
    }

    pub fn builder() -> Builder<T> {
        Builder::new()
    }
}

impl<T: Send + 'static, C: Clock> Ttl<T, C> {
    pub(crate) fn start(
        config: Config,
        clock: C,
        on_expire: Option<ExpireFn<T>>,
    ) -> Result<Self, Error> {
        let inner = Arc::new(Inner {
            items: Mutex::new(HashMap::new()),
            ids: IdAllocator::default(),
            timers: Scheduler::new(clock),
            on_expire,
            min_delay: config.min_delay,
        });
        let weak = Arc::downgrade(&inner);
        inner.timers.start(&config.thread_name, move |timer| {
            if let Some(inner) = weak.upgrade() {
                inner.expire(timer);
            }
        })?;
        debug!(thread = %config.thread_name, min_delay = ?config.min_delay, "ttl registry started");
        Ok(Ttl { inner })
    }

    /// Registers `value` to expire after `ttl` and returns its id.
    pub fn add(&self, value: T, ttl: Duration) -> ItemId {
        let id = self.inner.ids.next();
        let delay = self.inner.effective(ttl);
        {
            let mut items = self.inner.items.lock();
            // Armed under the item lock so the fire cannot reach `expire` first.
            let (timer, deadline) = self.inner.timers.arm(id, delay);
            items.insert(
                id,
                Item {
                    value,
                    timer,
                    deadline,
                },
            );
        }
        trace!(%id, ?delay, "item added");
        id
    }

    /// Removes a pending item, returning whether it was removed. The callback
    /// is not invoked for a removed item.
    pub fn remove(&self, id: ItemId) -> bool {
        self.take(id).is_some()
    }

    /// Like [`remove`](Ttl::remove), but hands back the value.
    pub fn take(&self, id: ItemId) -> Option<T> {
        let item = {
            let mut items = self.inner.items.lock();
            let timer = items.get(&id)?.timer;
            if !self.inner.timers.cancel(timer) {
                debug!(%id, "remove lost to expiration");
                return None;
            }
            items.remove(&id)?
        };
        trace!(%id, "item removed");
        Some(item.value)
    }

    /// Restarts a pending item's countdown at `ttl`. Returns false if the item
    /// was removed or has already expired.
    pub fn reset(&self, id: ItemId, ttl: Duration) -> bool {
        let delay = self.inner.effective(ttl);
        let mut items = self.inner.items.lock();
        let Some(item) = items.get_mut(&id) else {
            return false;
        };
        match self.inner.timers.rearm(item.timer, delay) {
            Ok((timer, deadline)) => {
                item.timer = timer;
                item.deadline = deadline;
                drop(items);
                trace!(%id, ?delay, "item reset");
                true
            }
            Err(err) => {
                drop(items);
                debug!(%id, %err, "reset lost to expiration");
                false
            }
        }
    }

    /// Whether `id` is still pending.
    pub fn contains(&self, id: ItemId) -> bool {
        let items = self.inner.items.lock();
        items
            .get(&id)
            .is_some_and(|item| self.inner.timers.is_armed(item.timer))
    }

    /// Time left until `id` expires, or `None` if it is no longer pending.
    pub fn remaining(&self, id: ItemId) -> Option<Duration> {
        let items = self.inner.items.lock();
        let item = items.get(&id)?;
        if !self.inner.timers.is_armed(item.timer) {
            return None;
        }
        Some(item.deadline.saturating_duration_since(self.inner.timers.now()))
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.inner.timers.pending()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn downgrade(&self) -> WeakTtl<T, C> {
        WeakTtl {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl<T, C: Clock> Inner<T, C> {
    fn effective(&self, ttl: Duration) -> Duration {
        ttl.max(self.min_delay)
    }

    /// Fire hook, run on the scheduler thread for every timer it takes.
    fn expire(&self, timer: TimerHandle) {
        let id = timer.item();
        let value = {
            let mut items = self.items.lock();
            match items.entry(id) {
                Entry::Occupied(occ) if occ.get().timer == timer => occ.remove().value,
                _ => return,
            }
        };
        debug!(%id, "item expired");
        let Some(on_expire) = &self.on_expire else {
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(|| on_expire(id, value))).is_err() {
            error!(%id, "expiration callback panicked");
        }
    }
}

impl<T, C: Clock> Clone for Ttl<T, C> {
    fn clone(&self) -> Self {
        Ttl {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, C: Clock> fmt::Debug for Ttl<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Ttl")
            .field("pending", &self.inner.timers.pending())
            .field("min_delay", &self.inner.min_delay)
            .finish()
    }
}

impl<T, C: Clock> WeakTtl<T, C> {
    pub fn upgrade(&self) -> Option<Ttl<T, C>> {
        self.inner.upgrade().map(|inner| Ttl { inner })
    }
}

impl<T, C: Clock> Clone for WeakTtl<T, C> {
    fn clone(&self) -> Self {
        WeakTtl {
            inner: Weak::clone(&self.inner),
        }
    }
}
