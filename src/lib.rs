//! Concurrency-safe containers for services that track short-lived items.
//!
//! [`Ttl`] holds values for a time-to-live and hands each one to an expiration
//! callback once its time is up, unless it was removed first. Deadlines can be
//! pushed back with [`Ttl::reset`] until the item fires.
//!
//! [`Fifo`] is a locked first-in-first-out queue that also supports removing
//! an element by value, which makes it a convenient place to park the
//! [`ItemId`]s a [`Ttl`] hands out.
//!
//! ```no_run
//! use std::time::Duration;
//! use ttlqueue::Ttl;
//!
//! let ttl = Ttl::new(|id, session: String| println!("{} expired ({})", session, id))?;
//! let id = ttl.add("alice".to_owned(), Duration::from_secs(30));
//! ttl.reset(id, Duration::from_secs(60));
//! # Ok::<(), ttlqueue::Error>(())
//! ```

use std::time::Instant;

mod config;
mod error;
#[cfg(test)]
mod fake_clock;
mod fifo;
mod id;
mod registry;
mod timer;

pub use config::{Builder, Config, DEFAULT_MIN_DELAY};
pub use error::Error;
pub use fifo::Fifo;
pub use id::ItemId;
pub use registry::{Ttl, WeakTtl};

/// Called when a [`Clock`] jumps forward. Returns false once the listener is gone.
pub type Wake = Box<dyn Fn() -> bool + Send + Sync>;

/// Time source used to compute deadlines.
pub trait Clock: Send + Sync + 'static {
    /// The current time.
    fn now(&self) -> Instant;

    /// Registers `wake` to run whenever time moves other than by real time
    /// passing. The scheduler uses it to re-check deadlines instead of sleeping
    /// out a stale gap. Clocks that follow real time can ignore it.
    fn on_advance(&self, wake: Wake) {
        drop(wake);
    }
}

/// The real monotonic clock, [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
