use std::time::Duration;

use crate::error::Error;
use crate::id::ItemId;
use crate::registry::{ExpireFn, Ttl};
use crate::{Clock, SystemClock};

/// Floor applied to requested time-to-live values unless configured otherwise.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(1);

/// Tunables for a [`Ttl`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Every time-to-live shorter than this is raised to it. With a zero floor a
    /// zero time-to-live fires on the scheduler's next pass.
    pub min_delay: Duration,
    /// Name given to the scheduler thread.
    pub thread_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            min_delay: DEFAULT_MIN_DELAY,
            thread_name: "ttl-timer".to_owned(),
        }
    }
}

/// Builds a [`Ttl`]. Obtained from [`Ttl::builder`].
pub struct Builder<T, C = SystemClock> {
    pub(crate) config: Config,
    pub(crate) clock: C,
    pub(crate) on_expire: Option<ExpireFn<T>>,
}

impl<T> Builder<T> {
    pub(crate) fn new() -> Self {
        Builder {
            config: Config::default(),
            clock: SystemClock,
            on_expire: None,
        }
    }
}

impl<T: Send + 'static, C: Clock> Builder<T, C> {
    /// Called with each item that expires. Without one, items still expire
    /// and leave the registry, they are just dropped.
    pub fn on_expire<F>(mut self, on_expire: F) -> Self
    where
        F: Fn(ItemId, T) + Send + Sync + 'static,
    {
        self.on_expire = Some(Box::new(on_expire));
        self
    }

    pub fn min_delay(mut self, min_delay: Duration) -> Self {
        self.config.min_delay = min_delay;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Replaces the clock deadlines are measured against.
    pub fn clock<C2: Clock>(self, clock: C2) -> Builder<T, C2> {
        Builder {
            config: self.config,
            clock,
            on_expire: self.on_expire,
        }
    }

    /// Starts the scheduler thread and returns the registry.
    pub fn build(self) -> Result<Ttl<T, C>, Error> {
        Ttl::start(self.config, self.clock, self.on_expire)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let b = Builder::<()>::new()
            .min_delay(Duration::ZERO)
            .thread_name("expiry");
        assert_eq!(b.config.min_delay, Duration::ZERO);
        assert_eq!(b.config.thread_name, "expiry");
        assert!(b.on_expire.is_none());

        let b = b.config(Config::default());
        assert_eq!(b.config.min_delay, DEFAULT_MIN_DELAY);
        assert_eq!(b.config.thread_name, "ttl-timer");
    }
}
