use std::io;

use thiserror::Error;

use crate::timer::TimerHandle;

/// Errors from building a [`Ttl`](crate::Ttl).
#[derive(Debug, Error)]
pub enum Error {
    /// The scheduler thread could not be started.
    #[error("failed to spawn timer thread `{name}`: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Errors from the timer scheduling adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum TimerError {
    /// The handle already fired or was cancelled.
    #[error("timer {0} is no longer armed")]
    NotArmed(TimerHandle),
}
