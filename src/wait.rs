use duration_str::deserialize_duration;
use serde::Deserialize;
use std::thread::sleep;
use std::time::{Duration, Instant};

pub mod resources;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(300);

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_poll_timeout() -> Duration {
    DEFAULT_POLL_TIMEOUT
}

/// Cadence and deadline for one convergence wait.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct WaitConfig {
    /// Pause between two probes.
    #[serde(
        default = "default_poll_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub interval: Duration,
    /// Total window after which the wait gives up.
    #[serde(
        default = "default_poll_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout: Duration,
}

impl WaitConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Whether the first probe runs before or after the first sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Immediate,
    Delayed,
}

#[derive(thiserror::Error, Debug)]
pub enum PollError<E: std::error::Error> {
    /// The condition never held within the allotted window.
    #[error("condition not met after {timeout:?}")]
    TimedOut { timeout: Duration },

    /// The predicate itself failed; polling stops immediately.
    #[error("{0}")]
    Predicate(E),
}

/// Repeatedly evaluates `predicate` every `interval` until it reports that the
/// condition holds, it fails, or `timeout` elapses.
///
/// The first `Ok(true)` terminates the wait. A predicate `Err` stops polling
/// immediately; call sites that want to ride out transient failures absorb them
/// inside the predicate. With [Schedule::Delayed] the first probe only runs
/// after one full interval. The wait blocks the calling thread; probes never
/// overlap and the only cancellation is the deadline.
pub fn poll_until<E, F>(
    schedule: Schedule,
    config: &WaitConfig,
    mut predicate: F,
) -> Result<(), PollError<E>>
where
    E: std::error::Error,
    F: FnMut() -> Result<bool, E>,
{
    let deadline = Instant::now() + config.timeout;

    if schedule == Schedule::Delayed {
        sleep(config.interval);
    }

    loop {
        if predicate().map_err(PollError::Predicate)? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(PollError::TimedOut {
                timeout: config.timeout,
            });
        }
        sleep(config.interval);
    }
}
