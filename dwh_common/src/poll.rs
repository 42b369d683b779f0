//! Waiting for a cluster to change state.
//!
//! We check at a fixed interval, and we give up after a fixed number of
//! checks. Giving up because time ran out (`WaitError::TimedOut`) is reported
//! differently from seeing a state the cluster will never leave
//! (`WaitError::TerminalState`).

use backoff::backoff::Backoff;
use thiserror::Error;

use crate::config::PollingSection;
use crate::prelude::*;

/// Why we stopped waiting without getting what we wanted.
#[derive(Debug, Error)]
pub enum WaitError {
    /// We ran out of attempts while the thing we were waiting for was still
    /// pending.
    #[error("gave up waiting for {what} after {attempts} checks (last state: {last_state})")]
    TimedOut {
        /// What we were waiting for.
        what: String,
        /// How many times we checked.
        attempts: u32,
        /// The last state we saw.
        last_state: String,
    },

    /// We saw a state which means we will never get what we were waiting
    /// for.
    #[error("stopped waiting for {what}: entered terminal state {state:?}")]
    TerminalState {
        /// What we were waiting for.
        what: String,
        /// The state we saw.
        state: String,
    },
}

/// The result of a single check.
#[derive(Debug)]
pub enum Poll<T> {
    /// We're done.
    Ready(T),
    /// Not yet. Contains the state we saw, for logging.
    Pending(String),
    /// This will never finish. Contains the state we saw.
    Failed(String),
}

/// A `Backoff` which always waits `interval`, and which allows at most
/// `max_attempts` checks.
#[derive(Clone, Copy, Debug)]
pub struct FixedInterval {
    interval: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl FixedInterval {
    /// Create a new policy. `max_attempts` is clamped to at least 1.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        FixedInterval {
            interval,
            max_attempts: max_attempts.max(1),
            attempts: 0,
        }
    }

    /// Create a policy from the `[POLLING]` section of our config.
    pub fn from_config(polling: &PollingSection) -> Self {
        Self::new(polling.interval, polling.max_attempts)
    }
}

impl Backoff for FixedInterval {
    fn reset(&mut self) {
        self.attempts = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        // Called once after each failed check.
        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            None
        } else {
            Some(self.interval)
        }
    }
}

/// Why a single check didn't return a value.
enum CheckFailure {
    Pending(String),
    Terminal(String),
    Error(Error),
}

/// Call `check` until it returns `Poll::Ready`, sleeping according to
/// `policy` between calls. `what` describes what we're waiting for, and is
/// used in log and error messages.
///
/// If `check` itself returns an error, we stop immediately and return it.
pub fn poll_until<T, F>(what: &str, policy: FixedInterval, mut check: F) -> Result<T>
where
    F: FnMut() -> Result<Poll<T>>,
{
    let mut attempts = 0;
    let operation = || -> std::result::Result<T, backoff::Error<CheckFailure>> {
        attempts += 1;
        match check() {
            Ok(Poll::Ready(value)) => Ok(value),
            Ok(Poll::Pending(state)) => {
                Err(backoff::Error::transient(CheckFailure::Pending(state)))
            }
            Ok(Poll::Failed(state)) => {
                Err(backoff::Error::permanent(CheckFailure::Terminal(state)))
            }
            Err(err) => Err(backoff::Error::permanent(CheckFailure::Error(err))),
        }
    };
    let notify = |failure: CheckFailure, wait: Duration| {
        if let CheckFailure::Pending(state) = failure {
            debug!("still waiting for {} (state: {}), checking again in {:?}", what, state, wait);
        }
    };

    let result = backoff::retry_notify(policy, operation, notify);
    let failure = match result {
        Ok(value) => return Ok(value),
        Err(backoff::Error::Permanent(failure)) => failure,
        Err(backoff::Error::Transient { err, .. }) => err,
    };
    match failure {
        CheckFailure::Pending(last_state) => Err(WaitError::TimedOut {
            what: what.to_owned(),
            attempts,
            last_state,
        }
        .into()),
        CheckFailure::Terminal(state) => Err(WaitError::TerminalState {
            what: what.to_owned(),
            state,
        }
        .into()),
        CheckFailure::Error(err) => {
            Err(err.context(format!("error while waiting for {}", what)))
        }
    }
}
