//! Delayed actions with bounded retry and panic isolation.
//!
//! Cleanup after a connection goes away (unregistering it, closing a socket
//! that lost a duplicate-id race) runs a little later, off the caller's
//! task, and must never take the process down if it panics.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Failure of a deferred or retried action.
#[derive(Debug, Error)]
pub enum DeferredError {
    /// The action returned an error.
    #[error("action failed: {message}")]
    Failed {
        /// Rendered error.
        message: String,
    },

    /// The action panicked.
    #[error("action panicked: {message}")]
    Panicked {
        /// Panic payload, when it was a string.
        message: String,
    },

    /// Every attempt failed.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// The last failure.
        last: Box<DeferredError>,
    },
}

/// Run a future, turning a panic into [`DeferredError::Panicked`].
pub async fn safe_run<F, T>(future: F) -> Result<T, DeferredError>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|payload| DeferredError::Panicked {
            message: panic_message(payload.as_ref()),
        })
}

/// Call `action` until it succeeds, at most `attempts` times (at least once).
///
/// Panics inside an attempt count as failures.
pub async fn try_times<F, Fut, T, E>(mut action: F, attempts: u32) -> Result<T, DeferredError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = attempts.max(1);
    let mut last = None;
    for attempt in 1..=attempts {
        let failure = match safe_run(action()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => DeferredError::Failed {
                message: e.to_string(),
            },
            Err(panicked) => panicked,
        };
        debug!(attempt, attempts, error = %failure, "attempt failed");
        last = Some(failure);
    }
    Err(DeferredError::Exhausted {
        attempts,
        last: Box::new(last.unwrap_or(DeferredError::Failed {
            message: "no attempt ran".into(),
        })),
    })
}

/// Schedules actions to run after a fixed delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deferred {
    delay: Duration,
    max_attempts: u32,
}

impl Deferred {
    /// Attempts made by [`Deferred::schedule`] unless overridden.
    pub const DEFAULT_ATTEMPTS: u32 = 3;

    /// Run actions after `delay`, retrying up to [`Self::DEFAULT_ATTEMPTS`] times.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: Self::DEFAULT_ATTEMPTS,
        }
    }

    /// Override the attempt bound.
    #[must_use]
    pub fn with_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Configured delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Configured attempt bound.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Spawn a task that sleeps, then runs `action` with bounded retry.
    ///
    /// The final failure is logged under `label`. Must be called inside a
    /// tokio runtime.
    pub fn schedule<F, Fut, E>(&self, label: &'static str, action: F) -> JoinHandle<Result<(), DeferredError>>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let Self { delay, max_attempts } = *self;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let result = try_times(action, max_attempts).await;
            if let Err(ref error) = result {
                warn!(label, error = %error, "deferred action failed");
            }
            result
        })
    }

    /// Spawn a task that sleeps, then runs `future` exactly once.
    ///
    /// For actions that consume what they operate on (a socket half, a
    /// sender) and so cannot be retried.
    pub fn schedule_once<Fut>(&self, label: &'static str, future: Fut) -> JoinHandle<Result<(), DeferredError>>
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let result = safe_run(future).await;
            if let Err(ref error) = result {
                warn!(label, error = %error, "deferred action failed");
            }
            result
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
