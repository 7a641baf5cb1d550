use std::future::Future;
use std::time::{Duration, SystemTime};

use rand::Rng;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::policies::{DefaultPolicy, RetryPolicy, Verdict};

#[derive(Clone, Debug)]
pub struct RetryOptions {
    retries: u32,
    forever: bool,
    factor: f64,
    min_timeout: Duration,
    max_timeout: Option<Duration>,
    jitter_ratio: f64,
    signal: Option<CancellationToken>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            retries: 3,
            forever: false,
            factor: 2.0,
            min_timeout: Duration::from_secs(1),
            max_timeout: None,
            jitter_ratio: 0.0,
            signal: None,
        }
    }
}

impl RetryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of invocations before giving up.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Ignore `retries` and keep going until the policy or the signal stops.
    pub fn forever(mut self, forever: bool) -> Self {
        self.forever = forever;
        self
    }

    pub fn factor(mut self, factor: f64) -> Self {
        if factor.is_finite() && factor >= 0.0 {
            self.factor = factor;
        }
        self
    }

    pub fn min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    pub fn max_timeout(mut self, max_timeout: Duration) -> Self {
        self.max_timeout = Some(max_timeout);
        self
    }

    /// Spread each delay by up to `ratio` of its value in both directions.
    pub fn jitter_ratio(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = if jitter_ratio.is_finite() {
            jitter_ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn retries_value(&self) -> u32 {
        self.retries
    }

    pub fn is_forever(&self) -> bool {
        self.forever
    }

    /// Delay slept after the failed invocation number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let seconds = self.min_timeout.as_secs_f64() * self.factor.powi(exponent);
        let mut delay = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX);
        if let Some(max_timeout) = self.max_timeout {
            delay = delay.min(max_timeout);
        }
        self.apply_jitter(delay)
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_ratio <= f64::EPSILON {
            return delay;
        }

        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        if delay_ms <= 1 {
            return delay;
        }
        let jitter_span = ((delay_ms as f64) * self.jitter_ratio).round().max(1.0) as u64;
        let low = delay_ms.saturating_sub(jitter_span);
        let mut high = delay_ms.saturating_add(jitter_span);
        if let Some(max_timeout) = self.max_timeout {
            high = high.min(u64::try_from(max_timeout.as_millis()).unwrap_or(u64::MAX));
        }
        let high = high.max(low);
        let mut rng = rand::rng();
        Duration::from_millis(rng.random_range(low..=high))
    }
}

/// Handed to the operation on every invocation.
#[derive(Clone, Debug)]
pub struct AttemptContext {
    /// Invocation number, starting at 1.
    pub attempt: u32,
    pub signal: CancellationToken,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryMetrics {
    /// Retries spent before the accepted value: 0 when the first
    /// invocation is accepted.
    pub attempt: u32,
    /// Time between the first invocation and the start of this one.
    pub elapsed_timeout_time: Duration,
    pub execution_timestamp: SystemTime,
}

#[derive(Clone, Debug)]
pub struct Retried<T> {
    pub data: T,
    pub metrics: RetryMetrics,
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("Aborted")]
    Aborted,
    #[error("Exceeded the maximum number of allowed retries!")]
    RetriesExceeded { attempts: u32 },
    #[error("{0}")]
    Operation(E),
}

impl<E> RetryError<E> {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    pub fn is_retries_exceeded(&self) -> bool {
        matches!(self, Self::RetriesExceeded { .. })
    }

    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::Operation(error) => Some(error),
            _ => None,
        }
    }

    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::Operation(error) => Some(error),
            _ => None,
        }
    }
}

/// Runs `operation` until it succeeds, retrying every error.
pub async fn retry<T, E, Op, Fut>(
    operation: Op,
    options: &RetryOptions,
) -> Result<Retried<T>, RetryError<E>>
where
    Op: FnMut(AttemptContext) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_policy(operation, options, &DefaultPolicy).await
}

/// Runs `operation` and lets `policy` decide what happens with each outcome.
pub async fn retry_with_policy<T, E, Op, Fut, P>(
    mut operation: Op,
    options: &RetryOptions,
    policy: &P,
) -> Result<Retried<T>, RetryError<E>>
where
    Op: FnMut(AttemptContext) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: RetryPolicy<T, E> + ?Sized,
{
    let signal = options.signal.clone().unwrap_or_default();
    let started_at = Instant::now();
    let mut attempt = 0_u32;

    loop {
        attempt = attempt.saturating_add(1);
        if signal.is_cancelled() {
            return Err(RetryError::Aborted);
        }
        let metrics = RetryMetrics {
            attempt: attempt - 1,
            elapsed_timeout_time: started_at.elapsed(),
            execution_timestamp: SystemTime::now(),
        };
        let context = AttemptContext {
            attempt,
            signal: signal.clone(),
        };

        let outcome = tokio::select! {
            biased;
            () = signal.cancelled() => return Err(RetryError::Aborted),
            outcome = operation(context) => outcome,
        };
        let failure = outcome.as_ref().err().map(ToString::to_string);

        match policy.classify(outcome) {
            Verdict::Accept(data) => {
                debug!(attempt, "operation accepted");
                return Ok(Retried { data, metrics });
            }
            Verdict::Reject(error) => return Err(RetryError::Operation(error)),
            Verdict::Retry => {}
        }

        if signal.is_cancelled() {
            return Err(RetryError::Aborted);
        }
        if !options.forever && attempt >= options.retries {
            return Err(RetryError::RetriesExceeded { attempts: attempt });
        }

        let delay = options.delay_for_attempt(attempt);
        warn!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = failure.as_deref().unwrap_or("rejected by policy"),
            "retrying operation"
        );
        tokio::select! {
            biased;
            () = signal.cancelled() => return Err(RetryError::Aborted),
            () = sleep(delay) => {}
        }
    }
}
