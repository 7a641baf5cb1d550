use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::HttpieError;

/// Admission held for the duration of one outbound call.
pub struct LimiterPermit {
    _inner: Option<Box<dyn Send + Sync>>,
}

impl LimiterPermit {
    pub fn new<P: Send + Sync + 'static>(permit: P) -> Self {
        Self {
            _inner: Some(Box::new(permit)),
        }
    }

    pub fn unlimited() -> Self {
        Self { _inner: None }
    }
}

impl std::fmt::Debug for LimiterPermit {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("LimiterPermit").finish_non_exhaustive()
    }
}

/// Gate deciding when an outbound call may start.
pub trait ConcurrencyLimiter: Send + Sync {
    fn acquire(&self) -> BoxFuture<'_, Result<LimiterPermit, HttpieError>>;
}

/// Lets at most `limit` calls run at the same time.
#[derive(Clone, Debug)]
pub struct SemaphoreLimiter {
    semaphore: Arc<Semaphore>,
}

impl SemaphoreLimiter {
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit.max(1))),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn close(&self) {
        self.semaphore.close();
    }
}

impl ConcurrencyLimiter for SemaphoreLimiter {
    fn acquire(&self) -> BoxFuture<'_, Result<LimiterPermit, HttpieError>> {
        let semaphore = Arc::clone(&self.semaphore);
        async move {
            let permit: OwnedSemaphorePermit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| HttpieError::ConcurrencyLimitClosed)?;
            Ok(LimiterPermit::new(permit))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::{ConcurrencyLimiter, SemaphoreLimiter};
    use crate::error::HttpieErrorCode;

    #[tokio::test]
    async fn permit_is_returned_on_drop() {
        let limiter = SemaphoreLimiter::new(2);
        let first = limiter.acquire().await.expect("first permit");
        let second = limiter.acquire().await.expect("second permit");
        assert_eq!(limiter.available_permits(), 0);

        drop(first);
        assert_eq!(limiter.available_permits(), 1);
        drop(second);
        assert_eq!(limiter.available_permits(), 2);
    }

    #[tokio::test]
    async fn closed_limiter_rejects_new_calls() {
        let limiter = SemaphoreLimiter::new(1);
        limiter.close();

        let error = limiter
            .acquire()
            .await
            .expect_err("closed limiter should fail");
        assert_eq!(error.code(), HttpieErrorCode::ConcurrencyLimitClosed);
    }
}
