//! Retry policy around fallible pipeline steps.
//!
//! Failures are classified by [`ErrorKind`]:
//! - `Retriable`: up to `retry_count` attempts, flat `retry_delay` between them
//! - `FatalRetriable`: one attempt per entry of `fatal_retry_backoffs`,
//!   waiting each listed delay in turn
//! - anything else: returned after the first attempt
//!
//! Waits are cancellable through a [`CancellationToken`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{ErrorKind, IndexingError};
use objsearch_types::{StoredStatusEvent, WorkerSettings};

/// Receives one call per retry.
pub trait RetryLogger: Send + Sync {
    fn log(&self, attempt: u32, event: Option<&StoredStatusEvent>, error: &IndexingError);
}

/// Logs retries through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRetryLogger;

impl RetryLogger for TracingRetryLogger {
    fn log(&self, attempt: u32, event: Option<&StoredStatusEvent>, error: &IndexingError) {
        match event {
            Some(stored) => warn!(
                attempt,
                event_id = %stored.id,
                event_type = %stored.event.event_type,
                error = %error,
                "Retrying after failure"
            ),
            None => warn!(attempt, error = %error, "Retrying after failure"),
        }
    }
}

/// Walks a fixed list of delays, then gives up.
#[derive(Debug, Clone)]
pub struct ScheduledBackoff {
    delays: Vec<Duration>,
    next: usize,
}

impl ScheduledBackoff {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays, next: 0 }
    }
}

impl Backoff for ScheduledBackoff {
    fn reset(&mut self) {
        self.next = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        let delay = self.delays.get(self.next).copied();
        self.next += 1;
        delay
    }
}

/// Retries operations according to the error class.
#[derive(Clone)]
pub struct Retrier {
    retry_count: u32,
    retry_delay: Duration,
    fatal_retry_backoffs: Vec<Duration>,
    logger: Arc<dyn RetryLogger>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Retrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retrier")
            .field("retry_count", &self.retry_count)
            .field("retry_delay", &self.retry_delay)
            .field("fatal_retry_backoffs", &self.fatal_retry_backoffs)
            .finish()
    }
}

impl Retrier {
    /// Build a retrier.
    ///
    /// Fails with [`IndexingError::Usage`] when `retry_count` is zero, the
    /// delay is under a millisecond, or any backoff is zero. An empty backoff
    /// list makes fatal-retriable errors terminal on the first attempt.
    pub fn new(
        retry_count: u32,
        retry_delay: Duration,
        fatal_retry_backoffs: Vec<Duration>,
        logger: Arc<dyn RetryLogger>,
    ) -> Result<Self, IndexingError> {
        if retry_count < 1 {
            return Err(IndexingError::Usage("retry count must be at least 1".to_string()));
        }
        if retry_delay < Duration::from_millis(1) {
            return Err(IndexingError::Usage(
                "retry delay must be at least 1 ms".to_string(),
            ));
        }
        if fatal_retry_backoffs.iter().any(Duration::is_zero) {
            return Err(IndexingError::Usage(
                "fatal retry backoffs must be positive".to_string(),
            ));
        }
        Ok(Self {
            retry_count,
            retry_delay,
            fatal_retry_backoffs,
            logger,
            cancel: CancellationToken::new(),
        })
    }

    pub fn from_settings(
        settings: &WorkerSettings,
        logger: Arc<dyn RetryLogger>,
    ) -> Result<Self, IndexingError> {
        Self::new(
            settings.retry_count,
            Duration::from_millis(settings.retry_delay_ms),
            settings
                .fatal_retry_backoffs_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            logger,
        )
    }

    /// Abort waits when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn fatal_retry_backoffs(&self) -> &[Duration] {
        &self.fatal_retry_backoffs
    }

    /// Call `func(input)` until it succeeds or the budget for its error
    /// class runs out. `event` is passed to the retry logger.
    pub async fn retry_func<T, R, F, Fut>(
        &self,
        mut func: F,
        input: T,
        event: Option<&StoredStatusEvent>,
    ) -> Result<R, IndexingError>
    where
        T: Clone,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<R, IndexingError>>,
    {
        let mut transient = Constant::new(self.retry_delay);
        let mut scheduled = ScheduledBackoff::new(self.fatal_retry_backoffs.clone());
        let mut transient_attempts = 0u32;
        let mut fatal_attempts = 0usize;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let error = match func(input.clone()).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let delay = match error.kind() {
                ErrorKind::Retriable => {
                    transient_attempts += 1;
                    if transient_attempts >= self.retry_count {
                        return Err(error);
                    }
                    transient.next_backoff()
                }
                ErrorKind::FatalRetriable => {
                    fatal_attempts += 1;
                    if fatal_attempts >= self.fatal_retry_backoffs.len() {
                        return Err(error);
                    }
                    scheduled.next_backoff()
                }
                _ => return Err(error),
            };
            let Some(delay) = delay else {
                return Err(error);
            };

            self.logger.log(attempt, event, &error);
            self.pause(delay).await?;
        }
    }

    /// [`Self::retry_func`] for operations without a result.
    pub async fn retry_cons<T, F, Fut>(
        &self,
        func: F,
        input: T,
        event: Option<&StoredStatusEvent>,
    ) -> Result<(), IndexingError>
    where
        T: Clone,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<(), IndexingError>>,
    {
        self.retry_func(func, input, event).await
    }

    async fn pause(&self, delay: Duration) -> Result<(), IndexingError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(IndexingError::Interrupted),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
