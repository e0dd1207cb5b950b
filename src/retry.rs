//! Retry policy with exponential backoff and an explicit error classifier.
//!
//! A [`RetryPolicy`] bundles the attempt ceiling, the backoff schedule and a
//! classifier mapping an [`ApiError`] to a [`FailureType`]. The two presets
//! used by the job lifecycle are:
//!
//! - [`RetryPolicy::submission`]: 3 attempts, retries only transport failures.
//!   An HTTP status means the backend rejected the request, so it is fatal.
//! - [`RetryPolicy::status_poll`]: 7 attempts, retries everything except payload
//!   type mismatches, interrupts and timeouts.
//!
//! # Example
//!
//! ```
//! use vds_client::{ApiError, FailureType, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::submission();
//! let error = ApiError::timeout("https://maps.vandersat.com/api/v2/x");
//! assert_eq!(policy.classify(&error), FailureType::Transient);
//!
//! match policy.should_retry(FailureType::Transient, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::api::ApiError;

/// Attempts allowed for a job submission.
pub const SUBMIT_MAX_ATTEMPTS: u32 = 3;

/// Attempts allowed for a single status poll.
pub const STATUS_MAX_ATTEMPTS: u32 = 7;

/// Base delay for exponential backoff (5 seconds).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);

/// Maximum single wait between attempts (15 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(15);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Maximum jitter added to delays (500ms).
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    Transient,

    /// Failure that must surface immediately.
    ///
    /// Examples: rejected request, malformed payload, user interrupt.
    Fatal,
}

/// Maps an error to a [`FailureType`].
pub type Classifier = fn(&ApiError) -> FailureType;

/// Decision on whether to retry a failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * multiplier^(attempt - 1), max_delay) + jitter
/// ```
///
/// With the presets, delays are approximately 5s, 10s, 15s, 15s, ...
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Base delay for the first retry.
    base_delay: Duration,

    /// Maximum delay cap.
    max_delay: Duration,

    /// Multiplier applied each attempt.
    backoff_multiplier: f32,

    /// Upper bound of the random jitter added to each delay.
    max_jitter: Duration,

    /// Error classifier.
    classifier: Classifier,
}

impl RetryPolicy {
    /// Creates a policy with the default 5s/15s schedule.
    #[must_use]
    pub fn new(max_attempts: u32, classifier: Classifier) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_jitter: MAX_JITTER,
            classifier,
        }
    }

    /// Preset for job submission: 3 attempts, transport failures only.
    #[must_use]
    pub fn submission() -> Self {
        Self::new(SUBMIT_MAX_ATTEMPTS, classify_submission_error)
    }

    /// Preset for status polls: 7 attempts, everything but fatal conditions.
    #[must_use]
    pub fn status_poll() -> Self {
        Self::new(STATUS_MAX_ATTEMPTS, classify_status_error)
    }

    /// Overrides the backoff schedule.
    #[must_use]
    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Overrides the attempt ceiling (minimum 1).
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Disables jitter, making delays deterministic.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.max_jitter = Duration::ZERO;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Classifies an error with this policy's classifier.
    #[must_use]
    pub fn classify(&self, error: &ApiError) -> FailureType {
        (self.classifier)(error)
    }

    /// Determines whether to retry after `attempt` (1-indexed) failed.
    #[instrument(level = "debug", skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Fatal {
            return RetryDecision::DoNotRetry {
                reason: "fatal failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Runs `op` under this policy.
    ///
    /// Transient failures are retried after the backoff delay. When attempts are
    /// exhausted, or the failure is fatal, the last error is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns the error of the final failed attempt.
    pub async fn run<T, F, Fut>(&self, label: &str, op: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.run_until_cancelled(label, &CancellationToken::new(), op)
            .await
    }

    /// Like [`run`](Self::run), but a backoff wait ends early when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns the error of the final failed attempt, or
    /// [`ApiError::Interrupted`] naming `label` when cancelled between attempts.
    pub async fn run_until_cancelled<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match op().await {
                Ok(value) => return Ok(value),
                Err(error) => match self.should_retry(self.classify(&error), attempt) {
                    RetryDecision::Retry {
                        delay,
                        attempt: next_attempt,
                    } => {
                        info!(
                            operation = label,
                            attempt = next_attempt,
                            max_attempts = self.max_attempts,
                            delay_ms = delay.as_millis(),
                            error = %error,
                            "retrying"
                        );
                        tokio::select! {
                            () = cancel.cancelled() => {
                                debug!(operation = label, "backoff cancelled");
                                return Err(ApiError::interrupted(label));
                            }
                            () = tokio::time::sleep(delay) => {}
                        }
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(operation = label, %reason, "not retrying");
                        return Err(error);
                    }
                },
            }
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);

        // attempt 1 = 2^0 = 1x base
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);

        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + self.calculate_jitter()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn calculate_jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(0..=max_ms))
    }
}

/// Submission classifier: only transport failures are worth another attempt.
///
/// | Error | Type |
/// |-------|------|
/// | Network, Timeout | Transient |
/// | HttpStatus | Fatal (request rejected or malformed) |
/// | Decode, InvalidUrl, Marker, Io, Interrupted, PollTimeout | Fatal |
#[must_use]
pub fn classify_submission_error(error: &ApiError) -> FailureType {
    match error {
        ApiError::Network { .. } | ApiError::Timeout { .. } => FailureType::Transient,
        ApiError::HttpStatus { .. }
        | ApiError::Decode { .. }
        | ApiError::InvalidUrl { .. }
        | ApiError::Marker(_)
        | ApiError::Io { .. }
        | ApiError::Interrupted { .. }
        | ApiError::PollTimeout { .. } => FailureType::Fatal,
    }
}

/// Status classifier: retry backend hiccups, stop on programming or
/// cancellation conditions.
///
/// | Error | Type |
/// |-------|------|
/// | Network, HttpStatus | Transient |
/// | Decode (type mismatch), Interrupted, Timeout | Fatal |
/// | InvalidUrl, Marker, Io, PollTimeout | Fatal |
#[must_use]
pub fn classify_status_error(error: &ApiError) -> FailureType {
    match error {
        ApiError::Network { .. } | ApiError::HttpStatus { .. } => FailureType::Transient,
        ApiError::Decode { .. }
        | ApiError::Interrupted { .. }
        | ApiError::Timeout { .. }
        | ApiError::InvalidUrl { .. }
        | ApiError::Marker(_)
        | ApiError::Io { .. }
        | ApiError::PollTimeout { .. } => FailureType::Fatal,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast(policy: RetryPolicy) -> RetryPolicy {
        policy
            .with_delays(Duration::from_millis(1), Duration::from_millis(2))
            .without_jitter()
    }

    // ==================== RetryPolicy Tests ====================

    #[test]
    fn test_submission_preset() {
        let policy = RetryPolicy::submission();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_delay, Duration::from_secs(5));
        assert_eq!(policy.max_delay, Duration::from_secs(15));
    }

    #[test]
    fn test_status_preset() {
        let policy = RetryPolicy::status_poll();
        assert_eq!(policy.max_attempts(), 7);
        assert_eq!(policy.base_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_max_attempts_minimum_is_one() {
        let policy = RetryPolicy::submission().with_max_attempts(0);
        assert_eq!(policy.max_attempts(), 1);
    }

    // ==================== Delay Calculation Tests ====================

    #[test]
    fn test_delay_schedule_is_capped_at_max() {
        let policy = RetryPolicy::status_poll().without_jitter();
        assert_eq!(policy.calculate_delay(1), Duration::from_secs(5));
        assert_eq!(policy.calculate_delay(2), Duration::from_secs(10));
        assert_eq!(policy.calculate_delay(3), Duration::from_secs(15));
        assert_eq!(policy.calculate_delay(6), Duration::from_secs(15));
    }

    #[test]
    fn test_jitter_within_bounds() {
        let policy = RetryPolicy::submission();
        for _ in 0..100 {
            let jitter = policy.calculate_jitter();
            assert!(jitter <= MAX_JITTER, "Jitter {} exceeds max", jitter.as_millis());
        }
    }

    // ==================== Classification Tests ====================

    #[test]
    fn test_submission_http_status_is_fatal() {
        let error = ApiError::http_status("http://h/x", 400);
        assert_eq!(classify_submission_error(&error), FailureType::Fatal);
        let error = ApiError::http_status("http://h/x", 503);
        assert_eq!(classify_submission_error(&error), FailureType::Fatal);
    }

    #[test]
    fn test_submission_timeout_is_transient() {
        let error = ApiError::timeout("http://h/x");
        assert_eq!(classify_submission_error(&error), FailureType::Transient);
    }

    #[test]
    fn test_submission_decode_is_fatal() {
        let error = ApiError::decode("http://h/x", "missing field `uuid`");
        assert_eq!(classify_submission_error(&error), FailureType::Fatal);
    }

    #[test]
    fn test_status_http_status_is_transient() {
        let error = ApiError::http_status("http://h/x", 502);
        assert_eq!(classify_status_error(&error), FailureType::Transient);
    }

    #[test]
    fn test_status_type_mismatch_interrupt_and_timeout_are_fatal() {
        assert_eq!(
            classify_status_error(&ApiError::decode("u", "invalid type")),
            FailureType::Fatal
        );
        assert_eq!(
            classify_status_error(&ApiError::interrupted("u")),
            FailureType::Fatal
        );
        assert_eq!(
            classify_status_error(&ApiError::timeout("u")),
            FailureType::Fatal
        );
    }

    // ==================== Should Retry Decision Tests ====================

    #[test]
    fn test_should_retry_fatal_does_not_retry() {
        let policy = RetryPolicy::submission();
        let decision = policy.should_retry(FailureType::Fatal, 1);
        assert!(matches!(decision, RetryDecision::DoNotRetry { .. }));
        if let RetryDecision::DoNotRetry { reason } = decision {
            assert!(reason.contains("fatal"));
        }
    }

    #[test]
    fn test_should_retry_respects_max_attempts() {
        let policy = RetryPolicy::submission();

        let decision = policy.should_retry(FailureType::Transient, 1);
        assert!(matches!(decision, RetryDecision::Retry { attempt: 2, .. }));

        let decision = policy.should_retry(FailureType::Transient, 2);
        assert!(matches!(decision, RetryDecision::Retry { attempt: 3, .. }));

        let decision = policy.should_retry(FailureType::Transient, 3);
        assert!(matches!(decision, RetryDecision::DoNotRetry { .. }));
        if let RetryDecision::DoNotRetry { reason } = decision {
            assert!(reason.contains("exhausted"));
        }
    }

    // ==================== Executor Tests ====================

    #[tokio::test]
    async fn test_run_retries_transient_until_success() {
        let policy = fast(RetryPolicy::submission());
        let calls = Arc::new(AtomicU32::new(0));

        let result = policy
            .run("test", || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ApiError::timeout("http://h/x"))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_returns_last_error_when_exhausted() {
        let policy = fast(RetryPolicy::submission());
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = policy
            .run("test", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ApiError::timeout("http://h/x"))
                }
            })
            .await;

        assert!(matches!(result, Err(ApiError::Timeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_stops_on_fatal() {
        let policy = fast(RetryPolicy::submission());
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = policy
            .run("test", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ApiError::http_status("http://h/x", 400))
                }
            })
            .await;

        assert!(matches!(result, Err(ApiError::HttpStatus { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_until_cancelled_cuts_backoff_short() {
        let policy = RetryPolicy::status_poll()
            .with_delays(Duration::from_secs(30), Duration::from_secs(30))
            .without_jitter();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result: Result<(), _> = policy
            .run_until_cancelled("http://h/status", &cancel, || async {
                Err(ApiError::http_status("http://h/status", 503))
            })
            .await;

        match result {
            Err(ApiError::Interrupted { url }) => assert_eq!(url, "http://h/status"),
            other => panic!("expected interrupt, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
