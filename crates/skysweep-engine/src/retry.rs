//! Retry policy for AWS calls: classify by error code, exponential backoff
//! with at least 20% jitter, five attempts.

use std::future::Future;
use std::time::Duration;

use aws_sdk_ec2::error::{ProvideErrorMetadata, SdkError};
use skysweep_core::{classify_aws_error, ErrorDisposition};
use tokio_util::sync::CancellationToken;

use crate::error::{format_err_chain, EngineError};

pub const MAX_ATTEMPTS: u32 = 5;
const BASE: Duration = Duration::from_secs(1);
const CAP: Duration = Duration::from_secs(60);

/// Result of a retried delete-style operation.
#[derive(Debug, PartialEq)]
pub enum AwsOp<T> {
    Done(T),
    /// The resource did not exist; for deletes that is success.
    AlreadyGone,
}

/// Backoff for the given attempt (0-based): `base * 2^attempt` capped,
/// inflated by a random 20–50% jitter.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp_ms = BASE
        .as_millis()
        .saturating_mul(1u128 << attempt.min(16))
        .min(CAP.as_millis()) as u64;
    let jitter = rand::random_range(0.20..=0.50);
    Duration::from_millis(exp_ms + (exp_ms as f64 * jitter) as u64)
}

/// Sleep out a backoff, returning early with `Cancelled` if the session is
/// being torn down.
pub async fn sleep_backoff(cancel: &CancellationToken, attempt: u32) -> Result<(), EngineError> {
    let delay = backoff_delay(attempt);
    tokio::select! {
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Extract (error code, full chain) from any service's `SdkError`.
pub fn aws_code_and_msg<E, R>(err: &SdkError<E, R>) -> (String, String)
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().unwrap_or_default().to_string();
    (code, format_err_chain(err))
}

/// Run an AWS operation under the retry policy.
///
/// The closure reports failures as `(code, message)`; classification decides
/// whether to back off and retry, treat a missing resource as success, or
/// fail. `RetryAfterUnblock` codes are retried here too; operations with an
/// intermediate cleanup pass (security groups) drive their own loop instead
/// of using this helper.
pub async fn retry_aws<T, Fut, Op>(
    label: &str,
    cancel: &CancellationToken,
    mut op: Op,
) -> Result<AwsOp<T>, EngineError>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, (String, String)>>,
{
    let mut last_message = String::new();
    for attempt in 0..MAX_ATTEMPTS {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        match op().await {
            Ok(value) => return Ok(AwsOp::Done(value)),
            Err((code, message)) => match classify_aws_error(&code) {
                ErrorDisposition::AlreadyGone => {
                    tracing::debug!(op = label, code = %code, "resource already gone");
                    return Ok(AwsOp::AlreadyGone);
                }
                ErrorDisposition::Retry | ErrorDisposition::RetryAfterUnblock => {
                    tracing::warn!(op = label, code = %code, attempt, "retryable AWS error");
                    last_message = message;
                    sleep_backoff(cancel, attempt).await?;
                }
                ErrorDisposition::Fail => {
                    return Err(EngineError::Aws(format!("{label}: {message}")));
                }
            },
        }
    }
    Err(EngineError::Aws(format!(
        "{label}: retries exhausted: {last_message}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_grows_and_is_jittered() {
        let first = backoff_delay(0);
        assert!(first >= Duration::from_millis(1200));
        assert!(first <= Duration::from_millis(1500));

        let third = backoff_delay(2);
        assert!(third >= Duration::from_millis(4800));
    }

    #[test]
    fn backoff_caps() {
        assert!(backoff_delay(30) <= Duration::from_millis(90_000));
    }

    #[tokio::test]
    async fn already_gone_short_circuits() {
        let cancel = CancellationToken::new();
        let result: AwsOp<()> = retry_aws("delete-thing", &cancel, || async {
            Err(("NoSuchEntity".to_string(), "gone".to_string()))
        })
        .await
        .unwrap();
        assert_eq!(result, AwsOp::AlreadyGone);
    }

    #[tokio::test]
    async fn fatal_error_does_not_retry() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let result: Result<AwsOp<()>, _> = retry_aws("delete-thing", &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(("AccessDenied".to_string(), "denied".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn throttling_retries_until_success() {
        tokio::time::pause();
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let fut = retry_aws("tagged-op", &cancel, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(("Throttling".to_string(), "slow down".to_string()))
                } else {
                    Ok(n)
                }
            }
        });
        let result = fut.await.unwrap();
        assert_eq!(result, AwsOp::Done(2));
    }

    #[tokio::test]
    async fn cancellation_wins_over_backoff() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<AwsOp<()>, _> = retry_aws("op", &cancel, || async {
            Err(("Throttling".to_string(), "x".to_string()))
        })
        .await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
