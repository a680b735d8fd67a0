/// Per-call store deadlines
///
/// Every store call made by a service goes through `bounded`, so a hung
/// backend surfaces as `PlacementError::Timeout` instead of blocking the
/// caller. Dropping the future is the only cancellation there is.

use crate::domain::error::{PlacementError, Result};
use std::future::Future;
use std::time::Duration;

pub async fn bounded<T, F>(limit: Duration, operation: &'static str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = limit.as_millis() as u64, "store call timed out");
            Err(PlacementError::Timeout {
                operation,
                timeout_ms: limit.as_millis() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_result_through() {
        let value = bounded(Duration::from_millis(50), "noop", async { Ok(7u32) }).await;
        assert_eq!(value, Ok(7));

        let err = bounded::<(), _>(Duration::from_millis(50), "noop", async {
            Err(PlacementError::NotFound("x".into()))
        })
        .await;
        assert!(matches!(err, Err(PlacementError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_times_out() {
        let result = bounded(Duration::from_millis(10), "slow_read", async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;

        assert_eq!(
            result,
            Err(PlacementError::Timeout {
                operation: "slow_read",
                timeout_ms: 10
            })
        );
    }
}
