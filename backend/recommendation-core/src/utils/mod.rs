// Utility functions for recommendation-core

use crate::error::{RecommendationError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Neutralise a raw signal: non-finite values become 0, everything else is clamped to [0, 1]
pub fn sanitize_unit(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Non-finite or negative counts contribute nothing
pub fn sanitize_count(value: f64) -> f64 {
    if !value.is_finite() || value < 0.0 {
        return 0.0;
    }
    value
}

/// Run a fallible collaborator call under a time budget.
/// An elapsed budget is reported as `RecommendationError::Timeout`.
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(RecommendationError::Timeout(duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_unit() {
        assert_eq!(sanitize_unit(f64::NAN), 0.0);
        assert_eq!(sanitize_unit(f64::INFINITY), 0.0);
        assert_eq!(sanitize_unit(-0.3), 0.0);
        assert_eq!(sanitize_unit(1.7), 1.0);
        assert!((sanitize_unit(0.42) - 0.42).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sanitize_count() {
        assert_eq!(sanitize_count(-5.0), 0.0);
        assert_eq!(sanitize_count(f64::NAN), 0.0);
        assert_eq!(sanitize_count(12.0), 12.0);
    }

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(Duration::from_secs(1), async { Ok::<_, RecommendationError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_elapsed() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, RecommendationError>(42)
        })
        .await;

        assert!(matches!(result, Err(RecommendationError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_errors_through() {
        let result: Result<i32> = with_timeout(Duration::from_secs(1), async {
            Err(RecommendationError::Upstream("down".to_string()))
        })
        .await;

        assert!(matches!(result, Err(RecommendationError::Upstream(_))));
    }
}
