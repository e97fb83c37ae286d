use crate::detection::DetectionResult;
use async_trait::async_trait;
use tracing::{info, warn};

/// Side-effect hook invoked once per delivered result. The original
/// client plays an alarm tone and raises a desktop notification on a
/// positive detection; implementations here decide what that means for
/// their environment.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// A positive detection arrived
    async fn alert(&self, result: &DetectionResult);

    /// A negative (all-clear) result arrived
    async fn all_clear(&self, result: &DetectionResult);
}

/// Default notifier: structured log lines only.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn alert(&self, result: &DetectionResult) {
        warn!(
            "Accident detected on frame {} ({:.0}% confidence, class: {})",
            result.frame_id,
            result.confidence_percent(),
            result.predicted_class
        );
    }

    async fn all_clear(&self, result: &DetectionResult) {
        info!(
            "Frame {} clear ({:.0}% confidence)",
            result.frame_id,
            result.confidence_percent()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_log_notifier_does_not_panic() {
        let notifier = LogNotifier;
        let result = DetectionResult {
            frame_id: 1,
            timestamp: Utc::now(),
            accident_detected: true,
            confidence: 0.95,
            predicted_class: "collision".to_string(),
        };

        notifier.alert(&result).await;
        notifier.all_clear(&result).await;
    }
}
