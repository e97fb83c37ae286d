use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One classification reply from the backend. Constructed only from an
/// inbound result message correlated to a frame that was actually sent;
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub frame_id: u64,
    pub timestamp: DateTime<Utc>,
    pub accident_detected: bool,
    /// Classifier confidence in [0, 1]
    pub confidence: f64,
    pub predicted_class: String,
}

impl DetectionResult {
    /// Confidence as a display percentage, clamped to [0, 100]
    pub fn confidence_percent(&self) -> f64 {
        (self.confidence.clamp(0.0, 1.0)) * 100.0
    }
}

/// Bounded most-recent-first buffer of detection results backing the
/// live view. Adding past capacity evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct RecentResults {
    entries: VecDeque<DetectionResult>,
    capacity: usize,
}

impl RecentResults {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "recent results capacity must be > 0");
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert a result at the front, evicting the oldest past capacity
    pub fn push(&mut self, result: DetectionResult) {
        self.entries.push_front(result);
        self.entries.truncate(self.capacity);
    }

    /// Most recent result, if any
    pub fn latest(&self) -> Option<&DetectionResult> {
        self.entries.front()
    }

    /// Results ordered most-recent-first
    pub fn iter(&self) -> impl Iterator<Item = &DetectionResult> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Snapshot of the buffer contents, most-recent-first
    pub fn to_vec(&self) -> Vec<DetectionResult> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(frame_id: u64, accident: bool) -> DetectionResult {
        DetectionResult {
            frame_id,
            timestamp: Utc::now(),
            accident_detected: accident,
            confidence: 0.9,
            predicted_class: if accident { "accident" } else { "normal" }.to_string(),
        }
    }

    #[test]
    fn test_push_and_latest() {
        let mut recent = RecentResults::new(10);
        assert!(recent.latest().is_none());

        recent.push(result(1, false));
        recent.push(result(2, true));

        assert_eq!(recent.latest().unwrap().frame_id, 2);
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn test_eviction_at_capacity() {
        let mut recent = RecentResults::new(10);
        for i in 1..=12 {
            recent.push(result(i, false));
        }

        // Last 10 survive, most recent first
        assert_eq!(recent.len(), 10);
        let ids: Vec<u64> = recent.iter().map(|r| r.frame_id).collect();
        assert_eq!(ids, vec![12, 11, 10, 9, 8, 7, 6, 5, 4, 3]);
    }

    #[test]
    fn test_front_insert_order() {
        let mut recent = RecentResults::new(3);
        recent.push(result(1, false));
        recent.push(result(2, false));
        recent.push(result(3, false));
        recent.push(result(4, false));

        let ids: Vec<u64> = recent.to_vec().iter().map(|r| r.frame_id).collect();
        assert_eq!(ids, vec![4, 3, 2]);
    }

    #[test]
    fn test_clear() {
        let mut recent = RecentResults::new(5);
        recent.push(result(1, true));
        recent.clear();
        assert!(recent.is_empty());
        assert_eq!(recent.capacity(), 5);
    }

    #[test]
    fn test_confidence_percent_clamped() {
        let mut r = result(1, true);
        r.confidence = 1.4;
        assert_eq!(r.confidence_percent(), 100.0);
        r.confidence = -0.2;
        assert_eq!(r.confidence_percent(), 0.0);
        r.confidence = 0.87;
        assert!((r.confidence_percent() - 87.0).abs() < 1e-9);
    }
}
