use crate::detection::DetectionResult;
use serde::{Deserialize, Serialize};

/// Detection session lifecycle.
///
/// `Idle -> Starting -> Active -> Stopping -> Idle`, with an
/// Active self-loop per frame tick. Start and stop requests outside the
/// expected phase are guarded no-ops, never queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Idle,
    Starting,
    Active,
    Stopping,
}

impl SessionPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionPhase::Active)
    }
}

/// Observable session counters and phase.
///
/// `frame_count` and the current detection reset on stop; `saved_count`
/// and `alerts_triggered` span sessions and survive until the client is
/// torn down.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub frame_count: u64,
    pub saved_count: u64,
    pub alerts_triggered: u64,
    /// Most recent result delivered while this session was active
    pub current_detection: Option<DetectionResult>,
    /// UI-facing error banner; set on in-session failures, cleared on
    /// stop and on the next successful start
    pub last_error: Option<String>,
}

impl SessionStatus {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            frame_count: 0,
            saved_count: 0,
            alerts_triggered: 0,
            current_detection: None,
            last_error: None,
        }
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_status() {
        let status = SessionStatus::new();
        assert_eq!(status.phase, SessionPhase::Idle);
        assert_eq!(status.frame_count, 0);
        assert_eq!(status.saved_count, 0);
        assert_eq!(status.alerts_triggered, 0);
        assert!(status.current_detection.is_none());
        assert!(status.last_error.is_none());
    }

    #[test]
    fn test_phase_predicates() {
        assert!(SessionPhase::Active.is_active());
        assert!(!SessionPhase::Idle.is_active());
        assert!(!SessionPhase::Starting.is_active());
        assert!(!SessionPhase::Stopping.is_active());
    }
}
