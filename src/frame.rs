use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Orientation preference for device acquisition. Mirrors the two
/// orientations a handheld client can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front-facing (selfie) camera
    User,
    /// Rear-facing camera
    Environment,
}

impl FacingMode {
    /// Get the opposite orientation, used when switching cameras
    pub fn flip(&self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FacingMode::User => "user",
            FacingMode::Environment => "environment",
        }
    }
}

/// A raw frame as produced by a capture device: packed RGB24 pixels.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
}

impl RawFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data: Arc::new(data),
            width,
            height,
        }
    }

    /// Expected byte length for packed RGB24
    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }
}

/// An encoded still-image snapshot ready to be sent to the backend.
/// Immutable once constructed; the JPEG bytes are shared, not copied.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Monotonically increasing frame identifier within a session
    pub frame_id: u64,
    /// Capture timestamp
    pub captured_at: DateTime<Utc>,
    /// JPEG-encoded image data
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
}

impl Snapshot {
    pub fn new(frame_id: u64, data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            frame_id,
            captured_at: Utc::now(),
            data: Arc::new(data),
            width,
            height,
        }
    }

    /// Build the outbound wire payload for this snapshot
    pub fn to_payload(&self) -> FramePayload {
        FramePayload {
            frame: BASE64.encode(self.data.as_slice()),
            timestamp: self
                .captured_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            frame_id: self.frame_id,
        }
    }
}

/// Outbound message sent per frame tick over the live-analysis stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramePayload {
    /// Base64-encoded JPEG image
    pub frame: String,
    /// ISO-8601 capture timestamp
    pub timestamp: String,
    pub frame_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facing_mode_flip() {
        assert_eq!(FacingMode::User.flip(), FacingMode::Environment);
        assert_eq!(FacingMode::Environment.flip(), FacingMode::User);
    }

    #[test]
    fn test_facing_mode_serde_lowercase() {
        let json = serde_json::to_string(&FacingMode::Environment).unwrap();
        assert_eq!(json, "\"environment\"");
        let parsed: FacingMode = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(parsed, FacingMode::User);
    }

    #[test]
    fn test_raw_frame_size_validation() {
        let valid = RawFrame::new(vec![0u8; 4 * 4 * 3], 4, 4);
        assert!(valid.validate_size());

        let invalid = RawFrame::new(vec![0u8; 10], 4, 4);
        assert!(!invalid.validate_size());
    }

    #[test]
    fn test_snapshot_payload() {
        let snapshot = Snapshot::new(7, vec![1, 2, 3], 128, 128);
        let payload = snapshot.to_payload();
        assert_eq!(payload.frame_id, 7);
        assert_eq!(payload.frame, BASE64.encode([1u8, 2, 3]));
        // RFC 3339 with Zulu suffix
        assert!(payload.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_payload_wire_shape() {
        let snapshot = Snapshot::new(1, vec![0xff], 128, 128);
        let json = serde_json::to_value(snapshot.to_payload()).unwrap();
        assert!(json.get("frame").is_some());
        assert!(json.get("timestamp").is_some());
        assert!(json.get("frame_id").is_some());
    }
}
