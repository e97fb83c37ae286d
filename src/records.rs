use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Review status of an accident record. Overrides applied locally may
/// run ahead of what the backend reflects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    New,
    Reviewed,
    Dismissed,
    Resolved,
}

/// Canonical accident record used throughout the client, independent of
/// which backend schema version produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccidentRecord {
    pub id: String,
    pub occurred_at: DateTime<Utc>,
    pub accident_detected: bool,
    pub confidence: f64,
    pub predicted_class: String,
    pub status: RecordStatus,
    pub camera_label: Option<String>,
}

impl AccidentRecord {
    /// Apply any locally stored status override
    pub fn with_overrides(mut self, overrides: &HashMap<String, RecordStatus>) -> Self {
        if let Some(status) = overrides.get(&self.id) {
            debug!("Applying local status override to record {}", self.id);
            self.status = *status;
        }
        self
    }
}

/// Backend record payload, explicitly tagged by schema version. Each
/// supported version has its own shape and its own adapter into the
/// canonical record — no runtime key guessing.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "schema")]
pub enum RecordEnvelope {
    #[serde(rename = "v1")]
    V1(RecordV1),
    #[serde(rename = "v2")]
    V2(RecordV2),
}

/// First-generation flat record shape.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordV1 {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub accident: bool,
    pub confidence: f64,
    #[serde(default)]
    pub label: Option<String>,
}

/// Second-generation shape with a nested detection object and explicit
/// status.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordV2 {
    pub record_id: String,
    pub detected_at: DateTime<Utc>,
    pub detection: DetectionV2,
    #[serde(default = "default_status")]
    pub status: RecordStatus,
    #[serde(default)]
    pub camera: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionV2 {
    pub accident_detected: bool,
    pub confidence: f64,
    #[serde(default)]
    pub predicted_class: Option<String>,
}

fn default_status() -> RecordStatus {
    RecordStatus::New
}

impl RecordEnvelope {
    /// Adapt whichever schema version arrived into the canonical form
    pub fn into_record(self) -> AccidentRecord {
        match self {
            RecordEnvelope::V1(v1) => from_v1(v1),
            RecordEnvelope::V2(v2) => from_v2(v2),
        }
    }
}

fn from_v1(record: RecordV1) -> AccidentRecord {
    AccidentRecord {
        id: record.id,
        occurred_at: record.timestamp,
        accident_detected: record.accident,
        confidence: record.confidence,
        predicted_class: record.label.clone().unwrap_or_default(),
        status: RecordStatus::New,
        camera_label: record.label,
    }
}

fn from_v2(record: RecordV2) -> AccidentRecord {
    AccidentRecord {
        id: record.record_id,
        occurred_at: record.detected_at,
        accident_detected: record.detection.accident_detected,
        confidence: record.detection.confidence,
        predicted_class: record.detection.predicted_class.unwrap_or_default(),
        status: record.status,
        camera_label: record.camera,
    }
}

/// Parse one backend record. Unknown or untagged schemas are a parse
/// error surfaced to the caller, not silently guessed at.
pub fn parse_record(text: &str) -> Result<AccidentRecord, serde_json::Error> {
    let envelope: RecordEnvelope = serde_json::from_str(text)?;
    Ok(envelope.into_record())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_v1_record() {
        let text = r#"{
            "schema": "v1",
            "id": "rec-1",
            "timestamp": "2024-03-01T08:30:00Z",
            "accident": true,
            "confidence": 0.88,
            "label": "intersection-cam"
        }"#;

        let record = parse_record(text).unwrap();
        assert_eq!(record.id, "rec-1");
        assert!(record.accident_detected);
        assert_eq!(record.status, RecordStatus::New);
        assert_eq!(record.camera_label.as_deref(), Some("intersection-cam"));
    }

    #[test]
    fn test_parse_v2_record() {
        let text = r#"{
            "schema": "v2",
            "record_id": "rec-2",
            "detected_at": "2024-03-02T10:00:00Z",
            "detection": {
                "accident_detected": false,
                "confidence": 0.12,
                "predicted_class": "normal"
            },
            "status": "reviewed",
            "camera": "highway-7"
        }"#;

        let record = parse_record(text).unwrap();
        assert_eq!(record.id, "rec-2");
        assert!(!record.accident_detected);
        assert_eq!(record.status, RecordStatus::Reviewed);
        assert_eq!(record.predicted_class, "normal");
        assert_eq!(record.camera_label.as_deref(), Some("highway-7"));
    }

    #[test]
    fn test_untagged_record_is_an_error() {
        // No schema tag: rejected rather than guessed at
        let text = r#"{"id": "rec-3", "accident": true}"#;
        assert!(parse_record(text).is_err());
    }

    #[test]
    fn test_unknown_schema_is_an_error() {
        let text = r#"{"schema": "v9", "id": "rec-4"}"#;
        assert!(parse_record(text).is_err());
    }

    #[test]
    fn test_status_override_applied() {
        let text = r#"{
            "schema": "v1",
            "id": "rec-5",
            "timestamp": "2024-03-01T08:30:00Z",
            "accident": true,
            "confidence": 0.7
        }"#;

        let mut overrides = HashMap::new();
        overrides.insert("rec-5".to_string(), RecordStatus::Dismissed);

        let record = parse_record(text).unwrap().with_overrides(&overrides);
        assert_eq!(record.status, RecordStatus::Dismissed);
    }
}
