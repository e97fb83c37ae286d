use crate::detection::DetectionResult;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::trace;

/// Classified inbound message from the live-analysis stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Connection lifecycle chatter (established/ping/pong); consumed
    /// silently
    Lifecycle(String),
    /// Backend-side analysis failure for one frame; non-fatal
    AnalysisError(String),
    /// A classification result
    Result(DetectionResult),
}

/// Lifecycle message kinds the backend emits
const LIFECYCLE_KINDS: &[&str] = &["connection_established", "ping", "pong"];

#[derive(Debug, Deserialize)]
struct ControlWire {
    #[serde(rename = "type")]
    kind: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultWire {
    accident_detected: bool,
    confidence: f64,
    frame_id: u64,
    #[serde(default)]
    predicted_class: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

/// Classify one inbound text frame. Returns None for malformed payloads,
/// which callers drop with a log line; a bad message must never take the
/// session down.
pub fn classify(text: &str) -> Option<Inbound> {
    // Lifecycle and error messages share an envelope shape, so probe
    // those fields first
    if let Ok(control) = serde_json::from_str::<ControlWire>(text) {
        if let Some(kind) = control.kind {
            if LIFECYCLE_KINDS.contains(&kind.as_str()) {
                trace!("Lifecycle message: {}", kind);
                return Some(Inbound::Lifecycle(kind));
            }
        }
        if let Some(error) = control.error {
            return Some(Inbound::AnalysisError(error));
        }
    }

    let wire: ResultWire = serde_json::from_str(text).ok()?;
    if !(0.0..=1.0).contains(&wire.confidence) {
        return None;
    }

    let timestamp = wire
        .timestamp
        .as_deref()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some(Inbound::Result(DetectionResult {
        frame_id: wire.frame_id,
        timestamp,
        accident_detected: wire.accident_detected,
        confidence: wire.confidence,
        predicted_class: wire.predicted_class.unwrap_or_default(),
    }))
}
