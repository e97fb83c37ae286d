use crate::error::CrashcamError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },
}

impl From<EventBusError> for CrashcamError {
    fn from(err: EventBusError) -> Self {
        CrashcamError::component("events", err.to_string())
    }
}

/// Events the detection session publishes for the UI layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// A session reached Active
    SessionStarted { timestamp: DateTime<Utc> },
    /// A session returned to Idle
    SessionStopped { timestamp: DateTime<Utc> },
    /// A frame was captured and handed to the transport
    FrameSent { frame_id: u64 },
    /// A classification result arrived
    ResultReceived {
        frame_id: u64,
        accident_detected: bool,
        confidence: f64,
    },
    /// A positive detection raised an alert
    AlertRaised {
        frame_id: u64,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },
    /// The backend failed to analyze one frame; the stream stays up
    AnalysisFailed { message: String },
    /// The socket closed unexpectedly while the session was active
    ConnectionLost { code: u16, timestamp: DateTime<Utc> },
}

impl SessionEvent {
    /// Human-readable description for logs and debug views
    pub fn description(&self) -> String {
        match self {
            SessionEvent::SessionStarted { .. } => "Detection session started".to_string(),
            SessionEvent::SessionStopped { .. } => "Detection session stopped".to_string(),
            SessionEvent::FrameSent { frame_id } => format!("Frame {} sent", frame_id),
            SessionEvent::ResultReceived {
                frame_id,
                accident_detected,
                confidence,
            } => format!(
                "Result for frame {}: {} ({:.0}%)",
                frame_id,
                if *accident_detected {
                    "accident"
                } else {
                    "clear"
                },
                confidence * 100.0
            ),
            SessionEvent::AlertRaised {
                frame_id,
                confidence,
                ..
            } => format!(
                "Accident alert for frame {} ({:.0}% confidence)",
                frame_id,
                confidence * 100.0
            ),
            SessionEvent::AnalysisFailed { message } => {
                format!("Analysis failed: {}", message)
            }
            SessionEvent::ConnectionLost { code, .. } => {
                format!("Connection lost (close code {})", code)
            }
        }
    }

    /// Event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::SessionStarted { .. } => "session_started",
            SessionEvent::SessionStopped { .. } => "session_stopped",
            SessionEvent::FrameSent { .. } => "frame_sent",
            SessionEvent::ResultReceived { .. } => "result_received",
            SessionEvent::AlertRaised { .. } => "alert_raised",
            SessionEvent::AnalysisFailed { .. } => "analysis_failed",
            SessionEvent::ConnectionLost { .. } => "connection_lost",
        }
    }
}

/// Async event bus for session/UI coordination using broadcast channels.
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers. Events published with no
    /// subscribers are dropped silently — the session must keep running
    /// whether or not a UI is watching.
    pub fn publish(&self, event: SessionEvent) {
        match &event {
            SessionEvent::AlertRaised {
                frame_id,
                confidence,
                ..
            } => {
                warn!(
                    "ALERT: accident detected on frame {} ({:.0}% confidence)",
                    frame_id,
                    confidence * 100.0
                );
            }
            SessionEvent::ConnectionLost { code, .. } => {
                error!("Connection lost (close code {})", code);
            }
            SessionEvent::SessionStarted { .. } | SessionEvent::SessionStopped { .. } => {
                info!("{}", event.description());
            }
            _ => {
                debug!("{}", event.description());
            }
        }

        let _ = self.sender.send(event);
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();

        bus.publish(SessionEvent::FrameSent { frame_id: 9 });

        match receiver.recv().await.unwrap() {
            SessionEvent::FrameSent { frame_id } => assert_eq!(frame_id, 9),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new(16);
        assert_eq!(bus.subscriber_count(), 0);
        // Must not panic or error
        bus.publish(SessionEvent::AnalysisFailed {
            message: "blurry".to_string(),
        });
    }

    #[test]
    fn test_event_types_and_descriptions() {
        let event = SessionEvent::AlertRaised {
            frame_id: 4,
            confidence: 0.91,
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_type(), "alert_raised");
        assert!(event.description().contains("frame 4"));

        let event = SessionEvent::ConnectionLost {
            code: 1011,
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_type(), "connection_lost");
        assert!(event.description().contains("1011"));
    }
}
