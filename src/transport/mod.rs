pub mod probe;
pub mod socket;
pub mod wire;

pub use probe::HealthProbe;
pub use socket::{ConnectionState, SocketTransport, TransportEvent};

use crate::error::TransportError;
use crate::frame::Snapshot;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Seam between the detection session and the socket layer. The session
/// only needs these five operations, which keeps its state machine
/// testable without a live backend.
#[async_trait]
pub trait ResultTransport: Send + Sync {
    /// Reachability check; cached per the probe TTL
    async fn probe(&self) -> Result<(), TransportError>;

    /// Open the stream and return the event receiver
    async fn connect(&self) -> Result<mpsc::Receiver<TransportEvent>, TransportError>;

    /// Deliver one frame, at most once; fails when not connected
    async fn send(&self, snapshot: &Snapshot) -> Result<(), TransportError>;

    /// Normal-closure shutdown; idempotent
    async fn close(&self);

    async fn connection_state(&self) -> ConnectionState;
}

#[async_trait]
impl ResultTransport for SocketTransport {
    async fn probe(&self) -> Result<(), TransportError> {
        SocketTransport::probe(self).await
    }

    async fn connect(&self) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        SocketTransport::connect(self).await
    }

    async fn send(&self, snapshot: &Snapshot) -> Result<(), TransportError> {
        SocketTransport::send(self, snapshot).await
    }

    async fn close(&self) {
        SocketTransport::close(self).await
    }

    async fn connection_state(&self) -> ConnectionState {
        SocketTransport::connection_state(self).await
    }
}
