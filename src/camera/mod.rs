pub mod device;
pub mod source;

pub use device::{
    CaptureDevice, DeviceConstraints, DeviceDescriptor, DeviceProvider, SyntheticDevice,
    SyntheticProvider,
};
pub use source::{CameraSource, CameraState, PermissionState};

use crate::error::CameraError;
use crate::frame::{FacingMode, Snapshot};
use async_trait::async_trait;

/// Seam between the detection session and the camera layer; mirrors the
/// transport seam so the session state machine can be exercised with test
/// doubles.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn acquire(&self, facing: FacingMode) -> Result<(), CameraError>;

    /// None is a normal transient outcome, never an error
    async fn capture_snapshot(&self) -> Option<Snapshot>;

    async fn switch(&self) -> Result<(), CameraError>;

    /// Idempotent
    async fn release(&self);

    async fn is_ready(&self) -> bool;
}

#[async_trait]
impl FrameSource for CameraSource {
    async fn acquire(&self, facing: FacingMode) -> Result<(), CameraError> {
        CameraSource::acquire(self, facing).await
    }

    async fn capture_snapshot(&self) -> Option<Snapshot> {
        CameraSource::capture_snapshot(self).await
    }

    async fn switch(&self) -> Result<(), CameraError> {
        CameraSource::switch(self).await
    }

    async fn release(&self) {
        CameraSource::release(self).await
    }

    async fn is_ready(&self) -> bool {
        CameraSource::is_ready(self).await
    }
}
