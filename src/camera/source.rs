use super::device::{CaptureDevice, DeviceConstraints, DeviceDescriptor, DeviceProvider};
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::{FacingMode, RawFrame, Snapshot};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

/// Whether camera access has been requested and what the answer was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    NotRequested,
    Granted,
    Denied,
}

/// Observable camera source state. Mutated only by the source's own
/// acquire/switch/release operations.
#[derive(Debug, Clone)]
pub struct CameraState {
    pub permission: PermissionState,
    pub facing: FacingMode,
    pub device_list: Vec<DeviceDescriptor>,
    pub ready: bool,
}

impl CameraState {
    fn new(facing: FacingMode) -> Self {
        Self {
            permission: PermissionState::NotRequested,
            facing,
            device_list: Vec::new(),
            ready: false,
        }
    }
}

/// Camera source: owns one capture device at a time and turns raw device
/// frames into small JPEG snapshots for the transport.
pub struct CameraSource {
    config: CameraConfig,
    provider: Arc<dyn DeviceProvider>,
    state: RwLock<CameraState>,
    device: Mutex<Option<Box<dyn CaptureDevice>>>,
    switching: AtomicBool,
    frame_counter: AtomicU64,
}

impl CameraSource {
    pub fn new(config: CameraConfig, provider: Arc<dyn DeviceProvider>) -> Self {
        let facing = config.facing_mode;
        Self {
            config,
            provider,
            state: RwLock::new(CameraState::new(facing)),
            device: Mutex::new(None),
            switching: AtomicBool::new(false),
            frame_counter: AtomicU64::new(0),
        }
    }

    /// Snapshot of the current camera state
    pub async fn state(&self) -> CameraState {
        self.state.read().await.clone()
    }

    pub async fn is_ready(&self) -> bool {
        self.state.read().await.ready
    }

    /// Request a capture device with the given orientation preference.
    ///
    /// A `ConstraintUnsatisfiable` answer triggers one automatic retry
    /// with the orientation preference dropped before the failure is
    /// surfaced. The source reports ready only after the settle delay has
    /// passed and the device confirms live, nonzero-dimension frames.
    pub async fn acquire(&self, facing: FacingMode) -> Result<(), CameraError> {
        if self.state.read().await.ready {
            debug!("Camera already acquired, ignoring acquire request");
            return Ok(());
        }

        info!("Acquiring camera (facing: {})", facing.as_str());

        let devices = self.provider.enumerate().await;
        {
            let mut state = self.state.write().await;
            state.device_list = devices;
            state.facing = facing;
        }

        let constraints = DeviceConstraints {
            facing: Some(facing),
            resolution: None,
        };

        let device = match self.open_with_fallback(&constraints).await {
            Ok(device) => device,
            Err(err) => {
                if err == CameraError::PermissionDenied {
                    self.state.write().await.permission = PermissionState::Denied;
                }
                warn!("Camera acquisition failed: {}", err);
                return Err(err);
            }
        };

        self.state.write().await.permission = PermissionState::Granted;

        // Let the sensor stabilize before trusting its first frame
        sleep(self.config.settle_delay()).await;

        let (width, height) = device.dimensions();
        if !device.is_live() || width == 0 || height == 0 {
            device.stop().await;
            return Err(CameraError::DeviceUnsupported {
                details: "device did not produce a live frame after settling".to_string(),
            });
        }

        info!(
            "Camera ready: {} ({}x{})",
            device.descriptor().label,
            width,
            height
        );

        *self.device.lock().await = Some(device);
        self.state.write().await.ready = true;

        Ok(())
    }

    /// Capture one still snapshot, downscaled and JPEG-encoded.
    ///
    /// Returns None whenever the device is not currently producing usable
    /// frames (not ready, paused, zero dimensions, bad frame). Never an
    /// error: a missing frame is a normal transient condition.
    pub async fn capture_snapshot(&self) -> Option<Snapshot> {
        if !self.state.read().await.ready {
            trace!("Snapshot requested while camera not ready");
            return None;
        }

        let raw = {
            let guard = self.device.lock().await;
            let device = guard.as_ref()?;

            if !device.is_live() {
                trace!("Snapshot skipped: device paused or ended");
                return None;
            }

            let (width, height) = device.dimensions();
            if width == 0 || height == 0 {
                trace!("Snapshot skipped: device reports zero dimensions");
                return None;
            }

            device.read_frame().await?
        };

        if !raw.validate_size() {
            warn!(
                "Dropping malformed frame: {} bytes for {}x{}",
                raw.data.len(),
                raw.width,
                raw.height
            );
            return None;
        }

        let frame_id = self.frame_counter.fetch_add(1, Ordering::Relaxed) + 1;
        match self.encode_snapshot(&raw, frame_id) {
            Some(snapshot) => {
                trace!(
                    "Captured snapshot {} ({} bytes)",
                    frame_id,
                    snapshot.data.len()
                );
                Some(snapshot)
            }
            None => None,
        }
    }

    /// Stop the current device, flip the orientation preference, and
    /// re-acquire. If the flipped orientation cannot be opened, one
    /// attempt is made to restore the previous one; if that also fails
    /// the source is left not-ready with `CameraLost`.
    ///
    /// A guarded no-op while not ready or while another switch is in
    /// flight.
    pub async fn switch(&self) -> Result<(), CameraError> {
        if self
            .switching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Switch requested while a switch is already in progress");
            return Ok(());
        }

        if !self.state.read().await.ready {
            warn!("Switch requested while camera not ready");
            self.switching.store(false, Ordering::Release);
            return Ok(());
        }

        let previous = self.state.read().await.facing;
        let target = previous.flip();
        info!(
            "Switching camera: {} -> {}",
            previous.as_str(),
            target.as_str()
        );

        self.state.write().await.ready = false;
        if let Some(device) = self.device.lock().await.take() {
            device.stop().await;
        }

        // Strict constraints on purpose: falling back to "any camera"
        // here would hand back the device we just stopped
        let result = match self.open_and_settle(target).await {
            Ok(device) => {
                *self.device.lock().await = Some(device);
                let mut state = self.state.write().await;
                state.facing = target;
                state.ready = true;
                Ok(())
            }
            Err(err) => {
                warn!(
                    "Switch to {} failed ({}), restoring {}",
                    target.as_str(),
                    err,
                    previous.as_str()
                );
                match self.open_and_settle(previous).await {
                    Ok(device) => {
                        *self.device.lock().await = Some(device);
                        self.state.write().await.ready = true;
                        Err(err)
                    }
                    Err(restore_err) => {
                        warn!("Restore of previous camera failed: {}", restore_err);
                        Err(CameraError::CameraLost {
                            details: format!(
                                "switch failed ({}) and previous camera could not be restored ({})",
                                err, restore_err
                            ),
                        })
                    }
                }
            }
        };

        self.switching.store(false, Ordering::Release);
        result
    }

    /// Stop all device tracks and clear permission/ready state.
    /// Idempotent.
    pub async fn release(&self) {
        if let Some(device) = self.device.lock().await.take() {
            debug!("Releasing camera device: {}", device.descriptor().label);
            device.stop().await;
        }

        let mut state = self.state.write().await;
        state.ready = false;
        state.permission = PermissionState::NotRequested;
        state.device_list.clear();
    }

    async fn open_with_fallback(
        &self,
        constraints: &DeviceConstraints,
    ) -> Result<Box<dyn CaptureDevice>, CameraError> {
        match self.provider.open(constraints).await {
            Ok(device) => Ok(device),
            Err(CameraError::ConstraintUnsatisfiable { details }) => {
                warn!(
                    "Constraints unsatisfiable ({}), retrying without orientation preference",
                    details
                );
                self.provider.open(&constraints.relaxed()).await
            }
            Err(err) => Err(err),
        }
    }

    async fn open_and_settle(
        &self,
        facing: FacingMode,
    ) -> Result<Box<dyn CaptureDevice>, CameraError> {
        let device = self
            .provider
            .open(&DeviceConstraints::facing(facing))
            .await?;

        sleep(self.config.settle_delay()).await;

        let (width, height) = device.dimensions();
        if !device.is_live() || width == 0 || height == 0 {
            device.stop().await;
            return Err(CameraError::DeviceUnsupported {
                details: "device did not produce a live frame after settling".to_string(),
            });
        }

        Ok(device)
    }

    fn encode_snapshot(&self, raw: &RawFrame, frame_id: u64) -> Option<Snapshot> {
        let image = match RgbImage::from_raw(raw.width, raw.height, raw.data.to_vec()) {
            Some(image) => image,
            None => {
                warn!("Failed to interpret raw frame {} as RGB", frame_id);
                return None;
            }
        };

        let (target_width, target_height) = self.config.snapshot_resolution;
        let resized = image::imageops::resize(&image, target_width, target_height, FilterType::Triangle);

        let mut buffer = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, self.config.jpeg_quality);
        if let Err(err) = encoder.encode_image(&resized) {
            warn!("JPEG encoding failed for frame {}: {}", frame_id, err);
            return None;
        }

        Some(Snapshot::new(frame_id, buffer, target_width, target_height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::device::{SyntheticDevice, SyntheticProvider};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    fn test_config() -> CameraConfig {
        CameraConfig {
            facing_mode: FacingMode::Environment,
            snapshot_resolution: (128, 128),
            jpeg_quality: 80,
            settle_ms: 0,
        }
    }

    fn source_with(provider: Arc<dyn DeviceProvider>) -> CameraSource {
        CameraSource::new(test_config(), provider)
    }

    /// Provider that always denies permission
    struct DenyingProvider;

    #[async_trait]
    impl DeviceProvider for DenyingProvider {
        async fn enumerate(&self) -> Vec<DeviceDescriptor> {
            Vec::new()
        }

        async fn open(
            &self,
            _constraints: &DeviceConstraints,
        ) -> Result<Box<dyn CaptureDevice>, CameraError> {
            Err(CameraError::PermissionDenied)
        }
    }

    /// Provider that hands out pausable synthetic devices and keeps the
    /// pause handle of the most recently opened one
    struct PausableProvider {
        last_pause_handle: StdMutex<Option<Arc<AtomicBool>>>,
    }

    impl PausableProvider {
        fn new() -> Self {
            Self {
                last_pause_handle: StdMutex::new(None),
            }
        }
    }

    #[async_trait]
    impl DeviceProvider for PausableProvider {
        async fn enumerate(&self) -> Vec<DeviceDescriptor> {
            Vec::new()
        }

        async fn open(
            &self,
            _constraints: &DeviceConstraints,
        ) -> Result<Box<dyn CaptureDevice>, CameraError> {
            let device = SyntheticDevice::new(
                DeviceDescriptor {
                    id: "pausable".to_string(),
                    label: "Pausable".to_string(),
                    facing: Some(FacingMode::Environment),
                },
                64,
                48,
            );
            *self.last_pause_handle.lock().unwrap() = Some(device.pause_handle());
            Ok(Box::new(device))
        }
    }

    #[tokio::test]
    async fn test_acquire_reaches_ready() {
        let source = source_with(Arc::new(SyntheticProvider::new()));

        source.acquire(FacingMode::Environment).await.unwrap();

        let state = source.state().await;
        assert!(state.ready);
        assert_eq!(state.permission, PermissionState::Granted);
        assert_eq!(state.facing, FacingMode::Environment);
        assert_eq!(state.device_list.len(), 2);
    }

    #[tokio::test]
    async fn test_acquire_permission_denied() {
        let source = source_with(Arc::new(DenyingProvider));

        let err = source.acquire(FacingMode::User).await.unwrap_err();
        assert_eq!(err, CameraError::PermissionDenied);

        let state = source.state().await;
        assert!(!state.ready);
        assert_eq!(state.permission, PermissionState::Denied);
    }

    #[tokio::test]
    async fn test_acquire_falls_back_on_unsatisfiable_constraints() {
        // Only a rear camera exists, but the front one is requested
        let provider = SyntheticProvider::with_devices(vec![DeviceDescriptor {
            id: "only-rear".to_string(),
            label: "Rear".to_string(),
            facing: Some(FacingMode::Environment),
        }]);
        let source = source_with(Arc::new(provider));

        source.acquire(FacingMode::User).await.unwrap();
        assert!(source.is_ready().await);
    }

    #[tokio::test]
    async fn test_capture_snapshot_encodes_target_resolution() {
        let source = source_with(Arc::new(SyntheticProvider::new()));
        source.acquire(FacingMode::Environment).await.unwrap();

        let snapshot = source.capture_snapshot().await.unwrap();
        assert_eq!(snapshot.frame_id, 1);
        assert_eq!((snapshot.width, snapshot.height), (128, 128));
        // JPEG magic bytes
        assert_eq!(&snapshot.data[0..2], &[0xff, 0xd8]);

        let second = source.capture_snapshot().await.unwrap();
        assert_eq!(second.frame_id, 2);
    }

    #[tokio::test]
    async fn test_capture_before_acquire_is_none() {
        let source = source_with(Arc::new(SyntheticProvider::new()));
        assert!(source.capture_snapshot().await.is_none());
    }

    #[tokio::test]
    async fn test_capture_on_paused_device_is_none() {
        let provider = Arc::new(PausableProvider::new());
        let source = source_with(Arc::clone(&provider) as Arc<dyn DeviceProvider>);
        source.acquire(FacingMode::Environment).await.unwrap();

        assert!(source.capture_snapshot().await.is_some());

        let pause = provider
            .last_pause_handle
            .lock()
            .unwrap()
            .clone()
            .unwrap();
        pause.store(true, Ordering::Relaxed);

        assert!(source.capture_snapshot().await.is_none());

        pause.store(false, Ordering::Relaxed);
        assert!(source.capture_snapshot().await.is_some());
    }

    #[tokio::test]
    async fn test_switch_flips_facing() {
        let source = source_with(Arc::new(SyntheticProvider::new()));
        source.acquire(FacingMode::Environment).await.unwrap();

        source.switch().await.unwrap();

        let state = source.state().await;
        assert!(state.ready);
        assert_eq!(state.facing, FacingMode::User);
    }

    #[tokio::test]
    async fn test_switch_restores_previous_on_failure() {
        // Only the rear camera exists; switching to the front must fail
        // and restore the rear device
        let provider = SyntheticProvider::with_devices(vec![DeviceDescriptor {
            id: "only-rear".to_string(),
            label: "Rear".to_string(),
            facing: Some(FacingMode::Environment),
        }]);
        let source = source_with(Arc::new(provider));
        source.acquire(FacingMode::Environment).await.unwrap();

        let err = source.switch().await.unwrap_err();
        assert!(matches!(err, CameraError::ConstraintUnsatisfiable { .. }));

        let state = source.state().await;
        assert!(state.ready, "previous camera should have been restored");
        assert_eq!(state.facing, FacingMode::Environment);
        assert!(source.capture_snapshot().await.is_some());
    }

    #[tokio::test]
    async fn test_switch_while_not_ready_is_noop() {
        let source = source_with(Arc::new(SyntheticProvider::new()));
        assert!(source.switch().await.is_ok());
        assert!(!source.is_ready().await);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let source = source_with(Arc::new(SyntheticProvider::new()));
        source.acquire(FacingMode::Environment).await.unwrap();

        source.release().await;
        let state = source.state().await;
        assert!(!state.ready);
        assert_eq!(state.permission, PermissionState::NotRequested);
        assert!(state.device_list.is_empty());

        // Second release has no observable effect
        source.release().await;
        assert!(!source.is_ready().await);
        assert!(source.capture_snapshot().await.is_none());
    }

    #[tokio::test]
    async fn test_reacquire_after_release() {
        let source = source_with(Arc::new(SyntheticProvider::new()));
        source.acquire(FacingMode::Environment).await.unwrap();
        source.release().await;

        source.acquire(FacingMode::User).await.unwrap();
        let state = source.state().await;
        assert!(state.ready);
        assert_eq!(state.facing, FacingMode::User);

        // Frame ids keep counting across reacquisition
        let snapshot = source.capture_snapshot().await.unwrap();
        assert!(snapshot.frame_id >= 1);
    }
}
