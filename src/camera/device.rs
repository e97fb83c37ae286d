use crate::error::CameraError;
use crate::frame::{FacingMode, RawFrame};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Descriptor for an enumerable capture device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    pub id: String,
    pub label: String,
    /// Orientation the device faces, when the platform reports one
    pub facing: Option<FacingMode>,
}

/// Constraints applied when opening a device. `relaxed()` drops the
/// orientation preference for the automatic fallback retry.
#[derive(Debug, Clone, Default)]
pub struct DeviceConstraints {
    pub facing: Option<FacingMode>,
    pub resolution: Option<(u32, u32)>,
}

impl DeviceConstraints {
    pub fn facing(facing: FacingMode) -> Self {
        Self {
            facing: Some(facing),
            resolution: None,
        }
    }

    /// Same constraints without the orientation preference
    pub fn relaxed(&self) -> Self {
        Self {
            facing: None,
            resolution: self.resolution,
        }
    }
}

/// An open capture device producing raw RGB frames. The platform media
/// layer is external to this crate; implementations adapt it behind this
/// trait so the camera source and its tests stay device-agnostic.
#[async_trait]
pub trait CaptureDevice: Send + Sync + std::fmt::Debug {
    fn descriptor(&self) -> DeviceDescriptor;

    /// Current frame dimensions. (0, 0) while the device has not settled.
    fn dimensions(&self) -> (u32, u32);

    /// Whether the device is actively producing frames (not paused,
    /// ended, or stopped).
    fn is_live(&self) -> bool;

    /// Read the most recent frame. None is a normal transient outcome.
    async fn read_frame(&self) -> Option<RawFrame>;

    /// Stop all tracks. Must be safe to call more than once.
    async fn stop(&self);
}

/// Opens capture devices matching a set of constraints.
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    async fn enumerate(&self) -> Vec<DeviceDescriptor>;

    async fn open(
        &self,
        constraints: &DeviceConstraints,
    ) -> std::result::Result<Box<dyn CaptureDevice>, CameraError>;
}

/// Test-pattern device provider used by the demo binary and the test
/// suites. Generates a moving gradient so downstream encoding has real
/// pixel data to work with.
pub struct SyntheticProvider {
    devices: Vec<DeviceDescriptor>,
    resolution: (u32, u32),
}

impl SyntheticProvider {
    /// Provider with one front-facing and one rear-facing device
    pub fn new() -> Self {
        Self {
            devices: vec![
                DeviceDescriptor {
                    id: "synthetic-rear".to_string(),
                    label: "Synthetic rear camera".to_string(),
                    facing: Some(FacingMode::Environment),
                },
                DeviceDescriptor {
                    id: "synthetic-front".to_string(),
                    label: "Synthetic front camera".to_string(),
                    facing: Some(FacingMode::User),
                },
            ],
            resolution: (320, 240),
        }
    }

    /// Provider exposing only the given devices
    pub fn with_devices(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            devices,
            resolution: (320, 240),
        }
    }

    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = (width, height);
        self
    }
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceProvider for SyntheticProvider {
    async fn enumerate(&self) -> Vec<DeviceDescriptor> {
        self.devices.clone()
    }

    async fn open(
        &self,
        constraints: &DeviceConstraints,
    ) -> std::result::Result<Box<dyn CaptureDevice>, CameraError> {
        if self.devices.is_empty() {
            return Err(CameraError::DeviceNotFound);
        }

        let descriptor = match constraints.facing {
            Some(facing) => self
                .devices
                .iter()
                .find(|d| d.facing == Some(facing))
                .cloned()
                .ok_or_else(|| CameraError::ConstraintUnsatisfiable {
                    details: format!("no device facing {}", facing.as_str()),
                })?,
            None => self.devices[0].clone(),
        };

        let (width, height) = constraints.resolution.unwrap_or(self.resolution);
        Ok(Box::new(SyntheticDevice::new(descriptor, width, height)))
    }
}

/// Deterministic test-pattern device. Pausing it makes `is_live` false
/// and `read_frame` return None, matching a paused media track.
#[derive(Debug)]
pub struct SyntheticDevice {
    descriptor: DeviceDescriptor,
    width: u32,
    height: u32,
    frame_seq: AtomicU64,
    paused: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl SyntheticDevice {
    pub fn new(descriptor: DeviceDescriptor, width: u32, height: u32) -> Self {
        Self {
            descriptor,
            width,
            height,
            frame_seq: AtomicU64::new(0),
            paused: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle that lets tests pause and resume the device externally
    pub fn pause_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.paused)
    }

    fn generate_pattern(&self, seq: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for y in 0..self.height {
            for x in 0..self.width {
                // Moving diagonal gradient
                let v = ((x + y + seq as u32) % 256) as u8;
                data.push(v);
                data.push(v.wrapping_add(85));
                data.push(v.wrapping_add(170));
            }
        }
        data
    }
}

#[async_trait]
impl CaptureDevice for SyntheticDevice {
    fn descriptor(&self) -> DeviceDescriptor {
        self.descriptor.clone()
    }

    fn dimensions(&self) -> (u32, u32) {
        if self.stopped.load(Ordering::Relaxed) {
            (0, 0)
        } else {
            (self.width, self.height)
        }
    }

    fn is_live(&self) -> bool {
        !self.stopped.load(Ordering::Relaxed) && !self.paused.load(Ordering::Relaxed)
    }

    async fn read_frame(&self) -> Option<RawFrame> {
        if !self.is_live() {
            return None;
        }

        let seq = self.frame_seq.fetch_add(1, Ordering::Relaxed);
        Some(RawFrame::new(
            self.generate_pattern(seq),
            self.width,
            self.height,
        ))
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }
}
