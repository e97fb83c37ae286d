pub mod app;
pub mod auth;
pub mod camera;
pub mod config;
pub mod detection;
pub mod error;
pub mod events;
pub mod frame;
pub mod history;
pub mod notify;
pub mod records;
pub mod retry;
pub mod session;
pub mod transport;
pub mod upload;

pub use app::CrashcamApp;
pub use auth::AuthContext;
pub use camera::{
    CameraSource, CameraState, CaptureDevice, DeviceConstraints, DeviceDescriptor, DeviceProvider,
    FrameSource, PermissionState, SyntheticDevice, SyntheticProvider,
};
pub use config::{
    CameraConfig, CrashcamConfig, HistoryConfig, SessionConfig, SystemConfig, TransportConfig,
};
pub use detection::{DetectionResult, RecentResults};
pub use error::{
    CameraError, CrashcamError, Result, StorageError, TransportError, UploadError,
};
pub use events::{EventBus, SessionEvent};
pub use frame::{FacingMode, FramePayload, RawFrame, Snapshot};
pub use history::{DetectionHistory, StatusOverrides};
pub use notify::{LogNotifier, Notifier};
pub use records::{AccidentRecord, RecordEnvelope, RecordStatus};
pub use retry::{RetryError, RetryPolicy};
pub use session::{DetectionSession, DetectionSessionBuilder, SessionPhase, SessionStatus};
pub use transport::{
    ConnectionState, HealthProbe, ResultTransport, SocketTransport, TransportEvent,
};
pub use upload::{AdminUploader, UploadReceipt};
