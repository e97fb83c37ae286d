use thiserror::Error;

/// Camera source failures, mirroring the distinct ways device acquisition
/// and capture can go wrong.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("No capture device found")]
    DeviceNotFound,

    #[error("Capture device is not supported: {details}")]
    DeviceUnsupported { details: String },

    #[error("Capture constraints could not be satisfied: {details}")]
    ConstraintUnsatisfiable { details: String },

    #[error("Camera lost: {details}")]
    CameraLost { details: String },
}

/// Socket transport and backend reachability failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Connection attempt timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Connection lost (close code {code})")]
    ConnectionLost { code: u16 },

    #[error("Analysis error from backend: {message}")]
    AnalysisError { message: String },

    #[error("Detection backend is unreachable: {details}")]
    BackendUnreachable { details: String },

    #[error("Socket is not connected")]
    NotConnected,

    #[error("Handshake failed: {details}")]
    Handshake { details: String },
}

/// Local history / override persistence failures. Persistence is a
/// best-effort cache, so these are logged rather than propagated in most
/// call sites.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read history file: {0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to write history file: {0}")]
    Write(#[source] std::io::Error),

    #[error("History file is corrupt: {details}")]
    Corrupt { details: String },
}

/// Admin upload failures, classified from the backend's HTTP response.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadError {
    #[error("Upload rejected: not authorized")]
    Unauthorized,

    #[error("Upload rejected: file failed validation: {details}")]
    InvalidFile { details: String },

    #[error("Upload failed with status {status}")]
    Unexpected { status: u16 },

    #[error("Upload request failed: {details}")]
    Request { details: String },
}

#[derive(Error, Debug)]
pub enum CrashcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl CrashcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Whether restarting the failed operation could plausibly succeed.
    /// Permission denials and unsupported devices are terminal until the
    /// user intervenes; everything network-shaped is worth retrying.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CrashcamError::Camera(CameraError::PermissionDenied) => false,
            CrashcamError::Camera(CameraError::DeviceUnsupported { .. }) => false,
            CrashcamError::Camera(_) => true,
            CrashcamError::Transport(_) => true,
            CrashcamError::Storage(_) => true,
            CrashcamError::Config(_) => false,
            _ => false,
        }
    }

    /// Single human-readable message surfaced to the UI layer when a
    /// session start fails. Kept free of internal detail.
    pub fn user_message(&self) -> String {
        match self {
            CrashcamError::Camera(CameraError::PermissionDenied) => {
                "Camera permission denied. Allow camera access and try again.".to_string()
            }
            CrashcamError::Camera(CameraError::DeviceNotFound) => {
                "No camera was found on this device.".to_string()
            }
            CrashcamError::Camera(CameraError::DeviceUnsupported { .. }) => {
                "This camera is not supported.".to_string()
            }
            CrashcamError::Camera(CameraError::ConstraintUnsatisfiable { .. }) => {
                "The camera could not be started with the requested settings.".to_string()
            }
            CrashcamError::Camera(CameraError::CameraLost { .. }) => {
                "The camera stopped responding.".to_string()
            }
            CrashcamError::Transport(TransportError::BackendUnreachable { .. }) => {
                "The detection service is unreachable. Check your connection.".to_string()
            }
            CrashcamError::Transport(TransportError::Timeout { .. }) => {
                "Timed out connecting to the detection service.".to_string()
            }
            CrashcamError::Transport(TransportError::ConnectionLost { .. }) => {
                "The connection to the detection service was lost.".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CrashcamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_wording() {
        let err = CrashcamError::from(CameraError::PermissionDenied);
        assert!(err
            .user_message()
            .to_lowercase()
            .contains("permission denied"));
    }

    #[test]
    fn test_recoverability() {
        assert!(!CrashcamError::from(CameraError::PermissionDenied).is_recoverable());
        assert!(CrashcamError::from(CameraError::DeviceNotFound).is_recoverable());
        assert!(CrashcamError::from(TransportError::Timeout { seconds: 10 }).is_recoverable());
        assert!(!CrashcamError::from(CameraError::DeviceUnsupported {
            details: "mono".to_string()
        })
        .is_recoverable());
    }

    #[test]
    fn test_component_error_display() {
        let err = CrashcamError::component("transport", "socket closed");
        assert_eq!(
            err.to_string(),
            "Component error in transport: socket closed"
        );
    }
}
