use crate::frame::FacingMode;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CrashcamConfig {
    pub camera: CameraConfig,
    pub transport: TransportConfig,
    pub session: SessionConfig,
    pub history: HistoryConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Preferred camera orientation on acquisition
    #[serde(default = "default_facing_mode")]
    pub facing_mode: FacingMode,

    /// Snapshot resolution sent to the backend (width, height).
    /// Kept small to bound per-frame transport cost.
    #[serde(default = "default_snapshot_resolution")]
    pub snapshot_resolution: (u32, u32),

    /// JPEG quality for encoded snapshots (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Delay after device start before the source reports ready,
    /// letting the sensor stabilize before the first frame is taken
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TransportConfig {
    /// Backend base URL for HTTP requests (health probe, uploads)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// WebSocket URL for the live-analysis stream
    #[serde(default = "default_stream_url")]
    pub stream_url: String,

    /// Health probe path relative to base_url
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Seconds to wait for the socket open acknowledgment
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,

    /// Seconds a health probe result stays cached before re-probing
    #[serde(default = "default_probe_cache_seconds")]
    pub probe_cache_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Milliseconds between frame ticks while a session is active
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Capacity of the recent-results buffer shown in the live view
    #[serde(default = "default_recent_capacity")]
    pub recent_capacity: usize,

    /// Maximum connect attempts during session start
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    /// Base delay in milliseconds between connect attempts
    #[serde(default = "default_connect_backoff_ms")]
    pub connect_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HistoryConfig {
    /// Maximum retained history entries (oldest dropped first)
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,

    /// Directory where history and override files are persisted
    #[serde(default = "default_history_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl CameraConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn probe_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.probe_cache_seconds)
    }

    pub fn health_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.health_path.trim_start_matches('/')
        )
    }
}

impl SessionConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl CrashcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("crashcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("camera.facing_mode", default_facing_mode().as_str())?
            .set_default(
                "camera.snapshot_resolution",
                vec![
                    default_snapshot_resolution().0,
                    default_snapshot_resolution().1,
                ],
            )?
            .set_default("camera.jpeg_quality", default_jpeg_quality() as i64)?
            .set_default("camera.settle_ms", default_settle_ms() as i64)?
            .set_default("transport.base_url", default_base_url())?
            .set_default("transport.stream_url", default_stream_url())?
            .set_default("transport.health_path", default_health_path())?
            .set_default(
                "transport.connect_timeout_seconds",
                default_connect_timeout_seconds() as i64,
            )?
            .set_default(
                "transport.probe_cache_seconds",
                default_probe_cache_seconds() as i64,
            )?
            .set_default("session.tick_interval_ms", default_tick_interval_ms() as i64)?
            .set_default("session.recent_capacity", default_recent_capacity() as i64)?
            .set_default("session.connect_attempts", default_connect_attempts() as i64)?
            .set_default(
                "session.connect_backoff_ms",
                default_connect_backoff_ms() as i64,
            )?
            .set_default("history.capacity", default_history_capacity() as i64)?
            .set_default("history.path", default_history_path())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with CRASHCAM_ prefix
            .add_source(Environment::with_prefix("CRASHCAM").separator("_"))
            .build()?;

        let config: CrashcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.snapshot_resolution.0 == 0 || self.camera.snapshot_resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Snapshot resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.jpeg_quality == 0 || self.camera.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "JPEG quality must be between 1 and 100".to_string(),
            ));
        }

        if self.transport.connect_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Connect timeout must be greater than 0".to_string(),
            ));
        }

        if !self.transport.stream_url.starts_with("ws://")
            && !self.transport.stream_url.starts_with("wss://")
        {
            return Err(ConfigError::Message(
                "Stream URL must use the ws or wss scheme".to_string(),
            ));
        }

        if self.session.tick_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Tick interval must be greater than 0".to_string(),
            ));
        }

        if self.session.recent_capacity == 0 {
            return Err(ConfigError::Message(
                "Recent results capacity must be greater than 0".to_string(),
            ));
        }

        if self.session.connect_attempts == 0 {
            return Err(ConfigError::Message(
                "Connect attempts must be greater than 0".to_string(),
            ));
        }

        if self.history.capacity == 0 {
            return Err(ConfigError::Message(
                "History capacity must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the default configuration as TOML for --print-config
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for CrashcamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                facing_mode: default_facing_mode(),
                snapshot_resolution: default_snapshot_resolution(),
                jpeg_quality: default_jpeg_quality(),
                settle_ms: default_settle_ms(),
            },
            transport: TransportConfig {
                base_url: default_base_url(),
                stream_url: default_stream_url(),
                health_path: default_health_path(),
                connect_timeout_seconds: default_connect_timeout_seconds(),
                probe_cache_seconds: default_probe_cache_seconds(),
            },
            session: SessionConfig {
                tick_interval_ms: default_tick_interval_ms(),
                recent_capacity: default_recent_capacity(),
                connect_attempts: default_connect_attempts(),
                connect_backoff_ms: default_connect_backoff_ms(),
            },
            history: HistoryConfig {
                capacity: default_history_capacity(),
                path: default_history_path(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

fn default_facing_mode() -> FacingMode {
    FacingMode::Environment
}

fn default_snapshot_resolution() -> (u32, u32) {
    (128, 128)
}

fn default_jpeg_quality() -> u8 {
    80
}

fn default_settle_ms() -> u64 {
    500
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_stream_url() -> String {
    "ws://localhost:8000/ws/live-analysis".to_string()
}

fn default_health_path() -> String {
    "health".to_string()
}

fn default_connect_timeout_seconds() -> u64 {
    10
}

fn default_probe_cache_seconds() -> u64 {
    300
}

fn default_tick_interval_ms() -> u64 {
    2000
}

fn default_recent_capacity() -> usize {
    10
}

fn default_connect_attempts() -> u32 {
    1
}

fn default_connect_backoff_ms() -> u64 {
    1000
}

fn default_history_capacity() -> usize {
    100
}

fn default_history_path() -> String {
    "./crashcam-data".to_string()
}

fn default_event_bus_capacity() -> usize {
    256
}
