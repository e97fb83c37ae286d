use crate::auth::AuthContext;
use crate::camera::{CameraSource, DeviceProvider, FrameSource, SyntheticProvider};
use crate::config::CrashcamConfig;
use crate::error::Result;
use crate::events::{EventBus, SessionEvent};
use crate::history::{DetectionHistory, StatusOverrides};
use crate::notify::{LogNotifier, Notifier};
use crate::session::DetectionSession;
use crate::transport::{ResultTransport, SocketTransport};
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, error, info};

/// Top-level application: wires the camera source, socket transport,
/// history store, and detection session together from configuration, and
/// drives one monitoring run until shutdown is requested.
pub struct CrashcamApp {
    config: CrashcamConfig,
    session: Arc<DetectionSession>,
    overrides: Arc<StatusOverrides>,
    bus: EventBus,
}

impl CrashcamApp {
    /// Build the application from configuration. The device provider is
    /// injectable so tests and headless environments can run without
    /// real capture hardware.
    pub async fn new(config: CrashcamConfig, auth: Option<AuthContext>) -> Result<Self> {
        Self::with_provider(config, auth, Arc::new(SyntheticProvider::new())).await
    }

    pub async fn with_provider(
        config: CrashcamConfig,
        auth: Option<AuthContext>,
        provider: Arc<dyn DeviceProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let camera = Arc::new(CameraSource::new(config.camera.clone(), provider));
        let transport = Arc::new(SocketTransport::new(config.transport.clone(), auth));
        let history = Arc::new(DetectionHistory::open(&config.history).await);
        let overrides = Arc::new(StatusOverrides::open(&config.history).await);
        let bus = EventBus::new(config.system.event_bus_capacity);

        let session = Arc::new(
            DetectionSession::builder()
                .camera(camera as Arc<dyn FrameSource>)
                .transport(transport as Arc<dyn ResultTransport>)
                .notifier(Arc::new(LogNotifier) as Arc<dyn Notifier>)
                .history(history)
                .event_bus(bus.clone())
                .config(config.session.clone())
                .build()?,
        );

        Ok(Self {
            config,
            session,
            overrides,
            bus,
        })
    }

    pub fn session(&self) -> Arc<DetectionSession> {
        Arc::clone(&self.session)
    }

    pub fn overrides(&self) -> Arc<StatusOverrides> {
        Arc::clone(&self.overrides)
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    /// Start a session and run until Ctrl-C, then stop it cleanly.
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting crashcam (backend: {}, stream: {})",
            self.config.transport.base_url, self.config.transport.stream_url
        );

        self.session.start(self.config.camera.facing_mode).await?;

        let mut events = self.bus.subscribe();
        loop {
            tokio::select! {
                signal = signal::ctrl_c() => {
                    match signal {
                        Ok(()) => info!("Shutdown requested"),
                        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
                    }
                    break;
                }
                event = events.recv() => {
                    match event {
                        Ok(event) => debug!("Session event: {}", event.description()),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!("Event log lagged, skipped {} events", skipped);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }

        self.session.stop().await?;
        debug!("Session stopped, phase: {:?}", self.session.phase().await);

        Ok(())
    }
}
