pub mod state;


pub use state::{SessionPhase, SessionStatus};

use crate::camera::FrameSource;
use crate::config::SessionConfig;
use crate::detection::{DetectionResult, RecentResults};
use crate::error::{CrashcamError, Result};
use crate::events::{EventBus, SessionEvent};
use crate::frame::FacingMode;
use crate::history::DetectionHistory;
use crate::notify::Notifier;
use crate::retry::{RetryError, RetryPolicy};
use crate::transport::{ResultTransport, TransportEvent};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Orchestrates the camera source and socket transport for live
/// monitoring: lifecycle, frame cadence, result bookkeeping, and alert
/// side effects.
///
/// One session instance owns at most one active camera/socket pair;
/// `start()` while not Idle is a guarded no-op. Failures while Active
/// (a lost connection) leave the session visibly Active but
/// non-functional behind an error banner until the user stops it — no
/// silent recovery, since silently reconnecting risks resuming with
/// stale camera state.
pub struct DetectionSession {
    camera: Arc<dyn FrameSource>,
    transport: Arc<dyn ResultTransport>,
    notifier: Arc<dyn Notifier>,
    history: Arc<DetectionHistory>,
    bus: EventBus,
    config: SessionConfig,
    status: Arc<Mutex<SessionStatus>>,
    recent: Arc<Mutex<RecentResults>>,
    cancel: Mutex<Option<CancellationToken>>,
    tick_task: Mutex<Option<JoinHandle<()>>>,
    pump_task: Mutex<Option<JoinHandle<()>>>,
}

impl DetectionSession {
    pub fn builder() -> DetectionSessionBuilder {
        DetectionSessionBuilder::new()
    }

    /// Current session status snapshot
    pub async fn status(&self) -> SessionStatus {
        self.status.lock().await.clone()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.status.lock().await.phase
    }

    /// Recent results, most-recent-first
    pub async fn recent_results(&self) -> Vec<DetectionResult> {
        self.recent.lock().await.to_vec()
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    /// Start a detection session: acquire the camera, verify the backend
    /// is reachable, open the stream, then begin the frame cadence.
    ///
    /// Any failure tears down whatever was brought up, returns the
    /// session to Idle, and surfaces one human-readable message. A
    /// permission denial never reaches the socket.
    pub async fn start(&self, facing: FacingMode) -> Result<()> {
        {
            let mut status = self.status.lock().await;
            if status.phase != SessionPhase::Idle {
                warn!(
                    "Start requested while session is {:?}; ignoring",
                    status.phase
                );
                return Ok(());
            }
            status.phase = SessionPhase::Starting;
            status.last_error = None;
        }

        // Run id correlates log lines across one start/stop cycle
        let run_id = Uuid::new_v4();
        info!(
            "Starting detection session {} (facing: {})",
            run_id,
            facing.as_str()
        );

        if let Err(err) = self.camera.acquire(facing).await {
            let err = CrashcamError::from(err);
            self.abort_start(&err, false).await;
            return Err(err);
        }

        if let Err(err) = self.transport.probe().await {
            let err = CrashcamError::from(err);
            self.abort_start(&err, true).await;
            return Err(err);
        }

        let policy = RetryPolicy::fixed(
            self.config.connect_attempts,
            Duration::from_millis(self.config.connect_backoff_ms),
        );
        let token = CancellationToken::new();
        let transport = Arc::clone(&self.transport);

        let events = match policy.run(&token, || transport.connect()).await {
            Ok(events) => events,
            Err(RetryError::Exhausted(err)) => {
                let err = CrashcamError::from(err);
                self.abort_start(&err, true).await;
                return Err(err);
            }
            Err(RetryError::Cancelled) => {
                let err = CrashcamError::system("connect attempt cancelled");
                self.abort_start(&err, true).await;
                return Err(err);
            }
        };

        // Active is only entered once both collaborators are confirmed up
        let camera_ready = self.camera.is_ready().await;
        let socket_open = self.transport.connection_state().await.socket_open;
        if !camera_ready || !socket_open {
            self.transport.close().await;
            let err = CrashcamError::system(format!(
                "session startup incomplete (camera ready: {}, socket open: {})",
                camera_ready, socket_open
            ));
            self.abort_start(&err, true).await;
            return Err(err);
        }

        self.status.lock().await.phase = SessionPhase::Active;
        self.bus.publish(SessionEvent::SessionStarted {
            timestamp: Utc::now(),
        });

        *self.cancel.lock().await = Some(token.clone());
        *self.tick_task.lock().await = Some(self.spawn_tick_loop(token.clone()));
        *self.pump_task.lock().await = Some(self.spawn_result_pump(events, token));

        Ok(())
    }

    /// Stop the session: tear down the frame timer, then the socket,
    /// then the camera, in that order. `frame_count` and the current
    /// detection reset; `saved_count` and `alerts_triggered` persist.
    /// Idempotent from Idle.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut status = self.status.lock().await;
            match status.phase {
                SessionPhase::Idle => {
                    debug!("Stop requested while already idle");
                    return Ok(());
                }
                SessionPhase::Stopping => {
                    debug!("Stop already in progress");
                    return Ok(());
                }
                _ => status.phase = SessionPhase::Stopping,
            }
        }

        info!("Stopping detection session");

        // 1. Frame timer
        if let Some(token) = self.cancel.lock().await.take() {
            token.cancel();
        }
        if let Some(task) = self.tick_task.lock().await.take() {
            let _ = task.await;
        }

        // 2. Socket
        self.transport.close().await;
        if let Some(task) = self.pump_task.lock().await.take() {
            let _ = task.await;
        }

        // 3. Camera
        self.camera.release().await;

        {
            let mut status = self.status.lock().await;
            status.frame_count = 0;
            status.current_detection = None;
            status.last_error = None;
            status.phase = SessionPhase::Idle;
        }

        self.bus.publish(SessionEvent::SessionStopped {
            timestamp: Utc::now(),
        });

        Ok(())
    }

    async fn abort_start(&self, err: &CrashcamError, release_camera: bool) {
        warn!("Session start failed: {}", err);
        if release_camera {
            self.camera.release().await;
        }

        let mut status = self.status.lock().await;
        status.last_error = Some(err.user_message());
        status.phase = SessionPhase::Idle;
    }

    fn spawn_tick_loop(&self, token: CancellationToken) -> JoinHandle<()> {
        let camera = Arc::clone(&self.camera);
        let transport = Arc::clone(&self.transport);
        let status = Arc::clone(&self.status);
        let bus = self.bus.clone();
        let interval = self.config.tick_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if !status.lock().await.phase.is_active() {
                    break;
                }

                // Frames flow only while the socket is open; a tick that
                // finds it closed is a transient condition, not an error
                if !transport.connection_state().await.socket_open {
                    trace!("Tick skipped: socket not open");
                    continue;
                }

                let snapshot = match camera.capture_snapshot().await {
                    Some(snapshot) => snapshot,
                    None => {
                        trace!("Tick skipped: no frame available");
                        continue;
                    }
                };

                status.lock().await.frame_count += 1;

                match transport.send(&snapshot).await {
                    Ok(()) => {
                        bus.publish(SessionEvent::FrameSent {
                            frame_id: snapshot.frame_id,
                        });
                    }
                    Err(err) => {
                        // Dropped frame; at-most-once delivery by design
                        trace!("Frame {} dropped: {}", snapshot.frame_id, err);
                    }
                }
            }

            debug!("Frame tick loop stopped");
        })
    }

    fn spawn_result_pump(
        &self,
        mut events: mpsc::Receiver<TransportEvent>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let status = Arc::clone(&self.status);
        let recent = Arc::clone(&self.recent);
        let history = Arc::clone(&self.history);
        let notifier = Arc::clone(&self.notifier);
        let bus = self.bus.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                match event {
                    TransportEvent::Result(result) => {
                        Self::deliver_result(
                            result, &status, &recent, &history, &notifier, &bus,
                        )
                        .await;
                    }
                    TransportEvent::AnalysisError(message) => {
                        bus.publish(SessionEvent::AnalysisFailed { message });
                    }
                    TransportEvent::ConnectionLost { code } => {
                        let mut st = status.lock().await;
                        st.last_error = Some(
                            "Connection to the detection service was lost. \
                             Stop and restart the session to resume monitoring."
                                .to_string(),
                        );
                        drop(st);
                        bus.publish(SessionEvent::ConnectionLost {
                            code,
                            timestamp: Utc::now(),
                        });
                    }
                }
            }

            debug!("Result pump stopped");
        })
    }

    async fn deliver_result(
        result: DetectionResult,
        status: &Arc<Mutex<SessionStatus>>,
        recent: &Arc<Mutex<RecentResults>>,
        history: &Arc<DetectionHistory>,
        notifier: &Arc<dyn Notifier>,
        bus: &EventBus,
    ) {
        recent.lock().await.push(result.clone());

        let saved = match history.append(result.clone()).await {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to persist result to history: {}", err);
                false
            }
        };

        {
            let mut st = status.lock().await;
            st.current_detection = Some(result.clone());
            if saved {
                st.saved_count += 1;
            }
            if result.accident_detected {
                st.alerts_triggered += 1;
            }
        }

        bus.publish(SessionEvent::ResultReceived {
            frame_id: result.frame_id,
            accident_detected: result.accident_detected,
            confidence: result.confidence,
        });

        if result.accident_detected {
            bus.publish(SessionEvent::AlertRaised {
                frame_id: result.frame_id,
                confidence: result.confidence,
                timestamp: Utc::now(),
            });
            notifier.alert(&result).await;
        } else {
            notifier.all_clear(&result).await;
        }
    }
}

/// Builder wiring a detection session's collaborators together.
pub struct DetectionSessionBuilder {
    camera: Option<Arc<dyn FrameSource>>,
    transport: Option<Arc<dyn ResultTransport>>,
    notifier: Option<Arc<dyn Notifier>>,
    history: Option<Arc<DetectionHistory>>,
    event_bus: Option<EventBus>,
    config: Option<SessionConfig>,
}

impl DetectionSessionBuilder {
    pub fn new() -> Self {
        Self {
            camera: None,
            transport: None,
            notifier: None,
            history: None,
            event_bus: None,
            config: None,
        }
    }

    pub fn camera(mut self, camera: Arc<dyn FrameSource>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn ResultTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn history(mut self, history: Arc<DetectionHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<DetectionSession> {
        let camera = self
            .camera
            .ok_or_else(|| CrashcamError::system("Session camera must be specified"))?;
        let transport = self
            .transport
            .ok_or_else(|| CrashcamError::system("Session transport must be specified"))?;
        let notifier = self
            .notifier
            .ok_or_else(|| CrashcamError::system("Session notifier must be specified"))?;
        let history = self
            .history
            .ok_or_else(|| CrashcamError::system("Session history must be specified"))?;
        let config = self
            .config
            .ok_or_else(|| CrashcamError::system("Session config must be specified"))?;
        let bus = self.event_bus.unwrap_or_else(|| EventBus::new(256));

        let recent_capacity = config.recent_capacity;

        Ok(DetectionSession {
            camera,
            transport,
            notifier,
            history,
            bus,
            config,
            status: Arc::new(Mutex::new(SessionStatus::new())),
            recent: Arc::new(Mutex::new(RecentResults::new(recent_capacity))),
            cancel: Mutex::new(None),
            tick_task: Mutex::new(None),
            pump_task: Mutex::new(None),
        })
    }
}

impl Default for DetectionSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
