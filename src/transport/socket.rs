use super::probe::HealthProbe;
use super::wire::{self, Inbound};
use crate::auth::AuthContext;
use crate::config::TransportConfig;
use crate::detection::DetectionResult;
use crate::error::TransportError;
use crate::frame::Snapshot;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Close code reported when the stream ends without a close frame
const ABNORMAL_CLOSE: u16 = 1006;
/// Close code for a missing status in the close frame
const NO_STATUS: u16 = 1005;

/// Observable transport state. Driven solely by transport events
/// (open/close/error) and the explicit health probe.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub socket_open: bool,
    pub api_reachable: bool,
    pub last_error: Option<String>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            socket_open: false,
            api_reachable: false,
            last_error: None,
        }
    }
}

/// Event delivered to the session from the read loop.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A parsed classification result
    Result(DetectionResult),
    /// Backend reported a per-frame analysis failure; connection stays up
    AnalysisError(String),
    /// The socket closed unexpectedly. The transport does not reconnect;
    /// that decision belongs to the orchestration layer.
    ConnectionLost { code: u16 },
}

/// Client for the backend's live-analysis stream. One connection at a
/// time; frames are delivered at most once, never queued while
/// disconnected — a stale frame has no value on a live feed.
pub struct SocketTransport {
    config: TransportConfig,
    probe: HealthProbe,
    writer: Mutex<Option<WsSink>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    state: Arc<RwLock<ConnectionState>>,
    normal_close: Arc<AtomicBool>,
    auth: Option<AuthContext>,
}

impl SocketTransport {
    pub fn new(config: TransportConfig, auth: Option<AuthContext>) -> Self {
        let probe = HealthProbe::new(&config, auth.clone());
        Self {
            config,
            probe,
            writer: Mutex::new(None),
            reader_task: Mutex::new(None),
            state: Arc::new(RwLock::new(ConnectionState::default())),
            normal_close: Arc::new(AtomicBool::new(false)),
            auth,
        }
    }

    /// Current connection state snapshot
    pub async fn connection_state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    /// Check backend reachability (cached per the probe TTL) and record
    /// the verdict in the connection state.
    pub async fn probe(&self) -> Result<(), TransportError> {
        match self.probe.probe().await {
            Ok(()) => {
                self.state.write().await.api_reachable = true;
                Ok(())
            }
            Err(err) => {
                let mut state = self.state.write().await;
                state.api_reachable = false;
                state.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Open the streaming connection. Fails with `Timeout` if the open
    /// acknowledgment does not arrive within the configured window.
    /// Returns the receiver on which transport events are delivered.
    pub async fn connect(&self) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        if self.state.read().await.socket_open {
            warn!("Connect requested while socket already open");
            return Err(TransportError::Handshake {
                details: "socket already open".to_string(),
            });
        }

        info!("Connecting to {}", self.config.stream_url);

        let mut request = self
            .config
            .stream_url
            .as_str()
            .into_client_request()
            .map_err(|err| TransportError::Handshake {
                details: err.to_string(),
            })?;

        if let Some(auth) = &self.auth {
            let value =
                HeaderValue::from_str(&auth.bearer()).map_err(|err| TransportError::Handshake {
                    details: format!("invalid auth token: {}", err),
                })?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let connect_timeout = self.config.connect_timeout();
        let (stream, _response) = timeout(connect_timeout, connect_async(request))
            .await
            .map_err(|_| TransportError::Timeout {
                seconds: connect_timeout.as_secs(),
            })?
            .map_err(|err| TransportError::Handshake {
                details: err.to_string(),
            })?;

        let (sink, source) = stream.split();
        *self.writer.lock().await = Some(sink);
        self.normal_close.store(false, Ordering::Release);

        {
            let mut state = self.state.write().await;
            state.socket_open = true;
            state.last_error = None;
        }

        let (tx, rx) = mpsc::channel(64);
        let task = tokio::spawn(Self::read_loop(
            source,
            tx,
            Arc::clone(&self.state),
            Arc::clone(&self.normal_close),
        ));
        *self.reader_task.lock().await = Some(task);

        info!("Live-analysis stream open");
        Ok(rx)
    }

    /// Send one snapshot. Errors with `NotConnected` when the socket is
    /// not open — the frame is simply dropped, never queued.
    pub async fn send(&self, snapshot: &Snapshot) -> Result<(), TransportError> {
        if !self.state.read().await.socket_open {
            trace!("Dropping frame {}: socket not open", snapshot.frame_id);
            return Err(TransportError::NotConnected);
        }

        let payload = serde_json::to_string(&snapshot.to_payload()).map_err(|err| {
            TransportError::Handshake {
                details: format!("payload serialization failed: {}", err),
            }
        })?;

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;

        if let Err(err) = writer.send(Message::Text(payload)).await {
            warn!("Send failed for frame {}: {}", snapshot.frame_id, err);
            let mut state = self.state.write().await;
            state.socket_open = false;
            state.last_error = Some(err.to_string());
            return Err(TransportError::ConnectionLost {
                code: ABNORMAL_CLOSE,
            });
        }

        trace!("Sent frame {}", snapshot.frame_id);
        Ok(())
    }

    /// Normal-closure shutdown. Idempotent.
    pub async fn close(&self) {
        self.normal_close.store(true, Ordering::Release);

        if let Some(mut writer) = self.writer.lock().await.take() {
            debug!("Closing live-analysis stream");
            let _ = writer.send(Message::Close(None)).await;
            let _ = writer.close().await;
        }

        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
        }

        self.state.write().await.socket_open = false;
    }

    async fn read_loop(
        mut source: WsSource,
        tx: mpsc::Sender<TransportEvent>,
        state: Arc<RwLock<ConnectionState>>,
        normal_close: Arc<AtomicBool>,
    ) {
        while let Some(message) = source.next().await {
            match message {
                Ok(Message::Text(text)) => match wire::classify(&text) {
                    Some(Inbound::Lifecycle(kind)) => {
                        trace!("Lifecycle message consumed: {}", kind);
                    }
                    Some(Inbound::AnalysisError(message)) => {
                        warn!("Backend analysis error: {}", message);
                        let _ = tx.send(TransportEvent::AnalysisError(message)).await;
                    }
                    Some(Inbound::Result(result)) => {
                        trace!(
                            "Result for frame {}: accident={} confidence={:.2}",
                            result.frame_id,
                            result.accident_detected,
                            result.confidence
                        );
                        let _ = tx.send(TransportEvent::Result(result)).await;
                    }
                    None => {
                        debug!("Dropping malformed inbound message ({} bytes)", text.len());
                    }
                },
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Close(frame)) => {
                    let code = frame.map(|f| u16::from(f.code)).unwrap_or(NO_STATUS);
                    Self::handle_closed(&tx, &state, &normal_close, code).await;
                    return;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("Socket read error: {}", err);
                    {
                        let mut s = state.write().await;
                        s.socket_open = false;
                        s.last_error = Some(err.to_string());
                    }
                    if !normal_close.load(Ordering::Acquire) {
                        let _ = tx
                            .send(TransportEvent::ConnectionLost {
                                code: ABNORMAL_CLOSE,
                            })
                            .await;
                    }
                    return;
                }
            }
        }

        // Stream ended without a close frame
        Self::handle_closed(&tx, &state, &normal_close, ABNORMAL_CLOSE).await;
    }

    async fn handle_closed(
        tx: &mpsc::Sender<TransportEvent>,
        state: &Arc<RwLock<ConnectionState>>,
        normal_close: &Arc<AtomicBool>,
        code: u16,
    ) {
        let expected = normal_close.load(Ordering::Acquire);
        let normal = code == 1000 || expected;

        {
            let mut s = state.write().await;
            s.socket_open = false;
            if !normal {
                s.last_error = Some(format!("connection lost (close code {})", code));
            }
        }

        if normal {
            debug!("Stream closed normally (code {})", code);
        } else {
            warn!("Stream closed unexpectedly (code {})", code);
            let _ = tx.send(TransportEvent::ConnectionLost { code }).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FramePayload;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    fn config_for(stream_url: String) -> TransportConfig {
        TransportConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            stream_url,
            health_path: "health".to_string(),
            connect_timeout_seconds: 1,
            probe_cache_seconds: 300,
        }
    }

    /// Spawn a websocket server running the given session script
    async fn spawn_ws_server<F, Fut>(script: F) -> String
    where
        F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            if let Ok((socket, _)) = listener.accept().await {
                if let Ok(ws) = accept_async(socket).await {
                    script(ws).await;
                }
            }
        });

        format!("ws://{}", addr)
    }

    #[tokio::test]
    async fn test_send_before_connect_is_not_connected() {
        let transport = SocketTransport::new(config_for("ws://127.0.0.1:1".to_string()), None);
        let snapshot = Snapshot::new(1, vec![0u8; 4], 128, 128);

        let err = transport.send(&snapshot).await.unwrap_err();
        assert_eq!(err, TransportError::NotConnected);
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        // Accepts TCP but never answers the websocket handshake
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _held = listener.accept().await;
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        });

        let transport = SocketTransport::new(config_for(format!("ws://{}", addr)), None);
        let err = transport.connect().await.unwrap_err();
        assert_eq!(err, TransportError::Timeout { seconds: 1 });
    }

    #[tokio::test]
    async fn test_connect_classifies_inbound_messages() {
        let url = spawn_ws_server(|mut ws| async move {
            ws.send(Message::Text(
                "{\"type\": \"connection_established\"}".to_string(),
            ))
            .await
            .unwrap();
            ws.send(Message::Text("{\"error\": \"blurry frame\"}".to_string()))
                .await
                .unwrap();
            ws.send(Message::Text("this is not json".to_string()))
                .await
                .unwrap();
            ws.send(Message::Text(
                r#"{"accident_detected": true, "confidence": 0.9, "frame_id": 3}"#.to_string(),
            ))
            .await
            .unwrap();
            // Hold the connection open until the client is done
            let _ = ws.next().await;
        })
        .await;

        let transport = SocketTransport::new(config_for(url), None);
        let mut events = transport.connect().await.unwrap();
        assert!(transport.connection_state().await.socket_open);

        // Lifecycle and malformed messages are consumed silently; the
        // first observable events are the analysis error and the result
        assert_eq!(
            events.recv().await.unwrap(),
            TransportEvent::AnalysisError("blurry frame".to_string())
        );
        match events.recv().await.unwrap() {
            TransportEvent::Result(result) => {
                assert!(result.accident_detected);
                assert_eq!(result.frame_id, 3);
            }
            other => panic!("expected result, got {:?}", other),
        }

        // Analysis errors do not close the connection
        assert!(transport.connection_state().await.socket_open);

        transport.close().await;
        assert!(!transport.connection_state().await.socket_open);
    }

    #[tokio::test]
    async fn test_send_delivers_frame_payload() {
        let url = spawn_ws_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let payload: FramePayload = serde_json::from_str(&text).unwrap();
                let reply = format!(
                    r#"{{"accident_detected": false, "confidence": 0.2, "frame_id": {}}}"#,
                    payload.frame_id
                );
                ws.send(Message::Text(reply)).await.unwrap();
            }
            let _ = ws.next().await;
        })
        .await;

        let transport = SocketTransport::new(config_for(url), None);
        let mut events = transport.connect().await.unwrap();

        let snapshot = Snapshot::new(11, vec![0xff, 0xd8, 0xff], 128, 128);
        transport.send(&snapshot).await.unwrap();

        match events.recv().await.unwrap() {
            TransportEvent::Result(result) => assert_eq!(result.frame_id, 11),
            other => panic!("expected result, got {:?}", other),
        }

        transport.close().await;
    }

    #[tokio::test]
    async fn test_abnormal_close_emits_connection_lost() {
        let url = spawn_ws_server(|mut ws| async move {
            ws.send(Message::Close(Some(CloseFrame {
                code: CloseCode::from(1011),
                reason: "backend going away".into(),
            })))
            .await
            .unwrap();
        })
        .await;

        let transport = SocketTransport::new(config_for(url), None);
        let mut events = transport.connect().await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            TransportEvent::ConnectionLost { code: 1011 }
        );

        let state = transport.connection_state().await;
        assert!(!state.socket_open);
        assert!(state.last_error.is_some());

        // Sends after the loss are dropped, not queued
        let snapshot = Snapshot::new(1, vec![0u8; 4], 128, 128);
        assert_eq!(
            transport.send(&snapshot).await.unwrap_err(),
            TransportError::NotConnected
        );
    }

    #[tokio::test]
    async fn test_normal_close_is_silent_and_idempotent() {
        let url = spawn_ws_server(|mut ws| async move {
            // Echo the close handshake
            while let Some(Ok(message)) = ws.next().await {
                if matches!(message, Message::Close(_)) {
                    break;
                }
            }
        })
        .await;

        let transport = SocketTransport::new(config_for(url), None);
        let mut events = transport.connect().await.unwrap();

        transport.close().await;
        transport.close().await;

        assert!(!transport.connection_state().await.socket_open);
        // No ConnectionLost event for a client-initiated close
        assert!(events.try_recv().is_err());
    }
}
