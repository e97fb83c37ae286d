use crate::auth::AuthContext;
use crate::config::TransportConfig;
use crate::error::TransportError;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Lightweight reachability check against the backend health path.
///
/// A successful probe is cached for the configured TTL so session starts
/// and reconnect attempts within that window skip the extra round trip.
/// Failures are never cached: an unreachable verdict should clear as soon
/// as the backend comes back.
pub struct HealthProbe {
    client: reqwest::Client,
    url: String,
    ttl: Duration,
    auth: Option<AuthContext>,
    last_success: Mutex<Option<Instant>>,
}

impl HealthProbe {
    pub fn new(config: &TransportConfig, auth: Option<AuthContext>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.health_url(),
            ttl: config.probe_cache_ttl(),
            auth,
            last_success: Mutex::new(None),
        }
    }

    /// Check backend reachability, honoring the cache.
    pub async fn probe(&self) -> Result<(), TransportError> {
        {
            let last = self.last_success.lock().await;
            if let Some(at) = *last {
                if at.elapsed() < self.ttl {
                    debug!("Health probe cache hit ({:?} old)", at.elapsed());
                    return Ok(());
                }
            }
        }

        debug!("Probing backend health at {}", self.url);

        let mut request = self.client.get(&self.url);
        if let Some(auth) = &self.auth {
            request = request.header(reqwest::header::AUTHORIZATION, auth.bearer());
        }

        let response = request.send().await.map_err(|err| {
            warn!("Health probe request failed: {}", err);
            TransportError::BackendUnreachable {
                details: err.to_string(),
            }
        })?;

        if !response.status().is_success() {
            warn!("Health probe returned status {}", response.status());
            return Err(TransportError::BackendUnreachable {
                details: format!("health check returned {}", response.status()),
            });
        }

        *self.last_success.lock().await = Some(Instant::now());
        debug!("Backend reachable");
        Ok(())
    }

    /// Drop the cached verdict, forcing the next probe to hit the network
    pub async fn invalidate(&self) {
        *self.last_success.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal one-shot HTTP server answering with the given status line
    async fn spawn_health_server(status_line: &'static str, responses: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for _ in 0..responses {
                let (mut socket, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let body = format!(
                    "{}\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
                    status_line
                );
                let _ = socket.write_all(body.as_bytes()).await;
            }
        });

        format!("http://{}", addr)
    }

    fn config_for(base_url: String) -> TransportConfig {
        TransportConfig {
            base_url,
            stream_url: "ws://localhost:1/ws".to_string(),
            health_path: "health".to_string(),
            connect_timeout_seconds: 1,
            probe_cache_seconds: 300,
        }
    }

    #[tokio::test]
    async fn test_probe_success_is_cached() {
        // Server answers exactly once; the second probe must come from
        // the cache
        let base = spawn_health_server("HTTP/1.1 200 OK", 1).await;
        let probe = HealthProbe::new(&config_for(base), None);

        probe.probe().await.unwrap();
        probe.probe().await.unwrap();
    }

    #[tokio::test]
    async fn test_probe_failure_not_cached() {
        let base = spawn_health_server("HTTP/1.1 503 Service Unavailable", 2).await;
        let probe = HealthProbe::new(&config_for(base), None);

        let err = probe.probe().await.unwrap_err();
        assert!(matches!(err, TransportError::BackendUnreachable { .. }));

        // Second call hits the network again (server allows 2 responses)
        let err = probe.probe().await.unwrap_err();
        assert!(matches!(err, TransportError::BackendUnreachable { .. }));
    }

    #[tokio::test]
    async fn test_probe_unreachable_host() {
        // Nothing listens here
        let probe = HealthProbe::new(&config_for("http://127.0.0.1:1".to_string()), None);
        let err = probe.probe().await.unwrap_err();
        assert!(matches!(err, TransportError::BackendUnreachable { .. }));
    }

    #[tokio::test]
    async fn test_invalidate_forces_reprobe() {
        let base = spawn_health_server("HTTP/1.1 200 OK", 2).await;
        let probe = HealthProbe::new(&config_for(base), None);

        probe.probe().await.unwrap();
        probe.invalidate().await;
        probe.probe().await.unwrap();
    }
}
