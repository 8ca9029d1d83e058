//! Backend health polling.

use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::config::Config;
use crate::utils::url::construct_api_url;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// One-shot health probe against `{base}/health`. Any 2xx counts as
/// healthy.
pub async fn probe(client: &reqwest::Client, config: &Config) -> Result<(), String> {
    let url = construct_api_url(&config.base_url, "health");
    let response = tokio::time::timeout(PROBE_TIMEOUT, client.get(url).send())
        .await
        .map_err(|_| "health check timed out".to_string())?
        .map_err(|e| format!("health check failed: {e}"))?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(format!("backend unhealthy: HTTP {}", response.status()))
    }
}

/// Periodic health poller publishing the latest result over a watch
/// channel. Embedders that want a passive connectivity indicator read the
/// channel; the engine itself only uses [`probe`] before opening a turn.
pub struct ConnectionMonitor {
    healthy: watch::Receiver<bool>,
    shutdown: CancellationToken,
}

impl ConnectionMonitor {
    pub fn spawn(client: reqwest::Client, config: Config, interval: Duration) -> Self {
        let (tx, rx) = watch::channel(false);
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        tokio::spawn(async move {
            loop {
                let healthy = probe(&client, &config).await.is_ok();
                if tx.send(healthy).is_err() {
                    return;
                }
                if !healthy {
                    debug!("backend health probe failed");
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = token.cancelled() => return,
                }
            }
        });

        Self {
            healthy: rx,
            shutdown,
        }
    }

    pub fn is_healthy(&self) -> bool {
        *self.healthy.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.healthy.clone()
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for ConnectionMonitor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probe_reports_unreachable_backend() {
        let client = reqwest::Client::new();
        let config = Config {
            base_url: "http://127.0.0.1:1".to_string(),
            ..Config::default()
        };
        let result = probe(&client, &config).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().starts_with("health check"));
    }

    #[tokio::test]
    async fn monitor_starts_unhealthy_and_stops_cleanly() {
        let client = reqwest::Client::new();
        let config = Config {
            base_url: "http://127.0.0.1:1".to_string(),
            ..Config::default()
        };
        let monitor = ConnectionMonitor::spawn(client, config, Duration::from_secs(60));
        assert!(!monitor.is_healthy());
        monitor.stop();
        // Stopping twice is a no-op.
        monitor.stop();
    }
}
