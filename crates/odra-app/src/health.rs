use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use odra_core::HealthSnapshot;
use odra_core::error::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::transport::AuditApi;

pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// `None` until the first check resolves.
pub type HealthReading = Option<Result<HealthSnapshot>>;

/// Background `/health` checker for the operational view.
pub struct HealthMonitor {
    latest: watch::Receiver<HealthReading>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    /// Checks immediately, then every `interval`.
    pub fn spawn(api: Arc<dyn AuditApi>, interval: Duration) -> Self {
        let (tx, latest) = watch::channel(None);
        let token = CancellationToken::new();
        let task = tokio::spawn(watch_health(api, interval, tx, token.clone()));

        Self {
            latest,
            token,
            task: Some(task),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthReading> {
        self.latest.clone()
    }

    pub fn latest(&self) -> HealthReading {
        self.latest.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub async fn stop(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
            debug!("Health monitor stopped");
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn watch_health(
    api: Arc<dyn AuditApi>,
    interval: Duration,
    tx: watch::Sender<HealthReading>,
    token: CancellationToken,
) {
    loop {
        let reading = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            reading = api.get_health() => reading,
        };

        match &reading {
            Ok(snapshot) if snapshot.is_healthy() => debug!("Backend healthy"),
            Ok(snapshot) => warn!("Backend reports status {}", snapshot.status),
            Err(err) => warn!("Health check failed: {}", err),
        }
        tx.send_replace(Some(reading));

        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
