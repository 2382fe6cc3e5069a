//! Heartbeat Service
//!
//! Periodically pushes the listener's connection health to the coordinator
//! while a stream session is active. Send failures are counted and logged;
//! they never stop the loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::listener_session::EventSource;
use crate::domain::{Coordinator, HeartbeatRequest};
use crate::infrastructure::metrics;

/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct HeartbeatCounters {
    sent: AtomicU64,
    failed: AtomicU64,
}

struct HeartbeatTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct HeartbeatService {
    coordinator: Arc<dyn Coordinator>,
    source: Arc<dyn EventSource>,
    interval: Duration,
    task: Mutex<Option<HeartbeatTask>>,
    counters: Arc<HeartbeatCounters>,
}

impl HeartbeatService {
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        source: Arc<dyn EventSource>,
        interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            source,
            interval,
            task: Mutex::new(None),
            counters: Arc::new(HeartbeatCounters::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Launch the periodic push. No-op if already running.
    ///
    /// Returns `true` if a new task was started.
    pub fn start(&self, session_id: Option<String>) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.source),
            Arc::clone(&self.counters),
            self.interval,
            session_id,
            cancel.clone(),
        ));
        *task = Some(HeartbeatTask { cancel, handle });

        info!(interval_ms = self.interval.as_millis() as u64, "Heartbeat started");
        true
    }

    /// Cancel the periodic push and wait for it to exit. Idempotent.
    pub async fn stop(&self) {
        let Some(task) = self.task.lock().take() else {
            return;
        };
        task.cancel.cancel();
        if let Err(e) = task.handle.await {
            if !e.is_cancelled() {
                warn!(error = %e, "Heartbeat task ended abnormally");
            }
        }
        info!("Heartbeat stopped");
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Heartbeats acknowledged by the coordinator.
    pub fn sent(&self) -> u64 {
        self.counters.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }
}

async fn run_heartbeat(
    coordinator: Arc<dyn Coordinator>,
    source: Arc<dyn EventSource>,
    counters: Arc<HeartbeatCounters>,
    interval: Duration,
    session_id: Option<String>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let request = HeartbeatRequest {
                    session_id: session_id.clone(),
                    connections: source.connection_health(),
                };

                match coordinator.send_heartbeat(&request).await {
                    Ok(ack) => {
                        counters.sent.fetch_add(1, Ordering::Relaxed);
                        metrics::record_heartbeat(true);
                        debug!(
                            connections = request.connections.len(),
                            status = ?ack.status,
                            "Heartbeat sent"
                        );
                    }
                    Err(e) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        metrics::record_heartbeat(false);
                        warn!(error = %e, "Heartbeat send failed");
                    }
                }
            }
        }
    }
}
