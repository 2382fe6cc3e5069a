//! Health Check Handlers
//!
//! # Endpoints
//! - `GET /health` - Process is up
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness: Redis reachability plus upstream room state
//!
//! Readiness only returns 503 when Redis is down. An active listener with
//! no connected room degrades the report but stays ready.

use std::time::{Duration, Instant};

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::application::dto::SessionStatus;
use crate::domain::SessionState;
use crate::startup::AppState;

static STARTED: Lazy<(Instant, DateTime<Utc>)> = Lazy::new(|| (Instant::now(), Utc::now()));

/// Redis round trips slower than this degrade readiness.
const REDIS_SLOW_THRESHOLD: Duration = Duration::from_millis(50);

/// Pin the uptime origin to server start instead of the first probe.
pub fn init_server_start() {
    Lazy::force(&STARTED);
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Result of one readiness check.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Probe {
    fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            latency_ms: None,
            message: None,
        }
    }

    fn with_message(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            latency_ms: None,
            message: Some(message.into()),
        }
    }
}

/// Listener/stream view included in the readiness report.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHealth {
    pub listener: SessionState,
    pub stream: SessionState,
    pub connected_rooms: usize,
    pub total_rooms: usize,
}

impl From<&SessionStatus> for SessionHealth {
    fn from(status: &SessionStatus) -> Self {
        Self {
            listener: status.listener.state,
            stream: status.stream.state,
            connected_rooms: status.listener.connected_rooms,
            total_rooms: status.listener.total_rooms,
        }
    }
}

impl SessionHealth {
    fn probe(&self) -> HealthStatus {
        if self.listener.is_active() && self.total_rooms > 0 && self.connected_rooms == 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Checks {
    pub redis: Probe,
    pub sessions: SessionHealth,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessReport {
    pub status: HealthStatus,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub started_at: String,
    pub checks: Checks,
}

#[derive(Debug, Serialize)]
pub struct Heartbeat {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<&'static str>,
}

pub async fn health_check() -> Json<Heartbeat> {
    Json(Heartbeat {
        status: "healthy",
        version: Some(env!("CARGO_PKG_VERSION")),
    })
}

pub async fn liveness() -> Json<Heartbeat> {
    Json(Heartbeat {
        status: "alive",
        version: None,
    })
}

pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let redis = probe_redis(&state).await;
    let sessions = SessionHealth::from(&state.manager.status());
    let status = overall_status(&redis, &sessions);

    let (started, started_at) = &*STARTED;
    let report = ReadinessReport {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: started.elapsed().as_secs(),
        started_at: started_at.to_rfc3339(),
        checks: Checks { redis, sessions },
    };

    let code = if status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(report))
}

async fn probe_redis(state: &AppState) -> Probe {
    let Some(redis) = &state.redis else {
        return Probe::with_message(HealthStatus::Healthy, "Redis probe not configured");
    };

    let mut conn = redis.clone();
    let start = Instant::now();
    match redis::cmd("PING").query_async::<String>(&mut conn).await {
        Ok(_) => {
            let elapsed = start.elapsed();
            let mut probe = Probe::healthy();
            if elapsed >= REDIS_SLOW_THRESHOLD {
                probe.status = HealthStatus::Degraded;
            }
            probe.latency_ms = Some(elapsed.as_millis() as u64);
            probe
        }
        Err(e) => Probe::with_message(HealthStatus::Unhealthy, format!("Redis PING failed: {}", e)),
    }
}

/// Worst of the individual checks.
fn overall_status(redis: &Probe, sessions: &SessionHealth) -> HealthStatus {
    redis.status.max(sessions.probe())
}
