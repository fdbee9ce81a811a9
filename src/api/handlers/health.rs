use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::{ApiError, JSend};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub database: String,
    pub active_runs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryUsage>,
}

#[derive(Debug, Serialize)]
pub struct MemoryUsage {
    pub resident_mb: u64,
}

pub async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<HealthResponse>>, ApiError> {
    if let Err(e) = state.db.health_check() {
        tracing::error!(error = %e, "Health check failed");
        return Err(ApiError::unavailable("Store unreachable"));
    }

    Ok(JSend::success(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        database: "connected".to_string(),
        active_runs: state.uploads.active_runs().await,
        memory: resident_memory_bytes().map(|bytes| MemoryUsage {
            resident_mb: bytes / 1024 / 1024,
        }),
    }))
}

/// Resident set size of this process, where the platform exposes it.
#[cfg(target_os = "linux")]
fn resident_memory_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_bytes() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_state, ScriptedTransfer};

    #[tokio::test]
    async fn test_health_reports_connected_store() {
        let state = test_state(ScriptedTransfer::succeed_all());
        let Json(body) = health(State(state)).await.unwrap();
        assert_eq!(body.data.status, "healthy");
        assert_eq!(body.data.database, "connected");
        assert_eq!(body.data.active_runs, 0);
    }
}
