use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::controller::{AppState, SchedulerStatus};
use crate::domain::{BatteryTelemetry, DateHour};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    checks: HealthChecks,
    tasks: SchedulerStatus,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    telemetry: ComponentHealth,
    planning: ComponentHealth,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ComponentHealth {
    fn healthy() -> Self {
        Self {
            status: "healthy",
            error: None,
        }
    }

    fn unhealthy(error: String) -> Self {
        Self {
            status: "unhealthy",
            error: Some(error),
        }
    }

    fn is_healthy(&self) -> bool {
        self.error.is_none()
    }
}

async fn check_telemetry(state: &AppState) -> ComponentHealth {
    match state.telemetry.snapshot().await {
        Ok(s) if s.is_fresh(Utc::now(), state.cfg.telemetry.max_age_seconds) => {
            ComponentHealth::healthy()
        }
        Ok(s) => ComponentHealth::unhealthy(format!("last reading at {}", s.observed_at)),
        Err(e) => ComponentHealth::unhealthy(format!("{e:#}")),
    }
}

/// A plan row must exist for the current hour.
async fn check_planning(state: &AppState) -> ComponentHealth {
    let hour = DateHour::now();
    match state.repos.planning.planning_for_hour(hour).await {
        Ok(Some(_)) => ComponentHealth::healthy(),
        Ok(None) => ComponentHealth::unhealthy(format!("no plan for {hour}")),
        Err(e) => ComponentHealth::unhealthy(format!("{e:#}")),
    }
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let checks = HealthChecks {
        telemetry: check_telemetry(&state).await,
        planning: check_planning(&state).await,
    };
    let healthy = checks.telemetry.is_healthy() && checks.planning.is_healthy();

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" },
        timestamp: Utc::now(),
        checks,
        tasks: state.scheduler.status().await,
    };
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    tracing::debug!(healthy, "health check completed");

    (code, Json(response))
}
