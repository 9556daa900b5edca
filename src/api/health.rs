use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::app::AppState;
use crate::domain::ClusterId;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    models: ComponentHealth,
}

/// Health status of a component
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    status: String,
    loaded_clusters: Vec<ClusterId>,
    expected_clusters: Vec<ClusterId>,
}

/// GET /health - Service status and the clusters whose models are in memory
///
/// Bundles load lazily, so a partially loaded store is still healthy.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.forecaster.policy().store();
    let response = HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        checks: HealthChecks {
            models: ComponentHealth {
                status: "healthy".to_string(),
                loaded_clusters: store.loaded_clusters(),
                expected_clusters: store.expected_clusters(),
            },
        },
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready - Readiness check
///
/// Returns 200 once every expected cluster bundle is loaded, loading the missing ones if
/// needed, and 503 if any of them cannot be loaded.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let failures = state.forecaster.policy().store().preload().await;
    if failures.is_empty() {
        StatusCode::OK
    } else {
        tracing::warn!(failed = failures.len(), "not ready: model bundles missing");
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live - Liveness check
pub async fn liveness_check() -> impl IntoResponse {
    StatusCode::OK
}
