use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::Instrument;
use uuid::Uuid;
use validator::Validate;

use crate::{api::error::ApiError, app::AppState, domain::ForecastResult};

fn default_capacity() -> f64 {
    3.0
}

/// Body of a forecast request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PredictRequest {
    #[validate(length(min = 1, max = 64))]
    pub turbine_id: String,
    pub cluster_id: i64,
    pub start_time: String,
    /// Rated capacity in MW
    #[serde(default = "default_capacity")]
    #[validate(range(exclusive_min = 0.0, max = 100.0))]
    pub capacity: f64,
}

/// Parse an RFC 3339 timestamp; one without an offset is taken as UTC.
pub fn parse_start_time(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| ApiError::BadRequest(format!("startTime is not an ISO-8601 timestamp: {raw:?}")))
}

/// POST /api/v1/predict - 24h power forecast for one turbine
pub async fn predict(
    State(state): State<AppState>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<ForecastResult>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    req.validate()?;
    let start_time = parse_start_time(&req.start_time)?;

    let span = tracing::info_span!(
        "predict",
        request_id = %Uuid::new_v4(),
        turbine_id = %req.turbine_id,
        cluster = req.cluster_id,
    );
    let result = state
        .forecaster
        .forecast(&req.turbine_id, req.cluster_id, req.capacity, start_time)
        .instrument(span)
        .await?;

    Ok(Json(result))
}
