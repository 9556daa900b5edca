use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ClusterId;

/// Fixed forecast length in hours.
pub const HORIZON_HOURS: usize = 24;

/// Per-request description of the turbine being forecast. Not persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct TurbineContext {
    pub turbine_id: String,
    pub cluster_id: ClusterId,
    /// Rated capacity (MW)
    pub capacity_mw: f64,
    pub start_time: DateTime<Utc>,
}

impl TurbineContext {
    pub fn new(
        turbine_id: impl Into<String>,
        cluster_id: ClusterId,
        capacity_mw: f64,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            turbine_id: turbine_id.into(),
            cluster_id,
            capacity_mw,
            start_time,
        }
    }
}

/// Forecast power for one hour offset from the start time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionPoint {
    /// Offset from the start time (0-23)
    pub hour: u32,
    /// Power (MW), never negative
    pub power: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurbineForecast {
    pub turbine_id: String,
    pub cluster_id: ClusterId,
    pub predictions: Vec<PredictionPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineStatus {
    pub turbine_id: String,
    pub cluster_id: ClusterId,
    pub status_message: String,
}

/// Outcome of a forecast request: either a full 24h forecast, or a status message for a
/// cluster that is offline by design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForecastResult {
    Forecast(TurbineForecast),
    Offline(OfflineStatus),
}

impl ForecastResult {
    pub fn turbine_id(&self) -> &str {
        match self {
            Self::Forecast(f) => &f.turbine_id,
            Self::Offline(o) => &o.turbine_id,
        }
    }

    pub fn cluster_id(&self) -> ClusterId {
        match self {
            Self::Forecast(f) => f.cluster_id,
            Self::Offline(o) => o.cluster_id,
        }
    }

    pub fn predictions(&self) -> Option<&[PredictionPoint]> {
        match self {
            Self::Forecast(f) => Some(&f.predictions),
            Self::Offline(_) => None,
        }
    }

    pub fn status_message(&self) -> Option<&str> {
        match self {
            Self::Forecast(_) => None,
            Self::Offline(o) => Some(&o.status_message),
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline(_))
    }
}
