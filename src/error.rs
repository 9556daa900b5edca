use thiserror::Error;

use crate::domain::ClusterId;

/// Failures of a forecast request. Each variant is a distinct outcome so the transport
/// layer can pick status codes; an offline cluster is not an error and has no variant.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Unknown cluster: {0}")]
    UnknownCluster(i64),

    #[error("Model unavailable for cluster {cluster}: {reason}")]
    ModelUnavailable { cluster: ClusterId, reason: String },

    #[error("Feature build failed: {0}")]
    FeatureBuildFailure(String),

    #[error("Non-finite model output at hour {hour}, channel {channel}")]
    InferenceNumericFailure { hour: usize, channel: usize },
}

impl ForecastError {
    /// Short stable name of the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownCluster(_) => "UnknownCluster",
            Self::ModelUnavailable { .. } => "ModelUnavailable",
            Self::FeatureBuildFailure(_) => "FeatureBuildFailure",
            Self::InferenceNumericFailure { .. } => "InferenceNumericFailure",
        }
    }
}
