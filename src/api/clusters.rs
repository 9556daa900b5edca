use axum::{extract::State, Json};
use serde::Serialize;

use crate::{
    app::AppState,
    domain::{ClusterId, ClusterProfile},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    pub cluster_id: ClusterId,
    pub offline: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    pub model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ClusterProfile>,
}

/// GET /api/v1/clusters - Known clusters with their routing and load status
pub async fn list_clusters(State(state): State<AppState>) -> Json<Vec<ClusterInfo>> {
    let policy = state.forecaster.policy();

    Json(
        policy
            .known_clusters()
            .map(|cluster| {
                let status_message = policy.offline_reason(cluster).map(str::to_string);
                ClusterInfo {
                    cluster_id: cluster,
                    offline: status_message.is_some(),
                    status_message,
                    model_loaded: policy.store().is_loaded(cluster),
                    profile: state.profiles.get(&cluster).cloned(),
                }
            })
            .collect(),
    )
}
