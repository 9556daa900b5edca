//! Cluster Behavior Policy
//!
//! Static routing of clusters: a cluster is either served by its trained model or is
//! offline by design. The offline decision lives here and nowhere else.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use crate::domain::ClusterId;
use crate::error::ForecastError;
use crate::ml::{ModelBundle, ModelStore};

/// Routing decision for one cluster.
#[derive(Debug, Clone)]
pub enum Route {
    RunInference(Arc<ModelBundle>),
    Offline(String),
}

pub struct ClusterPolicy {
    known: BTreeSet<ClusterId>,
    offline: BTreeMap<ClusterId, String>,
    store: Arc<ModelStore>,
}

impl ClusterPolicy {
    /// Offline clusters are always treated as known.
    pub fn new(
        known: impl IntoIterator<Item = ClusterId>,
        offline: impl IntoIterator<Item = (ClusterId, String)>,
        store: Arc<ModelStore>,
    ) -> Self {
        let offline: BTreeMap<ClusterId, String> = offline.into_iter().collect();
        let mut known: BTreeSet<ClusterId> = known.into_iter().collect();
        known.extend(offline.keys().copied());
        Self {
            known,
            offline,
            store,
        }
    }

    pub fn known_clusters(&self) -> impl Iterator<Item = ClusterId> + '_ {
        self.known.iter().copied()
    }

    pub fn offline_reason(&self, cluster: ClusterId) -> Option<&str> {
        self.offline.get(&cluster).map(String::as_str)
    }

    /// Clusters expected to have a trained model
    pub fn model_clusters(&self) -> Vec<ClusterId> {
        self.known
            .iter()
            .filter(|c| !self.offline.contains_key(c))
            .copied()
            .collect()
    }

    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    /// Map a caller-supplied cluster number onto a known cluster.
    pub fn resolve(&self, raw: i64) -> Result<ClusterId, ForecastError> {
        u32::try_from(raw)
            .ok()
            .map(ClusterId)
            .filter(|c| self.known.contains(c))
            .ok_or(ForecastError::UnknownCluster(raw))
    }

    pub async fn route(&self, cluster: ClusterId) -> Result<Route, ForecastError> {
        if !self.known.contains(&cluster) {
            return Err(ForecastError::UnknownCluster(i64::from(cluster.value())));
        }
        if let Some(reason) = self.offline.get(&cluster) {
            debug!(%cluster, "cluster is offline by policy");
            return Ok(Route::Offline(reason.clone()));
        }

        let bundle = self
            .store
            .get_bundle(cluster)
            .await
            .map_err(|e| ForecastError::ModelUnavailable {
                cluster,
                reason: e.reason,
            })?;
        Ok(Route::RunInference(bundle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{
        BundleError, BundleLoader, BundleMetadata, LstmModel, Scaler, ScalerSet, FEATURE_COUNT,
        OUTPUT_CHANNELS,
    };

    /// Serves a model for every cluster except 4, whose file is "missing".
    struct Loader;

    impl BundleLoader for Loader {
        fn load(&self, cluster: ClusterId) -> Result<ModelBundle, BundleError> {
            if cluster == ClusterId(4) {
                return Err(BundleError::Invalid("bundle file missing".to_string()));
            }
            ModelBundle::new(
                cluster,
                Arc::new(LstmModel::seeded(FEATURE_COUNT, 4, 1, OUTPUT_CHANNELS, 2)),
                ScalerSet::shared(Scaler::identity(FEATURE_COUNT)),
                ScalerSet::default(),
                BundleMetadata::default(),
            )
        }
    }

    fn policy() -> ClusterPolicy {
        let known: Vec<ClusterId> = (0..=6).map(ClusterId).collect();
        let offline = vec![(ClusterId(1), "Cluster 1 is offline for maintenance".to_string())];
        let model_clusters: Vec<ClusterId> =
            known.iter().copied().filter(|c| *c != ClusterId(1)).collect();
        let store = Arc::new(ModelStore::new(Arc::new(Loader), model_clusters));
        ClusterPolicy::new(known, offline, store)
    }

    #[tokio::test]
    async fn test_offline_cluster_routes_to_offline() {
        let p = policy();
        match p.route(ClusterId(1)).await.unwrap() {
            Route::Offline(reason) => assert!(reason.contains("maintenance")),
            Route::RunInference(_) => panic!("offline cluster must not run inference"),
        }
        assert!(p.store().loaded_clusters().is_empty());
    }

    #[tokio::test]
    async fn test_model_cluster_routes_to_inference() {
        let p = policy();
        match p.route(ClusterId(3)).await.unwrap() {
            Route::RunInference(bundle) => assert_eq!(bundle.cluster_id, ClusterId(3)),
            Route::Offline(_) => panic!("cluster 3 has a model"),
        }
    }

    #[tokio::test]
    async fn test_missing_bundle_is_model_unavailable() {
        let err = policy().route(ClusterId(4)).await.unwrap_err();
        assert!(matches!(
            err,
            ForecastError::ModelUnavailable {
                cluster: ClusterId(4),
                ..
            }
        ));
    }

    #[test]
    fn test_resolve() {
        let p = policy();
        assert_eq!(p.resolve(3).unwrap(), ClusterId(3));
        assert!(matches!(p.resolve(99), Err(ForecastError::UnknownCluster(99))));
        assert!(matches!(p.resolve(-1), Err(ForecastError::UnknownCluster(-1))));
    }

    #[test]
    fn test_model_clusters_exclude_offline() {
        let p = policy();
        let clusters: Vec<u32> = p.model_clusters().iter().map(ClusterId::value).collect();
        assert_eq!(clusters, vec![0, 2, 3, 4, 5, 6]);
        assert_eq!(p.known_clusters().count(), 7);
    }
}
