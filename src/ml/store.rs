//! Model Store
//!
//! Process-wide cache of model bundles, one slot per known cluster. Each slot is its own
//! initialization guard, so a slow first load of one cluster never holds up requests for
//! another, and reads of an already loaded bundle take no lock at all.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::bundle::{BundleLoader, ModelBundle};
use crate::domain::ClusterId;

/// The bundle for a cluster could not be loaded (missing or corrupt).
#[derive(Debug, Clone, Error)]
#[error("Bundle not found for cluster {cluster}: {reason}")]
pub struct BundleNotFound {
    pub cluster: ClusterId,
    pub reason: String,
}

pub struct ModelStore {
    loader: Arc<dyn BundleLoader>,
    slots: HashMap<ClusterId, Arc<OnceCell<Arc<ModelBundle>>>>,
}

impl ModelStore {
    /// Create a store with one empty slot per cluster that is expected to have a model.
    pub fn new(
        loader: Arc<dyn BundleLoader>,
        clusters: impl IntoIterator<Item = ClusterId>,
    ) -> Self {
        Self {
            loader,
            slots: clusters
                .into_iter()
                .map(|c| (c, Arc::new(OnceCell::new())))
                .collect(),
        }
    }

    /// Get the bundle for a cluster, loading it on first use.
    ///
    /// Concurrent first callers share a single load. The load runs in its own task, so a
    /// caller that is dropped mid-load does not abandon it. A failed load is not cached,
    /// so a later call tries again.
    pub async fn get_bundle(&self, cluster: ClusterId) -> Result<Arc<ModelBundle>, BundleNotFound> {
        let slot = self.slots.get(&cluster).ok_or_else(|| BundleNotFound {
            cluster,
            reason: "no model slot for this cluster".to_string(),
        })?;
        if let Some(bundle) = slot.get() {
            return Ok(Arc::clone(bundle));
        }

        let slot = Arc::clone(slot);
        let loader = Arc::clone(&self.loader);
        let init = tokio::spawn(async move {
            let bundle = slot
                .get_or_try_init(|| load_bundle(loader, cluster))
                .await
                .map(Arc::clone);
            bundle
        });

        match init.await {
            Ok(result) => result,
            Err(e) => Err(BundleNotFound {
                cluster,
                reason: format!("bundle init task failed: {e}"),
            }),
        }
    }

    /// Clusters whose bundle is currently cached, in ascending order
    pub fn loaded_clusters(&self) -> Vec<ClusterId> {
        let mut loaded: Vec<ClusterId> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(c, _)| *c)
            .collect();
        loaded.sort();
        loaded
    }

    /// Clusters this store can hold a bundle for, in ascending order
    pub fn expected_clusters(&self) -> Vec<ClusterId> {
        let mut clusters: Vec<ClusterId> = self.slots.keys().copied().collect();
        clusters.sort();
        clusters
    }

    pub fn is_loaded(&self, cluster: ClusterId) -> bool {
        self.slots
            .get(&cluster)
            .map(|slot| slot.initialized())
            .unwrap_or(false)
    }

    /// Load every expected cluster concurrently, returning the ones that failed.
    pub async fn preload(&self) -> Vec<BundleNotFound> {
        let loads = self
            .expected_clusters()
            .into_iter()
            .map(|c| self.get_bundle(c));
        futures::future::join_all(loads)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect()
    }
}

async fn load_bundle(
    loader: Arc<dyn BundleLoader>,
    cluster: ClusterId,
) -> Result<Arc<ModelBundle>, BundleNotFound> {
    let started = Instant::now();
    info!(%cluster, "loading model bundle");

    let loaded = match tokio::task::spawn_blocking(move || loader.load(cluster)).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(format!("loader task failed: {e}")),
    };

    match loaded {
        Ok(bundle) => {
            info!(
                %cluster,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "model bundle loaded"
            );
            Ok(Arc::new(bundle))
        }
        Err(reason) => {
            warn!(%cluster, error = %reason, "model bundle load failed");
            Err(BundleNotFound { cluster, reason })
        }
    }
}
