use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, WeatherSource};
use crate::domain::{ClusterId, ClusterProfile};
use crate::forecast::{
    ClusterPolicy, ConstantWeather, FeatureBuilder, Forecaster, OutputShaping, SyntheticWeather,
    WeatherProvider,
};
use crate::ml::{BundleLoader, FsBundleLoader, InferenceEngine, ModelStore};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub forecaster: Arc<Forecaster>,
    /// Configured cluster profiles, as handed to the synthetic weather source
    pub profiles: Arc<HashMap<ClusterId, ClusterProfile>>,
}

impl AppState {
    /// Wire the service from configuration: bundles from the models directory, weather
    /// from the configured source.
    pub async fn new(cfg: Config) -> Result<Self> {
        let loader = Arc::new(FsBundleLoader::new(
            cfg.models.dir.clone(),
            cfg.models.file_pattern.clone(),
        ));
        let weather: Arc<dyn WeatherProvider> = match cfg.forecast.weather {
            WeatherSource::Synthetic => {
                Arc::new(SyntheticWeather::new(cfg.clusters.cluster_profiles()?))
            }
            WeatherSource::Constant => Arc::new(ConstantWeather::default()),
        };
        info!(
            dir = %cfg.models.dir.display(),
            pattern = %cfg.models.file_pattern,
            weather = ?cfg.forecast.weather,
            "model store configured"
        );

        let state = Self::with_parts(cfg, loader, weather)?;
        if state.cfg.models.preload {
            state.preload().await;
        }
        Ok(state)
    }

    /// Wire the service around an explicit bundle loader and weather source.
    pub fn with_parts(
        cfg: Config,
        loader: Arc<dyn BundleLoader>,
        weather: Arc<dyn WeatherProvider>,
    ) -> Result<Self> {
        let known = cfg.clusters.known_clusters();
        let offline = cfg.clusters.offline_clusters()?;
        let profiles = Arc::new(cfg.clusters.cluster_profiles()?.into_iter().collect());
        let model_clusters: Vec<_> = known
            .iter()
            .copied()
            .filter(|c| !offline.iter().any(|(o, _)| o == c))
            .collect();

        let store = Arc::new(ModelStore::new(loader, model_clusters));
        let policy = Arc::new(ClusterPolicy::new(known, offline, store));
        let shaping = OutputShaping {
            smoothing_alpha: cfg.forecast.smoothing_alpha,
            decimals: cfg.forecast.decimals,
        };
        let forecaster = Arc::new(Forecaster::new(
            policy,
            weather,
            FeatureBuilder::new(cfg.forecast.age_years),
            InferenceEngine::new(cfg.forecast.scaler_scope),
            shaping,
        ));

        Ok(Self {
            cfg,
            forecaster,
            profiles,
        })
    }

    /// Load every cluster bundle up front. Failures are logged; those clusters are
    /// retried on first request.
    pub async fn preload(&self) {
        let failures = self.forecaster.policy().store().preload().await;
        for f in &failures {
            warn!(cluster = %f.cluster, reason = %f.reason, "bundle preload failed");
        }
        info!(
            loaded = self.forecaster.loaded_clusters().len(),
            failed = failures.len(),
            "bundle preload finished"
        );
    }
}
