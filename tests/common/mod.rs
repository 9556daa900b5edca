#![allow(dead_code)]
//! Shared fixtures: bundle files generated from seeded weights in a throwaway directory.

use chrono::{DateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use wind_power_forecast::{
    app::AppState,
    config::Config,
    domain::ClusterId,
    forecast::{ConstantWeather, FeatureBuilder, SyntheticWeather, WeatherProvider},
    ml::{
        BundleDocument, BundleError, BundleLoader, BundleMetadata, FsBundleLoader, LstmModel,
        ModelBundle, PowerUnit, Scaler, ScalerSet, FEATURE_COUNT, OUTPUT_CHANNELS,
    },
};

pub const MODEL_CLUSTERS: [u32; 6] = [0, 2, 3, 4, 5, 6];

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
}

/// Temporary models directory, removed on drop.
pub struct BundleDir {
    dir: TempDir,
}

impl BundleDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::Builder::new()
                .prefix("wpf-bundles-")
                .tempdir()
                .unwrap(),
        }
    }

    /// Directory with a bundle for every cluster that has a model
    pub fn with_all_clusters() -> Self {
        let dir = Self::new();
        for c in MODEL_CLUSTERS {
            dir.write_cluster(c);
        }
        dir
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file_for(&self, cluster: u32) -> PathBuf {
        self.path().join(format!("full_model_cluster{cluster}.json"))
    }

    pub fn write_cluster(&self, cluster: u32) {
        let model = LstmModel::seeded(FEATURE_COUNT, 32, 2, OUTPUT_CHANNELS, 100 + u64::from(cluster));
        let inputs = FeatureBuilder::default().reference_scaler(3.0);
        let outputs = Scaler::new(vec![0.0, 0.0, -40.0], vec![3000.0, 25.0, 40.0]).unwrap();
        let doc = BundleDocument::new(
            ClusterId(cluster),
            &model,
            ScalerSet::shared(inputs.clone()).with_turbine("T000", inputs),
            ScalerSet::shared(outputs),
            BundleMetadata {
                power_channel: 0,
                power_unit: PowerUnit::Kw,
                version: Some("test".to_string()),
                trained_at: None,
            },
        );
        self.write_raw(cluster, &doc.to_json().unwrap());
    }

    pub fn write_raw(&self, cluster: u32, contents: &str) {
        std::fs::write(self.file_for(cluster), contents).unwrap();
    }
}

pub fn test_config(dir: &BundleDir) -> Config {
    let mut cfg = Config::default();
    cfg.models.dir = dir.path().to_path_buf();
    cfg
}

/// Filesystem loader that counts loads and holds each one for a while, so concurrent
/// first requests overlap.
pub struct CountingLoader {
    inner: FsBundleLoader,
    delay: Duration,
    pub loads: AtomicUsize,
}

impl CountingLoader {
    pub fn new(dir: &BundleDir, delay: Duration) -> Self {
        Self {
            inner: FsBundleLoader::new(dir.path(), "full_model_cluster{cluster}.json"),
            delay,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl BundleLoader for CountingLoader {
    fn load(&self, cluster: ClusterId) -> Result<ModelBundle, BundleError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.inner.load(cluster)
    }
}

pub fn synthetic_weather() -> Arc<dyn WeatherProvider> {
    let profiles = Config::default().clusters.cluster_profiles().unwrap();
    Arc::new(SyntheticWeather::new(profiles))
}

pub fn constant_weather() -> Arc<dyn WeatherProvider> {
    Arc::new(ConstantWeather::default())
}

pub fn app_state(dir: &BundleDir) -> AppState {
    app_state_with(test_config(dir))
}

pub fn app_state_with(cfg: Config) -> AppState {
    let loader = Arc::new(FsBundleLoader::new(
        cfg.models.dir.clone(),
        cfg.models.file_pattern.clone(),
    ));
    AppState::with_parts(cfg, loader, synthetic_weather()).unwrap()
}
