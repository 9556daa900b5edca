//! Sustained concurrent forecast traffic across every cluster.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

use crate::common::{start_time, test_config, BundleDir, CountingLoader, MODEL_CLUSTERS};
use wind_power_forecast::app::AppState;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn test_mixed_cluster_load() {
    let dir = BundleDir::with_all_clusters();
    let loader = Arc::new(CountingLoader::new(&dir, Duration::from_millis(20)));
    let state = AppState::with_parts(
        test_config(&dir),
        loader.clone(),
        crate::common::synthetic_weather(),
    )
    .unwrap();

    let started = Instant::now();
    let mut tasks = JoinSet::new();
    for i in 0..500u32 {
        let state = state.clone();
        // every seventh request goes to the offline cluster
        let cluster = if i % 7 == 0 {
            1
        } else {
            MODEL_CLUSTERS[i as usize % MODEL_CLUSTERS.len()]
        };
        tasks.spawn(async move {
            state
                .forecaster
                .forecast(&format!("T{:03}", i % 120), i64::from(cluster), 3.0, start_time())
                .await
        });
    }

    let mut completed = 0;
    while let Some(result) = tasks.join_next().await {
        assert!(result.unwrap().is_ok());
        completed += 1;
    }

    let elapsed = started.elapsed();
    println!("{completed} forecasts in {elapsed:?}");
    assert_eq!(completed, 500);
    assert_eq!(loader.count(), MODEL_CLUSTERS.len());
    assert!(elapsed < Duration::from_secs(30));
}
