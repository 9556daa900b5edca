use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    features::FeatureBuilder,
    policy::{ClusterPolicy, Route},
    weather::WeatherProvider,
};
use crate::domain::{
    ClusterId, ForecastResult, OfflineStatus, PredictionPoint, TurbineContext, TurbineForecast,
    HORIZON_HOURS,
};
use crate::error::ForecastError;
use crate::ml::{InferenceEngine, ModelBundle};

/// Presentation of the decoded power series.
#[derive(Debug, Clone, Copy)]
pub struct OutputShaping {
    /// Exponential smoothing factor across the horizon; 1.0 leaves the series untouched
    pub smoothing_alpha: f64,
    pub decimals: u32,
}

impl Default for OutputShaping {
    fn default() -> Self {
        Self {
            smoothing_alpha: 1.0,
            decimals: 3,
        }
    }
}

impl OutputShaping {
    /// Clamp to [0, capacity], smooth, round.
    pub fn apply(&self, power: &[f64], capacity_mw: f64) -> Vec<f64> {
        let alpha = self.smoothing_alpha.clamp(0.0, 1.0);
        let scale = 10f64.powi(self.decimals as i32);

        let mut shaped: Vec<f64> = Vec::with_capacity(power.len());
        for p in power {
            let clamped = p.clamp(0.0, capacity_mw);
            let value = match shaped.last() {
                Some(prev) => alpha * clamped + (1.0 - alpha) * prev,
                None => clamped,
            };
            shaped.push(value);
        }
        shaped
            .into_iter()
            .map(|v| ((v * scale).round() / scale).clamp(0.0, capacity_mw))
            .collect()
    }
}

/// Forecast Orchestrator: the single entry point for turbine forecasts.
pub struct Forecaster {
    policy: Arc<ClusterPolicy>,
    weather: Arc<dyn WeatherProvider>,
    features: FeatureBuilder,
    engine: InferenceEngine,
    shaping: OutputShaping,
}

impl Forecaster {
    pub fn new(
        policy: Arc<ClusterPolicy>,
        weather: Arc<dyn WeatherProvider>,
        features: FeatureBuilder,
        engine: InferenceEngine,
        shaping: OutputShaping,
    ) -> Self {
        Self {
            policy,
            weather,
            features,
            engine,
            shaping,
        }
    }

    pub fn policy(&self) -> &Arc<ClusterPolicy> {
        &self.policy
    }

    /// Forecast the next 24 hours for one turbine.
    ///
    /// `cluster_id` is taken as supplied by the caller and checked against the known set.
    pub async fn forecast(
        &self,
        turbine_id: &str,
        cluster_id: i64,
        capacity_mw: f64,
        start_time: DateTime<Utc>,
    ) -> Result<ForecastResult, ForecastError> {
        let cluster = self.policy.resolve(cluster_id)?;
        let ctx = TurbineContext::new(turbine_id, cluster, capacity_mw, start_time);
        self.forecast_context(&ctx).await
    }

    pub async fn forecast_context(
        &self,
        ctx: &TurbineContext,
    ) -> Result<ForecastResult, ForecastError> {
        let result = match self.policy.route(ctx.cluster_id).await? {
            Route::Offline(reason) => {
                info!(
                    turbine_id = %ctx.turbine_id,
                    cluster = %ctx.cluster_id,
                    "cluster offline, no forecast produced"
                );
                Ok(ForecastResult::Offline(OfflineStatus {
                    turbine_id: ctx.turbine_id.clone(),
                    cluster_id: ctx.cluster_id,
                    status_message: reason,
                }))
            }
            Route::RunInference(bundle) => self
                .run_inference(ctx, &bundle)
                .await
                .map(ForecastResult::Forecast),
        };

        if let Err(e) = &result {
            warn!(
                turbine_id = %ctx.turbine_id,
                cluster = %ctx.cluster_id,
                kind = e.kind(),
                error = %e,
                "forecast failed"
            );
        }
        result
    }

    async fn run_inference(
        &self,
        ctx: &TurbineContext,
        bundle: &ModelBundle,
    ) -> Result<TurbineForecast, ForecastError> {
        let weather = self
            .weather
            .hourly(ctx, HORIZON_HOURS)
            .await
            .map_err(|e| ForecastError::FeatureBuildFailure(format!("weather unavailable: {e:#}")))?;

        let frame = self.features.build_frame(ctx, &weather)?;
        let reference = self.features.reference_scaler(ctx.capacity_mw);
        let power = self.engine.predict(
            bundle,
            &ctx.turbine_id,
            &frame,
            &reference,
            ctx.capacity_mw,
        )?;

        let predictions: Vec<PredictionPoint> = self
            .shaping
            .apply(&power, ctx.capacity_mw)
            .into_iter()
            .enumerate()
            .map(|(hour, power)| PredictionPoint {
                hour: hour as u32,
                power,
            })
            .collect();

        info!(
            turbine_id = %ctx.turbine_id,
            cluster = %ctx.cluster_id,
            start = %ctx.start_time,
            peak_mw = predictions.iter().map(|p| p.power).fold(0.0, f64::max),
            "forecast produced"
        );

        Ok(TurbineForecast {
            turbine_id: ctx.turbine_id.clone(),
            cluster_id: ctx.cluster_id,
            predictions,
        })
    }

    /// Clusters with a cached model bundle
    pub fn loaded_clusters(&self) -> Vec<ClusterId> {
        self.policy.store().loaded_clusters()
    }
}
