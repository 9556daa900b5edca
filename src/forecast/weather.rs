//! Weather inputs for the feature builder
//!
//! The models need hourly wind speed, wind direction and temperature at the turbine. The
//! source is injected behind [`WeatherProvider`]; the bundled [`SyntheticWeather`] derives a
//! deterministic series from the turbine id and its cluster's behavior profile.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::PI;

use crate::domain::{ClusterId, ClusterProfile, TurbineContext};

/// Wind speed (m/s) corresponding to a normalized wind level of 1.0
const WIND_SCALE_MS: f64 = 20.0;

/// Hourly weather at a turbine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    pub timestamp: DateTime<Utc>,
    pub wind_speed_ms: f64,
    /// Bearing the wind blows from, degrees clockwise from north
    pub wind_direction_deg: f64,
    pub temperature_c: f64,
}

impl WeatherSample {
    pub fn is_finite(&self) -> bool {
        self.wind_speed_ms.is_finite()
            && self.wind_direction_deg.is_finite()
            && self.temperature_c.is_finite()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Hourly samples starting at `ctx.start_time`, one per hour offset
    async fn hourly(&self, ctx: &TurbineContext, hours: usize) -> Result<Vec<WeatherSample>>;
}

/// Deterministic weather derived from cluster behavior profiles.
///
/// Same turbine, cluster and start time always give the same series.
#[derive(Debug, Clone)]
pub struct SyntheticWeather {
    profiles: HashMap<ClusterId, ClusterProfile>,
}

impl SyntheticWeather {
    pub fn new(profiles: impl IntoIterator<Item = (ClusterId, ClusterProfile)>) -> Self {
        Self {
            profiles: profiles.into_iter().collect(),
        }
    }

    fn profile(&self, cluster: ClusterId) -> ClusterProfile {
        self.profiles
            .get(&cluster)
            .cloned()
            .unwrap_or_else(ClusterProfile::baseline)
    }

    fn seed(ctx: &TurbineContext) -> u64 {
        let chars: u64 = ctx.turbine_id.chars().map(|c| c as u64).sum();
        chars % 10_000 + u64::from(ctx.cluster_id.value()) * 1000
    }

    /// Normalized wind levels (0..1) with a mid-afternoon diurnal peak, smoothed over a
    /// 5-hour window and with occasional low-wind events.
    fn wind_levels(
        &self,
        profile: &ClusterProfile,
        start: DateTime<Utc>,
        hours: usize,
        rng: &mut StdRng,
    ) -> Result<Vec<f64>> {
        let base = 0.4 + profile.power_level * 0.1;
        let volatility = (0.10 + profile.volatility * 0.03).max(0.02);
        let noise = Normal::new(0.0, volatility * 0.3).context("invalid wind noise")?;

        let raw: Vec<f64> = (0..hours)
            .map(|h| {
                let clock = (start + Duration::hours(h as i64)).hour() as f64;
                let diurnal = 0.15 * (2.0 * PI * clock / 24.0 - PI / 3.0).sin();
                (base + diurnal + noise.sample(&mut *rng)).clamp(0.15, 0.95)
            })
            .collect();

        let mut smoothed: Vec<f64> = (0..hours)
            .map(|i| {
                let window = &raw[i.saturating_sub(2)..(i + 3).min(hours)];
                window.iter().sum::<f64>() / window.len() as f64
            })
            .collect();

        for level in smoothed.iter_mut() {
            if rng.gen::<f64>() < profile.downtime / 50.0 {
                *level *= 0.6 + rng.gen::<f64>() * 0.2;
            }
        }

        if profile.is_ramp_dominated() {
            let intensity = 0.5 + profile.ramp * 0.15;
            for (h, level) in smoothed.iter_mut().enumerate() {
                let clock = (start + Duration::hours(h as i64)).hour() as f64;
                let angle = 2.0 * PI * clock / 24.0;
                *level = (*level + 0.08 * (angle * intensity).sin()).clamp(0.0, 1.0);
            }
        }

        Ok(smoothed)
    }
}

#[async_trait]
impl WeatherProvider for SyntheticWeather {
    async fn hourly(&self, ctx: &TurbineContext, hours: usize) -> Result<Vec<WeatherSample>> {
        let profile = self.profile(ctx.cluster_id);
        let mut rng = StdRng::seed_from_u64(Self::seed(ctx));

        let wind = self.wind_levels(&profile, ctx.start_time, hours, &mut rng)?;
        let prevailing = rng.gen_range(0.0..360.0);
        let temp_noise = Normal::new(0.0, 0.5).context("invalid temperature noise")?;

        // seasonal mean peaks mid-July
        let day_of_year = ctx.start_time.ordinal() as f64;
        let seasonal = 8.0 + 10.0 * (2.0 * PI * (day_of_year - 196.0) / 365.25).cos();

        Ok(wind
            .into_iter()
            .enumerate()
            .map(|(h, level)| {
                let timestamp = ctx.start_time + Duration::hours(h as i64);
                let clock = timestamp.hour() as f64;
                let veer = 20.0 * (PI * clock / 24.0).sin();
                WeatherSample {
                    timestamp,
                    wind_speed_ms: level * WIND_SCALE_MS,
                    wind_direction_deg: (prevailing + veer).rem_euclid(360.0),
                    temperature_c: seasonal
                        + 4.0 * (2.0 * PI * (clock - 9.0) / 24.0).sin()
                        + temp_noise.sample(&mut rng),
                }
            })
            .collect())
    }
}

/// Fixed weather for every hour, for deployments without a weather feed.
#[derive(Debug, Clone, Copy)]
pub struct ConstantWeather {
    pub wind_speed_ms: f64,
    pub wind_direction_deg: f64,
    pub temperature_c: f64,
}

impl Default for ConstantWeather {
    fn default() -> Self {
        Self {
            wind_speed_ms: 8.0,
            wind_direction_deg: 225.0,
            temperature_c: 10.0,
        }
    }
}

#[async_trait]
impl WeatherProvider for ConstantWeather {
    async fn hourly(&self, ctx: &TurbineContext, hours: usize) -> Result<Vec<WeatherSample>> {
        Ok((0..hours)
            .map(|h| WeatherSample {
                timestamp: ctx.start_time + Duration::hours(h as i64),
                wind_speed_ms: self.wind_speed_ms,
                wind_direction_deg: self.wind_direction_deg,
                temperature_c: self.temperature_c,
            })
            .collect())
    }
}
