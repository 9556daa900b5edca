//! Feature engineering for the turbine models
//!
//! Builds the raw (physical unit) feature frame for the forecast horizon, one row per hour
//! offset, columns in [`crate::ml::FEATURE_NAMES`] order.

use chrono::{DateTime, Duration, Timelike, Utc};
use ndarray::Array2;
use std::f64::consts::PI;

use super::weather::WeatherSample;
use crate::domain::{TurbineContext, HORIZON_HOURS};
use crate::error::ForecastError;
use crate::ml::{Scaler, FEATURE_COUNT};

/// Standard power curve (m/s)
const CUT_IN_MS: f64 = 3.0;
const RATED_MS: f64 = 12.0;
const CUT_OUT_MS: f64 = 25.0;

/// Fraction of the first hour's expected power used as the lag seed
const LAG_SEED_FACTOR: f64 = 0.8;

/// Expected output (MW) of a turbine of `capacity_mw` at `wind_ms`.
pub fn expected_power_mw(wind_ms: f64, capacity_mw: f64) -> f64 {
    if !(CUT_IN_MS..CUT_OUT_MS).contains(&wind_ms) {
        0.0
    } else if wind_ms >= RATED_MS {
        capacity_mw
    } else {
        capacity_mw * (wind_ms.powi(3) - CUT_IN_MS.powi(3)) / (RATED_MS.powi(3) - CUT_IN_MS.powi(3))
    }
}

/// Hour-of-day encoding on the unit circle
pub fn hour_encoding(timestamp: DateTime<Utc>) -> (f64, f64) {
    let angle = 2.0 * PI * timestamp.hour() as f64 / 24.0;
    (angle.sin(), angle.cos())
}

#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    /// Turbine age is not part of the request; every turbine gets this placeholder
    age_years: f64,
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self { age_years: 8.0 }
    }
}

impl FeatureBuilder {
    pub fn new(age_years: f64) -> Self {
        Self { age_years }
    }

    pub fn age_years(&self) -> f64 {
        self.age_years
    }

    fn validate(&self, ctx: &TurbineContext, weather: &[WeatherSample]) -> Result<(), ForecastError> {
        if ctx.turbine_id.trim().is_empty() {
            return Err(ForecastError::FeatureBuildFailure(
                "turbine id is empty".to_string(),
            ));
        }
        if !ctx.capacity_mw.is_finite() || ctx.capacity_mw <= 0.0 {
            return Err(ForecastError::FeatureBuildFailure(format!(
                "capacity must be a positive number of MW, got {}",
                ctx.capacity_mw
            )));
        }
        if !self.age_years.is_finite() || self.age_years < 0.0 {
            return Err(ForecastError::FeatureBuildFailure(format!(
                "invalid turbine age {}",
                self.age_years
            )));
        }
        if weather.len() < HORIZON_HOURS {
            return Err(ForecastError::FeatureBuildFailure(format!(
                "weather covers {} hours, need {}",
                weather.len(),
                HORIZON_HOURS
            )));
        }
        Ok(())
    }

    fn sample(
        ctx: &TurbineContext,
        weather: &[WeatherSample],
        hour: usize,
    ) -> Result<WeatherSample, ForecastError> {
        let sample = weather.get(hour).copied().ok_or_else(|| {
            ForecastError::FeatureBuildFailure(format!("no weather for hour {hour}"))
        })?;
        let expected = ctx.start_time + Duration::hours(hour as i64);
        if sample.timestamp != expected {
            return Err(ForecastError::FeatureBuildFailure(format!(
                "weather for hour {hour} is stamped {}, expected {}",
                sample.timestamp, expected
            )));
        }
        if !sample.is_finite() {
            return Err(ForecastError::FeatureBuildFailure(format!(
                "non-finite weather at hour {hour}"
            )));
        }
        Ok(sample)
    }

    /// Raw feature vector for one hour offset.
    pub fn build(
        &self,
        ctx: &TurbineContext,
        weather: &[WeatherSample],
        hour: usize,
    ) -> Result<[f64; FEATURE_COUNT], ForecastError> {
        if hour >= HORIZON_HOURS {
            return Err(ForecastError::FeatureBuildFailure(format!(
                "hour offset {hour} outside the {HORIZON_HOURS}h horizon"
            )));
        }
        self.validate(ctx, weather)?;

        let current = Self::sample(ctx, weather, hour)?;
        let power_lag = if hour == 0 {
            LAG_SEED_FACTOR * expected_power_mw(current.wind_speed_ms, ctx.capacity_mw)
        } else {
            let previous = Self::sample(ctx, weather, hour - 1)?;
            expected_power_mw(previous.wind_speed_ms, ctx.capacity_mw)
        };

        let bearing = current.wind_direction_deg.to_radians();
        let (hour_sin, hour_cos) = hour_encoding(current.timestamp);

        Ok([
            current.wind_speed_ms,
            bearing.sin(),
            bearing.cos(),
            current.temperature_c,
            hour_sin,
            hour_cos,
            ctx.capacity_mw,
            self.age_years,
            power_lag,
        ])
    }

    /// Full horizon, rows ordered by increasing hour offset.
    pub fn build_frame(
        &self,
        ctx: &TurbineContext,
        weather: &[WeatherSample],
    ) -> Result<Array2<f64>, ForecastError> {
        let mut frame = Array2::<f64>::zeros((HORIZON_HOURS, FEATURE_COUNT));
        for hour in 0..HORIZON_HOURS {
            let row = self.build(ctx, weather, hour)?;
            for (col, value) in row.into_iter().enumerate() {
                frame[[hour, col]] = value;
            }
        }
        Ok(frame)
    }

    /// Physical ranges of each feature, used to normalize inputs when a bundle carries
    /// no input scaler for the turbine.
    pub fn reference_scaler(&self, capacity_mw: f64) -> Scaler {
        let capacity = capacity_mw.max(0.0);
        let min = vec![0.0, -1.0, -1.0, -30.0, -1.0, -1.0, 0.0, 0.0, 0.0];
        let max = vec![
            CUT_OUT_MS + 5.0,
            1.0,
            1.0,
            45.0,
            1.0,
            1.0,
            10.0_f64.max(capacity),
            30.0_f64.max(self.age_years),
            capacity,
        ];
        Scaler::new(min, max).unwrap_or_else(|_| Scaler::identity(FEATURE_COUNT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ClusterId;
    use chrono::TimeZone;
    use rstest::rstest;

    fn ctx(start: DateTime<Utc>) -> TurbineContext {
        TurbineContext::new("T000", ClusterId(3), 3.2, start)
    }

    fn weather(start: DateTime<Utc>, wind: f64) -> Vec<WeatherSample> {
        (0..HORIZON_HOURS)
            .map(|h| WeatherSample {
                timestamp: start + Duration::hours(h as i64),
                wind_speed_ms: wind + h as f64 * 0.25,
                wind_direction_deg: 90.0,
                temperature_c: 5.0,
            })
            .collect()
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(2.9, 0.0)]
    #[case(12.0, 3.0)]
    #[case(20.0, 3.0)]
    #[case(25.0, 0.0)]
    fn test_power_curve(#[case] wind: f64, #[case] expected: f64) {
        assert!((expected_power_mw(wind, 3.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_power_curve_is_monotonic_below_rated() {
        let mut last = 0.0;
        for step in 30..=120 {
            let p = expected_power_mw(step as f64 / 10.0, 2.0);
            assert!(p >= last);
            last = p;
        }
    }

    #[test]
    fn test_frame_shape_and_order() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 22, 0, 0).unwrap();
        let builder = FeatureBuilder::default();
        let frame = builder.build_frame(&ctx(start), &weather(start, 6.0)).unwrap();

        assert_eq!(frame.shape(), &[HORIZON_HOURS, FEATURE_COUNT]);
        // hour offset 2 from 22:00 is midnight
        assert!((frame[[2, 4]] - 0.0).abs() < 1e-12);
        assert!((frame[[2, 5]] - 1.0).abs() < 1e-12);
        for row in frame.rows() {
            let norm = row[4].powi(2) + row[5].powi(2);
            assert!((norm - 1.0).abs() < 1e-12);
            assert_eq!(row[6], 3.2);
            assert_eq!(row[7], 8.0);
        }
    }

    #[test]
    fn test_wind_direction_encoding() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let row = FeatureBuilder::default()
            .build(&ctx(start), &weather(start, 6.0), 0)
            .unwrap();
        assert!((row[1] - 1.0).abs() < 1e-12);
        assert!(row[2].abs() < 1e-12);
    }

    #[test]
    fn test_power_lag_chain() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let c = ctx(start);
        let w = weather(start, 6.0);
        let builder = FeatureBuilder::default();

        let first = builder.build(&c, &w, 0).unwrap();
        assert!((first[8] - 0.8 * expected_power_mw(6.0, 3.2)).abs() < 1e-12);

        let fifth = builder.build(&c, &w, 5).unwrap();
        assert!((fifth[8] - expected_power_mw(w[4].wind_speed_ms, 3.2)).abs() < 1e-12);
    }

    #[test]
    fn test_build_is_deterministic() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
        let builder = FeatureBuilder::new(12.0);
        let a = builder.build_frame(&ctx(start), &weather(start, 4.0)).unwrap();
        let b = builder.build_frame(&ctx(start), &weather(start, 4.0)).unwrap();
        assert_eq!(a, b);
    }

    #[rstest]
    #[case::zero_capacity(0.0)]
    #[case::negative_capacity(-1.0)]
    #[case::nan_capacity(f64::NAN)]
    fn test_invalid_capacity(#[case] capacity: f64) {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let c = TurbineContext::new("T000", ClusterId(3), capacity, start);
        let err = FeatureBuilder::default()
            .build_frame(&c, &weather(start, 6.0))
            .unwrap_err();
        assert!(matches!(err, ForecastError::FeatureBuildFailure(_)));
    }

    #[test]
    fn test_short_weather_fails() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let mut w = weather(start, 6.0);
        w.truncate(20);
        assert!(FeatureBuilder::default().build_frame(&ctx(start), &w).is_err());
    }

    #[test]
    fn test_misaligned_weather_fails() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let w = weather(start + Duration::hours(1), 6.0);
        let err = FeatureBuilder::default()
            .build_frame(&ctx(start), &w)
            .unwrap_err();
        assert!(err.to_string().contains("stamped"));
    }

    #[test]
    fn test_non_finite_weather_fails() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let mut w = weather(start, 6.0);
        w[10].temperature_c = f64::INFINITY;
        assert!(FeatureBuilder::default().build_frame(&ctx(start), &w).is_err());
    }

    #[test]
    fn test_hour_out_of_horizon() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let err = FeatureBuilder::default()
            .build(&ctx(start), &weather(start, 6.0), 24)
            .unwrap_err();
        assert!(matches!(err, ForecastError::FeatureBuildFailure(_)));
    }

    #[test]
    fn test_reference_scaler_covers_capacity() {
        let s = FeatureBuilder::default().reference_scaler(3.2);
        assert_eq!(s.width(), FEATURE_COUNT);
        assert_eq!(s.max()[8], 3.2);
        assert!((s.encode_value(8, 1.6) - 0.5).abs() < 1e-12);
    }
}
