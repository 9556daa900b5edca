//! Min-max normalization
//!
//! Element-wise affine map between physical units and the [0, 1] range the models were
//! trained on. Decoding is the exact inverse and never clamps, so model outputs slightly
//! outside the training range pass through unchanged in formula.

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};
use thiserror::Error;

/// Ranges narrower than this are treated as constant features
const ZERO_RANGE: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScalerError {
    #[error("Scaler parameter count mismatch: {min} min values, {max} max values")]
    ParamMismatch { min: usize, max: usize },

    #[error("Scaler range inverted at feature {index}: min={min}, max={max}")]
    InvertedRange { index: usize, min: f64, max: f64 },

    #[error("Non-finite scaler parameter at feature {0}")]
    NonFinite(usize),

    #[error("Scale must be positive at feature {index}, got {scale}")]
    NonPositiveScale { index: usize, scale: f64 },

    #[error("Width mismatch: scaler has {expected} features, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },
}

/// Persisted scaler parameters. Bundles exported from scikit-learn carry `scale_`/`min_`
/// (`x' = x * scale + min`), hand-written ones carry the data range directly.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawScaler {
    Range {
        data_min: Vec<f64>,
        data_max: Vec<f64>,
    },
    Sklearn {
        #[serde(rename = "scale_")]
        scale: Vec<f64>,
        #[serde(rename = "min_")]
        offset: Vec<f64>,
    },
}

/// Per-feature min-max scaler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawScaler")]
pub struct Scaler {
    #[serde(rename = "data_min")]
    min: Vec<f64>,
    #[serde(rename = "data_max")]
    max: Vec<f64>,
}

impl TryFrom<RawScaler> for Scaler {
    type Error = ScalerError;

    fn try_from(raw: RawScaler) -> Result<Self, Self::Error> {
        match raw {
            RawScaler::Range { data_min, data_max } => Scaler::new(data_min, data_max),
            RawScaler::Sklearn { scale, offset } => Scaler::from_sklearn(&scale, &offset),
        }
    }
}

impl Scaler {
    pub fn new(min: Vec<f64>, max: Vec<f64>) -> Result<Self, ScalerError> {
        if min.len() != max.len() {
            return Err(ScalerError::ParamMismatch {
                min: min.len(),
                max: max.len(),
            });
        }
        for (index, (lo, hi)) in min.iter().zip(max.iter()).enumerate() {
            if !lo.is_finite() || !hi.is_finite() {
                return Err(ScalerError::NonFinite(index));
            }
            if hi < lo {
                return Err(ScalerError::InvertedRange {
                    index,
                    min: *lo,
                    max: *hi,
                });
            }
        }
        Ok(Self { min, max })
    }

    /// Convert scikit-learn `MinMaxScaler` parameters (feature range 0..1) into data ranges.
    pub fn from_sklearn(scale: &[f64], offset: &[f64]) -> Result<Self, ScalerError> {
        if scale.len() != offset.len() {
            return Err(ScalerError::ParamMismatch {
                min: offset.len(),
                max: scale.len(),
            });
        }
        let mut min = Vec::with_capacity(scale.len());
        let mut max = Vec::with_capacity(scale.len());
        for (index, (s, o)) in scale.iter().zip(offset.iter()).enumerate() {
            if !s.is_finite() || !o.is_finite() {
                return Err(ScalerError::NonFinite(index));
            }
            if *s <= 0.0 {
                return Err(ScalerError::NonPositiveScale { index, scale: *s });
            }
            let lo = -o / s;
            min.push(lo);
            max.push(lo + 1.0 / s);
        }
        Self::new(min, max)
    }

    /// Scaler that leaves every feature unchanged
    pub fn identity(width: usize) -> Self {
        Self {
            min: vec![0.0; width],
            max: vec![1.0; width],
        }
    }

    pub fn width(&self) -> usize {
        self.min.len()
    }

    pub fn min(&self) -> &[f64] {
        &self.min
    }

    pub fn max(&self) -> &[f64] {
        &self.max
    }

    fn range(&self, index: usize) -> Option<f64> {
        let range = self.max[index] - self.min[index];
        (range.abs() >= ZERO_RANGE).then_some(range)
    }

    fn check_width(&self, actual: usize) -> Result<(), ScalerError> {
        if actual != self.width() {
            return Err(ScalerError::WidthMismatch {
                expected: self.width(),
                actual,
            });
        }
        Ok(())
    }

    /// Normalize a single value of feature `index`. Zero-range features pass through.
    pub fn encode_value(&self, index: usize, raw: f64) -> f64 {
        match self.range(index) {
            Some(range) => (raw - self.min[index]) / range,
            None => raw,
        }
    }

    /// Inverse of [`Scaler::encode_value`]
    pub fn decode_value(&self, index: usize, normalized: f64) -> f64 {
        match self.range(index) {
            Some(range) => normalized * range + self.min[index],
            None => normalized,
        }
    }

    pub fn encode(&self, raw: &[f64]) -> Result<Vec<f64>, ScalerError> {
        self.check_width(raw.len())?;
        Ok(raw
            .iter()
            .enumerate()
            .map(|(i, v)| self.encode_value(i, *v))
            .collect())
    }

    pub fn decode(&self, normalized: &[f64]) -> Result<Vec<f64>, ScalerError> {
        self.check_width(normalized.len())?;
        Ok(normalized
            .iter()
            .enumerate()
            .map(|(i, v)| self.decode_value(i, *v))
            .collect())
    }

    /// Encode every row of a frame (rows = time steps, columns = features)
    pub fn encode_frame(&self, frame: &Array2<f64>) -> Result<Array2<f64>, ScalerError> {
        self.map_frame(frame, |i, v| self.encode_value(i, v))
    }

    pub fn decode_frame(&self, frame: &Array2<f64>) -> Result<Array2<f64>, ScalerError> {
        self.map_frame(frame, |i, v| self.decode_value(i, v))
    }

    fn map_frame(
        &self,
        frame: &Array2<f64>,
        f: impl Fn(usize, f64) -> f64,
    ) -> Result<Array2<f64>, ScalerError> {
        self.check_width(frame.ncols())?;
        let mut out = frame.clone();
        for mut row in out.rows_mut() {
            for (i, v) in row.iter_mut().enumerate() {
                *v = f(i, *v);
            }
        }
        Ok(out)
    }

    /// Decode one row and return a single channel
    pub fn decode_channel(&self, row: ArrayView1<'_, f64>, channel: usize) -> Result<f64, ScalerError> {
        self.check_width(row.len())?;
        if channel >= self.width() {
            return Err(ScalerError::WidthMismatch {
                expected: self.width(),
                actual: channel + 1,
            });
        }
        Ok(self.decode_value(channel, row[channel]))
    }
}

/// Which key a bundle's scalers are looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScalerScope {
    /// Per turbine id, falling back to the bundle's shared scaler
    #[default]
    Turbine,
    /// Shared scaler only
    Cluster,
}

/// Scalers stored in a bundle: an optional cluster-wide one plus per-turbine entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScalerSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared: Option<Scaler>,
    #[serde(default)]
    pub per_turbine: BTreeMap<String, Scaler>,
}

impl ScalerSet {
    pub fn shared(scaler: Scaler) -> Self {
        Self {
            shared: Some(scaler),
            per_turbine: BTreeMap::new(),
        }
    }

    pub fn with_turbine(mut self, turbine_id: impl Into<String>, scaler: Scaler) -> Self {
        self.per_turbine.insert(turbine_id.into(), scaler);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_none() && self.per_turbine.is_empty()
    }

    pub fn resolve(&self, scope: ScalerScope, turbine_id: &str) -> Option<&Scaler> {
        match scope {
            ScalerScope::Turbine => self
                .per_turbine
                .get(turbine_id)
                .or(self.shared.as_ref()),
            ScalerScope::Cluster => self.shared.as_ref(),
        }
    }

    /// Every scaler in the set must have `expected` features
    pub fn check_width(&self, expected: usize) -> Result<(), ScalerError> {
        self.shared
            .iter()
            .chain(self.per_turbine.values())
            .try_for_each(|s| s.check_width(expected))
    }
}
