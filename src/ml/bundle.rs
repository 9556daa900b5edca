//! Persisted model bundles
//!
//! A bundle is one JSON document per cluster holding the trained LSTM weights and the
//! two scaler sets the model was trained with:
//!
//! ```json
//! {
//!   "cluster_id": 3,
//!   "model_weights": { "lstm": [{ "weight_ih": [[..]], "weight_hh": [[..]],
//!                                 "bias_ih": [..], "bias_hh": [..] }],
//!                      "head": { "weight": [[..]], "bias": [..] } },
//!   "x_scaler": { "shared": { "data_min": [..], "data_max": [..] },
//!                 "per_turbine": { "T000": { "scale_": [..], "min_": [..] } } },
//!   "y_scaler": { .. },
//!   "metadata": { "power_channel": 0, "power_unit": "kw" }
//! }
//! ```

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::debug;

use super::{
    lstm::{LstmLayer, LstmModel, SequenceModel},
    scaler::ScalerSet,
    FEATURE_COUNT, OUTPUT_CHANNELS,
};
use crate::domain::ClusterId;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("Failed to read bundle {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Bundle is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bundle is missing section '{0}'")]
    MissingSection(&'static str),

    #[error("Bundle section '{section}' is invalid: {reason}")]
    Section {
        section: &'static str,
        reason: String,
    },

    #[error("Bundle belongs to cluster {found}, expected {expected}")]
    ClusterMismatch { expected: ClusterId, found: ClusterId },

    #[error("Bundle is inconsistent: {0}")]
    Invalid(String),
}

/// Unit the output scaler denormalizes the power channel into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PowerUnit {
    #[default]
    Kw,
    Mw,
}

impl PowerUnit {
    pub fn to_mw(self, value: f64) -> f64 {
        match self {
            Self::Kw => value / 1000.0,
            Self::Mw => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    /// Output channel carrying turbine power
    #[serde(default)]
    pub power_channel: usize,
    #[serde(default)]
    pub power_unit: PowerUnit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Default for BundleMetadata {
    fn default() -> Self {
        Self {
            power_channel: 0,
            power_unit: PowerUnit::Kw,
            version: None,
            trained_at: None,
        }
    }
}

/// Trained model plus its paired scalers. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct ModelBundle {
    pub cluster_id: ClusterId,
    pub model: Arc<dyn SequenceModel>,
    pub input_scalers: ScalerSet,
    pub output_scalers: ScalerSet,
    pub metadata: BundleMetadata,
}

impl ModelBundle {
    /// Assemble a bundle, checking that the model and scaler widths agree with the
    /// feature and output schemas.
    pub fn new(
        cluster_id: ClusterId,
        model: Arc<dyn SequenceModel>,
        input_scalers: ScalerSet,
        output_scalers: ScalerSet,
        metadata: BundleMetadata,
    ) -> Result<Self, BundleError> {
        if model.input_size() != FEATURE_COUNT {
            return Err(BundleError::Invalid(format!(
                "model takes {} input features, expected {}",
                model.input_size(),
                FEATURE_COUNT
            )));
        }
        if model.output_size() != OUTPUT_CHANNELS {
            return Err(BundleError::Invalid(format!(
                "model produces {} output channels, expected {}",
                model.output_size(),
                OUTPUT_CHANNELS
            )));
        }
        if metadata.power_channel >= OUTPUT_CHANNELS {
            return Err(BundleError::Invalid(format!(
                "power channel {} out of range",
                metadata.power_channel
            )));
        }
        input_scalers
            .check_width(FEATURE_COUNT)
            .map_err(|e| BundleError::Section {
                section: "x_scaler",
                reason: e.to_string(),
            })?;
        output_scalers
            .check_width(OUTPUT_CHANNELS)
            .map_err(|e| BundleError::Section {
                section: "y_scaler",
                reason: e.to_string(),
            })?;

        Ok(Self {
            cluster_id,
            model,
            input_scalers,
            output_scalers,
            metadata,
        })
    }

    /// Parse a bundle document. Sections are read in a fixed order (weights, input
    /// scalers, output scalers); any failure rejects the whole bundle.
    pub fn from_slice(bytes: &[u8], expected: ClusterId) -> Result<Self, BundleError> {
        let doc: Value = serde_json::from_slice(bytes)?;

        if let Some(found) = doc.get("cluster_id") {
            let found: ClusterId = parse_section("cluster_id", found.clone())?;
            if found != expected {
                return Err(BundleError::ClusterMismatch { expected, found });
            }
        }

        let weights: ModelWeights = required_section(&doc, "model_weights")?;
        let model = weights.into_model().map_err(|reason| BundleError::Section {
            section: "model_weights",
            reason,
        })?;
        let input_scalers: ScalerSet = required_section(&doc, "x_scaler")?;
        let output_scalers: ScalerSet = required_section(&doc, "y_scaler")?;
        let metadata: BundleMetadata = match doc.get("metadata") {
            Some(v) => parse_section("metadata", v.clone())?,
            None => BundleMetadata::default(),
        };

        debug!(
            cluster = %expected,
            layers = model.num_layers(),
            hidden = model.hidden_size(),
            turbine_scalers = input_scalers.per_turbine.len(),
            "parsed model bundle"
        );

        Self::new(
            expected,
            Arc::new(model),
            input_scalers,
            output_scalers,
            metadata,
        )
    }
}

fn parse_section<T: for<'de> Deserialize<'de>>(
    section: &'static str,
    value: Value,
) -> Result<T, BundleError> {
    serde_json::from_value(value).map_err(|e| BundleError::Section {
        section,
        reason: e.to_string(),
    })
}

fn required_section<T: for<'de> Deserialize<'de>>(
    doc: &Value,
    section: &'static str,
) -> Result<T, BundleError> {
    let value = doc
        .get(section)
        .ok_or(BundleError::MissingSection(section))?;
    parse_section(section, value.clone())
}

/// Serializable form of a bundle, used to export and to write bundle files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleDocument {
    pub cluster_id: ClusterId,
    pub model_weights: ModelWeights,
    pub x_scaler: ScalerSet,
    pub y_scaler: ScalerSet,
    #[serde(default)]
    pub metadata: BundleMetadata,
}

impl BundleDocument {
    pub fn new(
        cluster_id: ClusterId,
        model: &LstmModel,
        x_scaler: ScalerSet,
        y_scaler: ScalerSet,
        metadata: BundleMetadata,
    ) -> Self {
        Self {
            cluster_id,
            model_weights: ModelWeights::from_model(model),
            x_scaler,
            y_scaler,
            metadata,
        }
    }

    pub fn to_json(&self) -> Result<String, BundleError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelWeights {
    pub lstm: Vec<LayerWeights>,
    pub head: HeadWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerWeights {
    pub weight_ih: Vec<Vec<f64>>,
    pub weight_hh: Vec<Vec<f64>>,
    pub bias_ih: Vec<f64>,
    pub bias_hh: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadWeights {
    pub weight: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

fn to_matrix(name: &str, rows: Vec<Vec<f64>>) -> Result<Array2<f64>, String> {
    let nrows = rows.len();
    let ncols = rows.first().map(Vec::len).unwrap_or(0);
    if nrows == 0 || ncols == 0 {
        return Err(format!("{name} is empty"));
    }
    if rows.iter().any(|r| r.len() != ncols) {
        return Err(format!("{name} has ragged rows"));
    }
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    if flat.iter().any(|v| !v.is_finite()) {
        return Err(format!("{name} contains non-finite values"));
    }
    Array2::from_shape_vec((nrows, ncols), flat).map_err(|e| format!("{name}: {e}"))
}

fn to_vector(name: &str, values: Vec<f64>) -> Result<Array1<f64>, String> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(format!("{name} contains non-finite values"));
    }
    Ok(Array1::from(values))
}

fn from_matrix(m: &Array2<f64>) -> Vec<Vec<f64>> {
    m.rows().into_iter().map(|r| r.to_vec()).collect()
}

impl ModelWeights {
    pub fn into_model(self) -> Result<LstmModel, String> {
        let layers = self
            .lstm
            .into_iter()
            .enumerate()
            .map(|(k, l)| {
                LstmLayer::new(
                    to_matrix(&format!("lstm.weight_ih_l{k}"), l.weight_ih)?,
                    to_matrix(&format!("lstm.weight_hh_l{k}"), l.weight_hh)?,
                    to_vector(&format!("lstm.bias_ih_l{k}"), l.bias_ih)?,
                    to_vector(&format!("lstm.bias_hh_l{k}"), l.bias_hh)?,
                )
                .map_err(|e| e.to_string())
            })
            .collect::<Result<Vec<_>, String>>()?;

        LstmModel::new(
            layers,
            to_matrix("head.weight", self.head.weight)?,
            to_vector("head.bias", self.head.bias)?,
        )
        .map_err(|e| e.to_string())
    }

    pub fn from_model(model: &LstmModel) -> Self {
        Self {
            lstm: model
                .layers()
                .iter()
                .map(|l| LayerWeights {
                    weight_ih: from_matrix(l.weight_ih()),
                    weight_hh: from_matrix(l.weight_hh()),
                    bias_ih: l.bias_ih().to_vec(),
                    bias_hh: l.bias_hh().to_vec(),
                })
                .collect(),
            head: HeadWeights {
                weight: from_matrix(model.head_weight()),
                bias: model.head_bias().to_vec(),
            },
        }
    }
}

/// Source of model bundles, addressed by cluster.
pub trait BundleLoader: Send + Sync {
    fn load(&self, cluster: ClusterId) -> Result<ModelBundle, BundleError>;
}

/// Loads `<dir>/<pattern>` with `{cluster}` replaced by the cluster id.
#[derive(Debug, Clone)]
pub struct FsBundleLoader {
    dir: PathBuf,
    file_pattern: String,
}

impl FsBundleLoader {
    pub fn new(dir: impl Into<PathBuf>, file_pattern: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            file_pattern: file_pattern.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, cluster: ClusterId) -> PathBuf {
        self.dir
            .join(self.file_pattern.replace("{cluster}", &cluster.to_string()))
    }
}

impl BundleLoader for FsBundleLoader {
    fn load(&self, cluster: ClusterId) -> Result<ModelBundle, BundleError> {
        let path = self.path_for(cluster);
        let bytes = std::fs::read(&path).map_err(|source| BundleError::Io {
            path: path.clone(),
            source,
        })?;
        ModelBundle::from_slice(&bytes, cluster)
    }
}
