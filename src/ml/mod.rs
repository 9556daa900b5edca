//! Machine Learning Module
//!
//! Cluster-specific recurrent models and everything needed to run them in production:
//! - Min-max scalers for model inputs and outputs
//! - Stacked LSTM forward pass
//! - Persisted model bundles (weights + paired scalers)
//! - Process-wide, lazily populated bundle store
//! - Inference engine producing denormalized power

pub mod bundle;
pub mod inference;
pub mod lstm;
pub mod scaler;
pub mod store;

pub use bundle::{
    BundleDocument, BundleError, BundleLoader, BundleMetadata, FsBundleLoader, ModelBundle,
    PowerUnit,
};
pub use inference::InferenceEngine;
pub use lstm::{LstmLayer, LstmModel, ModelError, SequenceModel};
pub use scaler::{Scaler, ScalerError, ScalerScope, ScalerSet};
pub use store::{BundleNotFound, ModelStore};

/// Input features in the order the models were trained with.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "wind_speed",
    "wind_dir_sin",
    "wind_dir_cos",
    "temperature",
    "hour_sin",
    "hour_cos",
    "capacity",
    "age",
    "power_lag",
];

pub const FEATURE_COUNT: usize = 9;

/// Width of the trained output schema. Only the power channel is surfaced.
pub const OUTPUT_CHANNELS: usize = 3;
