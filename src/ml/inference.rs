//! ML Model Inference Engine
//!
//! Runs a loaded bundle over a full forecast frame: encode inputs with the resolved input
//! scaler, one forward pass over the whole sequence, then decode the power channel.

use ndarray::Array2;
use tracing::debug;

use super::{bundle::ModelBundle, scaler::Scaler, ScalerScope};
use crate::error::ForecastError;

/// Stateless: holds only configuration, never per-request model state.
#[derive(Debug, Clone, Copy, Default)]
pub struct InferenceEngine {
    scope: ScalerScope,
}

impl InferenceEngine {
    pub fn new(scope: ScalerScope) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> ScalerScope {
        self.scope
    }

    /// Normalize a raw feature frame. Falls back to `reference` when the bundle has no
    /// input scaler for this turbine.
    pub fn encode_inputs(
        &self,
        bundle: &ModelBundle,
        turbine_id: &str,
        raw: &Array2<f64>,
        reference: &Scaler,
    ) -> Result<Array2<f64>, ForecastError> {
        let scaler = match bundle.input_scalers.resolve(self.scope, turbine_id) {
            Some(s) => s,
            None => {
                debug!(turbine_id, scope = %self.scope, "no input scaler in bundle, using reference ranges");
                reference
            }
        };
        scaler
            .encode_frame(raw)
            .map_err(|e| ForecastError::FeatureBuildFailure(e.to_string()))
    }

    /// Single forward pass over every hour of the frame. Any non-finite output fails the
    /// whole request.
    pub fn forward(
        &self,
        bundle: &ModelBundle,
        encoded: &Array2<f64>,
    ) -> Result<Array2<f64>, ForecastError> {
        let output = bundle
            .model
            .forward(encoded)
            .map_err(|e| ForecastError::ModelUnavailable {
                cluster: bundle.cluster_id,
                reason: format!("model rejected the input frame: {e}"),
            })?;
        check_finite(&output)?;
        Ok(output)
    }

    /// Denormalize the power channel of every output row into MW.
    ///
    /// Without an output scaler the normalized value is read as a capacity factor.
    pub fn decode_power(
        &self,
        bundle: &ModelBundle,
        turbine_id: &str,
        output: &Array2<f64>,
        capacity_mw: f64,
    ) -> Result<Vec<f64>, ForecastError> {
        let channel = bundle.metadata.power_channel;
        let scaler = bundle.output_scalers.resolve(self.scope, turbine_id);

        let mut power = Vec::with_capacity(output.nrows());
        for (hour, row) in output.rows().into_iter().enumerate() {
            let mw = match scaler {
                Some(s) => {
                    let raw = s.decode_channel(row, channel).map_err(|e| {
                        ForecastError::ModelUnavailable {
                            cluster: bundle.cluster_id,
                            reason: format!("output scaler does not fit model output: {e}"),
                        }
                    })?;
                    bundle.metadata.power_unit.to_mw(raw)
                }
                None => row[channel] * capacity_mw,
            };
            if !mw.is_finite() {
                return Err(ForecastError::InferenceNumericFailure { hour, channel });
            }
            power.push(mw);
        }
        Ok(power)
    }

    /// Encode, run and decode in one go.
    pub fn predict(
        &self,
        bundle: &ModelBundle,
        turbine_id: &str,
        raw: &Array2<f64>,
        reference: &Scaler,
        capacity_mw: f64,
    ) -> Result<Vec<f64>, ForecastError> {
        let encoded = self.encode_inputs(bundle, turbine_id, raw, reference)?;
        let output = self.forward(bundle, &encoded)?;
        let power = self.decode_power(bundle, turbine_id, &output, capacity_mw)?;
        debug!(
            cluster = %bundle.cluster_id,
            turbine_id,
            hours = power.len(),
            "inference complete"
        );
        Ok(power)
    }
}

fn check_finite(output: &Array2<f64>) -> Result<(), ForecastError> {
    for ((hour, channel), v) in output.indexed_iter() {
        if !v.is_finite() {
            return Err(ForecastError::InferenceNumericFailure { hour, channel });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ClusterId;
    use crate::ml::{
        bundle::{BundleMetadata, PowerUnit},
        lstm::{LstmModel, ModelError, SequenceModel},
        scaler::ScalerSet,
        FEATURE_COUNT, OUTPUT_CHANNELS,
    };
    use std::sync::Arc;

    /// Returns a fixed output row for every step, NaN at a chosen position if asked.
    #[derive(Debug)]
    struct FixedModel {
        row: [f64; OUTPUT_CHANNELS],
        nan_at: Option<(usize, usize)>,
    }

    impl SequenceModel for FixedModel {
        fn input_size(&self) -> usize {
            FEATURE_COUNT
        }

        fn output_size(&self) -> usize {
            OUTPUT_CHANNELS
        }

        fn forward(&self, inputs: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
            let mut out = Array2::from_shape_fn((inputs.nrows(), OUTPUT_CHANNELS), |(_, c)| {
                self.row[c]
            });
            if let Some((t, c)) = self.nan_at {
                out[[t, c]] = f64::NAN;
            }
            Ok(out)
        }
    }

    fn bundle(model: Arc<dyn SequenceModel>, y: ScalerSet, metadata: BundleMetadata) -> ModelBundle {
        ModelBundle::new(
            ClusterId(3),
            model,
            ScalerSet::shared(Scaler::identity(FEATURE_COUNT)),
            y,
            metadata,
        )
        .unwrap()
    }

    fn frame() -> Array2<f64> {
        Array2::from_elem((24, FEATURE_COUNT), 0.5)
    }

    #[test]
    fn test_decode_uses_power_channel_parameters() {
        let model = Arc::new(FixedModel {
            row: [0.1, 0.5, 0.9],
            nan_at: None,
        });
        let y = ScalerSet::shared(
            Scaler::new(vec![0.0, 1000.0, 0.0], vec![1.0, 3000.0, 1.0]).unwrap(),
        );
        let metadata = BundleMetadata {
            power_channel: 1,
            power_unit: PowerUnit::Kw,
            ..Default::default()
        };
        let b = bundle(model, y, metadata);

        let engine = InferenceEngine::default();
        let power = engine
            .predict(&b, "T000", &frame(), &Scaler::identity(FEATURE_COUNT), 3.0)
            .unwrap();
        assert_eq!(power.len(), 24);
        // 0.5 * (3000 - 1000) + 1000 = 2000 kW
        assert!(power.iter().all(|p| (p - 2.0).abs() < 1e-12));
    }

    #[test]
    fn test_capacity_factor_without_output_scaler() {
        let model = Arc::new(FixedModel {
            row: [0.25, 0.0, 0.0],
            nan_at: None,
        });
        let b = bundle(model, ScalerSet::default(), BundleMetadata::default());

        let power = InferenceEngine::default()
            .predict(&b, "T000", &frame(), &Scaler::identity(FEATURE_COUNT), 4.0)
            .unwrap();
        assert!(power.iter().all(|p| (p - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_nan_output_fails_request() {
        let model = Arc::new(FixedModel {
            row: [0.5, 0.5, 0.5],
            nan_at: Some((7, 2)),
        });
        let b = bundle(model, ScalerSet::default(), BundleMetadata::default());

        let err = InferenceEngine::default()
            .predict(&b, "T000", &frame(), &Scaler::identity(FEATURE_COUNT), 3.0)
            .unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InferenceNumericFailure {
                hour: 7,
                channel: 2
            }
        ));
    }

    #[test]
    fn test_turbine_scaler_preferred_over_shared() {
        let model = Arc::new(LstmModel::seeded(FEATURE_COUNT, 8, 1, OUTPUT_CHANNELS, 3));
        let x = ScalerSet::shared(Scaler::identity(FEATURE_COUNT)).with_turbine(
            "T001",
            Scaler::new(vec![0.0; FEATURE_COUNT], vec![2.0; FEATURE_COUNT]).unwrap(),
        );
        let b = ModelBundle::new(
            ClusterId(3),
            model,
            x,
            ScalerSet::default(),
            BundleMetadata::default(),
        )
        .unwrap();
        let reference = Scaler::identity(FEATURE_COUNT);

        let engine = InferenceEngine::new(ScalerScope::Turbine);
        let t0 = engine.encode_inputs(&b, "T000", &frame(), &reference).unwrap();
        let t1 = engine.encode_inputs(&b, "T001", &frame(), &reference).unwrap();
        assert_eq!(t0[[0, 0]], 0.5);
        assert_eq!(t1[[0, 0]], 0.25);

        let cluster = InferenceEngine::new(ScalerScope::Cluster);
        let c1 = cluster.encode_inputs(&b, "T001", &frame(), &reference).unwrap();
        assert_eq!(c1[[0, 0]], 0.5);
    }

    /// Emits fewer channels than it advertises.
    #[derive(Debug)]
    struct NarrowModel;

    impl SequenceModel for NarrowModel {
        fn input_size(&self) -> usize {
            FEATURE_COUNT
        }

        fn output_size(&self) -> usize {
            OUTPUT_CHANNELS
        }

        fn forward(&self, inputs: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
            Ok(Array2::from_elem((inputs.nrows(), 1), 0.5))
        }
    }

    #[test]
    fn test_model_faults_are_model_unavailable() {
        let b = bundle(
            Arc::new(NarrowModel),
            ScalerSet::shared(Scaler::identity(OUTPUT_CHANNELS)),
            BundleMetadata::default(),
        );
        let err = InferenceEngine::default()
            .predict(&b, "T000", &frame(), &Scaler::identity(FEATURE_COUNT), 3.0)
            .unwrap_err();
        assert!(matches!(
            err,
            ForecastError::ModelUnavailable {
                cluster: ClusterId(3),
                ..
            }
        ));

        let lstm = Arc::new(LstmModel::seeded(FEATURE_COUNT, 4, 1, OUTPUT_CHANNELS, 5));
        let b = bundle(lstm, ScalerSet::default(), BundleMetadata::default());
        let narrow_frame = Array2::from_elem((24, FEATURE_COUNT - 1), 0.5);
        let err = InferenceEngine::default()
            .forward(&b, &narrow_frame)
            .unwrap_err();
        assert_eq!(err.kind(), "ModelUnavailable");
    }

    #[test]
    fn test_forward_is_repeatable() {
        let model = Arc::new(LstmModel::seeded(FEATURE_COUNT, 16, 1, OUTPUT_CHANNELS, 9));
        let b = bundle(model, ScalerSet::default(), BundleMetadata::default());
        let engine = InferenceEngine::default();

        let a = engine.forward(&b, &frame()).unwrap();
        let c = engine.forward(&b, &frame()).unwrap();
        assert_eq!(a.shape(), &[24, OUTPUT_CHANNELS]);
        assert_eq!(a, c);
    }
}
