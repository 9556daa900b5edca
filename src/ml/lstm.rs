//! Stacked LSTM sequence model
//!
//! Weight layout follows the PyTorch `nn.LSTM` convention: gates are stacked as
//! (input, forget, cell, output) along the first axis of `weight_ih`/`weight_hh`, with
//! separate input and hidden biases. A linear head is applied at every time step.

use ndarray::{s, Array1, Array2};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("{what} has shape {actual:?}, expected {expected:?}")]
    Shape {
        what: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Model has no LSTM layers")]
    NoLayers,

    #[error("Input width mismatch: model expects {expected} features, got {actual}")]
    InputWidth { expected: usize, actual: usize },
}

/// A model mapping a sequence of feature rows to a sequence of output rows.
///
/// Implementations must not keep state between calls: the same input always yields the
/// same output, whichever request or turbine called before.
pub trait SequenceModel: Send + Sync + fmt::Debug {
    fn input_size(&self) -> usize;

    fn output_size(&self) -> usize;

    /// `inputs` is (time steps x input_size); returns (time steps x output_size)
    fn forward(&self, inputs: &Array2<f64>) -> Result<Array2<f64>, ModelError>;
}

fn check_shape(what: &str, actual: &[usize], expected: &[usize]) -> Result<(), ModelError> {
    if actual != expected {
        return Err(ModelError::Shape {
            what: what.to_string(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[derive(Debug, Clone)]
pub struct LstmLayer {
    weight_ih: Array2<f64>,
    weight_hh: Array2<f64>,
    bias_ih: Array1<f64>,
    bias_hh: Array1<f64>,
}

impl LstmLayer {
    pub fn new(
        weight_ih: Array2<f64>,
        weight_hh: Array2<f64>,
        bias_ih: Array1<f64>,
        bias_hh: Array1<f64>,
    ) -> Result<Self, ModelError> {
        let gates = weight_hh.nrows();
        if gates == 0 || gates % 4 != 0 {
            return Err(ModelError::Shape {
                what: "weight_hh".to_string(),
                expected: vec![4 * weight_hh.ncols(), weight_hh.ncols()],
                actual: weight_hh.shape().to_vec(),
            });
        }
        let hidden = gates / 4;
        check_shape("weight_hh", weight_hh.shape(), &[gates, hidden])?;
        check_shape("weight_ih", &[weight_ih.nrows()], &[gates])?;
        check_shape("bias_ih", bias_ih.shape(), &[gates])?;
        check_shape("bias_hh", bias_hh.shape(), &[gates])?;
        Ok(Self {
            weight_ih,
            weight_hh,
            bias_ih,
            bias_hh,
        })
    }

    pub fn input_size(&self) -> usize {
        self.weight_ih.ncols()
    }

    pub fn hidden_size(&self) -> usize {
        self.weight_hh.ncols()
    }

    pub fn weight_ih(&self) -> &Array2<f64> {
        &self.weight_ih
    }

    pub fn weight_hh(&self) -> &Array2<f64> {
        &self.weight_hh
    }

    pub fn bias_ih(&self) -> &Array1<f64> {
        &self.bias_ih
    }

    pub fn bias_hh(&self) -> &Array1<f64> {
        &self.bias_hh
    }

    /// Run the layer over a whole sequence starting from zero hidden and cell state.
    fn run(&self, seq: &Array2<f64>) -> Array2<f64> {
        let hs = self.hidden_size();
        let mut h = Array1::<f64>::zeros(hs);
        let mut c = Array1::<f64>::zeros(hs);
        let mut out = Array2::<f64>::zeros((seq.nrows(), hs));

        for (t, x) in seq.rows().into_iter().enumerate() {
            let gates =
                self.weight_ih.dot(&x) + &self.bias_ih + self.weight_hh.dot(&h) + &self.bias_hh;
            let i = gates.slice(s![0..hs]).mapv(sigmoid);
            let f = gates.slice(s![hs..2 * hs]).mapv(sigmoid);
            let g = gates.slice(s![2 * hs..3 * hs]).mapv(f64::tanh);
            let o = gates.slice(s![3 * hs..4 * hs]).mapv(sigmoid);

            c = &f * &c + &i * &g;
            h = &o * &c.mapv(f64::tanh);
            out.row_mut(t).assign(&h);
        }
        out
    }
}

/// LSTM stack plus linear output head.
#[derive(Debug, Clone)]
pub struct LstmModel {
    layers: Vec<LstmLayer>,
    head_weight: Array2<f64>,
    head_bias: Array1<f64>,
}

impl LstmModel {
    pub fn new(
        layers: Vec<LstmLayer>,
        head_weight: Array2<f64>,
        head_bias: Array1<f64>,
    ) -> Result<Self, ModelError> {
        let first = layers.first().ok_or(ModelError::NoLayers)?;
        let mut width = first.hidden_size();
        for (k, layer) in layers.iter().enumerate().skip(1) {
            check_shape(
                &format!("layer {k} weight_ih"),
                layer.weight_ih.shape(),
                &[4 * layer.hidden_size(), width],
            )?;
            width = layer.hidden_size();
        }
        check_shape(
            "head weight",
            &[head_weight.ncols()],
            &[width],
        )?;
        check_shape("head bias", head_bias.shape(), &[head_weight.nrows()])?;
        Ok(Self {
            layers,
            head_weight,
            head_bias,
        })
    }

    /// Randomly initialized model, uniform in +-1/sqrt(hidden) like PyTorch's default init.
    /// Same seed, same weights.
    pub fn seeded(
        input_size: usize,
        hidden_size: usize,
        num_layers: usize,
        output_size: usize,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let k = 1.0 / (hidden_size.max(1) as f64).sqrt();
        let mut uniform = |rows: usize, cols: usize| {
            Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-k..k))
        };

        let mut layers = Vec::with_capacity(num_layers);
        let mut width = input_size;
        for _ in 0..num_layers.max(1) {
            let weight_ih = uniform(4 * hidden_size, width);
            let weight_hh = uniform(4 * hidden_size, hidden_size);
            let bias_ih = uniform(1, 4 * hidden_size).row(0).to_owned();
            let bias_hh = uniform(1, 4 * hidden_size).row(0).to_owned();
            layers.push(LstmLayer {
                weight_ih,
                weight_hh,
                bias_ih,
                bias_hh,
            });
            width = hidden_size;
        }
        let head_weight = uniform(output_size, hidden_size);
        let head_bias = uniform(1, output_size).row(0).to_owned();

        Self {
            layers,
            head_weight,
            head_bias,
        }
    }

    pub fn layers(&self) -> &[LstmLayer] {
        &self.layers
    }

    pub fn head_weight(&self) -> &Array2<f64> {
        &self.head_weight
    }

    pub fn head_bias(&self) -> &Array1<f64> {
        &self.head_bias
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn hidden_size(&self) -> usize {
        self.layers.last().map(LstmLayer::hidden_size).unwrap_or(0)
    }
}

impl SequenceModel for LstmModel {
    fn input_size(&self) -> usize {
        self.layers.first().map(LstmLayer::input_size).unwrap_or(0)
    }

    fn output_size(&self) -> usize {
        self.head_weight.nrows()
    }

    fn forward(&self, inputs: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        if inputs.ncols() != self.input_size() {
            return Err(ModelError::InputWidth {
                expected: self.input_size(),
                actual: inputs.ncols(),
            });
        }

        let mut seq = inputs.to_owned();
        for layer in &self.layers {
            seq = layer.run(&seq);
        }

        let mut out = seq.dot(&self.head_weight.t());
        out += &self.head_bias;
        Ok(out)
    }
}
