//! Learned residual correction of the bilinear muscle law
//! Location: src/model/compensation.rs
//!
//! A small fully connected network per muscle maps `(length, length_rate, activation)` to a
//! bounded `(Δk, Δl)` pair in `[-1, 1]²`. The engine scales the pair by the blend ratio and
//! by the stiffness/length scale constants before adding it to `K1` and `L1`.

use crate::config::constants::network::{HIDDEN_WIDTH, INPUT_WIDTH, LEAKY_RELU_SLOPE, OUTPUT_WIDTH};
use crate::error::{DynamicsErrorBuilder, DynamicsResult};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Layer widths, input first
pub const LAYER_WIDTHS: [usize; 5] = [INPUT_WIDTH, HIDDEN_WIDTH, HIDDEN_WIDTH, HIDDEN_WIDTH, OUTPUT_WIDTH];

/// Fully connected layer, `y = W x + b` with `W` shaped `(out, in)`
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLayer {
    weight: Array2<f64>,
    bias: Array1<f64>,
}

impl DenseLayer {
    pub fn new(weight: Array2<f64>, bias: Array1<f64>) -> DynamicsResult<Self> {
        if weight.nrows() != bias.len() {
            return Err(DynamicsErrorBuilder::new("compensation", "dense_layer")
                .length_mismatch("bias", weight.nrows(), bias.len()));
        }
        if weight.iter().chain(bias.iter()).any(|v| !v.is_finite()) {
            return Err(DynamicsErrorBuilder::new("compensation", "dense_layer")
                .configuration("layer weights must be finite"));
        }
        Ok(Self { weight, bias })
    }

    fn zeros(inputs: usize, outputs: usize) -> Self {
        Self {
            weight: Array2::zeros((outputs, inputs)),
            bias: Array1::zeros(outputs),
        }
    }

    /// Uniform in `±1/sqrt(fan_in)` for weights and bias
    fn random(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        let bound = 1.0 / (inputs as f64).sqrt();
        let dist = Uniform::new_inclusive(-bound, bound);
        Self {
            weight: Array2::from_shape_fn((outputs, inputs), |_| dist.sample(&mut *rng)),
            bias: Array1::from_shape_fn(outputs, |_| dist.sample(&mut *rng)),
        }
    }

    pub fn inputs(&self) -> usize {
        self.weight.ncols()
    }

    pub fn outputs(&self) -> usize {
        self.weight.nrows()
    }

    pub fn weight(&self) -> &Array2<f64> {
        &self.weight
    }

    pub fn bias(&self) -> &Array1<f64> {
        &self.bias
    }

    fn forward(&self, input: ArrayView1<f64>) -> Array1<f64> {
        self.weight.dot(&input) + &self.bias
    }

    /// Rows of `input` are independent samples
    fn forward_batch(&self, input: ArrayView2<f64>) -> Array2<f64> {
        input.dot(&self.weight.t()) + &self.bias
    }
}

fn leaky_relu(x: f64) -> f64 {
    if x >= 0.0 {
        x
    } else {
        LEAKY_RELU_SLOPE * x
    }
}

/// Weights of one 3→256→256→256→2 network
#[derive(Debug, Clone, PartialEq)]
pub struct CompensationWeights {
    layers: Vec<DenseLayer>,
}

impl CompensationWeights {
    /// Build from explicit layers, checking the topology
    pub fn from_layers(layers: Vec<DenseLayer>) -> DynamicsResult<Self> {
        let builder = || DynamicsErrorBuilder::new("compensation", "from_layers");
        let expected_layers = LAYER_WIDTHS.len() - 1;
        if layers.len() != expected_layers {
            return Err(builder().length_mismatch("layers", expected_layers, layers.len()));
        }
        for (i, layer) in layers.iter().enumerate() {
            if layer.inputs() != LAYER_WIDTHS[i] || layer.outputs() != LAYER_WIDTHS[i + 1] {
                return Err(builder().configuration(format!(
                    "layer {} is {}x{}, expected {}x{}",
                    i,
                    layer.outputs(),
                    layer.inputs(),
                    LAYER_WIDTHS[i + 1],
                    LAYER_WIDTHS[i]
                )));
            }
        }
        Ok(Self { layers })
    }

    /// Seeded dense-layer default initialisation
    pub fn random(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let layers = LAYER_WIDTHS
            .windows(2)
            .map(|w| DenseLayer::random(w[0], w[1], &mut rng))
            .collect();
        Self { layers }
    }

    /// Network whose output is identically zero
    pub fn zeros() -> Self {
        let layers = LAYER_WIDTHS.windows(2).map(|w| DenseLayer::zeros(w[0], w[1])).collect();
        Self { layers }
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }
}

/// Per-muscle compensation network; stateless and deterministic
#[derive(Debug, Clone, PartialEq)]
pub struct CompensationNetwork {
    weights: CompensationWeights,
}

impl CompensationNetwork {
    pub fn new(weights: CompensationWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &CompensationWeights {
        &self.weights
    }

    /// `(Δk, Δl)` in `[-1, 1]²`
    pub fn evaluate(&self, length: f64, length_rate: f64, activation: f64) -> (f64, f64) {
        let last = self.weights.layers.len() - 1;
        let mut x = Array1::from(vec![length, length_rate, activation]);
        for (i, layer) in self.weights.layers.iter().enumerate() {
            let y = layer.forward(x.view());
            x = if i == last { y.mapv_into(f64::tanh) } else { y.mapv_into(leaky_relu) };
        }
        (x[0], x[1])
    }

    /// Evaluate many `(length, length_rate, activation)` rows at once; returns `(B, 2)`
    pub fn evaluate_batch(&self, inputs: ArrayView2<f64>) -> DynamicsResult<Array2<f64>> {
        if inputs.ncols() != INPUT_WIDTH {
            return Err(DynamicsErrorBuilder::new("compensation", "evaluate_batch")
                .length_mismatch("input row", INPUT_WIDTH, inputs.ncols()));
        }
        let last = self.weights.layers.len() - 1;
        let mut x = inputs.to_owned();
        for (i, layer) in self.weights.layers.iter().enumerate() {
            let y = layer.forward_batch(x.view());
            x = if i == last { y.mapv_into(f64::tanh) } else { y.mapv_into(leaky_relu) };
        }
        Ok(x)
    }
}
