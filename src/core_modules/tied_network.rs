// THEORY:
// The `TiedNetwork` is a fixed three-layer network whose weights are shared by
// every spatial position of the image.
//
//   layer 0 (input):  one neuron per channel per pixel         (3 x pixels)
//   layer 1 (hidden): one neuron per pixel, reading its 3 channels through (wa, wb, wc)
//   layer 2 (output): one neuron per channel per pixel, reading its pixel's hidden
//                     value through wd, we or wf depending on the channel it produces
//
// Instead of giving each neuron its own weight vector and re-synchronising them
// after every update, the network holds a single `SharedWeights` parameter block
// that every position references. A neuron's "weights" are therefore a view into
// that block, and the tying invariant holds by construction. The learned function
// is one position-independent 3 -> 1 -> 3 map applied to every pixel, which is a
// depth-3 convolution with a single kernel and stride 3.
//
// Layers keep the transient per-neuron state (value, delta) that backpropagation
// needs. Those buffers are sized on the first recorded forward pass, so a network
// used only for inference (every genetic population member) never allocates them.

use crate::core_modules::activation::Activation;
use crate::core_modules::genome::Genome;
use crate::error::{DaltonError, Result};
use rand::Rng;
use std::path::Path;

/// Inputs per hidden neuron and outputs per hidden neuron.
pub const TYING_RATIO: usize = 3;
/// Weights are initialised uniformly in [-WEIGHT_RANGE, WEIGHT_RANGE].
pub const WEIGHT_RANGE: f32 = 5.0;
pub const DEFAULT_LEARNING_RATE: f32 = 0.01;

/// The six parameters shared by every position of the network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SharedWeights {
    /// (wa, wb, wc): channel weights into each hidden neuron.
    pub hidden: [f32; TYING_RATIO],
    /// (wd, we, wf): hidden-to-output weight per output channel.
    pub output: [f32; TYING_RATIO],
}

impl SharedWeights {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut draw = || rng.gen_range(-WEIGHT_RANGE..=WEIGHT_RANGE);
        Self {
            hidden: [draw(), draw(), draw()],
            output: [draw(), draw(), draw()],
        }
    }

    pub fn from_genome(genome: &Genome) -> Self {
        Self {
            hidden: genome.hidden_weights(),
            output: genome.output_weights(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerRole {
    Input,
    Hidden,
    Output,
}

impl LayerRole {
    fn index(self) -> usize {
        match self {
            LayerRole::Input => 0,
            LayerRole::Hidden => 1,
            LayerRole::Output => 2,
        }
    }
}

/// A fixed-size group of neurons sharing one activation function.
#[derive(Debug, Clone)]
pub struct Layer {
    size: usize,
    activation: Activation,
    pub(crate) values: Vec<f32>,
    pub(crate) deltas: Vec<f32>,
}

impl Layer {
    fn new(size: usize, activation: Activation) -> Self {
        Self {
            size,
            activation,
            values: Vec::new(),
            deltas: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Values from the last recorded forward pass (empty before the first one).
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn deltas(&self) -> &[f32] {
        &self.deltas
    }

    fn ensure_buffers(&mut self) {
        if self.values.len() != self.size {
            self.values.resize(self.size, 0.0);
        }
        if self.deltas.len() != self.size {
            self.deltas.resize(self.size, 0.0);
        }
    }
}

#[derive(Debug, Clone)]
pub struct TiedNetwork {
    pub(crate) layers: [Layer; 3],
    pub(crate) weights: SharedWeights,
    learning_rate: f32,
    pub(crate) error: f32,
}

impl TiedNetwork {
    /// Creates a network for `first_layer_neurons` inputs with random shared weights.
    pub fn new<R: Rng + ?Sized>(
        first_layer_neurons: usize,
        hidden: Activation,
        output: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        Self::with_weights(first_layer_neurons, SharedWeights::random(rng), hidden, output)
    }

    pub fn with_weights(
        first_layer_neurons: usize,
        weights: SharedWeights,
        hidden: Activation,
        output: Activation,
    ) -> Result<Self> {
        if first_layer_neurons == 0 || first_layer_neurons % TYING_RATIO != 0 {
            return Err(DaltonError::invalid_config(
                "first_layer_neurons",
                format!("{first_layer_neurons} is not a positive multiple of {TYING_RATIO}"),
            ));
        }
        Ok(Self {
            layers: [
                Layer::new(first_layer_neurons, Activation::Identity),
                Layer::new(first_layer_neurons / TYING_RATIO, hidden),
                Layer::new(first_layer_neurons, output),
            ],
            weights,
            learning_rate: DEFAULT_LEARNING_RATE,
            error: 1.0,
        })
    }

    pub fn from_genome(genome: &Genome, hidden: Activation, output: Activation) -> Result<Self> {
        Self::with_weights(
            genome.first_layer_neurons as usize,
            SharedWeights::from_genome(genome),
            hidden,
            output,
        )
    }

    pub fn from_genome_file(
        path: impl AsRef<Path>,
        hidden: Activation,
        output: Activation,
    ) -> Result<Self> {
        Self::from_genome(&Genome::load(path)?, hidden, output)
    }

    pub fn to_genome(&self) -> Genome {
        let [wa, wb, wc] = self.weights.hidden;
        let [wd, we, wf] = self.weights.output;
        Genome::from_weights([wa, wb, wc, wd, we, wf], self.input_len() as u32)
    }

    pub fn export_genome(&self, path: impl AsRef<Path>) -> Result<()> {
        self.to_genome().save(path)
    }

    pub fn input_len(&self) -> usize {
        self.layers[0].size
    }

    pub fn pixel_count(&self) -> usize {
        self.layers[1].size
    }

    pub fn layer(&self, role: LayerRole) -> &Layer {
        &self.layers[role.index()]
    }

    pub fn weights(&self) -> &SharedWeights {
        &self.weights
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }

    /// Training-progress signal from the last backpropagation step.
    pub fn error(&self) -> f32 {
        self.error
    }

    /// The weights neuron `index` of `role` reads through. Hidden neurons see the
    /// shared triple, output neurons the scalar for their channel, input neurons none.
    pub fn neuron_weights(&self, role: LayerRole, index: usize) -> Option<&[f32]> {
        if index >= self.layers[role.index()].size {
            return None;
        }
        let weights: &[f32] = match role {
            LayerRole::Input => &[],
            LayerRole::Hidden => &self.weights.hidden,
            LayerRole::Output => std::slice::from_ref(&self.weights.output[index % TYING_RATIO]),
        };
        Some(weights)
    }

    pub fn ensure_input_len(&self, len: usize, context: &str) -> Result<()> {
        if len != self.input_len() {
            return Err(DaltonError::dimension_mismatch(self.input_len(), len, context));
        }
        Ok(())
    }

    #[inline]
    fn forward_pixel(&self, channels: &[f32]) -> (f32, [f32; TYING_RATIO]) {
        let hidden_activation = self.layers[1].activation;
        let output_activation = self.layers[2].activation;
        let [wa, wb, wc] = self.weights.hidden;
        let hidden = hidden_activation.apply(channels[0] * wa + channels[1] * wb + channels[2] * wc);
        let output = self.weights.output.map(|w| output_activation.apply(hidden * w));
        (hidden, output)
    }

    /// Stateless inference: the output triples for every pixel of `input`.
    pub fn infer(&self, input: &[f32]) -> Result<Vec<f32>> {
        self.ensure_input_len(input.len(), "network input")?;
        let mut output = Vec::with_capacity(input.len());
        for channels in input.chunks_exact(TYING_RATIO) {
            let (_, produced) = self.forward_pixel(channels);
            output.extend_from_slice(&produced);
        }
        Ok(output)
    }

    /// Inference that also records every neuron's value for a following
    /// backpropagation step.
    pub fn feed_forward(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        self.ensure_input_len(input.len(), "network input")?;
        for layer in &mut self.layers {
            layer.ensure_buffers();
        }
        self.layers[0].values.copy_from_slice(input);

        let mut hidden_values = std::mem::take(&mut self.layers[1].values);
        let mut output_values = std::mem::take(&mut self.layers[2].values);
        for (pixel, channels) in input.chunks_exact(TYING_RATIO).enumerate() {
            let (hidden, produced) = self.forward_pixel(channels);
            hidden_values[pixel] = hidden;
            output_values[pixel * TYING_RATIO..(pixel + 1) * TYING_RATIO].copy_from_slice(&produced);
        }
        self.layers[1].values = hidden_values;
        self.layers[2].values = output_values;

        Ok(self.layers[2].values.clone())
    }
}
