// THEORY:
// Backpropagation specialised to the tied network. Every position proposes its own
// candidate update for the shared weights, `w - lr * delta * activation_in`, and the
// applied value is the mean of those candidates over all positions. Accumulation runs
// once over the image and the result is written once into `SharedWeights`, so the
// tying holds without any broadcast step.
//
// Step order for one sample:
//   1. output delta per channel = produced - desired
//   2. (wd, we, wf) <- mean over pixels of (w_k - lr * delta_k * hidden)
//   3. hidden delta = sum_k(delta_k * w_k_new) - previous hidden delta
//   4. (wa, wb, wc) <- mean over pixels of (w_j - lr * hidden_delta * input_j)
//
// The hidden delta of step 3 persists in the layer and is subtracted on the next
// step. The output weights used there are the freshly updated ones.
//
// The reported error is the mean absolute channel difference over the image.
//
// Online, fixed-rate, no momentum. Means accumulate in f64.

use crate::core_modules::tied_network::{TYING_RATIO, TiedNetwork};
use crate::error::{DaltonError, Result};

/// Runs one backpropagation step against the values recorded by the last
/// `feed_forward` and returns the sample error.
pub fn back_propagate(network: &mut TiedNetwork, desired: &[f32]) -> Result<f32> {
    network.ensure_input_len(desired.len(), "desired output")?;
    let recorded = network.layers[2].values.len();
    if recorded != network.input_len() {
        return Err(DaltonError::dimension_mismatch(
            network.input_len(),
            recorded,
            "recorded activations (feed_forward must run first)",
        ));
    }

    let learning_rate = network.learning_rate();
    let pixels = network.pixel_count() as f64;
    let [input, hidden, output] = &mut network.layers;

    let mut output_candidates = [0.0f64; TYING_RATIO];
    let mut absolute_error = 0.0f64;
    for (pixel, (produced, wanted)) in output
        .values
        .chunks_exact(TYING_RATIO)
        .zip(desired.chunks_exact(TYING_RATIO))
        .enumerate()
    {
        let hidden_value = hidden.values[pixel];
        for k in 0..TYING_RATIO {
            let delta = produced[k] - wanted[k];
            output.deltas[pixel * TYING_RATIO + k] = delta;
            output_candidates[k] +=
                (network.weights.output[k] - learning_rate * delta * hidden_value) as f64;
            absolute_error += delta.abs() as f64;
        }
    }
    let updated_output = output_candidates.map(|sum| (sum / pixels) as f32);
    network.weights.output = updated_output;

    let mut hidden_candidates = [0.0f64; TYING_RATIO];
    for (pixel, (channels, deltas)) in input
        .values
        .chunks_exact(TYING_RATIO)
        .zip(output.deltas.chunks_exact(TYING_RATIO))
        .enumerate()
    {
        let weighted: f32 = deltas.iter().zip(&updated_output).map(|(d, w)| d * w).sum();
        let delta = weighted - hidden.deltas[pixel];
        hidden.deltas[pixel] = delta;
        for j in 0..TYING_RATIO {
            hidden_candidates[j] +=
                (network.weights.hidden[j] - learning_rate * delta * channels[j]) as f64;
        }
    }
    network.weights.hidden = hidden_candidates.map(|sum| (sum / pixels) as f32);

    let error = (absolute_error / output.size() as f64) as f32;
    network.error = error;
    tracing::debug!(error, weights = ?network.weights, "backpropagation step");
    Ok(error)
}

/// Drives the online gradient loop: one forward pass and one update per sample.
#[derive(Debug, Default, Clone)]
pub struct GradientTrainer {
    steps: u64,
}

impl GradientTrainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn step(&mut self, network: &mut TiedNetwork, input: &[f32], desired: &[f32]) -> Result<f32> {
        // Both buffers are checked before the forward pass touches any layer state.
        network.ensure_input_len(input.len(), "network input")?;
        network.ensure_input_len(desired.len(), "desired output")?;
        network.feed_forward(input)?;
        let error = back_propagate(network, desired)?;
        self.steps += 1;
        Ok(error)
    }
}
