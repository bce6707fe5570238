// THEORY:
// Because every hidden neuron shares one weight triple and every output neuron
// shares one of three scalars, six floats fully determine a trained network's
// behaviour. The `Genome` is that minimal heritable state plus the input-layer
// size it was trained for. It is what the genetic trainer recombines and what
// gets written to disk.
//
// Text format: one line, `&`-separated, in the order
// `wa&wb&wc&wd&we&wf&first_layer_neurons`. Floats use Rust's shortest
// round-tripping decimal rendering of an `f32`; the neuron count is an unsigned
// integer and a positive multiple of three. Anything other than exactly seven well-formed
// fields is a malformed record.

use crate::core_modules::colour_space::Matrix3;
use crate::core_modules::tied_network::TYING_RATIO;
use crate::error::{DaltonError, Result};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub const GENOME_WEIGHTS: usize = 6;
const FIELD_SEPARATOR: char = '&';

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Genome {
    pub wa: f32,
    pub wb: f32,
    pub wc: f32,
    pub wd: f32,
    pub we: f32,
    pub wf: f32,
    pub first_layer_neurons: u32,
}

impl Genome {
    pub fn from_weights(weights: [f32; GENOME_WEIGHTS], first_layer_neurons: u32) -> Self {
        let [wa, wb, wc, wd, we, wf] = weights;
        Self {
            wa,
            wb,
            wc,
            wd,
            we,
            wf,
            first_layer_neurons,
        }
    }

    pub fn weights(&self) -> [f32; GENOME_WEIGHTS] {
        [self.wa, self.wb, self.wc, self.wd, self.we, self.wf]
    }

    pub fn hidden_weights(&self) -> [f32; 3] {
        [self.wa, self.wb, self.wc]
    }

    pub fn output_weights(&self) -> [f32; 3] {
        [self.wd, self.we, self.wf]
    }

    /// Collapses the tied 3 -> 1 -> 3 map into one colour matrix,
    /// `m[k][j] = output[k] * hidden[j]`. Exact only for identity activations.
    pub fn composite_matrix(&self) -> Matrix3 {
        let hidden = self.hidden_weights();
        let output = self.output_weights();
        let mut m = [[0.0f32; 3]; 3];
        for (k, row) in m.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = output[k] * hidden[j];
            }
        }
        Matrix3(m)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let line = content.lines().next().unwrap_or_default();
        line.parse()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_string())?;
        Ok(())
    }
}

impl fmt::Display for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for weight in self.weights() {
            write!(f, "{weight}{FIELD_SEPARATOR}")?;
        }
        write!(f, "{}", self.first_layer_neurons)
    }
}

impl FromStr for Genome {
    type Err = DaltonError;

    fn from_str(record: &str) -> Result<Self> {
        let fields: Vec<&str> = record.trim().split(FIELD_SEPARATOR).collect();
        if fields.len() != GENOME_WEIGHTS + 1 {
            return Err(DaltonError::malformed_genome(format!(
                "expected {} fields, found {}",
                GENOME_WEIGHTS + 1,
                fields.len()
            )));
        }

        let mut weights = [0.0f32; GENOME_WEIGHTS];
        for (slot, (weight, raw)) in weights.iter_mut().zip(&fields).enumerate() {
            let value: f32 = raw.trim().parse().map_err(|_| {
                DaltonError::malformed_genome(format!("field {slot} is not a float: '{raw}'"))
            })?;
            if !value.is_finite() {
                return Err(DaltonError::malformed_genome(format!(
                    "field {slot} is not finite: '{raw}'"
                )));
            }
            *weight = value;
        }

        let raw_count = fields[GENOME_WEIGHTS].trim();
        let first_layer_neurons: u32 = raw_count.parse().map_err(|_| {
            DaltonError::malformed_genome(format!("neuron count is not an unsigned integer: '{raw_count}'"))
        })?;
        if first_layer_neurons == 0 || first_layer_neurons as usize % TYING_RATIO != 0 {
            return Err(DaltonError::malformed_genome(format!(
                "neuron count must be a positive multiple of {TYING_RATIO}, found {first_layer_neurons}"
            )));
        }

        Ok(Genome::from_weights(weights, first_layer_neurons))
    }
}
