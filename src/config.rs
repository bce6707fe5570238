// THEORY:
// `PipelineConfig` is the single tunable surface of the engine. It is a plain
// struct with public fields and sensible defaults, so callers can build one in
// code, and it also deserializes from TOML so a run can be described in a file.
// Every field is optional in the file; missing fields take their default.
//
// Validation is explicit and runs once, before any image is loaded.

use crate::core_modules::activation::Activation;
use crate::core_modules::image::{InputSpace, SimulationKind};
use crate::core_modules::pixel::pixel::Deficiency;
use crate::core_modules::tied_network::DEFAULT_LEARNING_RATE;
use crate::error::{DaltonError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the desired network output is derived from a training image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetKind {
    /// Per-pixel LMS daltonization of the raw image.
    LmsDaltonization { deficiency: Deficiency },
    /// Simulate the deficiency, blur, then take the perceptual edge map.
    PerceptualEdges { deficiency: Deficiency },
    /// Parameter-free RGB push.
    Heuristic,
}

impl Default for TargetKind {
    fn default() -> Self {
        TargetKind::LmsDaltonization {
            deficiency: Deficiency::Deuteranopia,
        }
    }
}

impl TargetKind {
    pub fn deficiency(&self) -> Option<Deficiency> {
        match self {
            TargetKind::LmsDaltonization { deficiency } | TargetKind::PerceptualEdges { deficiency } => {
                Some(*deficiency)
            }
            TargetKind::Heuristic => None,
        }
    }

    /// The per-pixel route applied before any neighbourhood filter.
    pub fn simulation(&self) -> SimulationKind {
        match self {
            TargetKind::LmsDaltonization { deficiency } => SimulationKind::daltonization_for(*deficiency),
            TargetKind::PerceptualEdges { deficiency } => SimulationKind::simulation_for(*deficiency),
            TargetKind::Heuristic => SimulationKind::Heuristic,
        }
    }
}

/// Configuration for the DaltonizationPipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub image_width: u32,
    pub image_height: u32,
    pub learning_rate: f32,
    pub hidden_activation: Activation,
    pub output_activation: Activation,
    pub input_space: InputSpace,
    pub target: TargetKind,
    pub population_size: usize,
    pub generations: usize,
    /// Passes over the whole dataset.
    pub training_iterations: usize,
    /// Fixed seed for every random draw. `None` seeds from the OS.
    pub seed: Option<u64>,
    pub dataset_dir: PathBuf,
    pub genome_path: PathBuf,
    /// When set, each sample's network output and target are written here.
    pub debug_export_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            image_width: 64,
            image_height: 64,
            learning_rate: DEFAULT_LEARNING_RATE,
            hidden_activation: Activation::Relu,
            output_activation: Activation::Relu,
            input_space: InputSpace::Rgb,
            target: TargetKind::default(),
            population_size: 10,
            generations: 20,
            training_iterations: 1,
            seed: None,
            dataset_dir: PathBuf::from("assets/training_dataset"),
            genome_path: PathBuf::from("assets/data/genome.dat"),
            debug_export_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Input-layer size for the configured resolution.
    pub fn first_layer_neurons(&self) -> usize {
        self.image_width as usize * self.image_height as usize * 3
    }

    pub fn validate(&self) -> Result<()> {
        for (parameter, value) in [("image_width", self.image_width), ("image_height", self.image_height)] {
            if value == 0 {
                return Err(DaltonError::invalid_config(parameter, "must be non-zero"));
            }
            if value > u16::MAX as u32 {
                return Err(DaltonError::invalid_config(
                    parameter,
                    format!("{value} exceeds {}", u16::MAX),
                ));
            }
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(DaltonError::invalid_config(
                "learning_rate",
                format!("{} is not a positive finite number", self.learning_rate),
            ));
        }
        if self.population_size < 2 {
            return Err(DaltonError::invalid_config("population_size", "must be at least 2"));
        }
        if self.generations == 0 {
            return Err(DaltonError::invalid_config("generations", "must be non-zero"));
        }
        if self.training_iterations == 0 {
            return Err(DaltonError::invalid_config("training_iterations", "must be non-zero"));
        }
        Ok(())
    }
}
