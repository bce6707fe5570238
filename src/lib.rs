// THEORY:
// This file is the main entry point for the `dalton_vision` library crate.
// It exports the `DaltonizationPipeline` and its configuration as the high-level
// interface to the engine: learning a colour remapping that keeps hues
// distinguishable for viewers with a colour-vision deficiency.
//
// The `core_modules` hold the building blocks (pixel colour model, image filters,
// the weight-tied network and its two trainers). `parallel_pipeline` adds
// concurrent fitness evaluation on top of the genetic trainer.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::{PipelineConfig, TargetKind};
pub use error::{DaltonError, Result};
pub use pipeline::DaltonizationPipeline;
