// THEORY:
// The `pipeline` module is the top-level API of the engine. It encapsulates the
// full stack (pixel model, image filters, tied network, both trainers) behind the
// four entry points an orchestrator needs:
//
//   train_gradient(batch, network)                         -> (network, error)
//   train_genetic(batch, seed, population, generations)    -> best genome
//   infer(image, network)                                  -> output channels
//   simulate(image, kind)                                  -> image
//
// plus the end-user `transform` and whole-dataset training runs driven by
// `PipelineConfig`.
//
// Every image is checked against the configured resolution before any pixel loop
// runs. Dataset runs treat a failing sample as skipped: it is logged and the run
// moves on. Errors that concern the run itself (an unreadable dataset directory,
// an unwritable genome file) abort it.
//
// The pipeline owns the run's random source. Trainers that need their own
// generator get one seeded from it, so a seeded configuration reproduces a
// whole run.

use crate::config::{PipelineConfig, TargetKind};
use crate::core_modules::genetic_trainer::{GeneticConfig, GeneticTrainer};
use crate::core_modules::genome::Genome;
use crate::core_modules::gradient_trainer::GradientTrainer;
use crate::core_modules::image::{Image, InputSpace, SimulationKind};
use crate::core_modules::pixel::pixel::{Deficiency, Rgb};
use crate::core_modules::tied_network::{LayerRole, TiedNetwork};
use crate::error::{DaltonError, Result};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::path::{Path, PathBuf};

// Re-export key data structures for the public API.
pub use crate::core_modules::genetic_trainer::GenerationReport;

/// Outcome of a whole-dataset training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub samples_trained: usize,
    pub samples_skipped: usize,
    /// Gradient runs: error of the last step. Genetic runs: best fitness of the last generation.
    pub last_score: Option<f32>,
    pub genome: Genome,
}

/// The main, top-level struct for the daltonization engine.
pub struct DaltonizationPipeline {
    config: PipelineConfig,
    rng: StdRng,
}

impl DaltonizationPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self { config, rng })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn child_rng(&mut self) -> StdRng {
        StdRng::seed_from_u64(self.rng.next_u64())
    }

    pub fn ensure_resolution(&self, image: &Image) -> Result<()> {
        if image.width() as u32 != self.config.image_width || image.height() as u32 != self.config.image_height {
            return Err(DaltonError::dimension_mismatch(
                self.config.first_layer_neurons(),
                image.pixel_count() * 3,
                format!(
                    "image {}x{} vs configured {}x{}",
                    image.width(),
                    image.height(),
                    self.config.image_width,
                    self.config.image_height
                ),
            ));
        }
        Ok(())
    }

    /// A freshly initialised network for the configured resolution.
    pub fn new_network(&mut self) -> Result<TiedNetwork> {
        let mut rng = self.child_rng();
        let mut network = TiedNetwork::new(
            self.config.first_layer_neurons(),
            self.config.hidden_activation,
            self.config.output_activation,
            &mut rng,
        )?;
        network.set_learning_rate(self.config.learning_rate);
        Ok(network)
    }

    /// Loads a network from a genome file, checking it matches the configured resolution.
    pub fn load_network(&self, path: impl AsRef<Path>) -> Result<TiedNetwork> {
        let mut network = TiedNetwork::from_genome_file(
            path,
            self.config.hidden_activation,
            self.config.output_activation,
        )?;
        if network.input_len() != self.config.first_layer_neurons() {
            return Err(DaltonError::dimension_mismatch(
                self.config.first_layer_neurons(),
                network.input_len(),
                "persisted genome neuron count",
            ));
        }
        network.set_learning_rate(self.config.learning_rate);
        Ok(network)
    }

    pub fn network_input(&self, image: &Image) -> Vec<f32> {
        image.channels(self.config.input_space)
    }

    /// The channel vector the network is trained to reproduce for `image`.
    pub fn desired_output(&self, image: &Image) -> Vec<f32> {
        let simulated = image.simulate(self.config.target.simulation());
        match self.config.target {
            TargetKind::PerceptualEdges { .. } => simulated.blur().sobel_colour().channels(InputSpace::Rgb),
            TargetKind::LmsDaltonization { .. } | TargetKind::Heuristic => {
                simulated.channels(InputSpace::Rgb)
            }
        }
    }

    /// One online gradient step per image. Returns the trained network and the
    /// error of the last step.
    pub fn train_gradient(&self, batch: &[Image], mut network: TiedNetwork) -> Result<(TiedNetwork, f32)> {
        for image in batch {
            self.ensure_resolution(image)?;
        }
        network.ensure_input_len(self.config.first_layer_neurons(), "network resolution")?;

        let mut trainer = GradientTrainer::new();
        let mut error = network.error();
        for image in batch {
            error = trainer.step(&mut network, &self.network_input(image), &self.desired_output(image))?;
        }
        tracing::info!(samples = batch.len(), error, "gradient batch finished");
        Ok((network, error))
    }

    /// Runs `generations` generations on every image of the batch with a single
    /// population and returns the best genome found.
    pub fn train_genetic(
        &mut self,
        batch: &[Image],
        seed_genome: Option<&Genome>,
        population_size: usize,
        generations: usize,
    ) -> Result<Genome> {
        for image in batch {
            self.ensure_resolution(image)?;
        }
        let mut trainer = self.genetic_trainer(seed_genome, population_size, generations)?;
        for image in batch {
            trainer.train_sample(&self.network_input(image), &self.desired_output(image), |_| Ok(()))?;
        }
        Ok(trainer.best_genome())
    }

    /// A population for the configured resolution, seeded from the pipeline's generator.
    pub fn genetic_trainer(
        &mut self,
        seed_genome: Option<&Genome>,
        population_size: usize,
        generations: usize,
    ) -> Result<GeneticTrainer> {
        let config = GeneticConfig {
            population_size,
            generations,
            hidden_activation: self.config.hidden_activation,
            output_activation: self.config.output_activation,
        };
        let rng = self.child_rng();
        GeneticTrainer::new(config, self.config.first_layer_neurons(), seed_genome, rng)
    }

    pub fn infer(&self, image: &Image, network: &TiedNetwork) -> Result<Vec<f32>> {
        network.ensure_input_len(image.pixel_count() * 3, "image against network")?;
        network.infer(&self.network_input(image))
    }

    pub fn simulate(image: &Image, kind: SimulationKind) -> Image {
        image.simulate(kind)
    }

    /// Applies the network to `image` and limits every output channel to [0, 1].
    pub fn transform(&self, image: &Image, network: &TiedNetwork) -> Result<Image> {
        let output = self.infer(image, network)?;
        Image::from_channels(image.width(), image.height(), &output)
    }

    /// Applies the genome's composite colour matrix to every pixel. Equal to
    /// `transform` for identity activations and RGB input.
    pub fn transform_linear(image: &Image, genome: &Genome) -> Image {
        let matrix = genome.composite_matrix();
        let mut output = image.clone();
        for pixel in output.pixels_mut() {
            pixel.rgb = Rgb::from_array(matrix.apply(pixel.rgb.to_array())).clamped();
        }
        output
    }

    /// Writes the original and transformed images next to their simulated and
    /// edge-map views, so a sighted viewer can compare what a deficient viewer sees.
    pub fn export_comparison(
        &self,
        image: &Image,
        network: &TiedNetwork,
        directory: impl AsRef<Path>,
    ) -> Result<Vec<PathBuf>> {
        let directory = directory.as_ref();
        std::fs::create_dir_all(directory)?;
        let deficiency = self.config.target.deficiency().unwrap_or(Deficiency::Deuteranopia);
        let simulation = SimulationKind::simulation_for(deficiency);
        let transformed = self.transform(image, network)?;

        let mut written = Vec::new();
        for (name, source) in [("original", image), ("transformed", &transformed)] {
            let simulated = source.simulate(simulation);
            let views = [
                (format!("{name}.png"), source.clone()),
                (format!("{name}_simulated.png"), simulated.clone()),
                (format!("{name}_edges.png"), simulated.blur().sobel_colour()),
            ];
            for (file_name, mut view) in views {
                let path = directory.join(file_name);
                view.export(&path)?;
                written.push(path);
            }
        }
        tracing::info!(directory = %directory.display(), files = written.len(), "comparison exported");
        Ok(written)
    }

    /// Image files in `dataset_dir`, sorted by file name.
    pub fn dataset_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.config.dataset_dir)? {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn load_sample(&self, path: &Path) -> Result<Image> {
        let image = Image::load(path)?;
        self.ensure_resolution(&image)?;
        Ok(image)
    }

    fn export_debug(&self, path: &Path, output: &[f32], desired: &[f32]) -> Result<()> {
        let Some(directory) = &self.config.debug_export_dir else {
            return Ok(());
        };
        std::fs::create_dir_all(directory)?;
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("sample");
        let width = self.config.image_width as u16;
        let height = self.config.image_height as u16;
        Image::from_channels(width, height, output)?.export(directory.join(format!("{stem}_output.png")))?;
        Image::from_channels(width, height, desired)?.export(directory.join(format!("{stem}_target.png")))?;
        Ok(())
    }

    /// Loads a sample, or logs and counts it as skipped when it cannot be decoded
    /// or has the wrong resolution.
    fn load_or_skip(&self, path: &Path, summary: &mut TrainingSummary) -> Option<Image> {
        match self.load_sample(path) {
            Ok(image) => Some(image),
            Err(err) => {
                summary.samples_skipped += 1;
                tracing::warn!(path = %path.display(), error = %err, "skipping sample");
                None
            }
        }
    }

    /// Gradient training over the dataset for `training_iterations` passes. Training
    /// resumes from the genome at `genome_path` when one exists, and the result is
    /// written back once the run completes.
    pub fn run_gradient_training(&mut self) -> Result<TrainingSummary> {
        let files = self.dataset_files()?;
        let mut network = if self.config.genome_path.is_file() {
            tracing::info!(genome = %self.config.genome_path.display(), "resuming from persisted genome");
            self.load_network(&self.config.genome_path)?
        } else {
            self.new_network()?
        };
        let mut trainer = GradientTrainer::new();
        let mut summary = TrainingSummary {
            samples_trained: 0,
            samples_skipped: 0,
            last_score: None,
            genome: network.to_genome(),
        };
        tracing::info!(
            samples = files.len(),
            iterations = self.config.training_iterations,
            "gradient training started"
        );

        for iteration in 0..self.config.training_iterations {
            for (index, path) in files.iter().enumerate() {
                let Some(image) = self.load_or_skip(path, &mut summary) else {
                    continue;
                };
                let input = self.network_input(&image);
                let desired = self.desired_output(&image);
                let error = trainer.step(&mut network, &input, &desired)?;
                self.export_debug(path, network.layer(LayerRole::Output).values(), &desired)?;

                summary.samples_trained += 1;
                summary.last_score = Some(error);
                tracing::info!(
                    sample = iteration * files.len() + index + 1,
                    of = files.len() * self.config.training_iterations,
                    error,
                    "gradient sample trained"
                );
            }
        }

        network.export_genome(&self.config.genome_path)?;
        summary.genome = network.to_genome();
        tracing::info!(
            trained = summary.samples_trained,
            skipped = summary.samples_skipped,
            genome = %self.config.genome_path.display(),
            "gradient training finished"
        );
        Ok(summary)
    }

    /// Genetic training over the dataset. An existing genome at `genome_path`
    /// seeds the population, and the best genome is written back after every sample.
    pub fn run_genetic_training(&mut self) -> Result<TrainingSummary> {
        let files = self.dataset_files()?;
        let seed = if self.config.genome_path.is_file() {
            let genome = Genome::load(&self.config.genome_path)?;
            tracing::info!(genome = %self.config.genome_path.display(), "seeding population from persisted genome");
            Some(genome)
        } else {
            None
        };
        let mut trainer =
            self.genetic_trainer(seed.as_ref(), self.config.population_size, self.config.generations)?;
        let mut summary = TrainingSummary {
            samples_trained: 0,
            samples_skipped: 0,
            last_score: None,
            genome: trainer.best_genome(),
        };
        tracing::info!(
            samples = files.len(),
            population = self.config.population_size,
            generations = self.config.generations,
            "genetic training started"
        );

        let genome_path = self.config.genome_path.clone();
        for _ in 0..self.config.training_iterations {
            for path in &files {
                let Some(image) = self.load_or_skip(path, &mut summary) else {
                    continue;
                };
                let input = self.network_input(&image);
                let desired = self.desired_output(&image);
                let reports = trainer.train_sample(&input, &desired, |best| best.save(&genome_path))?;
                if self.config.debug_export_dir.is_some() {
                    let best = trainer.population()[reports.last().map_or(0, |r| r.best_index)].infer(&input)?;
                    self.export_debug(path, &best, &desired)?;
                }

                summary.samples_trained += 1;
                summary.last_score = reports.last().map(|r| r.best_fitness);
            }
        }

        summary.genome = trainer.best_genome();
        tracing::info!(
            trained = summary.samples_trained,
            skipped = summary.samples_skipped,
            best = ?summary.last_score,
            "genetic training finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::activation::Activation;
    use crate::core_modules::tied_network::SharedWeights;

    fn config(width: u32, height: u32) -> PipelineConfig {
        PipelineConfig {
            image_width: width,
            image_height: height,
            seed: Some(17),
            population_size: 4,
            generations: 3,
            ..PipelineConfig::default()
        }
    }

    fn gradient_image(width: u16, height: u16) -> Image {
        let mut image = Image::new(width, height).unwrap();
        for (i, pixel) in image.pixels_mut().iter_mut().enumerate() {
            let v = i as f32 / (width as f32 * height as f32);
            pixel.rgb = Rgb::new(v, 1.0 - v, 0.3);
        }
        image
    }

    #[test]
    fn wrong_resolution_is_rejected_before_training() {
        let mut pipeline = DaltonizationPipeline::new(config(4, 4)).unwrap();
        let network = pipeline.new_network().unwrap();
        let result = pipeline.train_gradient(&[gradient_image(3, 4)], network);
        assert!(matches!(result, Err(DaltonError::DimensionMismatch { .. })));
    }

    #[test]
    fn train_gradient_reports_the_last_error() {
        let mut pipeline = DaltonizationPipeline::new(config(3, 3)).unwrap();
        let network = pipeline.new_network().unwrap();
        let (network, error) = pipeline
            .train_gradient(&[gradient_image(3, 3), gradient_image(3, 3)], network)
            .unwrap();
        assert_eq!(network.error(), error);
        assert!(error.is_finite());
    }

    #[test]
    fn seeded_pipelines_train_identically() {
        let batch = [gradient_image(3, 2)];
        let mut first = DaltonizationPipeline::new(config(3, 2)).unwrap();
        let mut second = DaltonizationPipeline::new(config(3, 2)).unwrap();
        let a = first.train_genetic(&batch, None, 4, 3).unwrap();
        let b = second.train_genetic(&batch, None, 4, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn perceptual_edges_target_has_zero_border() {
        let pipeline = DaltonizationPipeline::new(PipelineConfig {
            target: TargetKind::PerceptualEdges {
                deficiency: Deficiency::Deuteranopia,
            },
            ..config(4, 4)
        })
        .unwrap();
        let desired = pipeline.desired_output(&gradient_image(4, 4));
        assert_eq!(desired.len(), 48);
        assert!(desired[..12].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn transform_limits_output_to_unit_range() {
        let pipeline = DaltonizationPipeline::new(config(2, 2)).unwrap();
        let network = TiedNetwork::with_weights(
            12,
            SharedWeights {
                hidden: [5.0, 5.0, 5.0],
                output: [5.0, -5.0, 0.1],
            },
            Activation::Identity,
            Activation::Identity,
        )
        .unwrap();
        let transformed = pipeline.transform(&gradient_image(2, 2), &network).unwrap();
        for pixel in transformed.pixels() {
            assert_eq!(pixel.rgb.red, 1.0);
            assert_eq!(pixel.rgb.green, 0.0);
            assert!((0.0..=1.0).contains(&pixel.rgb.blue));
        }
    }

    #[test]
    fn simulate_leaves_the_source_untouched() {
        let image = gradient_image(3, 3);
        let simulated = DaltonizationPipeline::simulate(&image, SimulationKind::LmsDeuteranopia);
        assert_eq!(simulated.width(), 3);
        assert_eq!(image.pixels()[0].rgb, Rgb::new(0.0, 1.0, 0.3));
        assert_ne!(simulated.pixels()[0].rgb, image.pixels()[0].rgb);
    }

    #[test]
    fn linear_transform_matches_identity_network() {
        let pipeline = DaltonizationPipeline::new(config(2, 2)).unwrap();
        let genome = Genome::from_weights([0.3, 0.2, 0.1, 1.0, 0.5, 0.8], 12);
        let network = TiedNetwork::from_genome(&genome, Activation::Identity, Activation::Identity).unwrap();
        let image = gradient_image(2, 2);
        let through_network = pipeline.transform(&image, &network).unwrap();
        let through_matrix = DaltonizationPipeline::transform_linear(&image, &genome);
        for (a, b) in through_network.pixels().iter().zip(through_matrix.pixels()) {
            for (x, y) in a.rgb.to_array().iter().zip(b.rgb.to_array()) {
                assert!((x - y).abs() < 1e-5);
            }
        }
    }
}
