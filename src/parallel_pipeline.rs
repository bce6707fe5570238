// THEORY:
// Fitness evaluation is the only embarrassingly parallel step of training: every
// population member runs inference over the same sample and nothing is mutated.
// `ParallelFitness` splits the population into one contiguous slice per CPU and
// scores each slice on a tokio blocking worker. Results are gathered in slice
// order, so the fitness vector is index-aligned with the population and equal
// to the sequential evaluation.
//
// Selection, recombination and every random draw stay on the calling task.
// `ParallelGeneticRunner` only swaps how a generation is scored, so a seeded run
// produces the same genomes with or without it.

use crate::core_modules::genetic_trainer::{GenerationReport, GeneticTrainer, fitness, perceptual_targets};
use crate::core_modules::genome::Genome;
use crate::core_modules::smart_pixel::smart_pixel::SmartPixel;
use crate::core_modules::tied_network::TiedNetwork;
use crate::error::{DaltonError, Result};
use futures::future::join_all;
use rand::Rng;
use rand::rngs::StdRng;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct ParallelFitness {
    workers: usize,
}

impl Default for ParallelFitness {
    fn default() -> Self {
        Self::new()
    }
}

impl ParallelFitness {
    /// One worker per logical CPU.
    pub fn new() -> Self {
        Self::with_workers(num_cpus::get())
    }

    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub async fn evaluate(&self, population: &[TiedNetwork], input: &[f32], desired: &[f32]) -> Result<Vec<f32>> {
        let input: Arc<[f32]> = Arc::from(input);
        let targets: Arc<[SmartPixel]> = Arc::from(perceptual_targets(desired));
        let slice_len = population.len().div_ceil(self.workers).max(1);

        let tasks = population.chunks(slice_len).map(|slice| {
            // Population members never carry activation buffers, so this copy is six floats each.
            let networks = slice.to_vec();
            let input = Arc::clone(&input);
            let targets = Arc::clone(&targets);
            tokio::task::spawn_blocking(move || {
                networks
                    .iter()
                    .map(|network| fitness(network, &input, &targets))
                    .collect::<Result<Vec<f32>>>()
            })
        });

        let mut scores = Vec::with_capacity(population.len());
        for joined in join_all(tasks).await {
            let slice = joined.map_err(|err| DaltonError::Worker(err.to_string()))??;
            scores.extend(slice);
        }
        Ok(scores)
    }
}

/// Drives a `GeneticTrainer` with parallel fitness evaluation.
pub struct ParallelGeneticRunner<R: Rng = StdRng> {
    trainer: GeneticTrainer<R>,
    fitness: ParallelFitness,
}

impl<R: Rng> ParallelGeneticRunner<R> {
    pub fn new(trainer: GeneticTrainer<R>, fitness: ParallelFitness) -> Self {
        Self { trainer, fitness }
    }

    pub fn trainer(&self) -> &GeneticTrainer<R> {
        &self.trainer
    }

    pub fn into_trainer(self) -> GeneticTrainer<R> {
        self.trainer
    }

    pub async fn run_generation(&mut self, input: &[f32], desired: &[f32]) -> Result<GenerationReport> {
        let scores = self.fitness.evaluate(self.trainer.population(), input, desired).await?;
        self.trainer.advance(&scores)
    }

    pub async fn train_sample<F>(&mut self, input: &[f32], desired: &[f32], persist: F) -> Result<Vec<GenerationReport>>
    where
        F: FnMut(&Genome) -> Result<()>,
    {
        self.trainer.ensure_sample(input, desired)?;
        let generations = self.trainer.config().generations;
        let mut reports = Vec::with_capacity(generations);
        for _ in 0..generations {
            reports.push(self.run_generation(input, desired).await?);
        }
        self.trainer.finish_sample(&reports, persist)?;
        Ok(reports)
    }
}
