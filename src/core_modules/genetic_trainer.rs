// THEORY:
// The genetic trainer searches the six-float genome space directly. A fixed-size
// population of tied networks is scored against a desired image, the two fittest
// members become parents, and every member is rebuilt from them scalar by scalar:
//
//   u ~ U(0, 1)
//   u < 0.45  -> take the best parent's scalar
//   u < 0.90  -> take the second parent's scalar
//   otherwise -> mutate: fresh draw in [-5, 5]
//
// Fitness is the summed CIE-76 distance between each output triple and its desired
// triple, both read as colours and taken through LUV. Lower is better.
//
// After recombination the best genome is written back into its own slot, so the
// current champion always survives into the next generation. With deterministic
// inference this makes the best fitness non-increasing across generations.
//
// Every random draw comes from the injected `R: Rng`; a seeded generator gives a
// reproducible run.

use crate::core_modules::activation::Activation;
use crate::core_modules::colour_space::Triple;
use crate::core_modules::genome::{GENOME_WEIGHTS, Genome};
use crate::core_modules::smart_pixel::smart_pixel::SmartPixel;
use crate::core_modules::tied_network::{SharedWeights, TYING_RATIO, TiedNetwork, WEIGHT_RANGE};
use crate::error::{DaltonError, Result};
use rand::Rng;
use rand::rngs::StdRng;

pub const BEST_PARENT_THRESHOLD: f32 = 0.45;
pub const SECOND_PARENT_THRESHOLD: f32 = 0.90;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneticConfig {
    pub population_size: usize,
    pub generations: usize,
    pub hidden_activation: Activation,
    pub output_activation: Activation,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            population_size: 10,
            generations: 20,
            hidden_activation: Activation::Relu,
            output_activation: Activation::Relu,
        }
    }
}

impl GeneticConfig {
    pub fn validate(&self) -> Result<()> {
        if self.population_size < 2 {
            return Err(DaltonError::invalid_config(
                "population_size",
                format!("{} is below the two parents selection needs", self.population_size),
            ));
        }
        Ok(())
    }
}

/// Outcome of one evaluated generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationReport {
    pub generation: usize,
    pub best_index: usize,
    pub best_fitness: f32,
    pub second_index: usize,
    pub second_fitness: f32,
}

/// Derives the LUV view of every desired triple once per sample.
pub fn perceptual_targets(desired: &[f32]) -> Vec<SmartPixel> {
    desired
        .chunks_exact(TYING_RATIO)
        .map(|triple| SmartPixel::from_triple([triple[0], triple[1], triple[2]]))
        .collect()
}

/// Summed colour difference between a network's output and the desired image.
pub fn fitness(network: &TiedNetwork, input: &[f32], targets: &[SmartPixel]) -> Result<f32> {
    if targets.len() != network.pixel_count() {
        return Err(DaltonError::dimension_mismatch(
            network.pixel_count(),
            targets.len(),
            "fitness targets",
        ));
    }
    let output = network.infer(input)?;
    let total: f64 = output
        .chunks_exact(TYING_RATIO)
        .zip(targets)
        .map(|(produced, target)| {
            let produced: Triple = [produced[0], produced[1], produced[2]];
            SmartPixel::from_triple(produced).colour_difference(target) as f64
        })
        .sum();
    Ok(total as f32)
}

// NaN fitness ranks below every finite value.
fn fitter(candidate: f32, incumbent: f32) -> bool {
    candidate < incumbent || (incumbent.is_nan() && !candidate.is_nan())
}

/// Indices of the lowest and second-lowest fitness. Ties keep the earlier index.
pub fn select_parents(fitness: &[f32]) -> Result<(usize, usize)> {
    if fitness.len() < 2 {
        return Err(DaltonError::invalid_config(
            "population_size",
            format!("{} members cannot supply two parents", fitness.len()),
        ));
    }
    let mut best = 0;
    let mut second: Option<usize> = None;
    for (index, &value) in fitness.iter().enumerate().skip(1) {
        if fitter(value, fitness[best]) {
            second = Some(best);
            best = index;
        } else if second.is_none_or(|s| fitter(value, fitness[s])) {
            second = Some(index);
        }
    }
    Ok((best, second.unwrap_or(1)))
}

/// One crossover-or-mutation draw per scalar.
pub fn recombine<R: Rng + ?Sized>(
    best: &[f32; GENOME_WEIGHTS],
    second: &[f32; GENOME_WEIGHTS],
    rng: &mut R,
) -> [f32; GENOME_WEIGHTS] {
    let mut child = [0.0f32; GENOME_WEIGHTS];
    for (slot, value) in child.iter_mut().enumerate() {
        let u: f32 = rng.gen_range(0.0..1.0);
        *value = if u < BEST_PARENT_THRESHOLD {
            best[slot]
        } else if u < SECOND_PARENT_THRESHOLD {
            second[slot]
        } else {
            rng.gen_range(-WEIGHT_RANGE..=WEIGHT_RANGE)
        };
    }
    child
}

fn genome_weights(network: &TiedNetwork) -> [f32; GENOME_WEIGHTS] {
    let weights = network.weights();
    let [wa, wb, wc] = weights.hidden;
    let [wd, we, wf] = weights.output;
    [wa, wb, wc, wd, we, wf]
}

fn shared_weights(weights: [f32; GENOME_WEIGHTS]) -> SharedWeights {
    let [wa, wb, wc, wd, we, wf] = weights;
    SharedWeights {
        hidden: [wa, wb, wc],
        output: [wd, we, wf],
    }
}

pub struct GeneticTrainer<R: Rng = StdRng> {
    config: GeneticConfig,
    population: Vec<TiedNetwork>,
    rng: R,
    generation: usize,
    champion: usize,
}

impl<R: Rng> GeneticTrainer<R> {
    /// Builds a population for `first_layer_neurons` inputs. Slot 0 holds `seed`
    /// when one is given, every other slot a random genome.
    pub fn new(
        config: GeneticConfig,
        first_layer_neurons: usize,
        seed: Option<&Genome>,
        mut rng: R,
    ) -> Result<Self> {
        config.validate()?;
        let mut population = Vec::with_capacity(config.population_size);
        if let Some(genome) = seed {
            if genome.first_layer_neurons as usize != first_layer_neurons {
                return Err(DaltonError::dimension_mismatch(
                    first_layer_neurons,
                    genome.first_layer_neurons as usize,
                    "seed genome neuron count",
                ));
            }
            population.push(TiedNetwork::from_genome(
                genome,
                config.hidden_activation,
                config.output_activation,
            )?);
        }
        while population.len() < config.population_size {
            population.push(TiedNetwork::new(
                first_layer_neurons,
                config.hidden_activation,
                config.output_activation,
                &mut rng,
            )?);
        }
        Ok(Self {
            config,
            population,
            rng,
            generation: 0,
            champion: 0,
        })
    }

    pub fn config(&self) -> &GeneticConfig {
        &self.config
    }

    pub fn population(&self) -> &[TiedNetwork] {
        &self.population
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    /// The best member found by the last generation (slot 0 before the first one).
    pub fn best_genome(&self) -> Genome {
        self.population[self.champion].to_genome()
    }

    /// Fitness of every member, index-aligned with the population.
    pub fn evaluate(&self, input: &[f32], desired: &[f32]) -> Result<Vec<f32>> {
        let targets = perceptual_targets(desired);
        self.population
            .iter()
            .map(|network| fitness(network, input, &targets))
            .collect()
    }

    /// Selects parents from `fitness`, rebuilds every member and keeps the champion.
    pub fn advance(&mut self, fitness: &[f32]) -> Result<GenerationReport> {
        if fitness.len() != self.population.len() {
            return Err(DaltonError::dimension_mismatch(
                self.population.len(),
                fitness.len(),
                "population fitness",
            ));
        }
        let (best_index, second_index) = select_parents(fitness)?;
        let best = genome_weights(&self.population[best_index]);
        let second = genome_weights(&self.population[second_index]);

        for network in &mut self.population {
            network.weights = shared_weights(recombine(&best, &second, &mut self.rng));
        }
        self.population[best_index].weights = shared_weights(best);
        self.champion = best_index;

        let report = GenerationReport {
            generation: self.generation,
            best_index,
            best_fitness: fitness[best_index],
            second_index,
            second_fitness: fitness[second_index],
        };
        self.generation += 1;
        tracing::debug!(
            generation = report.generation,
            best = report.best_fitness,
            second = report.second_fitness,
            "genetic generation"
        );
        Ok(report)
    }

    pub fn run_generation(&mut self, input: &[f32], desired: &[f32]) -> Result<GenerationReport> {
        let fitness = self.evaluate(input, desired)?;
        self.advance(&fitness)
    }

    /// Checks both buffers against the population's input size.
    pub fn ensure_sample(&self, input: &[f32], desired: &[f32]) -> Result<()> {
        let network = &self.population[0];
        network.ensure_input_len(input.len(), "genetic sample input")?;
        network.ensure_input_len(desired.len(), "genetic sample desired output")
    }

    /// Hands the current best genome to `persist` and logs the sample outcome.
    pub fn finish_sample<F>(&self, reports: &[GenerationReport], mut persist: F) -> Result<()>
    where
        F: FnMut(&Genome) -> Result<()>,
    {
        if let Some(last) = reports.last() {
            tracing::info!(
                generations = reports.len(),
                best_fitness = last.best_fitness,
                "genetic sample finished"
            );
        }
        persist(&self.best_genome())
    }

    /// Runs the configured number of generations on one sample, then hands the
    /// best genome to `persist`.
    pub fn train_sample<F>(
        &mut self,
        input: &[f32],
        desired: &[f32],
        persist: F,
    ) -> Result<Vec<GenerationReport>>
    where
        F: FnMut(&Genome) -> Result<()>,
    {
        self.ensure_sample(input, desired)?;
        let mut reports = Vec::with_capacity(self.config.generations);
        for _ in 0..self.config.generations {
            reports.push(self.run_generation(input, desired)?);
        }
        self.finish_sample(&reports, persist)?;
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn config(population_size: usize, generations: usize) -> GeneticConfig {
        GeneticConfig {
            population_size,
            generations,
            hidden_activation: Activation::Identity,
            output_activation: Activation::Identity,
        }
    }

    fn sample() -> (Vec<f32>, Vec<f32>) {
        let input = vec![0.2, 0.4, 0.6, 0.9, 0.1, 0.3, 0.5, 0.5, 0.5, 0.0, 0.8, 0.2];
        let desired = vec![0.3, 0.3, 0.3, 0.7, 0.7, 0.7, 0.6, 0.6, 0.6, 0.4, 0.4, 0.4];
        (input, desired)
    }

    #[test]
    fn select_parents_prefers_lowest_and_breaks_ties_by_order() {
        assert_eq!(select_parents(&[3.0, 1.0, 2.0, 1.0]).unwrap(), (1, 3));
        assert_eq!(select_parents(&[1.0, 5.0, 0.5]).unwrap(), (2, 0));
        assert_eq!(select_parents(&[2.0, 2.0, 2.0]).unwrap(), (0, 1));
        assert_eq!(select_parents(&[0.5, 4.0, 3.0]).unwrap(), (0, 2));
    }

    #[test]
    fn select_parents_ranks_nan_last() {
        assert_eq!(select_parents(&[f32::NAN, 2.0, 1.0]).unwrap(), (2, 1));
    }

    #[test]
    fn select_parents_needs_two_members() {
        assert!(select_parents(&[1.0]).is_err());
    }

    #[test]
    fn recombination_draws_only_from_parents_or_mutation_range() {
        let mut rng = StdRng::seed_from_u64(11);
        let best = [1.0; GENOME_WEIGHTS];
        let second = [2.0; GENOME_WEIGHTS];
        let mut from_best = 0;
        let mut from_second = 0;
        for _ in 0..1000 {
            for value in recombine(&best, &second, &mut rng) {
                assert!((-WEIGHT_RANGE..=WEIGHT_RANGE).contains(&value));
                if value == 1.0 {
                    from_best += 1;
                } else if value == 2.0 {
                    from_second += 1;
                }
            }
        }
        // 6000 draws at 45% / 45% / 10%.
        assert!((2400..3000).contains(&from_best));
        assert!((2400..3000).contains(&from_second));
    }

    #[test]
    fn population_size_below_two_is_rejected() {
        let rng = StdRng::seed_from_u64(1);
        assert!(GeneticTrainer::new(config(1, 1), 12, None, rng).is_err());
    }

    #[test]
    fn seed_genome_occupies_slot_zero() {
        let seed = Genome::from_weights([1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 12);
        let trainer = GeneticTrainer::new(config(4, 1), 12, Some(&seed), StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(trainer.population().len(), 4);
        assert_eq!(trainer.population()[0].to_genome(), seed);
        assert_eq!(trainer.best_genome(), seed);
    }

    #[test]
    fn seed_genome_for_another_resolution_is_rejected() {
        let seed = Genome::from_weights([1.0; 6], 27);
        let result = GeneticTrainer::new(config(4, 1), 12, Some(&seed), StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(DaltonError::DimensionMismatch { .. })));
    }

    #[test]
    fn best_fitness_never_gets_worse() {
        let (input, desired) = sample();
        let mut trainer = GeneticTrainer::new(config(8, 30), 12, None, StdRng::seed_from_u64(5)).unwrap();
        let reports = trainer.train_sample(&input, &desired, |_| Ok(())).unwrap();
        assert_eq!(reports.len(), 30);
        for pair in reports.windows(2) {
            assert!(pair[1].best_fitness <= pair[0].best_fitness);
        }
    }

    #[test]
    fn champion_survives_recombination() {
        let (input, desired) = sample();
        let mut trainer = GeneticTrainer::new(config(6, 1), 12, None, StdRng::seed_from_u64(9)).unwrap();
        let fitness = trainer.evaluate(&input, &desired).unwrap();
        let (best_index, _) = select_parents(&fitness).unwrap();
        let champion = trainer.population()[best_index].to_genome();
        trainer.advance(&fitness).unwrap();
        assert_eq!(trainer.best_genome(), champion);
    }

    #[test]
    fn persist_hook_receives_the_best_genome() {
        let (input, desired) = sample();
        let mut trainer = GeneticTrainer::new(config(5, 3), 12, None, StdRng::seed_from_u64(2)).unwrap();
        let mut persisted = Vec::new();
        trainer
            .train_sample(&input, &desired, |genome| {
                persisted.push(*genome);
                Ok(())
            })
            .unwrap();
        assert_eq!(persisted, vec![trainer.best_genome()]);
    }

    #[test]
    fn mismatched_sample_fails_before_any_generation() {
        let mut trainer = GeneticTrainer::new(config(3, 2), 12, None, StdRng::seed_from_u64(2)).unwrap();
        let result = trainer.train_sample(&[0.0; 9], &[0.0; 12], |_| Ok(()));
        assert!(result.is_err());
        assert_eq!(trainer.generation(), 0);
    }

    #[test]
    fn identical_prediction_has_zero_fitness() {
        let network = TiedNetwork::with_weights(
            3,
            SharedWeights {
                hidden: [1.0, 0.0, 0.0],
                output: [1.0, 1.0, 1.0],
            },
            Activation::Identity,
            Activation::Identity,
        )
        .unwrap();
        let targets = perceptual_targets(&[0.5, 0.5, 0.5]);
        assert_eq!(fitness(&network, &[0.5, 0.9, 0.1], &targets).unwrap(), 0.0);
    }
}
