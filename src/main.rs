// Example runner for the `dalton_vision` library.
//
//   dalton_vision train-gradient [config.toml]
//   dalton_vision train-genetic  [config.toml]
//   dalton_vision evolve    <image> [config.toml]
//   dalton_vision transform <input> <output> [config.toml]
//   dalton_vision compare   <input> <directory> [config.toml]
//   dalton_vision simulate  <input> <output> <kind>
//
// Logging honours RUST_LOG and defaults to `info`.

use anyhow::{Context, bail};
use dalton_vision::core_modules::genome::Genome;
use dalton_vision::core_modules::image::{Image, SimulationKind};
use dalton_vision::parallel_pipeline::{ParallelFitness, ParallelGeneticRunner};
use dalton_vision::{DaltonizationPipeline, PipelineConfig};
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn load_config(path: Option<&String>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load_from_file(path).with_context(|| format!("loading config {path}")),
        None => Ok(PipelineConfig::default()),
    }
}

fn required<'a>(args: &'a [String], index: usize, what: &str) -> anyhow::Result<&'a String> {
    args.get(index).with_context(|| format!("missing <{what}> argument"))
}

async fn evolve(image_path: &Path, config: PipelineConfig) -> anyhow::Result<()> {
    let mut pipeline = DaltonizationPipeline::new(config)?;
    let image = Image::load(image_path).with_context(|| format!("decoding {}", image_path.display()))?;
    pipeline.ensure_resolution(&image)?;

    let config = pipeline.config().clone();
    let seed = if config.genome_path.is_file() {
        Some(Genome::load(&config.genome_path)?)
    } else {
        None
    };
    let trainer = pipeline.genetic_trainer(seed.as_ref(), config.population_size, config.generations)?;
    let fitness = ParallelFitness::new();
    tracing::info!(workers = fitness.workers(), "evolving with parallel fitness");

    let mut runner = ParallelGeneticRunner::new(trainer, fitness);
    let reports = runner
        .train_sample(
            &pipeline.network_input(&image),
            &pipeline.desired_output(&image),
            |best| best.save(&config.genome_path),
        )
        .await?;
    if let Some(last) = reports.last() {
        tracing::info!(best_fitness = last.best_fitness, genome = %config.genome_path.display(), "evolution finished");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        bail!("usage: dalton_vision <train-gradient|train-genetic|evolve|transform|compare|simulate> ...");
    };

    match command.as_str() {
        "train-gradient" => {
            let mut pipeline = DaltonizationPipeline::new(load_config(args.get(1))?)?;
            let summary = pipeline.run_gradient_training()?;
            tracing::info!(?summary, "done");
        }
        "train-genetic" => {
            let mut pipeline = DaltonizationPipeline::new(load_config(args.get(1))?)?;
            let summary = pipeline.run_genetic_training()?;
            tracing::info!(?summary, "done");
        }
        "evolve" => {
            let image = required(&args, 1, "image")?;
            evolve(Path::new(image), load_config(args.get(2))?).await?;
        }
        "transform" => {
            let input = required(&args, 1, "input")?;
            let output = required(&args, 2, "output")?;
            let pipeline = DaltonizationPipeline::new(load_config(args.get(3))?)?;
            let network = pipeline.load_network(&pipeline.config().genome_path)?;
            let image = Image::load(input).with_context(|| format!("decoding {input}"))?;
            pipeline.transform(&image, &network)?.save(output)?;
            tracing::info!(%output, "transformed image written");
        }
        "compare" => {
            let input = required(&args, 1, "input")?;
            let directory = required(&args, 2, "directory")?;
            let pipeline = DaltonizationPipeline::new(load_config(args.get(3))?)?;
            let network = pipeline.load_network(&pipeline.config().genome_path)?;
            let image = Image::load(input).with_context(|| format!("decoding {input}"))?;
            pipeline.export_comparison(&image, &network, directory)?;
        }
        "simulate" => {
            let input = required(&args, 1, "input")?;
            let output = required(&args, 2, "output")?;
            let kind: SimulationKind = required(&args, 3, "kind")?.parse()?;
            let image = Image::load(input).with_context(|| format!("decoding {input}"))?;
            DaltonizationPipeline::simulate(&image, kind).save(output)?;
            tracing::info!(%output, ?kind, "simulated image written");
        }
        other => bail!("unknown command '{other}'"),
    }
    Ok(())
}
