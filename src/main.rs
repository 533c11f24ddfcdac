//! Clock Reader CLI
//!
//! Trains and evaluates the clock-reading network on synthetic clock faces
//! with the Burn framework.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::module::AutodiffModule;
use burn::tensor::backend::Backend;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use clock_reader::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use clock_reader::dataset::{ClockBatcher, DatasetBatchSource, SyntheticClocks, TimeUnit};
use clock_reader::evaluation::{compute_time_predictions, evaluate_model, StopSignal};
use clock_reader::model::{ClockNetConfig, MultiTaskTimeReader, TimeModel, TimeReader, WeightStore};
use clock_reader::training::{load_averaged_model, Trainer, TrainingConfig};
use clock_reader::utils::format_duration;
use clock_reader::utils::logging::{init_logging, LogConfig};

/// Noise added to synthetic training clocks
const TRAIN_NOISE: f32 = 0.05;

/// Read the time from analog clock images
#[derive(Parser, Debug)]
#[command(name = "clock_reader")]
#[command(version)]
#[command(about = "Train and evaluate a clock-reading CNN with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Log per-layer activation sparsity (very chatty)
    #[arg(long, default_value = "false")]
    trace_activations: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Which heads the network carries
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Task {
    /// Shared trunk with an hours head and a minutes head
    Multi,
    /// Single hours head
    Hours,
    /// Single minutes head
    Minutes,
}

impl Task {
    fn unit(self) -> Option<TimeUnit> {
        match self {
            Task::Multi => None,
            Task::Hours => Some(TimeUnit::Hours),
            Task::Minutes => Some(TimeUnit::Minutes),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train on synthetic clock faces
    Train {
        /// Number of training steps
        #[arg(short, long, default_value = "100")]
        steps: usize,

        /// Heads to train
        #[arg(long, value_enum, default_value = "multi")]
        task: Task,

        /// Training configuration JSON (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the batch size
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Image height and width in pixels
        #[arg(long, default_value = "32")]
        image_size: usize,

        /// Override the random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Directory for checkpoints
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Evaluate precision and time error on synthetic clock faces
    Evaluate {
        /// Checkpoint directory written by `train`; random weights otherwise
        #[arg(short, long)]
        checkpoint: Option<PathBuf>,

        /// Heads the checkpoint carries
        #[arg(long, value_enum, default_value = "multi")]
        task: Task,

        /// Number of records to evaluate
        #[arg(short, long, default_value = "10")]
        num_records: usize,

        /// Batch size for evaluation
        #[arg(short, long, default_value = "128")]
        batch_size: usize,

        /// Image height and width in pixels
        #[arg(long, default_value = "32")]
        image_size: usize,

        /// Random seed of the evaluation clocks
        #[arg(long, default_value = "4242")]
        seed: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.trace_activations {
        LogConfig::with_activation_summaries()
    } else if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train {
            steps,
            task,
            config,
            batch_size,
            image_size,
            seed,
            output_dir,
        } => {
            let mut training = match config {
                Some(path) => TrainingConfig::load(&path)
                    .with_context(|| format!("failed to read training config {:?}", path))?,
                None => TrainingConfig::default(),
            };
            if let Some(batch_size) = batch_size {
                training.batch_size = batch_size;
            }
            if let Some(seed) = seed {
                training.seed = seed;
            }

            cmd_train(steps, task, training, image_size, output_dir.as_deref())?;
        }

        Commands::Evaluate {
            checkpoint,
            task,
            num_records,
            batch_size,
            image_size,
            seed,
        } => {
            cmd_evaluate(
                checkpoint.as_deref(),
                task,
                num_records,
                batch_size,
                image_size,
                seed,
            )?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!("{}", "Clock Reader".green().bold());
    println!("  Backend: {}", backend_name().cyan());
    println!();
}

fn net_config(image_size: usize) -> ClockNetConfig {
    ClockNetConfig::new()
        .with_image_size1(image_size)
        .with_image_size2(image_size)
}

fn cmd_train(
    steps: usize,
    task: Task,
    config: TrainingConfig,
    image_size: usize,
    output_dir: Option<&Path>,
) -> Result<()> {
    config.validate()?;
    TrainingBackend::seed(config.seed);

    let device = default_device();
    let mut store = WeightStore::<TrainingBackend>::new(&device);
    let net = net_config(image_size);

    println!("{}", "Training".green().bold());
    println!("  Task:          {:?}", task);
    println!("  Steps:         {}", steps);
    println!("  Batch size:    {}", config.batch_size);
    println!("  Image size:    {}x{}", image_size, image_size);
    println!("  Decay steps:   {}", config.decay_steps());
    println!();

    match task.unit() {
        None => {
            let model = MultiTaskTimeReader::new(&mut store, &net)?;
            run_training(model, config, [image_size, image_size], steps, output_dir)
        }
        Some(unit) => {
            let model = TimeReader::new(&mut store, &net, unit)?;
            run_training(model, config, [image_size, image_size], steps, output_dir)
        }
    }
}

fn run_training<M>(
    model: M,
    config: TrainingConfig,
    image_size: [usize; 2],
    steps: usize,
    output_dir: Option<&Path>,
) -> Result<()>
where
    M: AutodiffModule<TrainingBackend> + TimeModel<TrainingBackend>,
{
    let device = default_device();

    let dataset = SyntheticClocks::new(config.seed, image_size)
        .with_noise(TRAIN_NOISE)
        .dataset(config.examples_per_epoch_train)?;
    let batcher = ClockBatcher::<TrainingBackend>::new(device.clone(), image_size);
    let mut source = DatasetBatchSource::new(dataset, batcher, config.batch_size)?;

    let chunk = config.log_every.max(1);
    let mut trainer = Trainer::new(model, config, device)?;
    let signal = StopSignal::new();

    let progress = ProgressBar::new(steps as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} steps {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );

    let mut remaining = steps;
    let mut elapsed = 0.0;
    while remaining > 0 {
        let summary = trainer.train(&mut source, chunk.min(remaining), &signal)?;
        elapsed += summary.elapsed_secs;
        remaining -= summary.steps_run;

        if let Some(report) = &summary.last {
            progress.set_position(report.step as u64);
            progress.set_message(format!(
                "loss {:.3} (avg {:.3}) lr {:.4}",
                report.total_loss, report.average_total_loss, report.learning_rate
            ));
        }
        if summary.stopped_early || summary.steps_run == 0 {
            break;
        }
    }
    progress.finish();

    println!();
    println!(
        "{} {} steps in {}",
        "Finished".green().bold(),
        trainer.global_step(),
        format_duration(elapsed)
    );
    for (name, average) in trainer.loss_averages().iter() {
        println!("  {:<36} {:.4}", name, average);
    }

    if let Some(dir) = output_dir {
        trainer.save_checkpoint(dir)?;
        trainer.config.save(&dir.join("training.json"))?;
        info!("Checkpoint written to {:?}", dir);
        println!("  Saved to: {}", dir.display().to_string().cyan());
    }

    Ok(())
}

fn cmd_evaluate(
    checkpoint: Option<&Path>,
    task: Task,
    num_records: usize,
    batch_size: usize,
    image_size: usize,
    seed: u64,
) -> Result<()> {
    let device = default_device();
    let net = net_config(image_size);
    let mut store = WeightStore::<DefaultBackend>::new(&device);

    let dataset = SyntheticClocks::new(seed, [image_size, image_size]).dataset(num_records)?;
    let batcher = ClockBatcher::<DefaultBackend>::new(device.clone(), [image_size, image_size]);
    let mut source = DatasetBatchSource::new(dataset, batcher, batch_size)?;
    let signal = StopSignal::new();

    if checkpoint.is_none() {
        println!(
            "{} no checkpoint given, evaluating random weights",
            "Note:".yellow()
        );
    }

    println!("{}", "Evaluation".green().bold());

    match task.unit() {
        None => {
            let mut model = MultiTaskTimeReader::new(&mut store, &net)?;
            if let Some(dir) = checkpoint {
                model = load_averaged_model(model, dir, &device)?;
            }

            let report = evaluate_model(&signal, &model, &mut source, num_records)?;
            println!("  Samples:            {}", report.total_sample_count);
            println!("  Precision (hours):   {:.3}", report.precisions[0]);
            println!("  Precision (minutes): {:.3}", report.precisions[1]);

            source.rewind();
            let predictions = compute_time_predictions(&signal, &model, &mut source, num_records)?;
            let error = predictions.time_error()?;
            println!("  Time error:          {}", error.to_string().cyan());

            for (predicted, truth) in predictions.predicted.iter().zip(&predictions.truth).take(5) {
                println!(
                    "    predicted {:>5}  true {:>5}",
                    predicted.to_string(),
                    truth.to_string()
                );
            }
        }
        Some(unit) => {
            let mut model = TimeReader::new(&mut store, &net, unit)?;
            if let Some(dir) = checkpoint {
                model = load_averaged_model(model, dir, &device)?;
            }

            let report = evaluate_model(&signal, &model, &mut source, num_records)?;
            println!("  Samples:            {}", report.total_sample_count);
            println!("  Precision ({}):  {:.3}", unit, report.precisions[0]);
        }
    }

    Ok(())
}
