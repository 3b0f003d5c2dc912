//! Chest X-ray Pneumonia Classifier CLI
//!
//! Runs the data preparation stages, training and evaluation either one at a
//! time or as a single pipeline driven by a JSON config file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use pneumonia_cnn::backend::{backend_name, default_device, DefaultBackend};
use pneumonia_cnn::dataset::{
    consolidate_with_policy, count_duplicates, extract_archive, remove_duplicates, ClassLabel,
    CollisionPolicy, DatasetTable, DuplicateReport,
};
use pneumonia_cnn::pipeline::{
    evaluate_bundle, run_pipeline, save_metrics, train_from_directory, PipelineConfig,
    EVALUATION_FILE, SPLITS_FILE,
};
use pneumonia_cnn::utils::format_duration;
use pneumonia_cnn::utils::logging::{init_logging, LogConfig};
use pneumonia_cnn::Predictor;

/// Chest X-ray pneumonia classification with Burn
#[derive(Parser, Debug)]
#[command(name = "pneumonia_cnn")]
#[command(version)]
#[command(about = "Deduplicate, balance and classify chest X-rays with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a pipeline config file with default values
    InitConfig {
        #[arg(short, long, default_value = "pipeline.json")]
        output: PathBuf,
    },

    /// Run every stage from extraction to evaluation
    Run {
        /// Pipeline config file (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Extract the dataset zip archive
    Extract {
        #[arg(short, long)]
        archive: PathBuf,

        #[arg(short, long, default_value = "data/extracted")]
        dest: PathBuf,
    },

    /// Count perceptual-hash duplicates in class directories (read-only)
    CheckDuplicates {
        /// Class directories to scan
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },

    /// Copy images from several source directories into one directory
    Consolidate {
        /// Source directories, in priority order
        #[arg(short, long, required = true, num_args = 1..)]
        sources: Vec<PathBuf>,

        #[arg(short, long)]
        dest: PathBuf,

        /// overwrite, skip or error
        #[arg(long, default_value = "overwrite")]
        on_collision: CollisionPolicy,
    },

    /// Delete perceptual-hash duplicates from class directories
    ///
    /// Deletion is irreversible: the first image of each hash (in filename
    /// order) is kept, every later one is removed from disk.
    Dedup {
        /// Class directories to clean
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },

    /// Show class counts of a consolidated dataset
    Stats {
        #[arg(short, long, default_value = "data/model_Data")]
        data_dir: PathBuf,
    },

    /// Train on an already consolidated dataset
    Train {
        /// Pipeline config file; the flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        #[arg(short, long)]
        epochs: Option<usize>,

        #[arg(short, long)]
        batch_size: Option<usize>,

        #[arg(short, long)]
        learning_rate: Option<f64>,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Evaluate a model bundle on the test split of a previous run
    Evaluate {
        #[arg(short, long)]
        model: PathBuf,

        /// splits.json written by training
        #[arg(short, long)]
        splits: PathBuf,

        /// Where to write evaluation.json (next to splits.json by default)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, default_value = "32")]
        batch_size: usize,
    },

    /// Classify a single image
    Infer {
        #[arg(short, long)]
        model: PathBuf,

        #[arg(short, long)]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    match cli.command {
        Commands::InitConfig { output } => {
            PipelineConfig::default().save(&output)?;
            println!("{} Wrote default config to {:?}", "✓".green(), output);
        }

        Commands::Run { config } => {
            let config = load_config(config.as_deref())?;
            cmd_run(&config)?;
        }

        Commands::Extract { archive, dest } => {
            let stats = extract_archive(&archive, &dest)?;
            println!(
                "{} Extracted {} files and {} directories into {:?}",
                "✓".green(),
                stats.files,
                stats.directories,
                dest
            );
        }

        Commands::CheckDuplicates { dirs } => {
            println!("{}", "Duplicate Check:".cyan().bold());
            for dir in dirs {
                print_duplicate_report(&count_duplicates(&dir)?);
            }
        }

        Commands::Consolidate {
            sources,
            dest,
            on_collision,
        } => {
            let report = consolidate_with_policy(&sources, &dest, on_collision)?;
            println!("{} Copied {} files into {:?}", "✓".green(), report.copied, dest);
            for collision in &report.collisions {
                println!(
                    "  {} {} ({:?} / {:?})",
                    "collision:".yellow(),
                    collision.file_name,
                    collision.first,
                    collision.second
                );
            }
        }

        Commands::Dedup { dirs } => {
            println!("{}", "Duplicate Removal:".cyan().bold());
            for dir in dirs {
                print_duplicate_report(&remove_duplicates(&dir)?);
            }
        }

        Commands::Stats { data_dir } => {
            cmd_stats(&data_dir)?;
        }

        Commands::Train {
            config,
            data_dir,
            output_dir,
            epochs,
            batch_size,
            learning_rate,
            seed,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }
            if let Some(output_dir) = output_dir {
                config.output_dir = output_dir;
            }
            if let Some(epochs) = epochs {
                config.training.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                config.training.batch_size = batch_size;
            }
            if let Some(learning_rate) = learning_rate {
                config.training.learning_rate = learning_rate;
            }
            if let Some(seed) = seed {
                config.training.seed = seed;
            }
            cmd_train(&config)?;
        }

        Commands::Evaluate {
            model,
            splits,
            output,
            batch_size,
        } => {
            let metrics = evaluate_bundle(&model, &splits, batch_size)?;
            let output = output.unwrap_or_else(|| {
                splits
                    .parent()
                    .map(|p| p.join(EVALUATION_FILE))
                    .unwrap_or_else(|| PathBuf::from(EVALUATION_FILE))
            });
            save_metrics(&metrics, &output)?;
            println!("{}", "Test Set Evaluation:".cyan().bold());
            println!("{}", metrics);
        }

        Commands::Infer { model, input } => {
            cmd_infer(&model, &input)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            info!("Loading config from {:?}", path);
            PipelineConfig::load(path)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn print_duplicate_report(report: &DuplicateReport) {
    println!(
        "  {:?}: {} images, {} duplicates, {} removed, {} skipped",
        report.class_dir,
        report.scanned,
        report.duplicates.to_string().yellow(),
        report.removed,
        report.skipped
    );
}

fn cmd_stats(data_dir: &Path) -> Result<()> {
    let table = DatasetTable::from_directory(data_dir)
        .with_context(|| format!("Failed to index {:?}", data_dir))?;
    let counts = table.class_counts();

    println!("{}", "Dataset Statistics:".cyan().bold());
    println!("  Total samples: {}", table.len());
    for label in ClassLabel::ALL {
        let count = counts.get(label);
        println!(
            "  {:<10} {:>6} ({:.1}%)",
            label.name(),
            count,
            100.0 * count as f64 / table.len().max(1) as f64
        );
    }
    Ok(())
}

fn cmd_train(config: &PipelineConfig) -> Result<()> {
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Data:          {:?}", config.data_dir);
    println!("  Output:        {:?}", config.output_dir);
    println!("  Epochs:        {}", config.training.epochs);
    println!("  Batch size:    {}", config.training.batch_size);
    println!("  Learning rate: {}", config.training.learning_rate);
    println!("  Backend:       {}", backend_name());
    println!();

    let start = std::time::Instant::now();
    let report = train_from_directory(config)?;

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!("  Synthetic samples: {}", report.synthetic_samples);
    if let Some(best) = report.history.best_val_accuracy() {
        println!("  Best validation accuracy: {:.2}%", best * 100.0);
    }
    println!("  Model:  {:?}", report.model_path);
    println!("  Splits: {:?}", config.output_dir.join(SPLITS_FILE));
    println!("  Time:   {}", format_duration(start.elapsed().as_secs_f64()));
    Ok(())
}

fn cmd_run(config: &PipelineConfig) -> Result<()> {
    let start = std::time::Instant::now();
    let summary = run_pipeline(config)?;

    println!();
    println!("{}", "Pipeline Complete!".green().bold());
    let detected: usize = summary.preparation.detected.iter().map(|r| r.duplicates).sum();
    let removed: usize = summary.preparation.removed.iter().map(|r| r.removed).sum();
    println!("  Duplicates detected before consolidation: {}", detected);
    println!(
        "  Files consolidated: {} ({} collisions)",
        summary.preparation.copied, summary.preparation.collisions
    );
    println!("  Duplicates removed: {}", removed);
    println!("  Synthetic samples: {}", summary.training.synthetic_samples);
    println!("  Model: {:?}", summary.training.model_path);
    println!();
    println!("{}", "Test Set Evaluation:".cyan().bold());
    println!("{}", summary.evaluation);
    println!("  Time: {}", format_duration(start.elapsed().as_secs_f64()));
    Ok(())
}

fn cmd_infer(model: &Path, input: &Path) -> Result<()> {
    let predictor = Predictor::<DefaultBackend>::from_bundle(model, default_device())
        .with_context(|| format!("Failed to load model {:?}", model))?;
    let prediction = predictor.predict_path(input)?;

    let label = match prediction.label {
        ClassLabel::Normal => prediction.label.name().green(),
        ClassLabel::Pneumonia => prediction.label.name().red(),
    };
    println!("{}", "Prediction:".cyan().bold());
    println!("  Image:       {:?}", input);
    println!("  Class:       {}", label.bold());
    println!("  P(PNEUMONIA): {:.4}", prediction.probability);
    Ok(())
}
