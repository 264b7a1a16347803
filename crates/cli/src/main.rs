// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ic_driver_core::registry::Registries;
use ic_driver_core::{ExperimentConfig, ExperimentRunner};
use ic_driver_formats::{write_labeled_npz, SyntheticImages};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// ic-driver – config-driven image classification experiments with batch augmentation
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Device {
    Cpu,
    Cuda,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train and evaluate the experiment described by a YAML config
    Run {
        /// Config file, looked up in --config-dir when not found as given
        #[arg(short, long, default_value = "Example.yaml")]
        config: PathBuf,

        /// Directory holding experiment configs
        #[arg(long, default_value = "./Config")]
        config_dir: PathBuf,

        /// Device to train on
        #[arg(short, long, value_enum, default_value_t = Device::Cpu)]
        device: Device,

        /// If set, dump the parsed config to stdout and exit
        #[arg(long)]
        pretty: bool,

        /// Save the run summary as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a config without running it
    Validate {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(long, default_value = "./Config")]
        config_dir: PathBuf,

        /// Convert YAML to JSON and print it
        #[arg(long)]
        to_json: bool,
    },
    /// Write a synthetic labelled image set as .npz
    Generate {
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value_t = 1200)]
        samples: usize,

        #[arg(long, default_value_t = 1)]
        channels: usize,

        #[arg(long, default_value_t = 28)]
        height: usize,

        #[arg(long, default_value_t = 28)]
        width: usize,

        #[arg(long, default_value_t = 10)]
        classes: usize,

        #[arg(long, default_value_t = 6942)]
        seed: u64,

        /// Deflate the archive members
        #[arg(long)]
        compress: bool,
    },
    /// List every registered dataset, model, augmentation and evaluation
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // a missing .env is fine

    let args = Args::parse();

    let log_level = if args.verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ic_driver={}", log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("ic-driver v{} starting", env!("CARGO_PKG_VERSION"));

    match args.command {
        Commands::Run { config, config_dir, device, pretty, output } => {
            run_experiment(&resolve_config(&config, &config_dir), device, pretty, output.as_deref()).await
        }
        Commands::Validate { config, config_dir, to_json } => {
            validate_config(&resolve_config(&config, &config_dir), to_json)
        }
        Commands::Generate { output, samples, channels, height, width, classes, seed, compress } => {
            let generator = SyntheticImages::new(channels, height, width, classes);
            generate_dataset(&output, &generator, samples, seed, compress)
        }
        Commands::List => {
            print!("{}", list_registered(&Registries::builtin()));
            Ok(())
        }
    }
}

/// `path` as given when it exists, otherwise relative to `config_dir`.
fn resolve_config(path: &Path, config_dir: &Path) -> PathBuf {
    if path.exists() || path.is_absolute() {
        path.to_path_buf()
    } else {
        config_dir.join(path)
    }
}

/// Checkpoints and reports are named after the config file.
fn run_name(config_path: &Path) -> String {
    config_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("experiment")
        .to_string()
}

/// No GPU backend is compiled in: `cuda` falls back to the CPU.
fn select_device(requested: Device) -> Device {
    match requested {
        Device::Cuda => {
            warn!("CUDA is not available in this build. Forcing device=\"cpu\".");
            Device::Cpu
        }
        Device::Cpu => {
            warn!("Running on CPU; reduce batch_size if memory runs short.");
            Device::Cpu
        }
    }
}

fn load_config(config_path: &Path) -> Result<ExperimentConfig> {
    info!("Loading experiment config from: {:?}", config_path);
    ExperimentConfig::from_yaml_file(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))
}

async fn run_experiment(config_path: &Path, device: Device, pretty: bool, output: Option<&Path>) -> Result<()> {
    let cfg = load_config(config_path)?;

    if pretty {
        println!("=== Parsed Experiment Configuration ===");
        println!("{:#?}", cfg);
        println!("Augmentation plan: {:?}", cfg.augmentation_plan());
        println!("Should checkpoint: {}", cfg.checkpoint_enabled());
        return Ok(());
    }

    let device = select_device(device);
    info!("Training on {:?}", device);

    let summary = ExperimentRunner::new(cfg, run_name(config_path))?
        .run()
        .await
        .context("Experiment failed")?;

    summary.metrics.print_summary();
    if let Some(test) = summary.test {
        println!("Test Accuracy: {:.3} , Test Loss: {:.3}", test.accuracy, test.loss);
    }

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write report to {:?}", path))?;
        eprintln!("✅ Run summary written to {:?}", path);
    }
    Ok(())
}

fn validate_config(config_path: &Path, to_json: bool) -> Result<()> {
    info!("Validating experiment config: {:?}", config_path);

    if to_json {
        let yaml_content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        println!("{}", ic_driver_core::config::yaml_to_json(&yaml_content)?);
        return Ok(());
    }

    let cfg = load_config(config_path)?;
    println!("✅ YAML parsing: SUCCESS");
    cfg.validate()?;
    println!("✅ Field checks: SUCCESS");
    Registries::builtin().check(&cfg)?;
    println!("✅ Names resolved: dataset={}, model={}, eval={}", cfg.data, cfg.model, cfg.eval);

    let plan = cfg.augmentation_plan();
    if plan.is_empty() {
        println!("  - Augmentation: none (batches repeated 4x)");
    }
    for (name, strength) in &plan {
        println!("  - Augmentation: {} (strength {})", name, strength);
    }
    println!(
        "  - Training: {} epochs, batch_size={}, optimizer={:?}, lr={}",
        cfg.epoch, cfg.batch_size, cfg.optimizer, cfg.learning_rate
    );
    println!("🎉 Experiment configuration is valid and ready to run!");
    Ok(())
}

fn generate_dataset(output: &Path, generator: &SyntheticImages, samples: usize, seed: u64, compress: bool) -> Result<()> {
    let start_time = std::time::Instant::now();
    let data = generator.generate(samples, seed);
    write_labeled_npz(output, &data, compress)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(
        "Generated {} samples in {:.2}s -> {}",
        samples,
        start_time.elapsed().as_secs_f64(),
        output.display()
    );
    println!("✅ Wrote {} samples to {}", samples, output.display());
    Ok(())
}

fn list_registered(r: &Registries) -> String {
    let mut out = String::new();
    for (kind, names) in [
        (r.datasets.kind(), r.datasets.names()),
        (r.models.kind(), r.models.names()),
        (r.augmentations.kind(), r.augmentations.names()),
        (r.evaluations.kind(), r.evaluations.names()),
    ] {
        out.push_str(&format!("{}: {}\n", kind, names.join(", ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn args_parse() {
        let args = Args::try_parse_from(["ic-driver", "-v", "run", "-c", "exp.yaml", "-d", "cuda"]).unwrap();
        assert!(args.verbose);
        match args.command {
            Commands::Run { config, config_dir, device, pretty, output } => {
                assert_eq!(config, PathBuf::from("exp.yaml"));
                assert_eq!(config_dir, PathBuf::from("./Config"));
                assert_eq!(device, Device::Cuda);
                assert!(!pretty && output.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(Args::try_parse_from(["ic-driver", "run", "-d", "tpu"]).is_err());
    }

    #[test]
    fn configs_fall_back_to_the_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("exp.yaml");
        assert_eq!(resolve_config(Path::new("exp.yaml"), dir.path()), file);
        assert_eq!(resolve_config(&file, Path::new("./Config")), file);
        assert_eq!(run_name(&file), "exp");
    }

    #[traced_test]
    #[test]
    fn cuda_falls_back_to_cpu() {
        assert_eq!(select_device(Device::Cuda), Device::Cpu);
        assert!(logs_contain("Forcing device=\"cpu\""));
    }

    #[test]
    fn validate_accepts_good_and_rejects_bad() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.yaml");
        std::fs::write(
            &good,
            "data: synthetic\nmodel: softmax\neval: accuracy\naugment: [Rotation]\naug_strength: [1.0]\n",
        )
        .unwrap();
        validate_config(&good, false).unwrap();
        validate_config(&good, true).unwrap();

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "data: synthetic\nmodel: softmax\neval: accuracy\naugment: [Blur]\naug_strength: [1.0]\n")
            .unwrap();
        let err = validate_config(&bad, false).unwrap_err();
        assert!(err.to_string().contains("Blur"), "{}", err);
    }

    #[traced_test]
    #[test]
    fn generate_writes_a_readable_archive() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("synthetic.npz");
        generate_dataset(&out, &SyntheticImages::new(1, 6, 6, 3), 30, 1, true).unwrap();
        let back = ic_driver_formats::read_labeled_npz(&out).unwrap();
        assert_eq!(back.len(), 30);
        assert_eq!(back.image_shape(), (1, 6, 6));
        assert!(logs_contain("Generated 30 samples"));
    }

    #[test]
    fn list_shows_every_kind() {
        let text = list_registered(&Registries::builtin());
        assert!(text.contains("dataset: npz, synthetic"));
        assert!(text.contains("augmentation: rotation, translation"));
        assert_eq!(text.lines().count(), 4);
    }

    #[tokio::test]
    async fn pretty_run_only_prints() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = dir.path().join("exp.yaml");
        std::fs::write(&cfg, "data: synthetic\nmodel: softmax\neval: accuracy\n").unwrap();
        run_experiment(&cfg, Device::Cpu, true, None).await.unwrap();
    }
}
