// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// src/runner.rs
//
// Supervised training loop: load, augment, train, validate, persist, test.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ExperimentConfig;
use crate::dataset::{DataSplits, Split};
use crate::eval::EvalReport;
use crate::metrics::{BatchMeans, EpochMetrics, RunMetrics};
use crate::model::{InputShape, Model, ModelParams, StepStats};
use crate::plugins::{CheckpointPlugin, Plugin, PluginManager};
use crate::registry::Registries;
use crate::seed::{stream_rng, RngStream};

/// Everything a finished run reports.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_name: String,
    pub model: String,
    pub augmentations: Vec<String>,
    pub metrics: RunMetrics,
    pub test: Option<StepStats>,
    pub evaluation: Option<EvalReport>,
}

pub struct ExperimentRunner {
    config: ExperimentConfig,
    run_name: String,
    registries: Registries,
    plugins: PluginManager,
}

impl std::fmt::Debug for ExperimentRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentRunner")
            .field("run_name", &self.run_name)
            .field("plugins", &self.plugins)
            .finish()
    }
}

impl ExperimentRunner {
    /// Validate `config` against the built-in registries.
    pub fn new(config: ExperimentConfig, run_name: impl Into<String>) -> Result<Self> {
        Self::with_registries(config, run_name, Registries::builtin())
    }

    pub fn with_registries(
        config: ExperimentConfig,
        run_name: impl Into<String>,
        registries: Registries,
    ) -> Result<Self> {
        config.validate().context("invalid experiment config")?;
        registries.check(&config)?;
        Ok(Self { config, run_name: run_name.into(), registries, plugins: PluginManager::new() })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Extra hooks; they run after any checkpoint plugin the config enables.
    pub fn add_plugin(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    fn log_selection(&self) {
        let cfg = &self.config;
        info!("==========Dataset: {}==========", cfg.data);
        let plan = cfg.augmentation_plan();
        if plan.is_empty() {
            info!("No augmentation method selected");
        }
        for (name, strength) in plan {
            info!("==========Augmentation Methods: {}, with a strength value of {}==========", name, strength);
        }
        info!("==========Model Selected: {}==========", cfg.model);
        info!("==========Evaluation Method: {}==========", cfg.eval);
    }

    async fn load(&self) -> Result<DataSplits> {
        let loader = self.registries.datasets.get(&self.config.data)?();
        let cfg = self.config.clone();
        let splits = tokio::task::spawn_blocking(move || loader.load(&cfg))
            .await
            .context("dataset loader panicked")??;
        info!("Dataloader ready");
        Ok(splits)
    }

    pub async fn run(mut self) -> Result<RunSummary> {
        let started = Instant::now();
        self.log_selection();
        let splits = self.load().await?;

        let cfg = self.config.clone();
        let (channels, height, width) = splits.labelled.image_shape();
        let shape = InputShape { channels, height, width, num_classes: cfg.num_classes };
        let mut model = self.registries.models.get(&cfg.model)?(&ModelParams::from_config(&cfg), shape)?;
        let mut augmenter = self.registries.build_augmenter(&cfg)?;

        let mut plugins = PluginManager::new();
        if let Some(ckpt) = CheckpointPlugin::new(&cfg, &self.run_name)? {
            plugins.push(Box::new(ckpt));
        }
        for p in std::mem::take(&mut self.plugins).into_plugins() {
            plugins.push(p);
        }
        plugins.initialize(&cfg).await?;

        let mut shuffle_rng = stream_rng(cfg.seed, RngStream::EpochShuffle);
        let mut metrics = RunMetrics::new();
        let mut step = 0u64;

        for epoch in 1..=cfg.epoch {
            let epoch_start = Instant::now();
            info!("==========Supervised Learning Epoch Number: {}/{}==========", epoch, cfg.epoch);

            let mut train = BatchMeans::new();
            let mut train_samples = 0;
            for batch in splits.labelled.batches(cfg.batch_size, cfg.num_classes, Some(&mut shuffle_rng)) {
                let augmented = augmenter.augment(&batch?)?;
                if augmented.is_empty() {
                    debug!("augmentation left batch {} empty, skipping", step + 1);
                    continue;
                }
                train_samples += augmented.len();
                train.record(model.train_step(&augmented)?);
                step += 1;
                plugins.after_step(step).await?;
            }
            let Some(train_stats) = train.mean() else {
                bail!("epoch {} trained on no samples", epoch);
            };
            info!(
                "==========Training Accuracy: {:.3} , Training Loss: {:.3}==========",
                train_stats.accuracy, train_stats.loss
            );

            let valid = evaluate_split(model.as_ref(), &splits.valid, &cfg)?;
            if let Some(v) = valid {
                info!("==========Validation Accuracy: {:.3} , Validation Loss: {:.3}==========", v.accuracy, v.loss);
            }

            let epoch_metrics = EpochMetrics {
                epoch,
                train_accuracy: train_stats.accuracy,
                train_loss: train_stats.loss,
                valid_accuracy: valid.map(|v| v.accuracy),
                valid_loss: valid.map(|v| v.loss),
                train_samples,
                elapsed: epoch_start.elapsed(),
            };
            metrics.record_epoch(epoch_metrics);
            plugins.after_epoch(&epoch_metrics, model.as_ref()).await?;
        }

        info!("Saving model");
        plugins.finalize(model.as_ref()).await?;

        let test = evaluate_split(model.as_ref(), &splits.test, &cfg)?;
        let evaluation = match test {
            Some(t) => {
                info!("==========Test Accuracy: {:.3} , Test Loss: {:.3}==========", t.accuracy, t.loss);
                let eval = self.registries.evaluations.get(&cfg.eval)?();
                let report = eval.evaluate(model.as_ref(), &splits.test, cfg.num_classes)?;
                info!("{} evaluation: accuracy {:.3} over {} samples", report.name, report.accuracy, report.samples);
                Some(report)
            }
            None => {
                warn!("test split is empty, skipping test pass and evaluation");
                None
            }
        };

        metrics.record_total_time(started.elapsed());
        info!("Experiment Complete");
        Ok(RunSummary {
            run_name: self.run_name,
            model: model.name().to_string(),
            augmentations: augmenter.names().iter().map(|n| n.to_string()).collect(),
            metrics,
            test,
            evaluation,
        })
    }
}

/// Mean of per-batch stats over `split`; `None` when it is empty.
fn evaluate_split(model: &dyn Model, split: &Split, cfg: &ExperimentConfig) -> Result<Option<StepStats>> {
    let mut means = BatchMeans::new();
    for batch in split.batches(cfg.batch_size, cfg.num_classes, None) {
        means.record(model.evaluate(&batch?)?);
    }
    Ok(means.mean())
}
