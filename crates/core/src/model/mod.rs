// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/core/src/model/mod.rs
pub mod optim;
pub mod softmax;

pub use optim::Optimizer;
pub use softmax::SoftmaxClassifier;

use anyhow::Result;
use ndarray::ArrayView4;
use serde::{Deserialize, Serialize};

use crate::batch::Batch;
use crate::config::{ExperimentConfig, OptimizerKind};

/// Mean accuracy and loss over one batch.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StepStats {
    pub accuracy: f64,
    pub loss: f64,
}

/// Image geometry and class count a model is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub num_classes: usize,
}

impl InputShape {
    pub fn features(&self) -> usize {
        self.channels * self.height * self.width
    }
}

/// Optimizer settings every model constructor receives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub optimizer: OptimizerKind,
    pub learning_rate: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    pub seed: u64,
}

impl ModelParams {
    pub fn from_config(cfg: &ExperimentConfig) -> Self {
        Self {
            optimizer: cfg.optimizer,
            learning_rate: cfg.learning_rate,
            momentum: cfg.momentum,
            weight_decay: cfg.weight_decay,
            seed: cfg.seed,
        }
    }
}

/// A trainable classifier resolved from the registry.
pub trait Model: Send + Sync {
    fn name(&self) -> &str;

    fn input_shape(&self) -> InputShape;

    /// One optimisation step on `batch`; stats are measured before the update.
    fn train_step(&mut self, batch: &Batch) -> Result<StepStats>;

    fn evaluate(&self, batch: &Batch) -> Result<StepStats>;

    /// Most likely class of every image.
    fn predict(&self, images: ArrayView4<'_, f32>) -> Result<Vec<usize>>;

    /// Serializable parameters, enough to rebuild the model.
    fn state(&self) -> Result<serde_json::Value>;
}
