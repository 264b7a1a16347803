// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Core library for ic-driver: config-driven image classification experiments
//! with proportional batch augmentation.

pub mod augment;
pub mod batch;
pub mod config;
pub mod dataset;
pub mod eval;
pub mod metrics;
pub mod model;
pub mod plugins;
pub mod registry;
pub mod runner;
pub mod seed;

pub use augment::{Augmentation, BatchAugmenter, EmptySlicePolicy, Interpolation, Rotation, Translation};
pub use batch::Batch;
pub use config::{ExperimentConfig, Task};
pub use dataset::{DataSplits, DatasetLoader, Split};
pub use eval::{EvalReport, Evaluation};
pub use metrics::{EpochMetrics, RunMetrics};
pub use model::{Model, SoftmaxClassifier, StepStats};
pub use registry::Registries;
pub use runner::{ExperimentRunner, RunSummary};
