// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/core/src/config/experiment_config.rs
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::augment::{check_strengths, EmptySlicePolicy, Interpolation};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Failed to parse experiment config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

/// Which training regime the experiment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    #[default]
    Super,
    Semi,
    Few,
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Task::Super => write!(f, "super"),
            Task::Semi => write!(f, "semi"),
            Task::Few => write!(f, "few"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
}

/// One experiment, as written in a `Config/*.yaml` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExperimentConfig {
    #[serde(default)]
    pub num: u32,
    #[serde(default)]
    pub task: Task,

    pub data: String,                   // dataset loader name: "synthetic" | "npz"
    pub model: String,                  // model name: "softmax"
    pub eval: String,                   // evaluation name: "accuracy" | "confusion"
    pub augment: Option<Vec<String>>,   // augmentation names, in slice order
    pub aug_strength: Option<Vec<f64>>, // fraction of each batch per augmentation

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default)]
    pub momentum: f64,
    #[serde(default = "default_epoch")]
    pub epoch: usize,
    #[serde(default)]
    pub optimizer: OptimizerKind,
    #[serde(default)]
    pub weight_decay: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,

    #[serde(default)]
    pub dataset_options: DatasetOptions,
    #[serde(default)]
    pub augment_options: AugmentOptions,
    pub checkpoint: Option<CheckpointOptions>,
}

fn default_batch_size() -> usize { 64 }
fn default_learning_rate() -> f64 { 0.001 }
fn default_epoch() -> usize { 10 }
fn default_seed() -> u64 { 6942 }
fn default_num_classes() -> usize { 10 }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetOptions {
    #[serde(alias = "file")]
    pub path: Option<PathBuf>,          // npz loader input
    pub samples: usize,                 // synthetic loader sample count
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub noise: f32,
    pub valid_fraction: f64,
    pub test_fraction: f64,
    pub shuffle: bool,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            path: None,
            samples: 1200,
            channels: 1,
            height: 28,
            width: 28,
            noise: 0.1,
            valid_fraction: 0.1,
            test_fraction: 0.1,
            shuffle: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentOptions {
    pub interpolation: Interpolation,
    pub empty_slice: EmptySlicePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointOptions {
    pub enabled: Option<bool>,

    #[serde(alias = "folder", alias = "path", alias = "uri")]
    pub dir: Option<PathBuf>,           // default: ./Model
    pub epochs_between: Option<u32>,    // 0 or absent: only at the end of the run
    pub compression: Option<String>,    // e.g. "zstd"
    pub compression_level: Option<i32>,
}

impl ExperimentConfig {
    /// Parse from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json_str)?)
    }

    /// Parse from YAML by way of a generic value, so YAML and JSON share one schema
    pub fn from_yaml(yaml_str: &str) -> Result<Self, ConfigError> {
        let yaml_value: serde_yaml::Value = serde_yaml::from_str(yaml_str)?;
        let json_value = serde_json::to_value(&yaml_value)?;
        Ok(serde_json::from_value(json_value)?)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_yaml(&text)
    }

    /// Augmentation names paired with their strengths; empty when no augmentation is configured.
    /// Pairs stop at the shorter list, so call [`Self::validate`] first when the lengths matter.
    pub fn augmentation_plan(&self) -> Vec<(&str, f64)> {
        match (&self.augment, &self.aug_strength) {
            (Some(names), Some(strengths)) => names
                .iter()
                .map(String::as_str)
                .zip(strengths.iter().copied())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn checkpoint_enabled(&self) -> bool {
        self.checkpoint.as_ref().map_or(false, |c| c.enabled.unwrap_or(true))
    }

    /// Check everything that can be checked without touching the registries or the disk.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.task != Task::Super {
            return Err(invalid(format!(
                "task '{}' is not supported, only 'super' is implemented",
                self.task
            )));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be > 0"));
        }
        if self.epoch == 0 {
            return Err(invalid("epoch must be > 0"));
        }
        if self.num_classes < 2 {
            return Err(invalid("num_classes must be at least 2"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(invalid("learning_rate must be a positive number"));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(invalid("momentum must be in [0, 1)"));
        }
        if self.weight_decay < 0.0 {
            return Err(invalid("weight_decay must be >= 0"));
        }

        match (&self.augment, &self.aug_strength) {
            (None, None) => {}
            (Some(_), None) => return Err(invalid("augment is set but aug_strength is missing")),
            (None, Some(_)) => return Err(invalid("aug_strength is set but augment is missing")),
            (Some(names), Some(strengths)) => {
                if names.len() != strengths.len() {
                    return Err(invalid(format!(
                        "{} augmentations but {} strengths",
                        names.len(),
                        strengths.len()
                    )));
                }
                check_strengths(strengths).map_err(|e| invalid(e.to_string()))?;
            }
        }

        let d = &self.dataset_options;
        for (name, v) in [("valid_fraction", d.valid_fraction), ("test_fraction", d.test_fraction)] {
            if !(0.0..1.0).contains(&v) {
                return Err(invalid(format!("dataset_options.{} must be in [0, 1)", name)));
            }
        }
        if d.valid_fraction + d.test_fraction >= 1.0 {
            return Err(invalid("valid_fraction + test_fraction must leave training samples"));
        }
        if d.channels == 0 || d.height == 0 || d.width == 0 {
            return Err(invalid("dataset_options image dimensions must be > 0"));
        }

        if let Some(cp) = &self.checkpoint {
            match cp.compression.as_deref() {
                None | Some("none") | Some("zstd") => {}
                Some(other) => return Err(invalid(format!("unsupported checkpoint compression '{}'", other))),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
data: synthetic
model: softmax
eval: accuracy
"#;

    #[test]
    fn defaults_match_the_original_driver() {
        let cfg = ExperimentConfig::from_yaml(MINIMAL).expect("Should parse YAML");
        assert_eq!(cfg.task, Task::Super);
        assert_eq!(cfg.batch_size, 64);
        assert_eq!(cfg.learning_rate, 0.001);
        assert_eq!(cfg.epoch, 10);
        assert_eq!(cfg.optimizer, OptimizerKind::Adam);
        assert_eq!(cfg.seed, 6942);
        assert_eq!(cfg.num_classes, 10);
        assert!(cfg.augmentation_plan().is_empty());
        assert!(!cfg.checkpoint_enabled());
        cfg.validate().unwrap();
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
num: 3
task: super
data: npz
model: softmax
augment: [Rotation, Translation]
aug_strength: [0.5, 0.5]
eval: confusion
batch_size: 32
optimizer: sgd
momentum: 0.9
dataset_options:
  path: data/train.npz
augment_options:
  interpolation: bilinear
  empty_slice: error
checkpoint:
  dir: /tmp/models
  compression: zstd
"#;
        let cfg = ExperimentConfig::from_yaml(yaml).expect("Should parse YAML");
        assert_eq!(cfg.num, 3);
        assert_eq!(cfg.augmentation_plan(), vec![("Rotation", 0.5), ("Translation", 0.5)]);
        assert_eq!(cfg.optimizer, OptimizerKind::Sgd);
        assert_eq!(cfg.dataset_options.path, Some(PathBuf::from("data/train.npz")));
        assert_eq!(cfg.dataset_options.samples, 1200);
        assert_eq!(cfg.augment_options.interpolation, Interpolation::Bilinear);
        assert_eq!(cfg.augment_options.empty_slice, EmptySlicePolicy::Error);
        assert!(cfg.checkpoint_enabled());
        cfg.validate().unwrap();
    }

    #[test]
    fn mismatched_augment_lists_are_rejected() {
        let yaml = format!("{}augment: [Rotation]\naug_strength: [0.5, 0.5]\n", MINIMAL);
        let cfg = ExperimentConfig::from_yaml(&yaml).unwrap();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("1 augmentations but 2 strengths"), "{}", err);
    }

    #[test]
    fn strengths_must_not_exceed_one() {
        let yaml = format!("{}augment: [Rotation, Translation]\naug_strength: [0.7, 0.6]\n", MINIMAL);
        let cfg = ExperimentConfig::from_yaml(&yaml).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn semi_and_few_shot_are_rejected() {
        for task in ["semi", "few"] {
            let cfg = ExperimentConfig::from_yaml(&format!("{}task: {}\n", MINIMAL, task)).unwrap();
            assert!(cfg.validate().is_err(), "task {} should be rejected", task);
        }
    }

    #[test]
    fn missing_required_key_fails_to_parse() {
        assert!(ExperimentConfig::from_yaml("model: softmax\neval: accuracy\n").is_err());
    }

    #[test]
    fn unknown_compression_is_rejected() {
        let yaml = format!("{}checkpoint:\n  compression: lz4\n", MINIMAL);
        let cfg = ExperimentConfig::from_yaml(&yaml).unwrap();
        assert!(cfg.validate().is_err());
    }
}
