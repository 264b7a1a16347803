// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/core/src/registry.rs
//
// Name -> constructor tables for every pluggable piece of an experiment.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::augment::{AugmentError, Augmentation, BatchAugmenter, Rotation, Translation};
use crate::config::{AugmentOptions, ExperimentConfig};
use crate::dataset::{DatasetLoader, NpzLoader, SyntheticLoader};
use crate::eval::{AccuracyEvaluation, ConfusionEvaluation, Evaluation};
use crate::model::{InputShape, Model, ModelParams, SoftmaxClassifier};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown {kind} '{name}' (available: {available})")]
    Unknown { kind: &'static str, name: String, available: String },
    #[error("{kind} '{name}' is already registered")]
    Duplicate { kind: &'static str, name: String },
}

pub type AugmentationFactory = fn(&AugmentOptions) -> Box<dyn Augmentation>;
pub type ModelFactory = fn(&ModelParams, InputShape) -> anyhow::Result<Box<dyn Model>>;
pub type DatasetFactory = fn() -> Box<dyn DatasetLoader>;
pub type EvaluationFactory = fn() -> Box<dyn Evaluation>;

/// Case-insensitive table of named constructors.
#[derive(Debug, Clone)]
pub struct Registry<F> {
    kind: &'static str,
    entries: BTreeMap<String, F>,
}

impl<F: Copy> Registry<F> {
    pub fn new(kind: &'static str) -> Self {
        Self { kind, entries: BTreeMap::new() }
    }

    pub fn register(&mut self, name: &str, factory: F) -> Result<(), RegistryError> {
        let key = name.to_lowercase();
        if self.entries.contains_key(&key) {
            return Err(RegistryError::Duplicate { kind: self.kind, name: key });
        }
        self.entries.insert(key, factory);
        Ok(())
    }

    fn insert(&mut self, name: &str, factory: F) {
        self.entries.insert(name.to_lowercase(), factory);
    }

    pub fn get(&self, name: &str) -> Result<F, RegistryError> {
        self.entries
            .get(&name.to_lowercase())
            .copied()
            .ok_or_else(|| RegistryError::Unknown {
                kind: self.kind,
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_lowercase())
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

/// All registries an experiment resolves names against.
#[derive(Debug, Clone)]
pub struct Registries {
    pub augmentations: Registry<AugmentationFactory>,
    pub models: Registry<ModelFactory>,
    pub datasets: Registry<DatasetFactory>,
    pub evaluations: Registry<EvaluationFactory>,
}

impl Default for Registries {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Registries {
    pub fn empty() -> Self {
        Self {
            augmentations: Registry::new("augmentation"),
            models: Registry::new("model"),
            datasets: Registry::new("dataset"),
            evaluations: Registry::new("evaluation"),
        }
    }

    /// Registries holding every implementation shipped with the crate.
    pub fn builtin() -> Self {
        let mut r = Self::empty();
        r.augmentations.insert("rotation", |o: &AugmentOptions| {
            Box::new(Rotation::new(o.interpolation)) as Box<dyn Augmentation>
        });
        r.augmentations.insert("translation", |o: &AugmentOptions| {
            Box::new(Translation::new(o.interpolation)) as Box<dyn Augmentation>
        });

        r.models.insert("softmax", SoftmaxClassifier::boxed);
        r.models.insert("linear", SoftmaxClassifier::boxed);

        r.datasets.insert("synthetic", || Box::new(SyntheticLoader) as Box<dyn DatasetLoader>);
        r.datasets.insert("npz", || Box::new(NpzLoader) as Box<dyn DatasetLoader>);

        r.evaluations.insert("accuracy", || Box::new(AccuracyEvaluation) as Box<dyn Evaluation>);
        r.evaluations.insert("confusion", || Box::new(ConfusionEvaluation) as Box<dyn Evaluation>);
        r
    }

    /// Resolve every name in `cfg`, reporting the first unknown one.
    pub fn check(&self, cfg: &ExperimentConfig) -> Result<(), RegistryError> {
        self.datasets.get(&cfg.data)?;
        self.models.get(&cfg.model)?;
        self.evaluations.get(&cfg.eval)?;
        for name in cfg.augment.iter().flatten() {
            self.augmentations.get(name)?;
        }
        Ok(())
    }

    /// Build the augmenter for `cfg`: resolved transforms paired with their strengths.
    ///
    /// Both lists go to [`BatchAugmenter::new`] unpaired, so a length mismatch
    /// is reported rather than truncated.
    pub fn build_augmenter(&self, cfg: &ExperimentConfig) -> anyhow::Result<BatchAugmenter> {
        let (names, strengths) = match (&cfg.augment, &cfg.aug_strength) {
            (None, None) => return Ok(BatchAugmenter::passthrough(cfg.seed)),
            (Some(names), Some(strengths)) => (names.as_slice(), strengths.clone()),
            (names, strengths) => {
                return Err(AugmentError::ConfigurationMismatch {
                    transforms: names.as_ref().map_or(0, Vec::len),
                    strengths: strengths.as_ref().map_or(0, Vec::len),
                }
                .into())
            }
        };
        let mut transforms = Vec::with_capacity(names.len());
        for name in names {
            let factory = self.augmentations.get(name)?;
            transforms.push(factory(&cfg.augment_options));
        }
        let augmenter = BatchAugmenter::new(transforms, strengths, cfg.seed)?
            .with_empty_slice_policy(cfg.augment_options.empty_slice);
        Ok(augmenter)
    }
}
