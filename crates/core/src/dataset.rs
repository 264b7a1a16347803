// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// src/dataset.rs
//
// Dataset loaders and the train/valid/test splits they produce.

use anyhow::{bail, Context, Result};
use ndarray::{Array4, Axis};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::batch::{Batch, BatchError};
use crate::config::{DatasetOptions, ExperimentConfig};
use crate::seed::{stream_rng, RngStream};
use ic_driver_formats::{read_labeled_npz, LabeledImages, SyntheticImages};

/// Produces the splits an experiment trains and evaluates on.
pub trait DatasetLoader: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self, cfg: &ExperimentConfig) -> Result<DataSplits>;
}

/// Images with their class indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub images: Array4<f32>,
    pub targets: Vec<usize>,
}

impl Split {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// `(channels, height, width)`
    pub fn image_shape(&self) -> (usize, usize, usize) {
        let (_, c, h, w) = self.images.dim();
        (c, h, w)
    }

    fn select(data: &LabeledImages, indices: &[usize]) -> Split {
        Split {
            images: data.images.select(Axis(0), indices),
            targets: indices.iter().map(|&i| data.labels[i]).collect(),
        }
    }

    /// One-hot batches of `batch_size`; the last one may be short.
    /// With an rng the sample order is reshuffled first.
    pub fn batches(
        &self,
        batch_size: usize,
        num_classes: usize,
        rng: Option<&mut ChaCha8Rng>,
    ) -> impl Iterator<Item = Result<Batch, BatchError>> + '_ {
        let mut order: Vec<usize> = (0..self.len()).collect();
        if let Some(rng) = rng {
            order.shuffle(rng);
        }
        let step = batch_size.max(1);
        let chunks: Vec<Vec<usize>> = order.chunks(step).map(<[usize]>::to_vec).collect();
        chunks.into_iter().map(move |idx| {
            let targets: Vec<usize> = idx.iter().map(|&i| self.targets[i]).collect();
            Batch::from_targets(self.images.select(Axis(0), &idx), &targets, num_classes)
        })
    }
}

#[derive(Debug, Clone)]
pub struct DataSplits {
    pub labelled: Split,
    pub valid: Split,
    pub test: Split,
}

impl DataSplits {
    /// Shuffle (when enabled) with `seed`, then carve off the test and
    /// validation fractions; the remainder is the training split.
    pub fn from_labeled(data: &LabeledImages, opts: &DatasetOptions, seed: u64) -> Result<Self> {
        let n = data.len();
        let mut order: Vec<usize> = (0..n).collect();
        if opts.shuffle {
            order.shuffle(&mut stream_rng(seed, RngStream::DataSplit));
        }
        let n_test = (n as f64 * opts.test_fraction).floor() as usize;
        let n_valid = (n as f64 * opts.valid_fraction).floor() as usize;
        if n_test + n_valid >= n {
            bail!("{} samples leave nothing to train on", n);
        }
        if (opts.test_fraction > 0.0 && n_test == 0) || (opts.valid_fraction > 0.0 && n_valid == 0) {
            bail!("{} samples are too few for the requested validation/test fractions", n);
        }
        let (test, rest) = order.split_at(n_test);
        let (valid, labelled) = rest.split_at(n_valid);
        Ok(Self {
            labelled: Split::select(data, labelled),
            valid: Split::select(data, valid),
            test: Split::select(data, test),
        })
    }

    fn check_classes(&self, num_classes: usize) -> Result<()> {
        for split in [&self.labelled, &self.valid, &self.test] {
            if let Some(&bad) = split.targets.iter().find(|&&t| t >= num_classes) {
                bail!("label {} found but num_classes is {}", bad, num_classes);
            }
        }
        Ok(())
    }
}

/// Seeded class-conditional images, no files needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticLoader;

impl DatasetLoader for SyntheticLoader {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn load(&self, cfg: &ExperimentConfig) -> Result<DataSplits> {
        let o = &cfg.dataset_options;
        let data = SyntheticImages::new(o.channels, o.height, o.width, cfg.num_classes)
            .with_noise(o.noise)
            .generate(o.samples, cfg.seed);
        let splits = DataSplits::from_labeled(&data, o, cfg.seed)?;
        info!(
            "synthetic dataset: {} samples of {}x{}x{} ({} train / {} valid / {} test)",
            data.len(), o.channels, o.height, o.width,
            splits.labelled.len(), splits.valid.len(), splits.test.len()
        );
        Ok(splits)
    }
}

/// Reads `images` / `labels` arrays from an `.npz` archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct NpzLoader;

impl DatasetLoader for NpzLoader {
    fn name(&self) -> &str {
        "npz"
    }

    fn load(&self, cfg: &ExperimentConfig) -> Result<DataSplits> {
        let path = cfg
            .dataset_options
            .path
            .as_ref()
            .context("the npz dataset needs dataset_options.path")?;
        let data = read_labeled_npz(path).with_context(|| format!("loading {}", path.display()))?;
        let splits = DataSplits::from_labeled(&data, &cfg.dataset_options, cfg.seed)?;
        splits.check_classes(cfg.num_classes)?;
        let (c, h, w) = data.image_shape();
        info!(
            "npz dataset {}: {} samples of {}x{}x{} ({} train / {} valid / {} test)",
            path.display(), data.len(), c, h, w,
            splits.labelled.len(), splits.valid.len(), splits.test.len()
        );
        Ok(splits)
    }
}
