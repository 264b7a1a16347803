// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/formats/src/lib.rs
//
pub mod npz;
pub mod synthetic;

pub use npz::{read_labeled_npz, write_labeled_npz};
pub use synthetic::SyntheticImages;

use ndarray::{Array4, Axis};

/// A labelled image collection: `(N, C, H, W)` pixels plus one class index per image.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledImages {
    pub images: Array4<f32>,
    pub labels: Vec<usize>,
}

impl LabeledImages {
    pub fn new(images: Array4<f32>, labels: Vec<usize>) -> anyhow::Result<Self> {
        let n = images.len_of(Axis(0));
        if n != labels.len() {
            anyhow::bail!("{} images but {} labels", n, labels.len());
        }
        Ok(Self { images, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// `(C, H, W)` of a single image.
    pub fn image_shape(&self) -> (usize, usize, usize) {
        let (_, c, h, w) = self.images.dim();
        (c, h, w)
    }

    /// Number of classes implied by the largest label.
    pub fn inferred_classes(&self) -> usize {
        self.labels.iter().max().map_or(0, |m| m + 1)
    }
}
