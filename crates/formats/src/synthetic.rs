// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/formats/src/synthetic.rs
//
// Class-conditional synthetic images for smoke runs and tests.

use ndarray::{s, Array4};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::LabeledImages;

/// Generator of labelled images where each class lights up its own block of a grid.
///
/// Class `k` of `K` owns cell `k` of a `ceil(sqrt(K))`-wide grid; pixels inside
/// the cell are near `1.0`, everything else is low amplitude noise. The result
/// is linearly separable, which keeps training runs short.
#[derive(Debug, Clone)]
pub struct SyntheticImages {
    channels: usize,
    height: usize,
    width: usize,
    classes: usize,
    noise: f32,
}

impl SyntheticImages {
    pub fn new(channels: usize, height: usize, width: usize, classes: usize) -> Self {
        Self {
            channels: channels.max(1),
            height: height.max(1),
            width: width.max(1),
            classes: classes.max(1),
            noise: 0.1,
        }
    }

    pub fn with_noise(mut self, noise: f32) -> Self {
        self.noise = noise.max(0.0);
        self
    }

    /// Generate `samples` images, labels cycling through the classes.
    pub fn generate(&self, samples: usize, seed: u64) -> LabeledImages {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut images = Array4::<f32>::zeros((samples, self.channels, self.height, self.width));
        let mut labels = Vec::with_capacity(samples);

        let grid = (self.classes as f64).sqrt().ceil() as usize;
        let cell_h = (self.height / grid).max(1);
        let cell_w = (self.width / grid).max(1);

        for i in 0..samples {
            let class = i % self.classes;
            labels.push(class);

            let row = (class / grid) * cell_h;
            let col = (class % grid) * cell_w;
            let (r0, r1) = (row.min(self.height - 1), (row + cell_h).min(self.height));
            let (c0, c1) = (col.min(self.width - 1), (col + cell_w).min(self.width));

            let mut image = images.slice_mut(s![i, .., .., ..]);
            if self.noise > 0.0 {
                image.mapv_inplace(|_| rng.random_range(0.0..self.noise));
            }
            image.slice_mut(s![.., r0..r1, c0..c1]).mapv_inplace(|v| 1.0 - v);
        }

        // labels.len() == samples by construction
        LabeledImages { images, labels }
    }
}
