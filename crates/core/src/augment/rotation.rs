// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/core/src/augment/rotation.rs

use rand::{Rng, RngCore};
use tracing::debug;

use super::affine::{warp, AffineParams, Interpolation};
use super::{Augmentation, AugmentError};
use crate::batch::Batch;

/// Rotates the whole slice by one angle drawn from `[-180, 180)` degrees.
#[derive(Debug, Clone)]
pub struct Rotation {
    interpolation: Interpolation,
    min_deg: i32,
    max_deg: i32,
}

impl Default for Rotation {
    fn default() -> Self {
        Self::new(Interpolation::default())
    }
}

impl Rotation {
    pub fn new(interpolation: Interpolation) -> Self {
        Self { interpolation, min_deg: -180, max_deg: 180 }
    }

    /// One integer angle, uniform over `[min, max)`.
    pub fn sample_angle(&self, rng: &mut dyn RngCore) -> i32 {
        rng.random_range(self.min_deg..self.max_deg)
    }

    /// Original slice followed by the slice rotated by `angle_deg` about the image centre.
    pub fn apply_with_angle(&self, batch: &Batch, angle_deg: f64) -> Result<Batch, AugmentError> {
        let rotated = warp(batch.images(), AffineParams::rotation(angle_deg), self.interpolation);
        Ok(batch.with_variant(rotated)?)
    }
}

impl Augmentation for Rotation {
    fn name(&self) -> &str {
        "rotation"
    }

    fn apply(&self, batch: &Batch, rng: &mut dyn RngCore) -> Result<Batch, AugmentError> {
        let angle = self.sample_angle(rng);
        debug!(angle, samples = batch.len(), "rotation");
        self.apply_with_angle(batch, f64::from(angle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array4};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn disc(n: usize, size: usize) -> Batch {
        // smooth radial bump so interpolation error stays small
        let c = (size as f32 - 1.0) / 2.0;
        let images = Array4::from_shape_fn((n, 1, size, size), |(i, _, y, x)| {
            let (dy, dx) = (y as f32 - c, x as f32 - c + i as f32);
            (-(dx * dx + dy * dy) / 40.0).exp()
        });
        Batch::from_targets(images, &vec![0; n], 2).unwrap()
    }

    #[test]
    fn first_half_is_the_untouched_input() {
        let batch = disc(3, 9);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let out = Rotation::default().apply(&batch, &mut rng).unwrap();
        assert_eq!(out.len(), 6);
        assert_eq!(out.slice(0, 3).unwrap(), batch);
        assert_eq!(out.targets(), vec![0; 6]);
    }

    #[test]
    fn rotating_back_recovers_the_centre() {
        let batch = disc(2, 21);
        let rot = Rotation::new(Interpolation::Bilinear);
        for angle in [-170.0, -37.0, 15.0, 90.0, 123.0] {
            let there = rot.apply_with_angle(&batch, angle).unwrap().slice(2, 4).unwrap();
            let back = rot.apply_with_angle(&there, -angle).unwrap().slice(2, 4).unwrap();
            let (a, b) = (batch.images(), back.images());
            // the corners are lost to zero fill, compare the inscribed region
            let diff = (&a.slice(s![.., .., 6..15, 6..15]) - &b.slice(s![.., .., 6..15, 6..15]))
                .mapv(f32::abs)
                .fold(0.0f32, |m, &v| m.max(v));
            assert!(diff < 0.05, "angle {} max error {}", angle, diff);
        }
    }

    #[test]
    fn angles_stay_in_range_and_vary() {
        let rot = Rotation::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let angles: Vec<i32> = (0..500).map(|_| rot.sample_angle(&mut rng)).collect();
        assert!(angles.iter().all(|a| (-180..180).contains(a)));
        assert!(angles.iter().any(|&a| a < -90) && angles.iter().any(|&a| a > 90));
    }

    #[test]
    fn same_seed_same_output() {
        let batch = disc(2, 9);
        let rot = Rotation::default();
        let a = rot.apply(&batch, &mut ChaCha8Rng::seed_from_u64(3)).unwrap();
        let b = rot.apply(&batch, &mut ChaCha8Rng::seed_from_u64(3)).unwrap();
        assert_eq!(a, b);
    }
}
