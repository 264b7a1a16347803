// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/core/src/augment/translation.rs

use rand::{Rng, RngCore};
use tracing::debug;

use super::affine::{warp, AffineParams, Interpolation};
use super::{Augmentation, AugmentError};
use crate::batch::Batch;

pub const MAX_SHIFT: i32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftAxis {
    Horizontal,
    Vertical,
    Both,
}

impl ShiftAxis {
    /// `p < 1/3` horizontal, `p > 2/3` vertical, the closed middle third both.
    pub fn from_draw(p: f64) -> Self {
        if p < 1.0 / 3.0 {
            ShiftAxis::Horizontal
        } else if p > 2.0 / 3.0 {
            ShiftAxis::Vertical
        } else {
            ShiftAxis::Both
        }
    }
}

/// Integer pixel shift applied to a whole slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TranslationShift {
    pub dx: i32,
    pub dy: i32,
}

impl TranslationShift {
    /// Pick the axis from `p`, then draw each active offset from `[-max_shift, max_shift)`.
    pub fn from_draw(p: f64, max_shift: i32, rng: &mut dyn RngCore) -> Self {
        let mut offset = || rng.random_range(-max_shift..max_shift);
        match ShiftAxis::from_draw(p) {
            ShiftAxis::Horizontal => Self { dx: offset(), dy: 0 },
            ShiftAxis::Vertical => Self { dx: 0, dy: offset() },
            ShiftAxis::Both => {
                let dx = offset();
                Self { dx, dy: offset() }
            }
        }
    }
}

/// Shifts the whole slice horizontally, vertically, or both, with equal odds.
#[derive(Debug, Clone)]
pub struct Translation {
    interpolation: Interpolation,
    max_shift: i32,
}

impl Default for Translation {
    fn default() -> Self {
        Self::new(Interpolation::default())
    }
}

impl Translation {
    pub fn new(interpolation: Interpolation) -> Self {
        Self { interpolation, max_shift: MAX_SHIFT }
    }

    pub fn sample_shift(&self, rng: &mut dyn RngCore) -> TranslationShift {
        let p: f64 = rng.random();
        TranslationShift::from_draw(p, self.max_shift, rng)
    }

    /// Original slice followed by the slice shifted by `shift`.
    pub fn apply_with_shift(&self, batch: &Batch, shift: TranslationShift) -> Result<Batch, AugmentError> {
        let params = AffineParams::translation(f64::from(shift.dx), f64::from(shift.dy));
        let shifted = warp(batch.images(), params, self.interpolation);
        Ok(batch.with_variant(shifted)?)
    }
}

impl Augmentation for Translation {
    fn name(&self) -> &str {
        "translation"
    }

    fn apply(&self, batch: &Batch, rng: &mut dyn RngCore) -> Result<Batch, AugmentError> {
        let shift = self.sample_shift(rng);
        debug!(dx = shift.dx, dy = shift.dy, samples = batch.len(), "translation");
        self.apply_with_shift(batch, shift)
    }
}
