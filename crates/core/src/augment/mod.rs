// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/core/src/augment/mod.rs
//
// Per-batch augmentation: every configured transform gets a contiguous share of
// the mini-batch proportional to its strength, and the transformed shares are
// stitched back together in configuration order.

pub mod affine;
pub mod rotation;
pub mod translation;

pub use affine::{AffineParams, Interpolation};
pub use rotation::Rotation;
pub use translation::{ShiftAxis, Translation, TranslationShift};

use rand::RngCore;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::batch::{Batch, BatchError};
use crate::seed::{stream_rng, RngStream};

/// Allowed overshoot of the strength sum above 1.0.
pub const STRENGTH_TOLERANCE: f64 = 1e-6;

/// Copies of the batch emitted when no augmentation is configured.
pub const FALLBACK_COPIES: usize = 4;

#[derive(Debug, Error)]
pub enum AugmentError {
    #[error("{transforms} augmentations configured but {strengths} strengths")]
    ConfigurationMismatch { transforms: usize, strengths: usize },
    #[error("strength #{index} = {value} is outside [0, 1]")]
    InvalidStrength { index: usize, value: f64 },
    #[error("strengths sum to {sum}, which exceeds 1")]
    StrengthSumExceeded { sum: f64 },
    #[error("augmentation #{index} received an empty slice (batch of {batch_len})")]
    EmptySlice { index: usize, batch_len: usize },
    #[error("augmentation '{name}' returned {got} samples for a slice of {slice} (expected twice the slice)")]
    OutputLength { name: String, slice: usize, got: usize },
    #[error(transparent)]
    Batch(#[from] BatchError),
}

/// What to do when a strength is too small to claim a single sample of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmptySlicePolicy {
    /// Leave the transform out for this batch.
    #[default]
    Skip,
    /// Fail the batch with [`AugmentError::EmptySlice`].
    Error,
}

/// A batch transform resolved from the registry.
///
/// Implementations return the input slice followed by one transformed copy,
/// with the labels duplicated to match.
pub trait Augmentation: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, batch: &Batch, rng: &mut dyn RngCore) -> Result<Batch, AugmentError>;
}

/// Validate a strength vector, returning its sum.
pub fn check_strengths(strengths: &[f64]) -> Result<f64, AugmentError> {
    for (index, &value) in strengths.iter().enumerate() {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(AugmentError::InvalidStrength { index, value });
        }
    }
    let sum: f64 = strengths.iter().sum();
    if sum > 1.0 + STRENGTH_TOLERANCE {
        return Err(AugmentError::StrengthSumExceeded { sum });
    }
    Ok(sum)
}

/// End index of every slice for a batch of `batch_len`.
///
/// One strength always covers the whole batch. Otherwise the ends are the
/// running sum of `strength * batch_len`, truncated to integers and capped at
/// `batch_len`.
pub fn slice_boundaries(strengths: &[f64], batch_len: usize) -> Vec<usize> {
    if strengths.len() == 1 {
        return vec![batch_len];
    }
    let n = batch_len as f64;
    let mut acc = 0.0;
    strengths
        .iter()
        .map(|s| {
            acc += s * n;
            // absorb representation error, e.g. 0.29 * 100 = 28.999999999999996
            let end = (acc + 1e-9).floor();
            (end.max(0.0) as usize).min(batch_len)
        })
        .collect()
}

/// Routes slices of every mini-batch through the configured augmentations.
pub struct BatchAugmenter {
    stages: Vec<Box<dyn Augmentation>>,
    strengths: Vec<f64>,
    empty_slice: EmptySlicePolicy,
    rng: ChaCha8Rng,
}

impl std::fmt::Debug for BatchAugmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchAugmenter")
            .field("stages", &self.names())
            .field("strengths", &self.strengths)
            .field("empty_slice", &self.empty_slice)
            .finish()
    }
}

impl BatchAugmenter {
    /// Pair `transforms` with `strengths`. An empty list gives the no-augmentation fallback.
    pub fn new(
        transforms: Vec<Box<dyn Augmentation>>,
        strengths: Vec<f64>,
        seed: u64,
    ) -> Result<Self, AugmentError> {
        if transforms.len() != strengths.len() {
            return Err(AugmentError::ConfigurationMismatch {
                transforms: transforms.len(),
                strengths: strengths.len(),
            });
        }
        let sum = check_strengths(&strengths)?;
        if transforms.len() > 1 && sum < 1.0 - STRENGTH_TOLERANCE {
            warn!(
                "augmentation strengths sum to {:.3}; the tail of every batch past that fraction is not trained on",
                sum
            );
        }
        Ok(Self {
            stages: transforms,
            strengths,
            empty_slice: EmptySlicePolicy::default(),
            rng: stream_rng(seed, RngStream::Augment),
        })
    }

    /// No transforms: every batch is repeated [`FALLBACK_COPIES`] times.
    pub fn passthrough(seed: u64) -> Self {
        Self {
            stages: Vec::new(),
            strengths: Vec::new(),
            empty_slice: EmptySlicePolicy::default(),
            rng: stream_rng(seed, RngStream::Augment),
        }
    }

    pub fn with_empty_slice_policy(mut self, policy: EmptySlicePolicy) -> Self {
        self.empty_slice = policy;
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn is_passthrough(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn boundaries(&self, batch_len: usize) -> Vec<usize> {
        slice_boundaries(&self.strengths, batch_len)
    }

    /// Augment one mini-batch.
    ///
    /// With exactly partitioning strengths the result holds `2 * batch.len()`
    /// samples; samples past the last boundary are dropped.
    pub fn augment(&mut self, batch: &Batch) -> Result<Batch, AugmentError> {
        if self.stages.is_empty() {
            let copies = vec![batch.clone(); FALLBACK_COPIES];
            return Ok(Batch::concat(&copies)?);
        }

        let bounds = slice_boundaries(&self.strengths, batch.len());
        let mut parts = Vec::with_capacity(self.stages.len());
        let mut start = 0;
        for (index, (stage, &end)) in self.stages.iter().zip(&bounds).enumerate() {
            let end = end.max(start);
            if end == start {
                match self.empty_slice {
                    EmptySlicePolicy::Skip => {
                        debug!(index, name = stage.name(), "empty slice skipped");
                        continue;
                    }
                    EmptySlicePolicy::Error => {
                        return Err(AugmentError::EmptySlice { index, batch_len: batch.len() });
                    }
                }
            }

            let slice = batch.slice(start, end)?;
            let out = stage.apply(&slice, &mut self.rng)?;
            if out.len() != 2 * slice.len() {
                return Err(AugmentError::OutputLength {
                    name: stage.name().to_string(),
                    slice: slice.len(),
                    got: out.len(),
                });
            }
            parts.push(out);
            start = end;
        }

        if parts.is_empty() {
            return Ok(batch.slice(0, 0)?);
        }
        Ok(Batch::concat(&parts)?)
    }
}
