// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/core/src/batch.rs
//
// Mini-batch of images with one-hot labels.

use ndarray::{concatenate, s, Array2, Array4, ArrayView2, ArrayView4, Axis, ShapeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch has {images} images but {labels} label rows")]
    LengthMismatch { images: usize, labels: usize },
    #[error("label {label} is out of range for {num_classes} classes")]
    LabelOutOfRange { label: usize, num_classes: usize },
    #[error("slice {start}..{end} is out of bounds for a batch of {len}")]
    OutOfBounds { start: usize, end: usize, len: usize },
    #[error("transformed images {got:?} do not match the batch shape {expected:?}")]
    VariantShape { expected: (usize, usize, usize, usize), got: (usize, usize, usize, usize) },
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// `images` is `(N, C, H, W)`, `labels` is `(N, num_classes)`.
///
/// Both arrays always have the same length along axis 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    images: Array4<f32>,
    labels: Array2<f32>,
}

impl Batch {
    pub fn new(images: Array4<f32>, labels: Array2<f32>) -> Result<Self, BatchError> {
        let (n_images, n_labels) = (images.len_of(Axis(0)), labels.len_of(Axis(0)));
        if n_images != n_labels {
            return Err(BatchError::LengthMismatch { images: n_images, labels: n_labels });
        }
        Ok(Self { images, labels })
    }

    /// Build a batch from class indices, one-hot encoding them.
    pub fn from_targets(images: Array4<f32>, targets: &[usize], num_classes: usize) -> Result<Self, BatchError> {
        let labels = one_hot(targets, num_classes)?;
        Self::new(images, labels)
    }

    pub fn len(&self) -> usize {
        self.images.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn images(&self) -> ArrayView4<'_, f32> {
        self.images.view()
    }

    pub fn labels(&self) -> ArrayView2<'_, f32> {
        self.labels.view()
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len_of(Axis(1))
    }

    /// Owned copy of samples `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> Result<Batch, BatchError> {
        if start > end || end > self.len() {
            return Err(BatchError::OutOfBounds { start, end, len: self.len() });
        }
        Ok(Batch {
            images: self.images.slice(s![start..end, .., .., ..]).to_owned(),
            labels: self.labels.slice(s![start..end, ..]).to_owned(),
        })
    }

    /// Concatenate batches along the sample axis, in order.
    pub fn concat(parts: &[Batch]) -> Result<Batch, BatchError> {
        let images: Vec<_> = parts.iter().map(|b| b.images.view()).collect();
        let labels: Vec<_> = parts.iter().map(|b| b.labels.view()).collect();
        Ok(Batch {
            images: concatenate(Axis(0), &images)?,
            labels: concatenate(Axis(0), &labels)?,
        })
    }

    /// `self ++ transformed`, labels duplicated: the shape every augmentation produces.
    pub fn with_variant(&self, transformed: Array4<f32>) -> Result<Batch, BatchError> {
        if transformed.dim() != self.images.dim() {
            return Err(BatchError::VariantShape { expected: self.images.dim(), got: transformed.dim() });
        }
        Ok(Batch {
            images: concatenate(Axis(0), &[self.images.view(), transformed.view()])?,
            labels: concatenate(Axis(0), &[self.labels.view(), self.labels.view()])?,
        })
    }

    /// Index of the hot entry of every label row.
    pub fn targets(&self) -> Vec<usize> {
        self.labels.outer_iter().map(|row| argmax(row.iter().copied())).collect()
    }
}

pub fn one_hot(targets: &[usize], num_classes: usize) -> Result<Array2<f32>, BatchError> {
    let mut labels = Array2::<f32>::zeros((targets.len(), num_classes));
    for (i, &t) in targets.iter().enumerate() {
        if t >= num_classes {
            return Err(BatchError::LabelOutOfRange { label: t, num_classes });
        }
        labels[[i, t]] = 1.0;
    }
    Ok(labels)
}

/// Position of the largest value; first one wins on ties.
pub fn argmax(values: impl Iterator<Item = f32>) -> usize {
    let mut best = (0, f32::NEG_INFINITY);
    for (i, v) in values.enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best.0
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn numbered(n: usize, classes: usize) -> Batch {
        let images = Array4::from_shape_fn((n, 1, 2, 2), |(i, _, y, x)| (i * 4 + y * 2 + x) as f32);
        let targets: Vec<usize> = (0..n).map(|i| i % classes).collect();
        Batch::from_targets(images, &targets, classes).unwrap()
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let err = Batch::new(Array4::zeros((3, 1, 2, 2)), Array2::zeros((2, 10))).unwrap_err();
        assert!(matches!(err, BatchError::LengthMismatch { images: 3, labels: 2 }));
    }

    #[test]
    fn one_hot_round_trips_through_targets() {
        let b = numbered(7, 3);
        assert_eq!(b.targets(), vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(b.labels().sum(), 7.0);
        assert!(one_hot(&[4], 3).is_err());
    }

    #[test]
    fn slice_and_concat_restore_the_batch() {
        let b = numbered(6, 2);
        let parts = [b.slice(0, 2).unwrap(), b.slice(2, 2).unwrap(), b.slice(2, 6).unwrap()];
        assert_eq!(parts[1].len(), 0);
        assert_eq!(Batch::concat(&parts).unwrap(), b);
        assert!(b.slice(4, 7).is_err());
    }

    #[test]
    fn with_variant_duplicates_labels() {
        let b = numbered(3, 3);
        let out = b.with_variant(Array4::zeros((3, 1, 2, 2))).unwrap();
        assert_eq!(out.len(), 6);
        assert_eq!(out.slice(0, 3).unwrap(), b);
        assert_eq!(out.targets(), vec![0, 1, 2, 0, 1, 2]);
        assert!(b.with_variant(Array4::zeros((2, 1, 2, 2))).is_err());
    }
}
