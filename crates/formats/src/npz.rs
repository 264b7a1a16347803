// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/formats/src/npz.rs

use anyhow::{Context, Result};
use ndarray::{Array1, ArrayD, Axis, Ix1, Ix3, Ix4, IxDyn, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter};
use std::fs::File;
use std::path::Path;

use crate::LabeledImages;

const IMAGES: &str = "images";
const LABELS: &str = "labels";

/// Read an NPZ archive holding `images` and `labels` arrays.
///
/// `images` may be `f32`, `f64` or `u8` (scaled into `[0, 1]`), shaped
/// `(N, C, H, W)` or `(N, H, W)` for single-channel data. `labels` may be
/// any of `i64`, `i32` or `u8`, shaped `(N,)`.
pub fn read_labeled_npz<P: AsRef<Path>>(path: P) -> Result<LabeledImages> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open NPZ file {:?}", path))?;
    let mut npz = NpzReader::new(file).with_context(|| format!("Failed to read NPZ archive {:?}", path))?;

    let raw: ArrayD<f32> = if let Ok(a) = npz.by_name::<OwnedRepr<f32>, IxDyn>(IMAGES) {
        a
    } else if let Ok(a) = npz.by_name::<OwnedRepr<f64>, IxDyn>(IMAGES) {
        a.mapv(|v| v as f32)
    } else {
        let a: ArrayD<u8> = npz
            .by_name::<OwnedRepr<u8>, IxDyn>(IMAGES)
            .with_context(|| format!("'{}' array missing or of unsupported dtype in {:?}", IMAGES, path))?;
        a.mapv(|v| f32::from(v) / 255.0)
    };

    let images = match raw.ndim() {
        4 => raw.into_dimensionality::<Ix4>()?,
        3 => raw.into_dimensionality::<Ix3>()?.insert_axis(Axis(1)),
        n => anyhow::bail!("'{}' must be 3 or 4 dimensional, got {} dimensions", IMAGES, n),
    };

    let labels: Vec<usize> = if let Ok(l) = npz.by_name::<OwnedRepr<i64>, Ix1>(LABELS) {
        to_indices(l.iter().copied())?
    } else if let Ok(l) = npz.by_name::<OwnedRepr<i32>, Ix1>(LABELS) {
        to_indices(l.iter().map(|&v| i64::from(v)))?
    } else {
        let l: Array1<u8> = npz
            .by_name::<OwnedRepr<u8>, Ix1>(LABELS)
            .with_context(|| format!("'{}' array missing or of unsupported dtype in {:?}", LABELS, path))?;
        l.iter().map(|&v| usize::from(v)).collect()
    };

    LabeledImages::new(images, labels).with_context(|| format!("Inconsistent NPZ archive {:?}", path))
}

fn to_indices(values: impl Iterator<Item = i64>) -> Result<Vec<usize>> {
    values
        .map(|v| usize::try_from(v).map_err(|_| anyhow::anyhow!("negative label {}", v)))
        .collect()
}

/// Write `data` as an NPZ archive readable by [`read_labeled_npz`] (and by NumPy).
pub fn write_labeled_npz<P: AsRef<Path>>(path: P, data: &LabeledImages, compressed: bool) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path).with_context(|| format!("Failed to create NPZ file at {:?}", path))?;
    let mut npz = if compressed {
        NpzWriter::new_compressed(file)
    } else {
        NpzWriter::new(file)
    };

    let labels: Array1<i64> = data.labels.iter().map(|&l| l as i64).collect();
    npz.add_array(IMAGES, &data.images)
        .with_context(|| format!("Failed to serialize '{}'", IMAGES))?;
    npz.add_array(LABELS, &labels)
        .with_context(|| format!("Failed to serialize '{}'", LABELS))?;
    npz.finish().context("Failed to finalize NPZ archive")?;
    Ok(())
}
