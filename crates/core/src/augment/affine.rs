// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/core/src/augment/affine.rs
//
// Inverse-mapping affine warp shared by the geometric augmentations.

use ndarray::{s, Array2, Array4, ArrayView2, ArrayView4};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    #[default]
    Nearest,
    Bilinear,
}

/// Rotation about the image centre followed by a translation.
///
/// Positive angles turn the image clockwise as displayed (row 0 at the top).
/// `dx` moves content right, `dy` moves it down, both in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AffineParams {
    pub angle_deg: f64,
    pub dx: f64,
    pub dy: f64,
}

impl AffineParams {
    pub fn rotation(angle_deg: f64) -> Self {
        Self { angle_deg, ..Default::default() }
    }

    pub fn translation(dx: f64, dy: f64) -> Self {
        Self { angle_deg: 0.0, dx, dy }
    }
}

/// Warp every image and channel of `images` (`(N, C, H, W)`) by the same transform.
///
/// Output pixels whose source falls outside the image are `0.0`.
pub fn warp(images: ArrayView4<'_, f32>, params: AffineParams, interpolation: Interpolation) -> Array4<f32> {
    let (n, c, h, w) = images.dim();
    let mut out = Array4::<f32>::zeros((n, c, h, w));
    if h == 0 || w == 0 {
        return out;
    }

    let (src_y, src_x) = source_grid(h, w, params);
    for i in 0..n {
        for ch in 0..c {
            let plane = images.slice(s![i, ch, .., ..]);
            let mut dst = out.slice_mut(s![i, ch, .., ..]);
            for ((y, x), px) in dst.indexed_iter_mut() {
                let (sy, sx) = (src_y[[y, x]], src_x[[y, x]]);
                *px = match interpolation {
                    Interpolation::Nearest => sample_nearest(&plane, sy, sx),
                    Interpolation::Bilinear => sample_bilinear(&plane, sy, sx),
                };
            }
        }
    }
    out
}

/// Source coordinates for every output pixel: `src = R^T (dst - centre - t) + centre`.
fn source_grid(h: usize, w: usize, p: AffineParams) -> (Array2<f64>, Array2<f64>) {
    let (cy, cx) = ((h as f64 - 1.0) / 2.0, (w as f64 - 1.0) / 2.0);
    let (sin, cos) = p.angle_deg.to_radians().sin_cos();
    let mut src_y = Array2::<f64>::zeros((h, w));
    let mut src_x = Array2::<f64>::zeros((h, w));
    for y in 0..h {
        for x in 0..w {
            let dx = x as f64 - cx - p.dx;
            let dy = y as f64 - cy - p.dy;
            src_x[[y, x]] = cos * dx + sin * dy + cx;
            src_y[[y, x]] = -sin * dx + cos * dy + cy;
        }
    }
    (src_y, src_x)
}

fn pixel(plane: &ArrayView2<'_, f32>, y: i64, x: i64) -> f32 {
    let (h, w) = plane.dim();
    if y < 0 || x < 0 || y >= h as i64 || x >= w as i64 {
        0.0
    } else {
        plane[[y as usize, x as usize]]
    }
}

fn sample_nearest(plane: &ArrayView2<'_, f32>, sy: f64, sx: f64) -> f32 {
    // snap values a rounding error away from an integer before rounding
    let snap = |v: f64| if (v - v.round()).abs() < 1e-6 { v.round() } else { v };
    pixel(plane, snap(sy).round() as i64, snap(sx).round() as i64)
}

fn sample_bilinear(plane: &ArrayView2<'_, f32>, sy: f64, sx: f64) -> f32 {
    let (y0, x0) = (sy.floor(), sx.floor());
    let (fy, fx) = ((sy - y0) as f32, (sx - x0) as f32);
    let (y0, x0) = (y0 as i64, x0 as i64);
    let top = pixel(plane, y0, x0) * (1.0 - fx) + pixel(plane, y0, x0 + 1) * fx;
    let bottom = pixel(plane, y0 + 1, x0) * (1.0 - fx) + pixel(plane, y0 + 1, x0 + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}
