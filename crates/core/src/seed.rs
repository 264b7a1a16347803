// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// src/seed.rs
//
// One run seed, one independent ChaCha stream per consumer.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Stream ids carved out of the run seed. Stream 0 is left to the synthetic
/// image generator in `ic_driver_formats`, which seeds a plain `ChaCha8Rng`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RngStream {
    DataSplit = 1,
    EpochShuffle = 2,
    Augment = 3,
    ModelInit = 4,
}

/// Reproducible generator for `stream` under `seed`.
pub fn stream_rng(seed: u64, stream: RngStream) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream as u64);
    rng
}
