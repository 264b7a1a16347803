// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/core/src/model/optim.rs

use ndarray::{Array, Dimension, Zip};

use super::ModelParams;
use crate::config::OptimizerKind;

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const EPS: f32 = 1e-8;

/// Per-parameter optimizer state.
#[derive(Debug, Clone)]
pub enum Optimizer<D: Dimension> {
    /// `v = momentum * v + g; p -= lr * v`
    Sgd { lr: f32, momentum: f32, weight_decay: f32, velocity: Array<f32, D> },
    Adam { lr: f32, weight_decay: f32, m: Array<f32, D>, v: Array<f32, D>, t: i32 },
}

impl<D: Dimension> Optimizer<D> {
    pub fn new(params: &ModelParams, shape: D) -> Self {
        let (lr, weight_decay) = (params.learning_rate as f32, params.weight_decay as f32);
        match params.optimizer {
            OptimizerKind::Sgd => Optimizer::Sgd {
                lr,
                momentum: params.momentum as f32,
                weight_decay,
                velocity: Array::zeros(shape),
            },
            OptimizerKind::Adam => Optimizer::Adam {
                lr,
                weight_decay,
                m: Array::zeros(shape.clone()),
                v: Array::zeros(shape),
                t: 0,
            },
        }
    }

    /// Apply `grad` (without weight decay, which is added here) to `param`.
    pub fn step(&mut self, param: &mut Array<f32, D>, grad: &Array<f32, D>) {
        match self {
            Optimizer::Sgd { lr, momentum, weight_decay, velocity } => {
                Zip::from(param).and(velocity).and(grad).for_each(|p, v, &g| {
                    let g = g + *weight_decay * *p;
                    *v = *momentum * *v + g;
                    *p -= *lr * *v;
                });
            }
            Optimizer::Adam { lr, weight_decay, m, v, t } => {
                *t += 1;
                let (c1, c2) = (1.0 - BETA1.powi(*t), 1.0 - BETA2.powi(*t));
                Zip::from(param).and(m).and(v).and(grad).for_each(|p, m, v, &g| {
                    let g = g + *weight_decay * *p;
                    *m = BETA1 * *m + (1.0 - BETA1) * g;
                    *v = BETA2 * *v + (1.0 - BETA2) * g * g;
                    *p -= *lr * (*m / c1) / ((*v / c2).sqrt() + EPS);
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, Ix1};

    fn params(optimizer: OptimizerKind, momentum: f64) -> ModelParams {
        ModelParams { optimizer, learning_rate: 0.1, momentum, weight_decay: 0.0, seed: 0 }
    }

    #[test]
    fn sgd_without_momentum_is_plain_gradient_descent() {
        let mut opt = Optimizer::new(&params(OptimizerKind::Sgd, 0.0), Ix1(2));
        let mut p = arr1(&[1.0f32, -1.0]);
        opt.step(&mut p, &arr1(&[1.0, -2.0]));
        assert!((p[0] - 0.9).abs() < 1e-6 && (p[1] + 0.8).abs() < 1e-6);
    }

    #[test]
    fn momentum_accumulates() {
        let mut opt = Optimizer::new(&params(OptimizerKind::Sgd, 0.5), Ix1(1));
        let mut p = arr1(&[0.0f32]);
        opt.step(&mut p, &arr1(&[1.0]));
        opt.step(&mut p, &arr1(&[1.0]));
        // 0.1 * 1 + 0.1 * 1.5
        assert!((p[0] + 0.25).abs() < 1e-6);
    }

    #[test]
    fn adam_first_step_moves_by_the_learning_rate() {
        let mut opt = Optimizer::new(&params(OptimizerKind::Adam, 0.0), Ix1(2));
        let mut p = arr1(&[0.0f32, 0.0]);
        opt.step(&mut p, &arr1(&[3.0, -0.5]));
        assert!((p[0] + 0.1).abs() < 1e-4 && (p[1] - 0.1).abs() < 1e-4);
    }
}
