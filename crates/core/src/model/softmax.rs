// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/core/src/model/softmax.rs
//
// Multinomial logistic regression over flattened pixels.

use anyhow::{bail, Context, Result};
use ndarray::{Array1, Array2, ArrayView2, ArrayView4, Axis, Ix1, Ix2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{InputShape, Model, ModelParams, Optimizer, StepStats};
use crate::batch::{argmax, Batch};
use crate::seed::{stream_rng, RngStream};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SoftmaxState {
    shape: InputShape,
    weights: Array2<f32>,
    bias: Array1<f32>,
}

#[derive(Debug, Clone)]
pub struct SoftmaxClassifier {
    shape: InputShape,
    weights: Array2<f32>, // (num_classes, features)
    bias: Array1<f32>,
    w_opt: Optimizer<Ix2>,
    b_opt: Optimizer<Ix1>,
}

impl SoftmaxClassifier {
    pub fn new(params: &ModelParams, shape: InputShape) -> Result<Self> {
        let features = shape.features();
        if features == 0 || shape.num_classes < 2 {
            bail!("cannot build a classifier for {:?}", shape);
        }
        let bound = 1.0 / (features as f32).sqrt();
        let mut rng = stream_rng(params.seed, RngStream::ModelInit);
        let weights =
            Array2::from_shape_simple_fn((shape.num_classes, features), || rng.random_range(-bound..bound));
        let bias = Array1::from_shape_simple_fn(shape.num_classes, || rng.random_range(-bound..bound));
        debug!("softmax classifier: {} classes x {} features", shape.num_classes, features);
        Ok(Self {
            shape,
            w_opt: Optimizer::new(params, weights.raw_dim()),
            b_opt: Optimizer::new(params, bias.raw_dim()),
            weights,
            bias,
        })
    }

    /// Registry constructor.
    pub fn boxed(params: &ModelParams, shape: InputShape) -> Result<Box<dyn Model>> {
        Ok(Box::new(Self::new(params, shape)?))
    }

    /// Rebuild from the output of [`Model::state`]; optimizer moments start fresh.
    pub fn from_state(params: &ModelParams, state: serde_json::Value) -> Result<Self> {
        let state: SoftmaxState = serde_json::from_value(state).context("invalid softmax state")?;
        if state.weights.dim() != (state.shape.num_classes, state.shape.features())
            || state.bias.len() != state.shape.num_classes
        {
            bail!("softmax state does not match its declared shape {:?}", state.shape);
        }
        Ok(Self {
            shape: state.shape,
            w_opt: Optimizer::new(params, state.weights.raw_dim()),
            b_opt: Optimizer::new(params, state.bias.raw_dim()),
            weights: state.weights,
            bias: state.bias,
        })
    }

    fn flatten(&self, images: ArrayView4<'_, f32>) -> Result<Array2<f32>> {
        let (n, c, h, w) = images.dim();
        if (c, h, w) != (self.shape.channels, self.shape.height, self.shape.width) {
            bail!(
                "images are {}x{}x{} but the model expects {}x{}x{}",
                c, h, w, self.shape.channels, self.shape.height, self.shape.width
            );
        }
        Ok(images.to_shape((n, c * h * w))?.into_owned())
    }

    /// Row-wise softmax of the logits.
    fn probabilities(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut p = x.dot(&self.weights.t()) + &self.bias;
        for mut row in p.outer_iter_mut() {
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }
        p
    }

    fn check_labels(&self, labels: ArrayView2<'_, f32>) -> Result<()> {
        if labels.len_of(Axis(1)) != self.shape.num_classes {
            bail!(
                "labels have {} classes but the model has {}",
                labels.len_of(Axis(1)),
                self.shape.num_classes
            );
        }
        Ok(())
    }
}

fn stats(probs: &Array2<f32>, labels: ArrayView2<'_, f32>) -> StepStats {
    let n = probs.len_of(Axis(0));
    if n == 0 {
        return StepStats::default();
    }
    let mut correct = 0usize;
    let mut loss = 0.0f64;
    for (p, y) in probs.outer_iter().zip(labels.outer_iter()) {
        let target = argmax(y.iter().copied());
        if argmax(p.iter().copied()) == target {
            correct += 1;
        }
        loss -= f64::from(p[target].max(1e-12)).ln();
    }
    StepStats { accuracy: correct as f64 / n as f64, loss: loss / n as f64 }
}

impl Model for SoftmaxClassifier {
    fn name(&self) -> &str {
        "softmax"
    }

    fn input_shape(&self) -> InputShape {
        self.shape
    }

    fn train_step(&mut self, batch: &Batch) -> Result<StepStats> {
        if batch.is_empty() {
            bail!("cannot train on an empty batch");
        }
        self.check_labels(batch.labels())?;
        let x = self.flatten(batch.images())?;
        let probs = self.probabilities(&x);
        let step = stats(&probs, batch.labels());

        let n = batch.len() as f32;
        let delta = (probs - &batch.labels()) / n;
        let grad_w = delta.t().dot(&x);
        let grad_b = delta.sum_axis(Axis(0));
        self.w_opt.step(&mut self.weights, &grad_w);
        self.b_opt.step(&mut self.bias, &grad_b);
        Ok(step)
    }

    fn evaluate(&self, batch: &Batch) -> Result<StepStats> {
        self.check_labels(batch.labels())?;
        let x = self.flatten(batch.images())?;
        Ok(stats(&self.probabilities(&x), batch.labels()))
    }

    fn predict(&self, images: ArrayView4<'_, f32>) -> Result<Vec<usize>> {
        let x = self.flatten(images)?;
        Ok(self.probabilities(&x).outer_iter().map(|p| argmax(p.iter().copied())).collect())
    }

    fn state(&self) -> Result<serde_json::Value> {
        let state = SoftmaxState { shape: self.shape, weights: self.weights.clone(), bias: self.bias.clone() };
        Ok(serde_json::to_value(state)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizerKind;
    use ndarray::Array4;

    fn params(optimizer: OptimizerKind) -> ModelParams {
        ModelParams { optimizer, learning_rate: 0.05, momentum: 0.9, weight_decay: 0.0, seed: 3 }
    }

    fn shape() -> InputShape {
        InputShape { channels: 1, height: 2, width: 2, num_classes: 2 }
    }

    /// Class 0 lights the top row, class 1 the bottom row.
    fn separable(n: usize) -> Batch {
        let targets: Vec<usize> = (0..n).map(|i| i % 2).collect();
        let images = Array4::from_shape_fn((n, 1, 2, 2), |(i, _, y, _)| if y == i % 2 { 1.0 } else { 0.0 });
        Batch::from_targets(images, &targets, 2).unwrap()
    }

    #[test]
    fn same_seed_same_weights() {
        let a = SoftmaxClassifier::new(&params(OptimizerKind::Adam), shape()).unwrap();
        let b = SoftmaxClassifier::new(&params(OptimizerKind::Adam), shape()).unwrap();
        assert_eq!(a.weights, b.weights);
        let bound = 1.0 / 2.0;
        assert!(a.weights.iter().all(|w| w.abs() <= bound));
    }

    #[test]
    fn learns_a_separable_problem() {
        for kind in [OptimizerKind::Sgd, OptimizerKind::Adam] {
            let mut m = SoftmaxClassifier::new(&params(kind), shape()).unwrap();
            let batch = separable(16);
            let first = m.train_step(&batch).unwrap();
            for _ in 0..200 {
                m.train_step(&batch).unwrap();
            }
            let last = m.evaluate(&batch).unwrap();
            assert!(last.loss < first.loss, "{:?}: {} !< {}", kind, last.loss, first.loss);
            assert_eq!(last.accuracy, 1.0);
            assert_eq!(m.predict(batch.images()).unwrap(), batch.targets());
        }
    }

    #[test]
    fn rejects_mismatched_inputs() {
        let mut m = SoftmaxClassifier::new(&params(OptimizerKind::Sgd), shape()).unwrap();
        let wrong = Batch::from_targets(Array4::zeros((2, 1, 3, 3)), &[0, 1], 2).unwrap();
        assert!(m.train_step(&wrong).is_err());
        let classes = Batch::from_targets(Array4::zeros((2, 1, 2, 2)), &[0, 1], 3).unwrap();
        assert!(m.evaluate(&classes).is_err());
    }

    #[test]
    fn state_rebuilds_an_identical_predictor() {
        let p = params(OptimizerKind::Adam);
        let mut m = SoftmaxClassifier::new(&p, shape()).unwrap();
        m.train_step(&separable(8)).unwrap();
        let copy = SoftmaxClassifier::from_state(&p, m.state().unwrap()).unwrap();
        assert_eq!(copy.weights, m.weights);
        assert_eq!(copy.bias, m.bias);
        assert!(SoftmaxClassifier::from_state(&p, serde_json::json!({"shape": 1})).is_err());
    }
}
