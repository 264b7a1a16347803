// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// src/eval.rs
//
// Post-training evaluations over a held-out split.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::dataset::Split;
use crate::model::Model;

/// Rows per forward pass while predicting.
const EVAL_CHUNK: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub name: String,
    pub accuracy: f64,
    pub samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_class_accuracy: Option<Vec<f64>>,
    /// `confusion[actual][predicted]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confusion: Option<Vec<Vec<usize>>>,
}

pub trait Evaluation: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, model: &dyn Model, split: &Split, num_classes: usize) -> Result<EvalReport>;
}

fn predictions(model: &dyn Model, split: &Split) -> Result<Vec<usize>> {
    let mut out = Vec::with_capacity(split.len());
    let mut start = 0;
    while start < split.len() {
        let end = (start + EVAL_CHUNK).min(split.len());
        out.extend(model.predict(split.images.slice(ndarray::s![start..end, .., .., ..]))?);
        start = end;
    }
    Ok(out)
}

fn accuracy_of(predicted: &[usize], actual: &[usize]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let hits = predicted.iter().zip(actual).filter(|(p, a)| p == a).count();
    hits as f64 / actual.len() as f64
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AccuracyEvaluation;

impl Evaluation for AccuracyEvaluation {
    fn name(&self) -> &str {
        "accuracy"
    }

    fn evaluate(&self, model: &dyn Model, split: &Split, _num_classes: usize) -> Result<EvalReport> {
        let predicted = predictions(model, split)?;
        Ok(EvalReport {
            name: self.name().to_string(),
            accuracy: accuracy_of(&predicted, &split.targets),
            samples: split.len(),
            per_class_accuracy: None,
            confusion: None,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfusionEvaluation;

impl Evaluation for ConfusionEvaluation {
    fn name(&self) -> &str {
        "confusion"
    }

    fn evaluate(&self, model: &dyn Model, split: &Split, num_classes: usize) -> Result<EvalReport> {
        let predicted = predictions(model, split)?;
        let mut confusion = vec![vec![0usize; num_classes]; num_classes];
        for (&p, &a) in predicted.iter().zip(&split.targets) {
            if p >= num_classes || a >= num_classes {
                bail!("class {} is outside 0..{}", p.max(a), num_classes);
            }
            confusion[a][p] += 1;
        }
        // classes absent from the split score 0
        let per_class = confusion
            .iter()
            .enumerate()
            .map(|(c, row)| {
                let total: usize = row.iter().sum();
                if total == 0 { 0.0 } else { row[c] as f64 / total as f64 }
            })
            .collect();
        Ok(EvalReport {
            name: self.name().to_string(),
            accuracy: accuracy_of(&predicted, &split.targets),
            samples: split.len(),
            per_class_accuracy: Some(per_class),
            confusion: Some(confusion),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Batch;
    use crate::model::{InputShape, StepStats};
    use ndarray::{Array4, ArrayView4};

    /// Predicts the first pixel value as the class.
    struct PixelOracle;

    impl Model for PixelOracle {
        fn name(&self) -> &str {
            "oracle"
        }
        fn input_shape(&self) -> InputShape {
            InputShape { channels: 1, height: 1, width: 1, num_classes: 3 }
        }
        fn train_step(&mut self, _: &Batch) -> Result<StepStats> {
            Ok(StepStats::default())
        }
        fn evaluate(&self, _: &Batch) -> Result<StepStats> {
            Ok(StepStats::default())
        }
        fn predict(&self, images: ArrayView4<'_, f32>) -> Result<Vec<usize>> {
            Ok(images.outer_iter().map(|img| img[[0, 0, 0]] as usize).collect())
        }
        fn state(&self) -> Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
    }

    fn split() -> Split {
        // pixel = predicted class
        let preds = [0.0, 1.0, 2.0, 2.0, 1.0, 0.0];
        Split {
            images: Array4::from_shape_vec((6, 1, 1, 1), preds.to_vec()).unwrap(),
            targets: vec![0, 1, 2, 1, 1, 2],
        }
    }

    #[test]
    fn accuracy_counts_hits() {
        let r = AccuracyEvaluation.evaluate(&PixelOracle, &split(), 3).unwrap();
        assert_eq!(r.samples, 6);
        assert!((r.accuracy - 4.0 / 6.0).abs() < 1e-12);
        assert!(r.confusion.is_none());
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("confusion").is_none());
    }

    #[test]
    fn confusion_matrix_rows_are_actual_classes() {
        let r = ConfusionEvaluation.evaluate(&PixelOracle, &split(), 3).unwrap();
        assert_eq!(r.confusion.unwrap(), vec![vec![1, 0, 0], vec![0, 2, 1], vec![1, 0, 1]]);
        assert_eq!(r.per_class_accuracy.unwrap(), vec![1.0, 2.0 / 3.0, 0.5]);
        assert!(ConfusionEvaluation.evaluate(&PixelOracle, &split(), 2).is_err());
    }

    #[test]
    fn large_splits_are_predicted_in_chunks() {
        let n = EVAL_CHUNK * 2 + 7;
        let s = Split { images: Array4::zeros((n, 1, 1, 1)), targets: vec![0; n] };
        let r = AccuracyEvaluation.evaluate(&PixelOracle, &s, 3).unwrap();
        assert_eq!((r.samples, r.accuracy), (n, 1.0));
    }
}
