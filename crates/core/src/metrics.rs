// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::model::StepStats;

/// Averages per-batch stats; every batch weighs the same regardless of size.
#[derive(Debug, Clone, Default)]
pub struct BatchMeans {
    accuracy_sum: f64,
    loss_sum: f64,
    batches: usize,
}

impl BatchMeans {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stats: StepStats) {
        self.accuracy_sum += stats.accuracy;
        self.loss_sum += stats.loss;
        self.batches += 1;
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    /// `None` before the first batch.
    pub fn mean(&self) -> Option<StepStats> {
        if self.batches == 0 {
            return None;
        }
        let n = self.batches as f64;
        Some(StepStats { accuracy: self.accuracy_sum / n, loss: self.loss_sum / n })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_accuracy: f64,
    pub train_loss: f64,
    pub valid_accuracy: Option<f64>,
    pub valid_loss: Option<f64>,
    /// Samples seen after augmentation.
    pub train_samples: usize,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

/// Per-epoch history of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    pub epochs: Vec<EpochMetrics>,
    #[serde(with = "duration_secs_opt")]
    pub total_time: Option<Duration>,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_epoch(&mut self, epoch: EpochMetrics) {
        self.epochs.push(epoch);
    }

    pub fn record_total_time(&mut self, duration: Duration) {
        self.total_time = Some(duration);
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    /// Epoch with the highest validation accuracy; the earliest wins on ties.
    pub fn best_valid_epoch(&self) -> Option<&EpochMetrics> {
        self.epochs
            .iter()
            .filter(|e| e.valid_accuracy.is_some())
            .fold(None, |best: Option<&EpochMetrics>, e| match best {
                Some(b) if b.valid_accuracy >= e.valid_accuracy => Some(b),
                _ => Some(e),
            })
    }

    pub fn average_train_accuracy(&self) -> Option<f64> {
        if self.epochs.is_empty() {
            return None;
        }
        Some(self.epochs.iter().map(|e| e.train_accuracy).sum::<f64>() / self.epochs.len() as f64)
    }

    pub fn average_epoch_time(&self) -> Option<Duration> {
        if self.epochs.is_empty() {
            return None;
        }
        let total: Duration = self.epochs.iter().map(|e| e.elapsed).sum();
        Some(total / self.epochs.len() as u32)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn print_summary(&self) {
        println!("\n=== Training Results ===");

        if let Some(total_time) = self.total_time {
            println!("Total Time: {:?}", total_time);
        }
        println!("Epochs: {}", self.epochs.len());

        if let Some(last) = self.last() {
            println!("Final Training Accuracy: {:.3} , Training Loss: {:.3}", last.train_accuracy, last.train_loss);
        }
        if let Some(avg) = self.average_train_accuracy() {
            println!("Average Training Accuracy: {:.3}", avg);
        }
        if let Some(best) = self.best_valid_epoch() {
            println!(
                "Best Validation Accuracy: {:.3} (epoch {})",
                best.valid_accuracy.unwrap_or_default(),
                best.epoch
            );
        }
        if let Some(avg_epoch) = self.average_epoch_time() {
            println!("Average Epoch Time: {:?}", avg_epoch);
        }

        println!("========================\n");
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod duration_secs_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(d)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch(epoch: usize, valid: Option<f64>) -> EpochMetrics {
        EpochMetrics {
            epoch,
            train_accuracy: 0.5,
            train_loss: 1.0,
            valid_accuracy: valid,
            valid_loss: valid.map(|v| 1.0 - v),
            train_samples: 128,
            elapsed: Duration::from_millis(500),
        }
    }

    #[test]
    fn batch_means_weigh_batches_equally() {
        let mut m = BatchMeans::new();
        assert!(m.mean().is_none());
        m.record(StepStats { accuracy: 1.0, loss: 0.0 });
        m.record(StepStats { accuracy: 0.0, loss: 2.0 });
        m.record(StepStats { accuracy: 0.5, loss: 1.0 });
        assert_eq!(m.mean(), Some(StepStats { accuracy: 0.5, loss: 1.0 }));
        assert_eq!(m.batches(), 3);
    }

    #[test]
    fn best_valid_epoch_prefers_the_earliest_maximum() {
        let mut run = RunMetrics::new();
        assert!(run.best_valid_epoch().is_none());
        run.record_epoch(epoch(0, Some(0.6)));
        run.record_epoch(epoch(1, Some(0.8)));
        run.record_epoch(epoch(2, None));
        run.record_epoch(epoch(3, Some(0.8)));
        assert_eq!(run.best_valid_epoch().map(|e| e.epoch), Some(1));
        assert_eq!(run.average_epoch_time(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn json_uses_seconds() {
        let mut run = RunMetrics::new();
        run.record_epoch(epoch(0, None));
        run.record_total_time(Duration::from_millis(1500));
        let json: serde_json::Value = serde_json::from_str(&run.to_json().unwrap()).unwrap();
        assert_eq!(json["total_time"], 1.5);
        assert_eq!(json["epochs"][0]["elapsed"], 0.5);

        let back: RunMetrics = serde_json::from_value(json).unwrap();
        assert_eq!(back.epochs, run.epochs);
    }
}
