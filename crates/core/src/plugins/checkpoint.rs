// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/core/src/plugins/checkpoint.rs
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::Plugin;
use crate::config::{CheckpointOptions, ExperimentConfig};
use crate::metrics::EpochMetrics;
use crate::model::Model;
use ic_driver_storage::{ArtifactStore, LocalStore};

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
pub const DEFAULT_CHECKPOINT_DIR: &str = "./Model";

/// Model snapshot as written to the artifact store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointData {
    pub run_id: String,
    /// `None` for the end-of-run snapshot
    pub epoch: Option<usize>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
    pub config_snapshot: serde_json::Value,
    pub model: String,
    pub state: serde_json::Value,
}

impl CheckpointData {
    /// JSON, optionally zstd-compressed at `level`
    pub fn encode(&self, zstd_level: Option<i32>) -> Result<Vec<u8>> {
        let json = serde_json::to_vec_pretty(self).context("Failed to serialize checkpoint data")?;
        match zstd_level {
            Some(level) => zstd::encode_all(json.as_slice(), level)
                .context("Failed to compress checkpoint data with zstd"),
            None => Ok(json),
        }
    }

    /// Accepts either form `encode` produces
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let json = if bytes.starts_with(&ZSTD_MAGIC) {
            zstd::decode_all(bytes).context("Failed to decompress checkpoint")?
        } else {
            bytes.to_vec()
        };
        serde_json::from_slice(&json).context("Failed to parse checkpoint")
    }
}

/// Writes model checkpoints every `epochs_between` epochs and once at the end of the run
pub struct CheckpointPlugin {
    opts: CheckpointOptions,
    store: Arc<dyn ArtifactStore>,
    run_id: String,
    run_name: String,
    config_snapshot: serde_json::Value,
    written: Vec<String>,
}

impl std::fmt::Debug for CheckpointPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointPlugin")
            .field("run_id", &self.run_id)
            .field("run_name", &self.run_name)
            .field("epochs_between", &self.epochs_between())
            .field("compression_enabled", &self.compression_enabled())
            .field("written", &self.written.len())
            .finish()
    }
}

impl CheckpointPlugin {
    /// `None` when the config has no enabled checkpoint section
    pub fn new(config: &ExperimentConfig, run_name: &str) -> Result<Option<Self>> {
        let Some(opts) = config.checkpoint.as_ref().filter(|_| config.checkpoint_enabled()) else {
            debug!("Checkpointing not enabled in config");
            return Ok(None);
        };
        let dir = opts.dir.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CHECKPOINT_DIR));
        info!("Checkpoints for '{}' go to {}", run_name, dir.display());
        Self::with_store(config, run_name, Arc::new(LocalStore::new(dir))).map(Some)
    }

    /// Checkpoint into an explicit store, ignoring `checkpoint.dir`
    pub fn with_store(config: &ExperimentConfig, run_name: &str, store: Arc<dyn ArtifactStore>) -> Result<Self> {
        let opts = config.checkpoint.clone().unwrap_or(CheckpointOptions {
            enabled: Some(true),
            dir: None,
            epochs_between: None,
            compression: None,
            compression_level: None,
        });
        if run_name.is_empty() || run_name.contains(|c: char| c == '/' || c == '\\') {
            bail!("invalid checkpoint run name '{}'", run_name);
        }
        let config_snapshot =
            serde_json::to_value(config).context("Failed to serialize config for checkpoint metadata")?;
        Ok(Self {
            opts,
            store,
            run_id: Uuid::new_v4().to_string(),
            run_name: run_name.to_string(),
            config_snapshot,
            written: Vec::new(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// 0 means only the final snapshot is written
    pub fn epochs_between(&self) -> u32 {
        self.opts.epochs_between.unwrap_or(0)
    }

    pub fn compression_enabled(&self) -> bool {
        self.opts.compression.as_deref() == Some("zstd")
    }

    pub fn compression_level(&self) -> i32 {
        self.opts.compression_level.unwrap_or(3)
    }

    /// Keys written so far, oldest first
    pub fn written(&self) -> &[String] {
        &self.written
    }

    fn key_for(&self, epoch: Option<usize>) -> String {
        let ext = if self.compression_enabled() { "json.zst" } else { "json" };
        match epoch {
            Some(e) => format!("{}.epoch{:03}.{}", self.run_name, e, ext),
            None => format!("{}.{}", self.run_name, ext),
        }
    }

    fn should_checkpoint(&self, epoch: usize) -> bool {
        let every = self.epochs_between() as usize;
        every > 0 && epoch % every == 0
    }

    async fn write_checkpoint(&mut self, epoch: Option<usize>, model: &dyn Model) -> Result<String> {
        let data = CheckpointData {
            run_id: self.run_id.clone(),
            epoch,
            timestamp: chrono::Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_snapshot: self.config_snapshot.clone(),
            model: model.name().to_string(),
            state: model.state()?,
        };
        let level = self.compression_enabled().then(|| self.compression_level());
        let bytes = data.encode(level)?;
        let size = bytes.len();

        let key = self.key_for(epoch);
        let store = Arc::clone(&self.store);
        let put_key = key.clone();
        tokio::task::spawn_blocking(move || store.put(&put_key, &bytes))
            .await
            .context("checkpoint writer panicked")?
            .with_context(|| format!("Failed to write checkpoint {}", self.store.locate(&key)))?;

        info!("Checkpoint written: {} ({} bytes)", self.store.locate(&key), size);
        self.written.push(key.clone());
        Ok(key)
    }
}

#[async_trait]
impl Plugin for CheckpointPlugin {
    fn name(&self) -> &str {
        "checkpoint"
    }

    async fn initialize(&mut self, _cfg: &ExperimentConfig) -> Result<()> {
        info!("CheckpointPlugin initialized for run_id: {}", self.run_id);
        Ok(())
    }

    async fn after_epoch(&mut self, metrics: &EpochMetrics, model: &dyn Model) -> Result<()> {
        if self.should_checkpoint(metrics.epoch) {
            debug!("Writing checkpoint at epoch {}", metrics.epoch);
            self.write_checkpoint(Some(metrics.epoch), model).await?;
        }
        Ok(())
    }

    async fn finalize(&mut self, model: &dyn Model) -> Result<()> {
        self.write_checkpoint(None, model).await?;
        info!("CheckpointPlugin finalized for run_id: {}", self.run_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InputShape, ModelParams, SoftmaxClassifier};
    use std::time::Duration;
    use tempfile::tempdir;

    fn config(checkpoint: &str) -> ExperimentConfig {
        ExperimentConfig::from_yaml(&format!("data: synthetic\nmodel: softmax\neval: accuracy\n{}", checkpoint))
            .unwrap()
    }

    fn model(cfg: &ExperimentConfig) -> SoftmaxClassifier {
        let shape = InputShape { channels: 1, height: 2, width: 2, num_classes: cfg.num_classes };
        SoftmaxClassifier::new(&ModelParams::from_config(cfg), shape).unwrap()
    }

    fn epoch(epoch: usize) -> EpochMetrics {
        EpochMetrics {
            epoch,
            train_accuracy: 0.0,
            train_loss: 0.0,
            valid_accuracy: None,
            valid_loss: None,
            train_samples: 0,
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn disabled_unless_configured() {
        assert!(CheckpointPlugin::new(&config(""), "run").unwrap().is_none());
        let off = config("checkpoint:\n  enabled: false\n");
        assert!(CheckpointPlugin::new(&off, "run").unwrap().is_none());

        let dir = tempdir().unwrap();
        let on = config(&format!(
            "checkpoint:\n  dir: {}\n  epochs_between: 2\n  compression: zstd\n  compression_level: 5\n",
            dir.path().display()
        ));
        let plugin = CheckpointPlugin::new(&on, "run").unwrap().unwrap();
        assert_eq!(plugin.epochs_between(), 2);
        assert!(plugin.compression_enabled());
        assert_eq!(plugin.compression_level(), 5);
        assert!(!plugin.run_id().is_empty());
    }

    #[tokio::test]
    async fn writes_on_schedule_and_at_the_end() {
        let dir = tempdir().unwrap();
        let cfg = config("checkpoint:\n  epochs_between: 2\n");
        let store = Arc::new(LocalStore::new(dir.path()));
        let mut plugin = CheckpointPlugin::with_store(&cfg, "exp1", store.clone()).unwrap();
        let m = model(&cfg);

        for e in 1..=5 {
            plugin.after_epoch(&epoch(e), &m).await.unwrap();
        }
        plugin.finalize(&m).await.unwrap();
        assert_eq!(plugin.written(), ["exp1.epoch002.json", "exp1.epoch004.json", "exp1.json"]);
        assert_eq!(store.list("").unwrap(), vec!["exp1.epoch002.json", "exp1.epoch004.json", "exp1.json"]);

        let back = CheckpointData::decode(&store.get("exp1.json").unwrap()).unwrap();
        assert_eq!(back.epoch, None);
        assert_eq!(back.model, "softmax");
        assert_eq!(back.run_id, plugin.run_id());
        assert_eq!(back.config_snapshot["data"], "synthetic");
        let restored = SoftmaxClassifier::from_state(&ModelParams::from_config(&cfg), back.state).unwrap();
        assert_eq!(restored.state().unwrap(), m.state().unwrap());
    }

    #[tokio::test]
    async fn zstd_checkpoints_decode() {
        let dir = tempdir().unwrap();
        let cfg = config("checkpoint:\n  compression: zstd\n");
        let store = Arc::new(LocalStore::new(dir.path()));
        let mut plugin = CheckpointPlugin::with_store(&cfg, "exp2", store.clone()).unwrap();
        plugin.finalize(&model(&cfg)).await.unwrap();

        let raw = store.get("exp2.json.zst").unwrap();
        assert!(raw.starts_with(&ZSTD_MAGIC));
        assert_eq!(CheckpointData::decode(&raw).unwrap().model, "softmax");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(CheckpointData::decode(b"not a checkpoint").is_err());
        assert!(CheckpointData::decode(&[0x28, 0xB5, 0x2F, 0xFD, 0, 0]).is_err());
    }
}
