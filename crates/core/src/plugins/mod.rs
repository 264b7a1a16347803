// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/core/src/plugins/mod.rs
use anyhow::Result;
use async_trait::async_trait;

use crate::config::ExperimentConfig;
use crate::metrics::EpochMetrics;
use crate::model::Model;

/// Hooks the runner calls around training. Every hook defaults to a no-op.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    async fn initialize(&mut self, _cfg: &ExperimentConfig) -> Result<()> { Ok(()) }
    async fn after_step(&mut self, _step: u64) -> Result<()> { Ok(()) }
    async fn after_epoch(&mut self, _metrics: &EpochMetrics, _model: &dyn Model) -> Result<()> { Ok(()) }
    async fn finalize(&mut self, _model: &dyn Model) -> Result<()> { Ok(()) }
}

pub struct PluginManager {
    plugins: Vec<Box<dyn Plugin>>,
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.names())
            .finish()
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginManager {
    pub fn new() -> Self {
        Self { plugins: Vec::new() }
    }

    pub fn push(&mut self, p: Box<dyn Plugin>) {
        self.plugins.push(p);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn into_plugins(self) -> Vec<Box<dyn Plugin>> {
        self.plugins
    }

    pub async fn initialize(&mut self, cfg: &ExperimentConfig) -> Result<()> {
        for p in self.plugins.iter_mut() {
            p.initialize(cfg).await?;
        }
        Ok(())
    }

    pub async fn after_step(&mut self, step: u64) -> Result<()> {
        for p in self.plugins.iter_mut() {
            p.after_step(step).await?;
        }
        Ok(())
    }

    pub async fn after_epoch(&mut self, metrics: &EpochMetrics, model: &dyn Model) -> Result<()> {
        for p in self.plugins.iter_mut() {
            p.after_epoch(metrics, model).await?;
        }
        Ok(())
    }

    pub async fn finalize(&mut self, model: &dyn Model) -> Result<()> {
        for p in self.plugins.iter_mut() {
            p.finalize(model).await?;
        }
        Ok(())
    }
}

pub mod checkpoint;
pub use checkpoint::{CheckpointData, CheckpointPlugin};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Plugin for Recorder {
        fn name(&self) -> &str {
            self.tag
        }
        async fn after_step(&mut self, step: u64) -> Result<()> {
            self.log.lock().unwrap().push(format!("{}:{}", self.tag, step));
            Ok(())
        }
    }

    #[tokio::test]
    async fn hooks_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pm = PluginManager::new();
        pm.push(Box::new(Recorder { tag: "a", log: log.clone() }));
        pm.push(Box::new(Recorder { tag: "b", log: log.clone() }));
        assert_eq!(pm.names(), vec!["a", "b"]);

        pm.after_step(1).await.unwrap();
        pm.after_step(2).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a:1", "b:1", "a:2", "b:2"]);
    }
}
