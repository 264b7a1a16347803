// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod local;
pub use local::LocalStore;

/// Synchronous store for run artifacts (model checkpoints, evaluation reports).
pub trait ArtifactStore: Send + Sync {
    /// Write `data` under the relative key `key`, replacing any previous artifact.
    fn put(&self, key: &str, data: &[u8]) -> std::io::Result<()>;
    /// Read the artifact stored at `key`.
    fn get(&self, key: &str) -> std::io::Result<Vec<u8>>;
    /// Whether an artifact exists at `key`.
    fn exists(&self, key: &str) -> bool;
    /// List artifact names (files only) under `prefix`, sorted.
    fn list(&self, prefix: &str) -> std::io::Result<Vec<String>>;
    /// Human readable location of `key`, used in log lines.
    fn locate(&self, key: &str) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn local_put_get_list() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.put("runs/example.json", b"{}").unwrap();
        store.put("runs/example.report.json", b"[]").unwrap();

        assert!(store.exists("runs/example.json"));
        assert_eq!(store.get("runs/example.json").unwrap(), b"{}");
        assert_eq!(
            store.list("runs").unwrap(),
            vec!["example.json".to_string(), "example.report.json".to_string()]
        );
        assert!(store.get("runs/missing.json").is_err());
    }

    #[test]
    fn list_of_missing_prefix_is_empty() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        assert!(store.list("nothing-here").unwrap().is_empty());
    }
}
