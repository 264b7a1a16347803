// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    fs, io,
    path::{Path, PathBuf},
};
use crate::ArtifactStore;

/// Artifacts kept as plain files below a root directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
}

impl ArtifactStore for LocalStore {
    fn put(&self, key: &str, data: &[u8]) -> io::Result<()> {
        let path = self.root.join(key);
        if let Some(p) = path.parent() {
            fs::create_dir_all(p)?;
        }
        // readers never observe a partially written artifact
        let tmp = path.with_extension("partial");
        fs::write(&tmp, data)?;
        fs::rename(tmp, path)
    }

    fn get(&self, key: &str) -> io::Result<Vec<u8>> {
        fs::read(self.root.join(key))
    }

    fn exists(&self, key: &str) -> bool {
        self.root.join(key).is_file()
    }

    fn list(&self, prefix: &str) -> io::Result<Vec<String>> {
        let dir = self.root.join(prefix);
        let mut names = Vec::new();
        if dir.is_dir() {
            for entry in fs::read_dir(dir)? {
                let f = entry?;
                if f.path().is_file() {
                    if let Some(n) = f.file_name().to_str() {
                        names.push(n.to_string());
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn locate(&self, key: &str) -> String {
        self.root.join(key).display().to_string()
    }
}
