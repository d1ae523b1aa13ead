// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! JSON file store for [`StorageConfig`].
//!
//! Absence or corruption of the file is a normal first-run state and loads
//! as [`StorageConfig::default`]. Writes are whole-record overwrites done
//! through a temp file and a rename. There is no locking: two concurrent
//! saves race and the last rename wins.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::storage_config::StorageConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the configuration, falling back to defaults on any problem.
    pub fn load(&self) -> StorageConfig {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no storage configuration yet");
                return StorageConfig::default();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read storage configuration");
                return StorageConfig::default();
            }
        };

        match serde_json::from_str::<StorageConfig>(&content) {
            Ok(config) => config.normalized(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to parse storage configuration");
                StorageConfig::default()
            }
        }
    }

    /// Validate and persist the whole configuration.
    pub fn save(&self, config: &StorageConfig) -> Result<()> {
        config.validate()?;

        let content = serde_json::to_string_pretty(config).map_err(|e| Error::ConfigIo {
            path: self.path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;

        self.write_atomic(content.as_bytes())
            .map_err(|source| Error::ConfigIo {
                path: self.path.clone(),
                source,
            })?;

        tracing::debug!(path = %self.path.display(), "saved storage configuration");
        Ok(())
    }

    fn write_atomic(&self, content: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "storage_config.json".into());
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        fs::write(&tmp_path, content)?;
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        Ok(())
    }
}
