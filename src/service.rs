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

//! The network storage subsystem as one handle.
//!
//! [`NetworkStorage`] wires the configuration store, connectivity prober,
//! mount manager, status reporter and scanner together and adds the
//! workflows that span several of them: mounting from saved settings,
//! auto-mount on startup, status for dashboards and media sync.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::common::config::AppConfig;
use crate::config::{ConfigStore, Credential, StorageConfig};
use crate::error::{Error, Result};
use crate::mount::{
    MountManager, MountOutcome, MountRequest, MountState, SimulatedMountSystem, UnmountOutcome,
};
use crate::network::{ConnectionReport, ConnectivityProber, NetworkScanner, ProbeFailure, ScanReport};
use crate::storage::{MountRecord, StatusReporter, StorageStats};
use crate::sync::{sync_tree, SyncSummary};

/// Result of [`NetworkStorage::auto_mount`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AutoMountOutcome {
    /// Network storage or auto-mount is switched off.
    Disabled,
    Incomplete { missing: Vec<String> },
    AlreadyMounted,
    Mounted,
    Failed { error: ProbeFailure },
}

/// Snapshot of the configured share for dashboards. Always computed live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub enabled: bool,
    pub mounted: bool,
    pub server_address: String,
    pub mount_point: String,
    pub state: MountState,
    pub stats: Option<StorageStats>,
    /// Why the share is not usable, when it is not.
    pub message: Option<String>,
}

#[derive(Clone)]
pub struct NetworkStorage {
    store: ConfigStore,
    prober: ConnectivityProber,
    manager: Arc<MountManager>,
    reporter: StatusReporter,
    scanner: NetworkScanner,
}

impl NetworkStorage {
    pub fn new(store: ConfigStore, manager: MountManager, reporter: StatusReporter) -> Self {
        Self {
            store,
            prober: ConnectivityProber::system(),
            manager: Arc::new(manager),
            reporter,
            scanner: NetworkScanner::system(),
        }
    }

    /// Storage backed by the real OS mount facility.
    pub fn system(config_path: impl Into<PathBuf>, use_sudo: bool) -> Self {
        Self::new(
            ConfigStore::new(config_path),
            MountManager::system(use_sudo),
            StatusReporter::system(),
        )
    }

    /// Storage whose mounts only exist inside `system`. Probing and
    /// scanning still use the real network.
    pub fn simulated(config_path: impl Into<PathBuf>, system: Arc<SimulatedMountSystem>) -> Self {
        Self::new(
            ConfigStore::new(config_path),
            MountManager::new(system.clone(), system.clone()),
            StatusReporter::new(system.clone(), system),
        )
    }

    pub fn with_prober(mut self, prober: ConnectivityProber) -> Self {
        self.prober = prober;
        self
    }

    pub fn with_scanner(mut self, scanner: NetworkScanner) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn manager(&self) -> &MountManager {
        &self.manager
    }

    pub fn reporter(&self) -> &StatusReporter {
        &self.reporter
    }

    pub fn scanner(&self) -> &NetworkScanner {
        &self.scanner
    }

    pub fn load_config(&self) -> StorageConfig {
        self.store.load()
    }

    pub fn save_config(&self, config: &StorageConfig) -> Result<()> {
        self.store.save(config)
    }

    fn credential_for(config: &StorageConfig, credential: Option<Credential>) -> Result<Credential> {
        match credential {
            Some(credential) => Ok(credential),
            None => config.credential_ref.resolve(),
        }
    }

    /// Probe the server described by `config` on its configured port.
    ///
    /// `credential` overrides the configuration's credential reference,
    /// which lets a caller test a password before saving anything.
    pub async fn test_connection(
        &self,
        config: &StorageConfig,
        credential: Option<Credential>,
    ) -> Result<ConnectionReport> {
        let credential = Self::credential_for(config, credential)?;
        let prober = self.prober.clone().with_port(config.port);
        Ok(prober
            .test_connection(
                &config.server_address,
                &config.share_name,
                &config.username,
                &credential,
            )
            .await)
    }

    /// Mount the share from the saved configuration.
    pub async fn mount_configured(&self, credential: Option<Credential>) -> Result<MountOutcome> {
        let config = self.store.load();
        config.validate()?;
        if !config.is_complete() {
            return Err(Error::InvalidConfig(format!(
                "configuration is missing: {}",
                config.missing_fields().join(", ")
            )));
        }
        let credential = Self::credential_for(&config, credential)?;
        self.manager
            .mount(&MountRequest::from_config(&config, credential))
            .await
    }

    /// Unmount the configured mount point.
    pub async fn unmount_configured(&self) -> Result<UnmountOutcome> {
        let config = self.store.load();
        if config.mount_point.trim().is_empty() {
            return Err(Error::InvalidConfig("no mount point configured".to_string()));
        }
        self.manager.unmount(&config.mount_point_path()).await
    }

    /// Mount the configured share if auto-mount is switched on.
    ///
    /// Never fails: every problem is reported in the outcome so startup can
    /// carry on without network storage.
    pub async fn auto_mount(&self) -> AutoMountOutcome {
        let config = self.store.load();
        if !config.enabled || !config.auto_mount_on_startup {
            tracing::debug!("auto-mount disabled");
            return AutoMountOutcome::Disabled;
        }
        if !config.is_complete() {
            let missing: Vec<String> = config
                .missing_fields()
                .into_iter()
                .map(str::to_string)
                .collect();
            tracing::warn!(missing = ?missing, "auto-mount skipped, configuration incomplete");
            return AutoMountOutcome::Incomplete { missing };
        }

        match self.mount_configured(None).await {
            Ok(MountOutcome::Mounted) => AutoMountOutcome::Mounted,
            Ok(MountOutcome::AlreadyMounted) => AutoMountOutcome::AlreadyMounted,
            Err(e) => {
                tracing::warn!(kind = ?e.kind(), error = %e, "auto-mount failed");
                AutoMountOutcome::Failed { error: e.into() }
            }
        }
    }

    /// Live status of the configured share.
    pub async fn connection_status(&self) -> ConnectionStatus {
        let config = self.store.load();
        let mount_point = config.mount_point_path();
        let mounted =
            !config.mount_point.trim().is_empty() && self.reporter.is_mounted(&mount_point).await;

        let (stats, message) = if !config.enabled {
            (None, Some("Network storage not enabled".to_string()))
        } else if !mounted {
            (None, Some("Not mounted".to_string()))
        } else {
            match self.reporter.get_stats(&mount_point).await {
                Some(stats) => (Some(stats), None),
                None => (None, Some("Cannot get storage stats".to_string())),
            }
        };

        ConnectionStatus {
            enabled: config.enabled,
            mounted,
            state: MountState::observe(&config, mounted),
            server_address: config.server_address,
            mount_point: config.mount_point,
            stats,
            message,
        }
    }

    pub async fn list_mounted_shares(&self) -> Vec<MountRecord> {
        self.reporter.list_mounted_shares().await
    }

    pub async fn get_stats(&self, mount_point: &Path) -> Option<StorageStats> {
        self.reporter.get_stats(mount_point).await
    }

    pub async fn scan(&self, range: &str) -> Result<ScanReport> {
        self.scanner.scan(range).await
    }

    /// Copy `local_dir` into the `media` directory of the mounted share.
    pub async fn sync_media(&self, local_dir: &Path) -> Result<SyncSummary> {
        let config = self.store.load();
        let mount_point = config.mount_point_path();
        if config.mount_point.trim().is_empty() || !self.reporter.is_mounted(&mount_point).await {
            return Err(Error::NotMounted(mount_point));
        }

        let source = local_dir.to_path_buf();
        let destination = mount_point.join(AppConfig::REMOTE_MEDIA_SUBDIR);
        tokio::task::spawn_blocking(move || sync_tree(&source, &destination))
            .await
            .map_err(|e| Error::Io(io::Error::other(e.to_string())))?
    }
}
