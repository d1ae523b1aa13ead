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

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::config::{AppConfig, EnvConfig};
use crate::config::credentials::CredentialRef;
use crate::error::{Error, Result};

/// Network filesystem protocol used to attach the share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Smb,
    Nfs,
}

impl Protocol {
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Smb => AppConfig::SMB_PORT,
            Protocol::Nfs => AppConfig::NFS_PORT,
        }
    }

    /// Filesystem type passed to `mount -t`.
    pub fn fs_type(&self) -> &'static str {
        match self {
            Protocol::Smb => "cifs",
            Protocol::Nfs => "nfs",
        }
    }

    /// Remote source string in the form the OS mount facility expects.
    pub fn source_spec(&self, server: &str, share: &str) -> String {
        let share = share.trim_matches('/');
        match self {
            Protocol::Smb => format!("//{server}/{share}"),
            Protocol::Nfs => format!("{server}:/{share}"),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Smb => write!(f, "smb"),
            Protocol::Nfs => write!(f, "nfs"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "smb" | "cifs" => Ok(Protocol::Smb),
            "nfs" => Ok(Protocol::Nfs),
            other => Err(format!("unknown protocol '{other}' (expected smb or nfs)")),
        }
    }
}

/// Persisted network storage connection settings.
///
/// The record is always written and read as a whole. The credential itself
/// is never part of it; only a [`CredentialRef`] telling where to fetch it
/// at mount time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(alias = "server_ip")]
    pub server_address: String,
    pub share_name: String,
    pub username: String,
    pub credential_ref: CredentialRef,
    pub mount_point: String,
    pub protocol: Protocol,
    pub port: u16,
    #[serde(alias = "auto_mount")]
    pub auto_mount_on_startup: bool,
    #[serde(alias = "mount_timeout")]
    pub mount_timeout_seconds: u64,
    pub enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            server_address: String::new(),
            share_name: String::new(),
            username: String::new(),
            credential_ref: CredentialRef::default(),
            mount_point: String::new(),
            protocol: Protocol::Smb,
            port: AppConfig::SMB_PORT,
            auto_mount_on_startup: false,
            mount_timeout_seconds: AppConfig::DEFAULT_MOUNT_TIMEOUT_SECS,
            enabled: false,
        }
    }
}

impl StorageConfig {
    /// Names of the connection fields that are still empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.server_address.trim().is_empty() {
            missing.push("server_address");
        }
        if self.share_name.trim().is_empty() {
            missing.push("share_name");
        }
        if self.username.trim().is_empty() {
            missing.push("username");
        }
        if self.mount_point.trim().is_empty() {
            missing.push("mount_point");
        }
        missing
    }

    /// True when every field needed to attempt a mount is filled in.
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Check the invariants a saved configuration must hold.
    pub fn validate(&self) -> Result<()> {
        if self.enabled {
            let missing = self.missing_fields();
            if !missing.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "enabled configuration is missing: {}",
                    missing.join(", ")
                )));
            }
        }
        if !self.mount_point.is_empty() && !Path::new(&self.mount_point).is_absolute() {
            return Err(Error::InvalidConfig(format!(
                "mount point '{}' must be an absolute path",
                self.mount_point
            )));
        }
        if !(AppConfig::MIN_MOUNT_TIMEOUT_SECS..=AppConfig::MAX_MOUNT_TIMEOUT_SECS)
            .contains(&self.mount_timeout_seconds)
        {
            return Err(Error::InvalidConfig(format!(
                "mount timeout must be between {} and {} seconds, got {}",
                AppConfig::MIN_MOUNT_TIMEOUT_SECS,
                AppConfig::MAX_MOUNT_TIMEOUT_SECS,
                self.mount_timeout_seconds
            )));
        }
        if self.port == 0 {
            return Err(Error::InvalidConfig("port must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Bring out-of-range values read from disk back into bounds.
    pub(crate) fn normalized(mut self) -> Self {
        self.mount_timeout_seconds = EnvConfig::clamp_mount_timeout(self.mount_timeout_seconds);
        if self.port == 0 {
            self.port = self.protocol.default_port();
        }
        self
    }

    pub fn mount_point_path(&self) -> PathBuf {
        PathBuf::from(&self.mount_point)
    }

    pub fn mount_timeout(&self) -> Duration {
        Duration::from_secs(self.mount_timeout_seconds)
    }
}
