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

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::common::config::AppConfig;
use crate::config::{CredentialRef, Protocol, StorageConfig};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path of the storage configuration file.
    #[arg(long, global = true, env = AppConfig::CONFIG_PATH_ENV, default_value = AppConfig::DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
    /// Run mount and umount through `sudo -n`.
    #[arg(long, global = true)]
    pub sudo: bool,
    /// Use an in-memory mount table instead of the real mount facility.
    #[arg(long, global = true)]
    pub simulate: bool,
    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show or change the saved storage configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Test reachability and share enumeration of the file server.
    Test(TestArgs),
    /// Mount the configured share.
    Mount,
    /// Unmount the configured share, or the given mount point.
    Unmount(UnmountArgs),
    /// Show the status of the configured share.
    Status,
    /// List mounted network shares.
    Shares,
    /// Scan a network range for SMB hosts.
    Scan(ScanArgs),
    /// Mount the configured share if auto-mount is enabled.
    AutoMount,
    /// Copy local media onto the mounted share.
    Sync(SyncArgs),
    /// Serve the storage operations as a JSON HTTP API.
    Api(ApiArgs),
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the saved configuration.
    Show,
    /// Update fields of the saved configuration.
    Set(ConnectionArgs),
}

/// Connection settings that can be given on the command line.
#[derive(Args, Clone, Default)]
pub struct ConnectionArgs {
    /// File server hostname or IP address.
    #[arg(long)]
    pub server: Option<String>,
    /// Share name on the server.
    #[arg(long)]
    pub share: Option<String>,
    #[arg(long)]
    pub username: Option<String>,
    /// Local mount point (absolute path).
    #[arg(long)]
    pub mount_point: Option<String>,
    /// smb or nfs.
    #[arg(long)]
    pub protocol: Option<Protocol>,
    #[arg(long)]
    pub port: Option<u16>,
    /// Mount timeout in seconds (5-120).
    #[arg(long)]
    pub timeout: Option<u64>,
    /// Read the password from this environment variable.
    #[arg(long, conflicts_with_all = ["password_file", "guest"])]
    pub password_env: Option<String>,
    /// Read the password from the first line of this file.
    #[arg(long, conflicts_with = "guest")]
    pub password_file: Option<PathBuf>,
    /// Connect without a password.
    #[arg(long)]
    pub guest: bool,
    /// Mount automatically on startup.
    #[arg(long)]
    pub auto_mount: Option<bool>,
    #[arg(long, conflicts_with = "disable")]
    pub enable: bool,
    #[arg(long)]
    pub disable: bool,
}

impl ConnectionArgs {
    /// Overwrite the fields of `config` that were given.
    pub fn apply(&self, config: &mut StorageConfig) {
        if let Some(server) = &self.server {
            config.server_address = server.clone();
        }
        if let Some(share) = &self.share {
            config.share_name = share.clone();
        }
        if let Some(username) = &self.username {
            config.username = username.clone();
        }
        if let Some(mount_point) = &self.mount_point {
            config.mount_point = mount_point.clone();
        }
        if let Some(protocol) = self.protocol {
            // Follow the protocol's port unless one is given explicitly
            if config.port == config.protocol.default_port() {
                config.port = protocol.default_port();
            }
            config.protocol = protocol;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(timeout) = self.timeout {
            config.mount_timeout_seconds = timeout;
        }
        if let Some(var) = &self.password_env {
            config.credential_ref = CredentialRef::Env(var.clone());
        }
        if let Some(path) = &self.password_file {
            config.credential_ref = CredentialRef::File(path.clone());
        }
        if self.guest {
            config.credential_ref = CredentialRef::None;
        }
        if let Some(auto_mount) = self.auto_mount {
            config.auto_mount_on_startup = auto_mount;
        }
        if self.enable {
            config.enabled = true;
        }
        if self.disable {
            config.enabled = false;
        }
    }
}

#[derive(Args)]
pub struct TestArgs {
    /// Settings to test instead of (or on top of) the saved ones.
    #[command(flatten)]
    pub overrides: ConnectionArgs,
}

#[derive(Args)]
pub struct UnmountArgs {
    /// Mount point to detach. Defaults to the configured one.
    pub path: Option<PathBuf>,
}

#[derive(Args)]
pub struct ScanArgs {
    /// IPv4 range in CIDR notation.
    #[arg(default_value = AppConfig::DEFAULT_SCAN_RANGE)]
    pub range: String,
    /// Probes in flight (1-64).
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Give up after this many seconds.
    #[arg(long, default_value_t = AppConfig::SCAN_GLOBAL_TIMEOUT_SECS)]
    pub timeout: u64,
}

#[derive(Args)]
pub struct SyncArgs {
    /// Local media directory to copy from.
    #[arg(long, default_value = AppConfig::DEFAULT_MEDIA_DIR)]
    pub local_dir: PathBuf,
}

#[derive(Args)]
pub struct ApiArgs {
    /// The port to listen on. Use 0 to disable the TCP listener.
    #[arg(short, long, default_value_t = AppConfig::DEFAULT_API_PORT)]
    pub port: u16,
    /// Address to bind the TCP listener to.
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: String,
    /// Unix domain socket path for local IPC.
    /// When specified without a value, uses /tmp/pinas.sock.
    #[arg(short, long, num_args = 0..=1, default_missing_value = "")]
    pub socket: Option<String>,
    /// Try to mount the configured share before serving.
    #[arg(long)]
    pub auto_mount: bool,
}
