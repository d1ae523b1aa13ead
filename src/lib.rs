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

//! Network storage core of a self-hosted media server.
//!
//! Configures, probes, mounts and monitors an SMB/CIFS (or NFS) share and
//! discovers candidate file servers on the local network.
//!
//! # Example
//!
//! ```rust,no_run
//! use pinas::service::NetworkStorage;
//!
//! # async fn run() -> pinas::Result<()> {
//! let storage = NetworkStorage::system("config/storage_config.json", false);
//! let config = storage.load_config();
//! let report = storage.test_connection(&config, None).await?;
//! if report.is_ok() {
//!     storage.mount_configured(None).await?;
//! }
//! for share in storage.list_mounted_shares().await {
//!     println!("{} on {}", share.source, share.mount_point.display());
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod mount;
pub mod network;
pub mod service;
pub mod storage;
pub mod sync;
pub mod utils;

// Re-export just the config module from common for library users
pub mod common {
    pub mod config;
}

pub use error::{Error, ErrorKind, Result};
