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

//! In-memory stand-in for the OS mount facility.
//!
//! [`SimulatedMountSystem`] acts as mount executor, mount table and
//! filesystem statistics source at once, so the whole storage stack can run
//! without root or a real file server. It backs `--simulate` mode and the
//! test suites, and supports latency and failure injection.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::mount::executor::{MountExecutor, MountParams};
use crate::storage::fs_stats::FsStatsProvider;
use crate::storage::info::StorageStats;
use crate::storage::mount_table::{lexical_mount_path, resolve_mount_path, MountEntry, MountTable};
use crate::utils::CommandOutput;

/// Capacity reported for every simulated share: 64 GiB with 16 GiB used.
const SIMULATED_TOTAL_BYTES: u64 = 64 * 1024 * 1024 * 1024;
const SIMULATED_FREE_BYTES: u64 = 48 * 1024 * 1024 * 1024;

/// One request the simulated system received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedCall {
    Mount {
        source: String,
        target: PathBuf,
        options: String,
        /// Whether the referenced credential file existed during the call.
        credentials_present: bool,
    },
    Unmount {
        target: PathBuf,
        force: bool,
    },
}

#[derive(Debug, Default)]
struct SimState {
    mounts: BTreeMap<PathBuf, MountEntry>,
    history: Vec<SimulatedCall>,
    unmount_timeouts: Vec<Duration>,
    busy: bool,
    unmount_denied: bool,
}

#[derive(Debug)]
pub struct SimulatedMountSystem {
    state: Mutex<SimState>,
    latency: Duration,
    mount_failure: Option<String>,
    stats: StorageStats,
}

impl Default for SimulatedMountSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedMountSystem {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            latency: Duration::ZERO,
            mount_failure: None,
            stats: StorageStats::from_total_and_free(SIMULATED_TOTAL_BYTES, SIMULATED_FREE_BYTES),
        }
    }

    /// Delay every mount and unmount by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reject every mount with exit status 32 and `diagnostic` on stderr.
    pub fn failing_with(mut self, diagnostic: impl Into<String>) -> Self {
        self.mount_failure = Some(diagnostic.into());
        self
    }

    pub fn with_stats(mut self, stats: StorageStats) -> Self {
        self.stats = stats;
        self
    }

    /// Pretend the filesystem is in use: normal unmounts fail, forced ones
    /// still succeed.
    pub fn set_busy(&self, busy: bool) {
        self.lock().busy = busy;
    }

    /// Make every unmount fail, forced or not.
    pub fn set_unmount_denied(&self, denied: bool) {
        self.lock().unmount_denied = denied;
    }

    /// Register an existing mount without going through the executor.
    /// `target` is recorded as given.
    pub fn insert_mount(&self, source: &str, target: &Path, fs_type: &str) {
        self.lock().mounts.insert(
            lexical_mount_path(target),
            MountEntry {
                source: source.to_string(),
                mount_point: target.to_path_buf(),
                fs_type: fs_type.to_string(),
                options: "rw".to_string(),
            },
        );
    }

    pub fn history(&self) -> Vec<SimulatedCall> {
        self.lock().history.clone()
    }

    /// Timeout passed with each unmount request, in order.
    pub fn unmount_timeouts(&self) -> Vec<Duration> {
        self.lock().unmount_timeouts.clone()
    }

    pub fn mount_calls(&self) -> usize {
        self.lock()
            .history
            .iter()
            .filter(|call| matches!(call, SimulatedCall::Mount { .. }))
            .count()
    }

    pub fn unmount_calls(&self) -> usize {
        self.lock()
            .history
            .iter()
            .filter(|call| matches!(call, SimulatedCall::Unmount { .. }))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn exit(status: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        status,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl MountExecutor for SimulatedMountSystem {
    async fn mount(&self, params: &MountParams) -> io::Result<CommandOutput> {
        let credentials_present = params
            .credentials_path
            .as_ref()
            .map(|p| p.exists())
            .unwrap_or(false);
        self.lock().history.push(SimulatedCall::Mount {
            source: params.source.clone(),
            target: params.target.clone(),
            options: params.options.clone(),
            credentials_present,
        });

        self.delay().await;

        if let Some(diagnostic) = &self.mount_failure {
            return Ok(exit(32, diagnostic));
        }

        // The kernel records the resolved target path
        let target = resolve_mount_path(&params.target, params.timeout).await;
        self.lock().mounts.insert(
            target.clone(),
            MountEntry {
                source: params.source.clone(),
                mount_point: target,
                fs_type: params.protocol.fs_type().to_string(),
                options: params.options.clone(),
            },
        );
        tracing::debug!(source = %params.source, target = %params.target.display(), "simulated mount");
        Ok(exit(0, ""))
    }

    async fn unmount(
        &self,
        target: &Path,
        force: bool,
        timeout: Duration,
    ) -> io::Result<CommandOutput> {
        {
            let mut state = self.lock();
            state.unmount_timeouts.push(timeout);
            state.history.push(SimulatedCall::Unmount {
                target: target.to_path_buf(),
                force,
            });
        }

        self.delay().await;

        let key = resolve_mount_path(target, timeout).await;
        let mut state = self.lock();
        if state.unmount_denied {
            return Ok(exit(32, "umount: permission denied"));
        }
        if state.busy && !force {
            return Ok(exit(32, "umount: target is busy."));
        }
        match state.mounts.remove(&key) {
            Some(_) => Ok(exit(0, "")),
            None => Ok(exit(32, "umount: not mounted.")),
        }
    }
}

#[async_trait]
impl MountTable for SimulatedMountSystem {
    async fn entries(&self) -> io::Result<Vec<MountEntry>> {
        Ok(self.lock().mounts.values().cloned().collect())
    }
}

impl FsStatsProvider for SimulatedMountSystem {
    fn stats(&self, path: &Path) -> io::Result<StorageStats> {
        if self.lock().mounts.contains_key(&lexical_mount_path(path)) {
            Ok(self.stats)
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a simulated mount", path.display()),
            ))
        }
    }
}
