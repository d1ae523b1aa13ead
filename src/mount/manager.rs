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

//! Mount and unmount of network shares.
//!
//! The manager holds no record of what it mounted. Every call asks the mount
//! table first, so a share mounted or removed behind its back is handled
//! correctly. Calls on the same mount point are single-flight: a second
//! caller waits for the first to finish and then observes its result through
//! the mount table. Calls on different mount points run independently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;

use crate::common::config::AppConfig;
use crate::config::{Credential, Protocol, StorageConfig};
use crate::error::{Error, Result};
use crate::mount::credentials_file::TransientCredentials;
use crate::mount::executor::{CommandMountExecutor, MountExecutor, MountParams};
use crate::mount::state::{MountEvent, MountState};
use crate::storage::mount_table::{lexical_mount_path, MountTable, SystemMountTable};
use crate::utils::current_uid_gid;

/// Parameters of a single mount call.
#[derive(Debug, Clone)]
pub struct MountRequest {
    pub server_address: String,
    pub share_name: String,
    pub username: String,
    pub credential: Credential,
    pub mount_point: PathBuf,
    pub protocol: Protocol,
    pub port: u16,
    pub timeout: Duration,
}

impl MountRequest {
    /// An SMB mount on the default port.
    pub fn smb(
        server_address: impl Into<String>,
        share_name: impl Into<String>,
        username: impl Into<String>,
        credential: Credential,
        mount_point: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            server_address: server_address.into(),
            share_name: share_name.into(),
            username: username.into(),
            credential,
            mount_point: mount_point.into(),
            protocol: Protocol::Smb,
            port: AppConfig::SMB_PORT,
            timeout,
        }
    }

    pub fn from_config(config: &StorageConfig, credential: Credential) -> Self {
        Self {
            server_address: config.server_address.clone(),
            share_name: config.share_name.clone(),
            username: config.username.clone(),
            credential,
            mount_point: config.mount_point_path(),
            protocol: config.protocol,
            port: config.port,
            timeout: config.mount_timeout(),
        }
    }

    pub fn source_spec(&self) -> String {
        self.protocol
            .source_spec(&self.server_address, &self.share_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MountOutcome {
    /// This call attached the share.
    Mounted,
    /// The mount point was already active; the OS was not asked again.
    AlreadyMounted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnmountOutcome {
    Unmounted,
    /// The normal unmount failed and the forced fallback succeeded.
    ForceUnmounted,
    /// Nothing was mounted there; the OS was not asked.
    NotMounted,
}

/// One async lock per mount point. An entry lives only while some caller
/// holds or waits on it.
#[derive(Default)]
struct MountLocks {
    inner: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

/// Exclusive access to one mount point.
struct MountLockGuard<'a> {
    locks: &'a MountLocks,
    key: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for MountLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.key);
    }
}

impl MountLocks {
    async fn acquire(&self, key: PathBuf) -> MountLockGuard<'_> {
        let lock = self.map().entry(key.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        MountLockGuard {
            locks: self,
            key,
            guard: Some(guard),
        }
    }

    /// Forget `key` once the map holds the only reference to its lock.
    fn release(&self, key: &Path) {
        let mut locks = self.map();
        if locks
            .get(key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(key);
        }
    }

    fn len(&self) -> usize {
        self.map().len()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct MountManager {
    executor: Arc<dyn MountExecutor>,
    table: Arc<dyn MountTable>,
    credentials_dir: PathBuf,
    unmount_timeout: Duration,
    table_timeout: Duration,
    locks: MountLocks,
}

impl MountManager {
    pub fn new(executor: Arc<dyn MountExecutor>, table: Arc<dyn MountTable>) -> Self {
        Self {
            executor,
            table,
            credentials_dir: std::env::temp_dir(),
            unmount_timeout: Duration::from_secs(AppConfig::UNMOUNT_TIMEOUT_SECS),
            table_timeout: Duration::from_secs(AppConfig::STATS_TIMEOUT_SECS),
            locks: MountLocks::default(),
        }
    }

    /// Manager that shells out to the system `mount`/`umount`.
    pub fn system(use_sudo: bool) -> Self {
        Self::new(
            Arc::new(CommandMountExecutor::new().with_sudo(use_sudo)),
            Arc::new(SystemMountTable::new()),
        )
    }

    /// Directory for transient credential files. Defaults to the system
    /// temp directory.
    pub fn with_credentials_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.credentials_dir = dir.into();
        self
    }

    pub fn with_unmount_timeout(mut self, timeout: Duration) -> Self {
        self.unmount_timeout = timeout;
        self
    }

    /// Upper bound on each mount-table lookup.
    pub fn with_table_timeout(mut self, timeout: Duration) -> Self {
        self.table_timeout = timeout;
        self
    }

    pub async fn is_mounted(&self, mount_point: &Path) -> Result<bool> {
        match tokio::time::timeout(self.table_timeout, self.table.is_mount_point(mount_point)).await
        {
            Ok(result) => result.map_err(Error::MountTable),
            Err(_) => Err(Error::MountTable(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!(
                    "lookup of {} timed out after {}ms",
                    mount_point.display(),
                    self.table_timeout.as_millis()
                ),
            ))),
        }
    }

    /// Attach the share described by `request` at its mount point.
    pub async fn mount(&self, request: &MountRequest) -> Result<MountOutcome> {
        let _guard = self
            .locks
            .acquire(lexical_mount_path(&request.mount_point))
            .await;
        let source = request.source_spec();
        let mount_point = request.mount_point.display().to_string();

        if self.is_mounted(&request.mount_point).await? {
            tracing::info!(source = %source, mount_point = %mount_point, "share already mounted");
            return Ok(MountOutcome::AlreadyMounted);
        }

        let state = MountState::Configured.next(MountEvent::MountRequested);
        tracing::info!(source = %source, mount_point = %mount_point, state = %state, "mounting share");

        tokio::fs::create_dir_all(&request.mount_point)
            .await
            .map_err(|e| Error::DirectoryCreate {
                path: request.mount_point.clone(),
                source: e,
            })?;

        match self.invoke_mount(request, &source).await {
            Ok(outcome) => {
                let state = state.next(MountEvent::MountSucceeded);
                tracing::info!(source = %source, mount_point = %mount_point, state = %state, "share mounted");
                Ok(outcome)
            }
            Err(e) => {
                let state = state.next(MountEvent::MountFailed);
                tracing::warn!(
                    source = %source,
                    mount_point = %mount_point,
                    state = %state,
                    kind = ?e.kind(),
                    error = %e,
                    "mount failed"
                );
                Err(e)
            }
        }
    }

    async fn invoke_mount(&self, request: &MountRequest, source: &str) -> Result<MountOutcome> {
        let needs_credentials = request.protocol == Protocol::Smb
            && !(request.username.is_empty() && request.credential.is_empty());

        // Lives until the end of this function, including early returns and
        // cancellation of the surrounding future
        let credentials = if needs_credentials {
            let creds = TransientCredentials::create(
                &self.credentials_dir,
                &request.username,
                &request.credential,
            )
            .map_err(|e| {
                Error::CredentialUnavailable(format!("cannot write credential file: {e}"))
            })?;
            Some(creds)
        } else {
            None
        };

        let (uid, gid) = current_uid_gid();
        let credentials_path = credentials.as_ref().map(|c| c.path().to_path_buf());
        let params = MountParams {
            protocol: request.protocol,
            source: source.to_string(),
            target: request.mount_point.clone(),
            options: MountParams::build_options(
                request.protocol,
                request.port,
                credentials_path.as_deref(),
                uid,
                gid,
            ),
            credentials_path,
            timeout: request.timeout,
        };

        let result = tokio::time::timeout(request.timeout, self.executor.mount(&params)).await;
        drop(credentials);

        match result {
            Err(_) => Err(Error::MountTimeout {
                source_spec: source.to_string(),
                timeout: request.timeout,
            }),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => Err(Error::MountTimeout {
                source_spec: source.to_string(),
                timeout: request.timeout,
            }),
            Ok(Err(e)) => Err(Error::MountRejected {
                source_spec: source.to_string(),
                diagnostic: e.to_string(),
            }),
            Ok(Ok(output)) if output.success() => Ok(MountOutcome::Mounted),
            Ok(Ok(output)) => Err(Error::MountRejected {
                source_spec: source.to_string(),
                diagnostic: output.diagnostic(),
            }),
        }
    }

    /// Detach whatever is mounted at `mount_point`.
    ///
    /// Tries a normal unmount, then exactly one forced unmount.
    pub async fn unmount(&self, mount_point: &Path) -> Result<UnmountOutcome> {
        let _guard = self.locks.acquire(lexical_mount_path(mount_point)).await;

        if !self.is_mounted(mount_point).await? {
            tracing::info!(mount_point = %mount_point.display(), "nothing mounted, skipping unmount");
            return Ok(UnmountOutcome::NotMounted);
        }

        let state = MountState::Mounted.next(MountEvent::UnmountRequested);
        tracing::info!(mount_point = %mount_point.display(), state = %state, "unmounting share");

        let first = match self.try_unmount(mount_point, false).await {
            Ok(()) => {
                let state = state.next(MountEvent::UnmountSucceeded);
                tracing::info!(mount_point = %mount_point.display(), state = %state, "share unmounted");
                return Ok(UnmountOutcome::Unmounted);
            }
            Err(diagnostic) => diagnostic,
        };

        tracing::warn!(
            mount_point = %mount_point.display(),
            error = %first,
            "unmount failed, retrying with force"
        );

        match self.try_unmount(mount_point, true).await {
            Ok(()) => {
                let state = state.next(MountEvent::UnmountSucceeded);
                tracing::info!(mount_point = %mount_point.display(), state = %state, "share force-unmounted");
                Ok(UnmountOutcome::ForceUnmounted)
            }
            Err(second) => {
                let state = state.next(MountEvent::UnmountFailed);
                tracing::warn!(
                    mount_point = %mount_point.display(),
                    state = %state,
                    error = %second,
                    "forced unmount failed"
                );
                Err(Error::UnmountFailed {
                    mount_point: mount_point.to_path_buf(),
                    diagnostic: format!("{first}; forced unmount: {second}"),
                })
            }
        }
    }

    async fn try_unmount(&self, mount_point: &Path, force: bool) -> std::result::Result<(), String> {
        match tokio::time::timeout(
            self.unmount_timeout,
            self.executor
                .unmount(mount_point, force, self.unmount_timeout),
        )
        .await
        {
            Err(_) => Err(format!(
                "timed out after {}s",
                self.unmount_timeout.as_secs()
            )),
            Ok(Err(e)) => Err(e.to_string()),
            Ok(Ok(output)) if output.success() => Ok(()),
            Ok(Ok(output)) => Err(output.diagnostic()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mount::simulated::{SimulatedCall, SimulatedMountSystem};
    use tempfile::TempDir;

    fn manager(system: &Arc<SimulatedMountSystem>, creds_dir: &Path) -> MountManager {
        MountManager::new(system.clone(), system.clone()).with_credentials_dir(creds_dir)
    }

    fn request(mount_point: &Path) -> MountRequest {
        MountRequest::smb(
            "10.0.0.5",
            "media",
            "pi",
            Credential::new("raspberry"),
            mount_point,
            Duration::from_secs(5),
        )
    }

    fn credential_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with(AppConfig::CREDENTIAL_FILE_PREFIX)
            })
            .count()
    }

    #[tokio::test]
    async fn mount_then_already_mounted() {
        let temp = TempDir::new().unwrap();
        let system = Arc::new(SimulatedMountSystem::new());
        let manager = manager(&system, temp.path());
        let mount_point = temp.path().join("mnt/pi-nas");

        let outcome = manager.mount(&request(&mount_point)).await.unwrap();
        assert_eq!(outcome, MountOutcome::Mounted);
        assert!(mount_point.is_dir());
        assert!(manager.is_mounted(&mount_point).await.unwrap());

        let outcome = manager.mount(&request(&mount_point)).await.unwrap();
        assert_eq!(outcome, MountOutcome::AlreadyMounted);
        assert_eq!(system.mount_calls(), 1);
    }

    #[tokio::test]
    async fn mount_passes_credentials_and_ownership() {
        let temp = TempDir::new().unwrap();
        let system = Arc::new(SimulatedMountSystem::new());
        let manager = manager(&system, temp.path());
        let mount_point = temp.path().join("share");

        manager.mount(&request(&mount_point)).await.unwrap();

        let history = system.history();
        let SimulatedCall::Mount {
            source,
            options,
            credentials_present,
            ..
        } = &history[0]
        else {
            panic!("expected a mount call, got {history:?}");
        };
        assert_eq!(source, "//10.0.0.5/media");
        assert!(options.contains("credentials="));
        assert!(options.contains("iocharset=utf8"));
        let (uid, gid) = current_uid_gid();
        assert!(options.contains(&format!("uid={uid}")));
        assert!(options.contains(&format!("gid={gid}")));
        assert!(*credentials_present, "credential file must exist during the call");
        assert_eq!(credential_files(temp.path()), 0);
    }

    #[tokio::test]
    async fn failed_mount_removes_credentials() {
        let temp = TempDir::new().unwrap();
        let system = Arc::new(SimulatedMountSystem::new().failing_with("mount error(13): Permission denied"));
        let manager = manager(&system, temp.path());
        let mount_point = temp.path().join("share");

        let err = manager.mount(&request(&mount_point)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MountRejected);
        assert!(err.to_string().contains("Permission denied"));
        assert_eq!(credential_files(temp.path()), 0);
        assert!(!manager.is_mounted(&mount_point).await.unwrap());
    }

    #[tokio::test]
    async fn slow_mount_times_out_and_removes_credentials() {
        let temp = TempDir::new().unwrap();
        let system =
            Arc::new(SimulatedMountSystem::new().with_latency(Duration::from_secs(10)));
        let manager = manager(&system, temp.path());
        let mount_point = temp.path().join("share");

        let mut req = request(&mount_point);
        req.timeout = Duration::from_millis(100);
        let err = manager.mount(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MountTimeout);
        assert_eq!(credential_files(temp.path()), 0);
    }

    #[tokio::test]
    async fn directory_create_failure() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        let system = Arc::new(SimulatedMountSystem::new());
        let manager = manager(&system, temp.path());

        let err = manager
            .mount(&request(&blocker.join("share")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectoryCreateFailed);
        assert_eq!(system.mount_calls(), 0);
    }

    #[tokio::test]
    async fn unmount_not_mounted_skips_os_call() {
        let temp = TempDir::new().unwrap();
        let system = Arc::new(SimulatedMountSystem::new());
        let manager = manager(&system, temp.path());

        let outcome = manager.unmount(&temp.path().join("share")).await.unwrap();
        assert_eq!(outcome, UnmountOutcome::NotMounted);
        assert_eq!(system.unmount_calls(), 0);
    }

    #[tokio::test]
    async fn unmount_falls_back_to_force_once() {
        let temp = TempDir::new().unwrap();
        let system = Arc::new(SimulatedMountSystem::new());
        let manager = manager(&system, temp.path());
        let mount_point = temp.path().join("share");
        manager.mount(&request(&mount_point)).await.unwrap();

        system.set_busy(true);
        let outcome = manager.unmount(&mount_point).await.unwrap();
        assert_eq!(outcome, UnmountOutcome::ForceUnmounted);
        assert_eq!(system.unmount_calls(), 2);
        assert!(!manager.is_mounted(&mount_point).await.unwrap());
    }

    #[tokio::test]
    async fn unmount_failure_reports_both_diagnostics() {
        let temp = TempDir::new().unwrap();
        let system = Arc::new(SimulatedMountSystem::new());
        let manager = manager(&system, temp.path());
        let mount_point = temp.path().join("share");
        manager.mount(&request(&mount_point)).await.unwrap();

        system.set_unmount_denied(true);
        let err = manager.unmount(&mount_point).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnmountFailed);
        assert!(err.to_string().contains("forced unmount"));
        assert_eq!(system.unmount_calls(), 2);
        assert!(manager.is_mounted(&mount_point).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_mounts_on_same_point_invoke_os_once() {
        let temp = TempDir::new().unwrap();
        let system =
            Arc::new(SimulatedMountSystem::new().with_latency(Duration::from_millis(100)));
        let manager = Arc::new(manager(&system, temp.path()));
        let mount_point = temp.path().join("share");

        let a = {
            let manager = manager.clone();
            let req = request(&mount_point);
            tokio::spawn(async move { manager.mount(&req).await })
        };
        let b = {
            let manager = manager.clone();
            let req = request(&mount_point);
            tokio::spawn(async move { manager.mount(&req).await })
        };

        let mut outcomes = vec![a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        outcomes.sort_by_key(|o| *o == MountOutcome::AlreadyMounted);
        assert_eq!(
            outcomes,
            vec![MountOutcome::Mounted, MountOutcome::AlreadyMounted]
        );
        assert_eq!(system.mount_calls(), 1);
    }

    #[tokio::test]
    async fn different_mount_points_are_independent() {
        let temp = TempDir::new().unwrap();
        let system =
            Arc::new(SimulatedMountSystem::new().with_latency(Duration::from_millis(200)));
        let manager = Arc::new(manager(&system, temp.path()));

        let started = std::time::Instant::now();
        let first = request(&temp.path().join("one"));
        let second = request(&temp.path().join("two"));
        let (a, b) = tokio::join!(manager.mount(&first), manager.mount(&second));
        assert_eq!(a.unwrap(), MountOutcome::Mounted);
        assert_eq!(b.unwrap(), MountOutcome::Mounted);
        assert!(started.elapsed() < Duration::from_millis(390));
        assert_eq!(system.mount_calls(), 2);
    }

    #[tokio::test]
    async fn unmount_timeout_reaches_executor() {
        let temp = TempDir::new().unwrap();
        let system = Arc::new(SimulatedMountSystem::new());
        let manager = manager(&system, temp.path()).with_unmount_timeout(Duration::from_secs(45));
        let mount_point = temp.path().join("share");
        manager.mount(&request(&mount_point)).await.unwrap();

        system.set_busy(true);
        manager.unmount(&mount_point).await.unwrap();
        assert_eq!(
            system.unmount_timeouts(),
            vec![Duration::from_secs(45), Duration::from_secs(45)]
        );
    }

    #[tokio::test]
    async fn lock_entries_are_released() {
        let temp = TempDir::new().unwrap();
        let system =
            Arc::new(SimulatedMountSystem::new().with_latency(Duration::from_millis(50)));
        let manager = Arc::new(manager(&system, temp.path()));
        let mount_point = temp.path().join("share");

        let a = {
            let manager = manager.clone();
            let req = request(&mount_point);
            tokio::spawn(async move { manager.mount(&req).await })
        };
        let b = {
            let manager = manager.clone();
            let req = request(&mount_point);
            tokio::spawn(async move { manager.mount(&req).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();
        assert_eq!(manager.locks.len(), 0);

        for i in 0..10 {
            manager.unmount(&temp.path().join(format!("gone-{i}"))).await.unwrap();
        }
        manager.unmount(&mount_point).await.unwrap();
        assert_eq!(manager.locks.len(), 0);
    }

    /// A mount table that never answers.
    struct StalledTable;

    #[async_trait::async_trait]
    impl MountTable for StalledTable {
        async fn entries(&self) -> std::io::Result<Vec<crate::storage::MountEntry>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn stalled_mount_table_is_bounded() {
        let temp = TempDir::new().unwrap();
        let system = Arc::new(SimulatedMountSystem::new());
        let manager = MountManager::new(system.clone(), Arc::new(StalledTable))
            .with_credentials_dir(temp.path())
            .with_table_timeout(Duration::from_millis(100));

        let started = std::time::Instant::now();
        let err = manager
            .mount(&request(&temp.path().join("share")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MountTableUnavailable);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(system.mount_calls(), 0);
    }
}
