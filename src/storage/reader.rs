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

//! Storage status reporting.
//!
//! [`StatusReporter`] answers two questions for dashboards: how full is a
//! given mount point, and which network shares are mounted right now. Both
//! re-read live OS state on every call, and every OS query is bounded by the
//! reporter's timeout.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use crate::common::config::AppConfig;
use crate::storage::fs_stats::{FsStatsProvider, StatvfsProvider};
use crate::storage::info::{MountRecord, StorageStats};
use crate::storage::mount_table::{MountEntry, MountTable, SystemMountTable};

/// Reports capacity of mounted filesystems and lists mounted network shares.
///
/// # Example
///
/// ```rust,no_run
/// use pinas::storage::StatusReporter;
///
/// # async fn run() {
/// let reporter = StatusReporter::system();
/// for share in reporter.list_mounted_shares().await {
///     let percent = share.usage.map(|u| u.usage_percent).unwrap_or(0.0);
///     println!("{} -> {} ({percent:.1}% used)", share.source, share.mount_point.display());
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct StatusReporter {
    table: Arc<dyn MountTable>,
    fs_stats: Arc<dyn FsStatsProvider>,
    timeout: Duration,
}

impl StatusReporter {
    pub fn new(table: Arc<dyn MountTable>, fs_stats: Arc<dyn FsStatsProvider>) -> Self {
        Self {
            table,
            fs_stats,
            timeout: Duration::from_secs(AppConfig::STATS_TIMEOUT_SECS),
        }
    }

    /// Reporter backed by the running system.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemMountTable::new()), Arc::new(StatvfsProvider))
    }

    /// Upper bound for each mount-table read and statistics query.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Usage of `mount_point`, or `None` when it is not currently mounted
    /// or its statistics cannot be read in time.
    pub async fn get_stats(&self, mount_point: &Path) -> Option<StorageStats> {
        let entry = match tokio::time::timeout(self.timeout, self.table.find(mount_point)).await {
            Ok(Ok(Some(entry))) => entry,
            Ok(Ok(None)) => return None,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "failed to read mount table");
                return None;
            }
            Err(_) => {
                tracing::warn!(
                    mount_point = %mount_point.display(),
                    timeout_secs = self.timeout.as_secs(),
                    "mount table lookup timed out"
                );
                return None;
            }
        };

        match self.query_stats(&entry).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!(
                    mount_point = %mount_point.display(),
                    error = %e,
                    "failed to read storage statistics"
                );
                None
            }
        }
    }

    /// Every mounted SMB/CIFS or NFS share, each with best-effort usage.
    ///
    /// A share whose statistics cannot be read in time is still listed with
    /// `usage = None`. An unreadable mount table yields an empty list.
    pub async fn list_mounted_shares(&self) -> Vec<MountRecord> {
        let entries = match self.entries().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read mount table");
                return Vec::new();
            }
        };

        // Queried concurrently so one hung share costs a single timeout
        let records = entries
            .into_iter()
            .filter(MountEntry::is_network)
            .map(|entry| async move {
                let usage = match self.query_stats(&entry).await {
                    Ok(stats) => Some(stats),
                    Err(e) => {
                        tracing::debug!(
                            mount_point = %entry.mount_point.display(),
                            error = %e,
                            "no statistics for mounted share"
                        );
                        None
                    }
                };
                MountRecord {
                    source: entry.source,
                    mount_point: entry.mount_point,
                    filesystem_type: entry.fs_type,
                    options: entry.options,
                    usage,
                }
            });
        join_all(records).await
    }

    /// Whether `mount_point` is currently mounted. An unreadable or slow
    /// table means no.
    pub async fn is_mounted(&self, mount_point: &Path) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, self.table.is_mount_point(mount_point)).await,
            Ok(Ok(true))
        )
    }

    async fn entries(&self) -> io::Result<Vec<MountEntry>> {
        tokio::time::timeout(self.timeout, self.table.entries())
            .await
            .unwrap_or_else(|_| Err(timed_out("reading the mount table", self.timeout)))
    }

    /// `statvfs` on the blocking pool, abandoned after the timeout.
    async fn query_stats(&self, entry: &MountEntry) -> io::Result<StorageStats> {
        let provider = Arc::clone(&self.fs_stats);
        let path = entry.mount_point.clone();
        let query = tokio::task::spawn_blocking(move || provider.stats(&path));
        match tokio::time::timeout(self.timeout, query).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(io::Error::other(e.to_string())),
            Err(_) => Err(timed_out("statistics query", self.timeout)),
        }
    }
}

fn timed_out(what: &str, timeout: Duration) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{what} timed out after {}ms", timeout.as_millis()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::time::Instant;

    struct StaticTable(Vec<MountEntry>);

    #[async_trait]
    impl MountTable for StaticTable {
        async fn entries(&self) -> io::Result<Vec<MountEntry>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenTable;

    #[async_trait]
    impl MountTable for BrokenTable {
        async fn entries(&self) -> io::Result<Vec<MountEntry>> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }
    }

    /// Never answers within any reasonable bound.
    struct StalledTable;

    #[async_trait]
    impl MountTable for StalledTable {
        async fn entries(&self) -> io::Result<Vec<MountEntry>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    /// Reports fixed stats everywhere except under `/mnt/broken`.
    struct SelectiveStats;

    impl FsStatsProvider for SelectiveStats {
        fn stats(&self, path: &Path) -> io::Result<StorageStats> {
            if path.starts_with("/mnt/broken") {
                Err(io::Error::new(io::ErrorKind::Other, "Host is down"))
            } else {
                Ok(StorageStats::from_total_and_free(1000, 400))
            }
        }
    }

    /// Blocks the calling thread like `statvfs` on a dead CIFS server.
    struct HungStats;

    impl FsStatsProvider for HungStats {
        fn stats(&self, _path: &Path) -> io::Result<StorageStats> {
            std::thread::sleep(Duration::from_secs(2));
            Ok(StorageStats::from_total_and_free(1000, 400))
        }
    }

    fn entry(source: &str, target: &str, fs_type: &str) -> MountEntry {
        MountEntry {
            source: source.to_string(),
            mount_point: PathBuf::from(target),
            fs_type: fs_type.to_string(),
            options: "rw".to_string(),
        }
    }

    fn reporter(entries: Vec<MountEntry>) -> StatusReporter {
        StatusReporter::new(Arc::new(StaticTable(entries)), Arc::new(SelectiveStats))
    }

    #[tokio::test]
    async fn test_list_filters_network_filesystems() {
        let reporter = reporter(vec![
            entry("/dev/sda1", "/", "ext4"),
            entry("//10.0.0.5/media", "/mnt/pi-nas", "cifs"),
            entry("nas:/export", "/mnt/nfs", "nfs4"),
            entry("tmpfs", "/run", "tmpfs"),
        ]);

        let shares = reporter.list_mounted_shares().await;
        assert_eq!(shares.len(), 2);
        assert_eq!(shares[0].mount_point, PathBuf::from("/mnt/pi-nas"));
        assert_eq!(shares[0].filesystem_type, "cifs");
        assert_eq!(shares[0].usage.unwrap().usage_percent, 60.0);
        assert_eq!(shares[1].filesystem_type, "nfs4");
    }

    #[tokio::test]
    async fn test_stats_failure_keeps_entry() {
        let reporter = reporter(vec![entry("//nas/broken", "/mnt/broken", "cifs")]);
        let shares = reporter.list_mounted_shares().await;
        assert_eq!(shares.len(), 1);
        assert!(shares[0].usage.is_none());
    }

    #[tokio::test]
    async fn test_get_stats_requires_mount() {
        let reporter = reporter(vec![entry("//10.0.0.5/media", "/mnt/pi-nas", "cifs")]);
        assert!(reporter.get_stats(Path::new("/mnt/pi-nas")).await.is_some());
        assert!(reporter.get_stats(Path::new("/mnt/pi-nas/")).await.is_some());
        assert!(reporter.get_stats(Path::new("/mnt/elsewhere")).await.is_none());
    }

    #[tokio::test]
    async fn test_broken_table_degrades() {
        let reporter = StatusReporter::new(Arc::new(BrokenTable), Arc::new(SelectiveStats));
        assert!(reporter.list_mounted_shares().await.is_empty());
        assert!(reporter.get_stats(Path::new("/mnt/pi-nas")).await.is_none());
        assert!(!reporter.is_mounted(Path::new("/mnt/pi-nas")).await);
    }

    #[tokio::test]
    async fn test_hung_statistics_are_bounded() {
        let reporter = StatusReporter::new(
            Arc::new(StaticTable(vec![
                entry("//10.0.0.5/media", "/mnt/pi-nas", "cifs"),
                entry("//10.0.0.6/photos", "/mnt/photos", "cifs"),
            ])),
            Arc::new(HungStats),
        )
        .with_timeout(Duration::from_millis(200));

        let started = Instant::now();
        let shares = reporter.list_mounted_shares().await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(shares.len(), 2);
        assert!(shares.iter().all(|share| share.usage.is_none()));

        let started = Instant::now();
        assert!(reporter.get_stats(Path::new("/mnt/pi-nas")).await.is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_stalled_table_is_bounded() {
        let reporter = StatusReporter::new(Arc::new(StalledTable), Arc::new(SelectiveStats))
            .with_timeout(Duration::from_millis(100));

        let started = Instant::now();
        assert!(reporter.list_mounted_shares().await.is_empty());
        assert!(reporter.get_stats(Path::new("/mnt/pi-nas")).await.is_none());
        assert!(!reporter.is_mounted(Path::new("/mnt/pi-nas")).await);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_system_reporter_does_not_panic() {
        let reporter = StatusReporter::system();
        for share in reporter.list_mounted_shares().await {
            assert!(!share.source.is_empty());
        }
    }
}
