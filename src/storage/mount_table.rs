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

//! Live view of the operating system's mount table.
//!
//! Nothing here is cached: every call re-reads the table, so callers always
//! see the mounts as they are right now.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::common::config::AppConfig;

/// Filesystem types treated as network shares.
pub const NETWORK_FS_TYPES: &[&str] = &["cifs", "smb3", "smbfs", "nfs", "nfs4"];

/// One line of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub source: String,
    pub mount_point: PathBuf,
    pub fs_type: String,
    pub options: String,
}

impl MountEntry {
    pub fn is_network(&self) -> bool {
        NETWORK_FS_TYPES.contains(&self.fs_type.as_str())
    }
}

/// Read access to the current mount table.
///
/// Implementations must be thread-safe (`Send + Sync`) so one table can be
/// shared by the mount manager and the status reporter.
#[async_trait]
pub trait MountTable: Send + Sync {
    async fn entries(&self) -> io::Result<Vec<MountEntry>>;

    /// Whether `path` is currently an active mount point.
    async fn is_mount_point(&self, path: &Path) -> io::Result<bool> {
        Ok(self.find(path).await?.is_some())
    }

    /// The entry mounted at `path`.
    ///
    /// Only the caller's path is resolved through the filesystem; table
    /// entries are compared in their lexical form, since the kernel already
    /// records them resolved.
    async fn find(&self, path: &Path) -> io::Result<Option<MountEntry>> {
        let wanted =
            resolve_mount_path(path, Duration::from_secs(AppConfig::STATS_TIMEOUT_SECS)).await;
        // Later entries shadow earlier ones mounted on the same path
        Ok(self
            .entries()
            .await?
            .into_iter()
            .rev()
            .find(|entry| lexical_mount_path(&entry.mount_point) == wanted))
    }
}

/// Mount table of the running system.
///
/// Linux reads `/proc/self/mounts`; other Unix systems parse the output of
/// `mount`. Both reads are bounded by the table's timeout.
#[derive(Debug, Clone)]
pub struct SystemMountTable {
    timeout: Duration,
}

impl Default for SystemMountTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMountTable {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(AppConfig::STATS_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl MountTable for SystemMountTable {
    #[cfg(target_os = "linux")]
    async fn entries(&self) -> io::Result<Vec<MountEntry>> {
        let content = tokio::time::timeout(
            self.timeout,
            tokio::fs::read_to_string("/proc/self/mounts"),
        )
        .await
        .map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("reading the mount table timed out after {}s", self.timeout.as_secs()),
            )
        })??;
        Ok(parse_proc_mounts(&content))
    }

    #[cfg(not(target_os = "linux"))]
    async fn entries(&self) -> io::Result<Vec<MountEntry>> {
        let no_args: [&str; 0] = [];
        let output =
            crate::utils::run_command_with_timeout("mount", &no_args, self.timeout).await?;
        if !output.success() {
            return Err(io::Error::other(output.diagnostic()));
        }
        Ok(parse_mount_output(&output.stdout))
    }
}

/// Lexical form used to compare mount paths: drops `.` components and
/// trailing separators so `/mnt/pi-nas/` and `/mnt/pi-nas` compare equal.
/// Touches no filesystem.
pub fn lexical_mount_path(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Resolve symlinks in a caller-supplied mount path.
///
/// `canonicalize` stats the path, which hangs on a dead network mount, so it
/// runs on the blocking pool under `timeout`. A missing path, a failure or a
/// timeout falls back to [`lexical_mount_path`].
pub async fn resolve_mount_path(path: &Path, timeout: Duration) -> PathBuf {
    let target = path.to_path_buf();
    let lookup = tokio::task::spawn_blocking(move || std::fs::canonicalize(target));
    match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(Ok(canonical))) => canonical,
        Ok(Ok(Err(_))) | Ok(Err(_)) => lexical_mount_path(path),
        Err(_) => {
            tracing::warn!(
                path = %path.display(),
                timeout_secs = timeout.as_secs(),
                "resolving mount path timed out"
            );
            lexical_mount_path(path)
        }
    }
}

/// Parse `/proc/mounts` format: `source target fstype options dump pass`.
pub fn parse_proc_mounts(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let target = fields.next()?;
            let fs_type = fields.next()?;
            let options = fields.next().unwrap_or_default();
            Some(MountEntry {
                source: unescape_octal(source),
                mount_point: PathBuf::from(unescape_octal(target)),
                fs_type: fs_type.to_string(),
                options: options.to_string(),
            })
        })
        .collect()
}

static LINUX_MOUNT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<source>.+?) on (?P<target>.+?) type (?P<fstype>\S+) \((?P<options>[^)]*)\)$")
        .expect("valid linux mount regex")
});

static BSD_MOUNT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<source>.+?) on (?P<target>.+?) \((?P<fstype>[^,)]+)(?:, (?P<options>[^)]*))?\)$")
        .expect("valid bsd mount regex")
});

/// Parse the human-readable output of `mount`, in either the Linux
/// (`src on dst type fs (opts)`) or BSD/macOS (`src on dst (fs, opts)`) form.
pub fn parse_mount_output(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let caps = LINUX_MOUNT_LINE
                .captures(line)
                .or_else(|| BSD_MOUNT_LINE.captures(line))?;
            Some(MountEntry {
                source: caps["source"].to_string(),
                mount_point: PathBuf::from(&caps["target"]),
                fs_type: caps["fstype"].to_string(),
                options: caps
                    .name("options")
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// Decode the `\ooo` escapes the kernel uses for spaces, tabs and
/// backslashes in mount table fields.
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits
                    .iter()
                    .fold(0u16, |acc, b| acc * 8 + u16::from(b - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).to_string()
}
