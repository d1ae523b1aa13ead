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

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::storage::info::StorageStats;

/// Source of filesystem capacity figures.
pub trait FsStatsProvider: Send + Sync {
    fn stats(&self, path: &Path) -> io::Result<StorageStats>;
}

/// Filesystem statistics via `statvfs(3)`.
///
/// Free space is what an unprivileged user can still allocate (`f_bavail`),
/// so `used + free` may be less than `total` on filesystems with reserved
/// blocks.
#[derive(Debug, Default, Clone)]
pub struct StatvfsProvider;

impl FsStatsProvider for StatvfsProvider {
    fn stats(&self, path: &Path) -> io::Result<StorageStats> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let mut buf: libc::statvfs = unsafe { std::mem::zeroed() };
        // SAFETY: c_path is a valid NUL-terminated string and buf is a
        // properly sized, writable statvfs struct
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut buf) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }

        let fragment = buf.f_frsize as u64;
        let total = (buf.f_blocks as u64).saturating_mul(fragment);
        let free = (buf.f_bavail as u64).saturating_mul(fragment);
        Ok(StorageStats::from_total_and_free(total, free))
    }
}
