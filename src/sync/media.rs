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

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub copied: usize,
    /// Files whose destination was already up to date.
    pub skipped: usize,
    pub bytes_copied: u64,
}

/// Mirror every regular file under `source` into `destination`.
///
/// A file is copied when the destination is missing or has an older
/// modification time; the copy keeps the source's modification time so a
/// second run skips it. Nothing is ever deleted from `destination`.
/// Symlinks are not followed.
pub fn sync_tree(source: &Path, destination: &Path) -> Result<SyncSummary> {
    if !source.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no local media found at {}", source.display()),
        )
        .into());
    }

    fs::create_dir_all(destination)?;
    let mut summary = SyncSummary::default();

    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let target = destination.join(relative);

        let source_mtime = entry.metadata().map_err(io::Error::from)?.modified()?;
        let up_to_date = match fs::metadata(&target).and_then(|m| m.modified()) {
            Ok(target_mtime) => target_mtime >= source_mtime,
            Err(_) => false,
        };
        if up_to_date {
            summary.skipped += 1;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = fs::copy(entry.path(), &target)?;
        fs::File::options()
            .write(true)
            .open(&target)?
            .set_modified(source_mtime)?;

        tracing::debug!(file = %relative.display(), bytes, "copied media file");
        summary.copied += 1;
        summary.bytes_copied += bytes;
    }

    tracing::info!(
        copied = summary.copied,
        skipped = summary.skipped,
        bytes = summary.bytes_copied,
        destination = %destination.display(),
        "media sync finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_copies_tree_then_skips_unchanged() {
        let local = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        write(&local.path().join("a.jpg"), "aaaa");
        write(&local.path().join("albums/2024/b.mp4"), "bb");

        let summary = sync_tree(local.path(), remote.path()).unwrap();
        assert_eq!(summary.copied, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.bytes_copied, 6);
        assert_eq!(
            fs::read_to_string(remote.path().join("albums/2024/b.mp4")).unwrap(),
            "bb"
        );

        let summary = sync_tree(local.path(), remote.path()).unwrap();
        assert_eq!(summary.copied, 0);
        assert_eq!(summary.skipped, 2);
    }

    #[test]
    fn test_newer_source_is_recopied() {
        let local = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        let source = local.path().join("a.jpg");
        write(&source, "old");
        sync_tree(local.path(), remote.path()).unwrap();

        fs::write(&source, "new content").unwrap();
        let later = SystemTime::now() + Duration::from_secs(60);
        fs::File::options()
            .write(true)
            .open(&source)
            .unwrap()
            .set_modified(later)
            .unwrap();

        let summary = sync_tree(local.path(), remote.path()).unwrap();
        assert_eq!(summary.copied, 1);
        assert_eq!(
            fs::read_to_string(remote.path().join("a.jpg")).unwrap(),
            "new content"
        );
    }

    #[test]
    fn test_missing_source() {
        let remote = TempDir::new().unwrap();
        let err = sync_tree(&remote.path().join("nope"), remote.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("no local media found"));
    }
}
