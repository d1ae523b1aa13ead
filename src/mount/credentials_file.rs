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

//! Transient credential files for `mount.cifs` and `smbclient`.
//!
//! Both tools read `key=value` lines from a file, which keeps the password
//! off the command line. The file exists only while a [`TransientCredentials`]
//! value is alive: it is created owner-read/write only and removed on drop,
//! whichever way the owning call ends (success, error, panic or a cancelled
//! future).

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use rand::distr::Alphanumeric;
use rand::Rng;

use crate::common::config::AppConfig;
use crate::config::Credential;

#[derive(Debug)]
pub struct TransientCredentials {
    path: PathBuf,
}

impl TransientCredentials {
    /// Write a fresh credential file with mode `0600` under `dir`.
    ///
    /// Each call gets its own randomly named file, so concurrent mounts never
    /// share credential material.
    pub fn create(dir: &Path, username: &str, credential: &Credential) -> io::Result<Self> {
        if username.contains('\n') || credential.expose().contains('\n') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "credentials must not contain newlines",
            ));
        }

        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        let path = dir.join(format!("{}{suffix}", AppConfig::CREDENTIAL_FILE_PREFIX));

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)?;

        // From here on the guard owns the file and removes it on any exit
        let guard = Self { path };
        writeln!(file, "username={username}")?;
        writeln!(file, "password={}", credential.expose())?;
        file.sync_all()?;

        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransientCredentials {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::trace!(path = %self.path.display(), "removed transient credentials"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove transient credentials"
            ),
        }
    }
}
