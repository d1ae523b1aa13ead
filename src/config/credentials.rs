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

//! Credential references and resolved secrets.
//!
//! The persisted configuration only stores *where* a password comes from.
//! The password itself is resolved into a [`Credential`] right before a
//! probe or mount and is dropped afterwards.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::common::config::AppConfig;
use crate::error::{Error, Result};

/// Where to fetch the share password at mount time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialRef {
    /// Read from an environment variable.
    Env(String),
    /// Read from a file (first line, trailing newline stripped).
    File(PathBuf),
    /// Guest access.
    None,
}

impl Default for CredentialRef {
    fn default() -> Self {
        CredentialRef::Env(AppConfig::DEFAULT_PASSWORD_ENV.to_string())
    }
}

impl CredentialRef {
    /// Resolve the reference into a usable credential.
    ///
    /// An unset environment variable means guest access. An unreadable
    /// secret file is an error because the user explicitly pointed at it.
    pub fn resolve(&self) -> Result<Credential> {
        match self {
            CredentialRef::Env(var) => match std::env::var(var) {
                Ok(value) => Ok(Credential::new(value)),
                Err(_) => {
                    tracing::debug!(var = %var, "credential variable not set, using guest access");
                    Ok(Credential::empty())
                }
            },
            CredentialRef::File(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::CredentialUnavailable(format!("{}: {e}", path.display()))
                })?;
                let secret = content.lines().next().unwrap_or_default().to_string();
                Ok(Credential::new(secret))
            }
            CredentialRef::None => Ok(Credential::empty()),
        }
    }
}

/// A resolved share password. `Debug` and `Display` never show the value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Expose the secret. Only the transient credential store calls this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl<'de> Deserialize<'de> for Credential {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_credential_debug_is_redacted() {
        let cred = Credential::new("raspberry");
        assert_eq!(format!("{cred:?}"), "Credential(***)");
        assert_eq!(cred.expose(), "raspberry");
    }

    #[test]
    fn test_resolve_missing_env_is_guest() {
        let cred = CredentialRef::Env("PINAS_TEST_SURELY_UNSET_VARIABLE".to_string())
            .resolve()
            .unwrap();
        assert!(cred.is_empty());
    }

    #[test]
    fn test_resolve_file_reads_first_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "s3cret").unwrap();
        writeln!(file, "ignored").unwrap();

        let cred = CredentialRef::File(file.path().to_path_buf())
            .resolve()
            .unwrap();
        assert_eq!(cred.expose(), "s3cret");
    }

    #[test]
    fn test_resolve_missing_file_is_error() {
        let err = CredentialRef::File(PathBuf::from("/nonexistent/pinas/secret"))
            .resolve()
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CredentialUnavailable);
    }

    #[test]
    fn test_credential_ref_serde_shape() {
        let json = serde_json::to_string(&CredentialRef::default()).unwrap();
        assert_eq!(json, r#"{"env":"SMB_PASSWORD"}"#);
        let parsed: CredentialRef = serde_json::from_str(r#""none""#).unwrap();
        assert_eq!(parsed, CredentialRef::None);
    }
}
