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

//! Unified error types for the pinas library.
//!
//! Every failure surfaced by the storage core carries two things: a
//! machine-readable [`ErrorKind`] so callers can branch on it, and a
//! human-readable diagnostic (the `Display` output) that includes the
//! underlying OS or tool output where one exists.
//!
//! # Example
//!
//! ```rust,no_run
//! use pinas::{ErrorKind, Result};
//! use pinas::config::ConfigStore;
//!
//! fn save_defaults() -> Result<()> {
//!     let store = ConfigStore::new("config/storage_config.json");
//!     match store.save(&store.load()) {
//!         Err(e) if e.kind() == ErrorKind::ConfigIoFailure => {
//!             eprintln!("cannot write config: {e}");
//!             Err(e)
//!         }
//!         other => other,
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// TCP connect to the service port failed or timed out.
    PortUnreachable,
    /// Share listing ran but authentication or enumeration failed.
    AuthOrEnumerationFailure,
    /// The local mount point directory could not be created.
    DirectoryCreateFailed,
    /// The OS mount facility did not finish within the allotted time.
    MountTimeout,
    /// The OS mount facility reported a failure.
    MountRejected,
    /// Both the normal and the forced unmount failed.
    UnmountFailed,
    /// The configuration file could not be written.
    ConfigIoFailure,
    /// The global scan deadline elapsed. Reported as a flag on a scan
    /// report, never as an `Err`.
    ScanTimeout,
    InvalidConfig,
    InvalidRange,
    CredentialUnavailable,
    MountTableUnavailable,
    NotMounted,
    Io,
}

/// The main error type for pinas operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Cannot connect to {address}:{port}: {diagnostic}")]
    PortUnreachable {
        address: String,
        port: u16,
        diagnostic: String,
    },

    #[error("Share enumeration failed: {0}")]
    AuthOrEnumeration(String),

    #[error("Failed to create mount point {}: {source}", path.display())]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Mounting {source_spec} timed out after {}s", timeout.as_secs())]
    MountTimeout {
        source_spec: String,
        timeout: Duration,
    },

    #[error("Mount of {source_spec} rejected: {diagnostic}")]
    MountRejected {
        source_spec: String,
        diagnostic: String,
    },

    #[error("Failed to unmount {}: {diagnostic}", mount_point.display())]
    UnmountFailed {
        mount_point: PathBuf,
        diagnostic: String,
    },

    #[error("Failed to write configuration {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid network range '{range}': {reason}")]
    InvalidRange { range: String, reason: String },

    #[error("Credential unavailable: {0}")]
    CredentialUnavailable(String),

    #[error("Cannot read mount table: {0}")]
    MountTable(#[source] std::io::Error),

    #[error("{} is not mounted", .0.display())]
    NotMounted(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::PortUnreachable { .. } => ErrorKind::PortUnreachable,
            Error::AuthOrEnumeration(_) => ErrorKind::AuthOrEnumerationFailure,
            Error::DirectoryCreate { .. } => ErrorKind::DirectoryCreateFailed,
            Error::MountTimeout { .. } => ErrorKind::MountTimeout,
            Error::MountRejected { .. } => ErrorKind::MountRejected,
            Error::UnmountFailed { .. } => ErrorKind::UnmountFailed,
            Error::ConfigIo { .. } => ErrorKind::ConfigIoFailure,
            Error::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Error::InvalidRange { .. } => ErrorKind::InvalidRange,
            Error::CredentialUnavailable(_) => ErrorKind::CredentialUnavailable,
            Error::MountTable(_) => ErrorKind::MountTableUnavailable,
            Error::NotMounted(_) => ErrorKind::NotMounted,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn invalid_range(range: &str, reason: impl Into<String>) -> Self {
        Error::InvalidRange {
            range: range.to_string(),
            reason: reason.into(),
        }
    }
}

/// A specialized Result type for pinas operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PortUnreachable {
            address: "10.0.0.5".to_string(),
            port: 445,
            diagnostic: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot connect to 10.0.0.5:445: connection refused"
        );

        let err = Error::MountTimeout {
            source_spec: "//10.0.0.5/media".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "Mounting //10.0.0.5/media timed out after 30s");

        let err = Error::UnmountFailed {
            mount_point: PathBuf::from("/mnt/pi-nas"),
            diagnostic: "target is busy".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to unmount /mnt/pi-nas: target is busy"
        );

        let err = Error::NotMounted(PathBuf::from("/mnt/pi-nas"));
        assert_eq!(err.to_string(), "/mnt/pi-nas is not mounted");
    }

    #[test]
    fn test_error_kinds() {
        let io = || std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");

        assert_eq!(
            Error::AuthOrEnumeration("NT_STATUS_LOGON_FAILURE".into()).kind(),
            ErrorKind::AuthOrEnumerationFailure
        );
        assert_eq!(
            Error::DirectoryCreate {
                path: PathBuf::from("/mnt/x"),
                source: io(),
            }
            .kind(),
            ErrorKind::DirectoryCreateFailed
        );
        assert_eq!(
            Error::ConfigIo {
                path: PathBuf::from("config/storage_config.json"),
                source: io(),
            }
            .kind(),
            ErrorKind::ConfigIoFailure
        );
        assert_eq!(Error::MountTable(io()).kind(), ErrorKind::MountTableUnavailable);
        assert_eq!(Error::from(io()).kind(), ErrorKind::Io);
    }

    #[test]
    fn test_error_kind_serializes_by_name() {
        let json = serde_json::to_string(&ErrorKind::MountRejected).unwrap();
        assert_eq!(json, "\"MountRejected\"");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
