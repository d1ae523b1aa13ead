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

//! Read-only connectivity checks against a candidate file server.
//!
//! A probe never creates a mount point and never touches configuration, so it
//! is safe to repeat as often as the caller likes.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

use crate::common::config::AppConfig;
use crate::config::Credential;
use crate::error::{Error, ErrorKind};
use crate::mount::TransientCredentials;
use crate::utils::run_command_with_timeout;

/// Result of asking a server for its share list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListOutcome {
    Shares(Vec<String>),
    /// The listing tool is not installed on this machine.
    Unavailable,
    /// Authentication or enumeration failed; carries the tool's diagnostic.
    Failed(String),
}

/// Capability to enumerate the shares a server exports.
#[async_trait]
pub trait ShareLister: Send + Sync {
    async fn list_shares(
        &self,
        address: &str,
        port: u16,
        username: &str,
        credential: &Credential,
        timeout: Duration,
    ) -> ListOutcome;
}

/// Lists shares with `smbclient -g -L`.
///
/// Credentials are passed through a transient `-A` authentication file so
/// the password never appears on the command line.
#[derive(Debug, Clone)]
pub struct SmbclientLister {
    credentials_dir: PathBuf,
}

impl Default for SmbclientLister {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl SmbclientLister {
    pub fn new(credentials_dir: impl Into<PathBuf>) -> Self {
        Self {
            credentials_dir: credentials_dir.into(),
        }
    }
}

#[async_trait]
impl ShareLister for SmbclientLister {
    async fn list_shares(
        &self,
        address: &str,
        port: u16,
        username: &str,
        credential: &Credential,
        timeout: Duration,
    ) -> ListOutcome {
        let mut args = vec![
            "-g".to_string(),
            "-L".to_string(),
            format!("//{address}"),
            "-p".to_string(),
            port.to_string(),
        ];

        let auth_file = if username.is_empty() && credential.is_empty() {
            args.push("-N".to_string());
            None
        } else {
            match TransientCredentials::create(&self.credentials_dir, username, credential) {
                Ok(file) => {
                    args.push("-A".to_string());
                    args.push(file.path().display().to_string());
                    Some(file)
                }
                Err(e) => return ListOutcome::Failed(format!("cannot write credential file: {e}")),
            }
        };

        let result = run_command_with_timeout("smbclient", &args, timeout).await;
        drop(auth_file);

        match result {
            Ok(output) if output.success() => ListOutcome::Shares(parse_share_list(&output.stdout)),
            Ok(output) => ListOutcome::Failed(output.diagnostic()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => ListOutcome::Unavailable,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                ListOutcome::Failed(format!("share listing timed out after {}s", timeout.as_secs()))
            }
            Err(e) => ListOutcome::Failed(e.to_string()),
        }
    }
}

/// Extract disk share names from `smbclient -g -L` output.
///
/// Grepable output has one `Type|Name|Comment` line per share; only `Disk`
/// shares can be mounted, so `IPC` and `Printer` entries are skipped.
pub fn parse_share_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.trim().splitn(3, '|');
            match (fields.next(), fields.next()) {
                (Some("Disk"), Some(name)) if !name.is_empty() => Some(name.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// Error attached to a [`ConnectionReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<Error> for ProbeFailure {
    fn from(error: Error) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionReport {
    pub reachable: bool,
    /// `None` when enumeration was not attempted or failed; empty when the
    /// listing tool is unavailable.
    pub shares: Option<Vec<String>>,
    pub error: Option<ProbeFailure>,
}

impl ConnectionReport {
    pub fn is_ok(&self) -> bool {
        self.reachable && self.error.is_none()
    }

    /// Whether `share` was among the enumerated shares. Share names compare
    /// case-insensitively, as SMB does.
    pub fn has_share(&self, share: &str) -> bool {
        self.shares
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|s| s.eq_ignore_ascii_case(share))
    }
}

/// Attempt a TCP connection to `address:port` within `timeout`.
pub async fn probe_port(address: &str, port: u16, timeout: Duration) -> Result<(), String> {
    match tokio::time::timeout(timeout, TcpStream::connect((address, port))).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {}s", timeout.as_secs_f32())),
    }
}

/// Tests TCP reachability and share enumeration of a server.
#[derive(Clone)]
pub struct ConnectivityProber {
    lister: Arc<dyn ShareLister>,
    port: u16,
    connect_timeout: Duration,
    list_timeout: Duration,
}

impl ConnectivityProber {
    pub fn new(lister: Arc<dyn ShareLister>) -> Self {
        Self {
            lister,
            port: AppConfig::SMB_PORT,
            connect_timeout: Duration::from_secs(AppConfig::CONNECT_TIMEOUT_SECS),
            list_timeout: Duration::from_secs(AppConfig::SHARE_LIST_TIMEOUT_SECS),
        }
    }

    /// Prober that enumerates shares with the system `smbclient`.
    pub fn system() -> Self {
        Self::new(Arc::new(SmbclientLister::default()))
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, list: Duration) -> Self {
        self.connect_timeout = connect;
        self.list_timeout = list;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Check that `address` accepts connections and, if so, list its shares.
    ///
    /// A closed port short-circuits with `PortUnreachable`. A missing listing
    /// tool still counts as success with an empty share list.
    pub async fn test_connection(
        &self,
        address: &str,
        share: &str,
        username: &str,
        credential: &Credential,
    ) -> ConnectionReport {
        if let Err(diagnostic) = probe_port(address, self.port, self.connect_timeout).await {
            tracing::info!(address = %address, port = self.port, error = %diagnostic, "server unreachable");
            return ConnectionReport {
                reachable: false,
                shares: None,
                error: Some(
                    Error::PortUnreachable {
                        address: address.to_string(),
                        port: self.port,
                        diagnostic,
                    }
                    .into(),
                ),
            };
        }

        let outcome = self
            .lister
            .list_shares(address, self.port, username, credential, self.list_timeout)
            .await;

        let report = match outcome {
            ListOutcome::Shares(shares) => ConnectionReport {
                reachable: true,
                shares: Some(shares),
                error: None,
            },
            ListOutcome::Unavailable => {
                tracing::debug!(address = %address, "share listing tool not installed, skipping enumeration");
                ConnectionReport {
                    reachable: true,
                    shares: Some(Vec::new()),
                    error: None,
                }
            }
            ListOutcome::Failed(diagnostic) => ConnectionReport {
                reachable: true,
                shares: None,
                error: Some(Error::AuthOrEnumeration(diagnostic).into()),
            },
        };

        match &report.error {
            Some(failure) => {
                tracing::info!(address = %address, error = %failure.message, "share enumeration failed");
            }
            None if !share.is_empty()
                && report.shares.as_ref().is_some_and(|s| !s.is_empty())
                && !report.has_share(share) =>
            {
                tracing::warn!(address = %address, share = %share, "server does not list the requested share");
            }
            None => tracing::info!(address = %address, "connection test succeeded"),
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    struct FixedLister {
        outcome: ListOutcome,
        calls: AtomicUsize,
    }

    impl FixedLister {
        fn new(outcome: ListOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ShareLister for FixedLister {
        async fn list_shares(
            &self,
            _address: &str,
            _port: u16,
            _username: &str,
            _credential: &Credential,
            _timeout: Duration,
        ) -> ListOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    async fn stub_listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    async fn closed_port() -> u16 {
        let (listener, port) = stub_listener().await;
        drop(listener);
        port
    }

    #[test]
    fn test_parse_share_list() {
        let output = "\
Disk|media|Media files
Disk|backup|
IPC|IPC$|IPC Service (Samba 4.17)
Printer|laser|Office printer

Server|NAS|
Workgroup|WORKGROUP|NAS
";
        assert_eq!(parse_share_list(output), vec!["media", "backup"]);
        assert!(parse_share_list("").is_empty());
    }

    #[tokio::test]
    async fn test_reachable_with_shares() {
        let (_listener, port) = stub_listener().await;
        let lister = FixedLister::new(ListOutcome::Shares(vec!["Media".to_string()]));
        let prober = ConnectivityProber::new(lister.clone()).with_port(port);

        let report = prober
            .test_connection("127.0.0.1", "media", "pi", &Credential::new("pw"))
            .await;
        assert!(report.is_ok());
        assert!(report.has_share("media"));
        assert!(!report.has_share("backup"));
        assert_eq!(lister.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreachable_short_circuits() {
        let port = closed_port().await;
        let lister = FixedLister::new(ListOutcome::Shares(vec![]));
        let prober = ConnectivityProber::new(lister.clone()).with_port(port);

        let report = prober
            .test_connection("127.0.0.1", "media", "pi", &Credential::empty())
            .await;
        assert!(!report.reachable);
        assert_eq!(report.shares, None);
        assert_eq!(report.error.unwrap().kind, ErrorKind::PortUnreachable);
        assert_eq!(lister.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_tool_degrades_gracefully() {
        let (_listener, port) = stub_listener().await;
        let prober =
            ConnectivityProber::new(FixedLister::new(ListOutcome::Unavailable)).with_port(port);

        let report = prober
            .test_connection("127.0.0.1", "media", "pi", &Credential::empty())
            .await;
        assert!(report.reachable);
        assert_eq!(report.shares, Some(vec![]));
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn test_auth_failure_carries_diagnostic() {
        let (_listener, port) = stub_listener().await;
        let prober = ConnectivityProber::new(FixedLister::new(ListOutcome::Failed(
            "session setup failed: NT_STATUS_LOGON_FAILURE".to_string(),
        )))
        .with_port(port);

        let report = prober
            .test_connection("127.0.0.1", "media", "pi", &Credential::new("wrong"))
            .await;
        assert!(report.reachable);
        let error = report.error.unwrap();
        assert_eq!(error.kind, ErrorKind::AuthOrEnumerationFailure);
        assert!(error.message.contains("NT_STATUS_LOGON_FAILURE"));
    }

    #[tokio::test]
    async fn test_probe_port() {
        let (_listener, port) = stub_listener().await;
        assert!(probe_port("127.0.0.1", port, Duration::from_secs(1)).await.is_ok());

        let port = closed_port().await;
        assert!(probe_port("127.0.0.1", port, Duration::from_secs(1)).await.is_err());
    }

    #[test]
    fn test_report_serializes_kind() {
        let report = ConnectionReport {
            reachable: false,
            shares: None,
            error: Some(ProbeFailure {
                kind: ErrorKind::PortUnreachable,
                message: "Cannot connect to 10.0.0.5:445: timed out".to_string(),
            }),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["error"]["kind"], "PortUnreachable");
        assert_eq!(json["reachable"], false);
    }
}
