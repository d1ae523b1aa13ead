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

//! Discovery of SMB-capable hosts on the local network.
//!
//! A scan expands a CIDR range, pings every host with a bounded number of
//! probes in flight, and enriches each live host with its hostname, MAC
//! address and whether it accepts connections on the SMB port. Enrichment is
//! best-effort: a failed lookup leaves the field empty and never aborts the
//! scan. A global deadline bounds the whole sweep; hosts not probed by then
//! are simply missing from the report.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::common::config::{AppConfig, EnvConfig};
use crate::error::{ErrorKind, Result};
use crate::network::cidr::Ipv4Cidr;
use crate::network::prober::probe_port;
use crate::network::resolve::{lookup_mac, reverse_lookup};
use crate::utils::run_command_with_timeout;

/// A live host found by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub address: Ipv4Addr,
    /// `None` when reverse DNS had no answer.
    pub hostname: Option<String>,
    pub mac_address: Option<String>,
    pub smb_available: bool,
}

impl DiscoveredDevice {
    pub fn hostname_or_unknown(&self) -> &str {
        self.hostname.as_deref().unwrap_or("Unknown")
    }
}

/// Per-host network operations used by the scanner.
#[async_trait]
pub trait HostProbe: Send + Sync {
    /// Lightweight reachability check.
    async fn is_alive(&self, addr: Ipv4Addr) -> bool;

    async fn hostname(&self, addr: Ipv4Addr) -> Option<String>;

    async fn mac_address(&self, addr: Ipv4Addr) -> Option<String>;

    async fn port_open(&self, addr: Ipv4Addr, port: u16) -> bool;
}

/// Probes hosts with the system `ping`, `getnameinfo`, the ARP table and a
/// plain TCP connect.
#[derive(Debug, Clone)]
pub struct SystemHostProbe {
    ping_timeout: Duration,
    dns_timeout: Duration,
    port_timeout: Duration,
}

impl Default for SystemHostProbe {
    fn default() -> Self {
        Self {
            ping_timeout: Duration::from_secs(AppConfig::PING_TIMEOUT_SECS),
            dns_timeout: Duration::from_millis(AppConfig::REVERSE_DNS_TIMEOUT_MS),
            port_timeout: Duration::from_millis(AppConfig::SMB_PROBE_TIMEOUT_MS),
        }
    }
}

impl SystemHostProbe {
    fn ping_args(&self, addr: Ipv4Addr) -> Vec<String> {
        let wait = self.ping_timeout.as_secs().max(1).to_string();
        // BSD ping takes the overall deadline via -t; Linux waits per reply via -W
        #[cfg(target_os = "macos")]
        let wait_flag = "-t";
        #[cfg(not(target_os = "macos"))]
        let wait_flag = "-W";
        vec![
            "-c".to_string(),
            "1".to_string(),
            wait_flag.to_string(),
            wait,
            addr.to_string(),
        ]
    }
}

#[async_trait]
impl HostProbe for SystemHostProbe {
    async fn is_alive(&self, addr: Ipv4Addr) -> bool {
        let hard_limit = self.ping_timeout + Duration::from_millis(AppConfig::PING_WAIT_GRACE_MS);
        match run_command_with_timeout("ping", &self.ping_args(addr), hard_limit).await {
            Ok(output) => output.success(),
            Err(e) => {
                tracing::trace!(address = %addr, error = %e, "ping failed");
                false
            }
        }
    }

    async fn hostname(&self, addr: Ipv4Addr) -> Option<String> {
        reverse_lookup(addr, self.dns_timeout).await
    }

    async fn mac_address(&self, addr: Ipv4Addr) -> Option<String> {
        lookup_mac(addr).await
    }

    async fn port_open(&self, addr: Ipv4Addr, port: u16) -> bool {
        probe_port(&addr.to_string(), port, self.port_timeout)
            .await
            .is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Probes in flight; `None` picks a default from the CPU count. Always
    /// clamped to the supported window.
    pub concurrency: Option<usize>,
    /// Deadline for the whole sweep.
    pub timeout: Duration,
    pub smb_port: u16,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            concurrency: None,
            timeout: Duration::from_secs(AppConfig::SCAN_GLOBAL_TIMEOUT_SECS),
            smb_port: AppConfig::SMB_PORT,
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub range: String,
    /// Live hosts, in completion order.
    pub devices: Vec<DiscoveredDevice>,
    /// Hosts whose probe finished before the deadline.
    pub probed: usize,
    pub total_hosts: usize,
    /// The global deadline elapsed; `devices` is partial.
    pub timed_out: bool,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl ScanReport {
    /// `Some(ScanTimeout)` when the results are partial.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.timed_out.then_some(ErrorKind::ScanTimeout)
    }
}

#[derive(Clone)]
pub struct NetworkScanner {
    probe: Arc<dyn HostProbe>,
    options: ScanOptions,
}

impl NetworkScanner {
    pub fn new(probe: Arc<dyn HostProbe>) -> Self {
        Self {
            probe,
            options: ScanOptions::default(),
        }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemHostProbe::default()))
    }

    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Lazily probe every host of `cidr`, yielding live devices as their
    /// probes complete.
    ///
    /// Nothing runs until the stream is polled, and each call starts a fresh
    /// sweep. The stream has no deadline of its own; [`scan`](Self::scan)
    /// adds one.
    pub fn devices(&self, cidr: Ipv4Cidr) -> impl Stream<Item = DiscoveredDevice> + Send + 'static {
        self.probes(cidr).filter_map(|result| async move { result })
    }

    /// One item per host: `Some` when it answered.
    fn probes(&self, cidr: Ipv4Cidr) -> impl Stream<Item = Option<DiscoveredDevice>> + Send + 'static {
        let probe = self.probe.clone();
        let smb_port = self.options.smb_port;
        let concurrency = EnvConfig::scan_concurrency(self.options.concurrency, cidr.host_count());

        stream::iter(cidr.hosts())
            .map(move |addr| {
                let probe = probe.clone();
                async move { probe_host(probe.as_ref(), addr, smb_port).await }
            })
            .buffer_unordered(concurrency)
    }

    /// Sweep `range` and collect the live hosts.
    ///
    /// Returns partial results with `timed_out` set when the global deadline
    /// elapses. Only an unparseable range is an error.
    pub async fn scan(&self, range: &str) -> Result<ScanReport> {
        let cidr: Ipv4Cidr = range.parse()?;
        let total_hosts = cidr.host_count();
        let started_at = Utc::now();
        let started = Instant::now();

        tracing::info!(
            range = %cidr,
            hosts = total_hosts,
            concurrency = EnvConfig::scan_concurrency(self.options.concurrency, total_hosts),
            "starting network scan"
        );

        let mut probes = Box::pin(self.probes(cidr));
        let deadline = tokio::time::sleep(self.options.timeout);
        tokio::pin!(deadline);

        let mut devices = Vec::new();
        let mut probed = 0;
        let mut timed_out = false;

        loop {
            tokio::select! {
                next = probes.next() => match next {
                    Some(Some(device)) => {
                        probed += 1;
                        tracing::debug!(
                            address = %device.address,
                            hostname = device.hostname_or_unknown(),
                            smb = device.smb_available,
                            "host discovered"
                        );
                        devices.push(device);
                    }
                    Some(None) => probed += 1,
                    None => break,
                },
                _ = &mut deadline => {
                    timed_out = true;
                    tracing::warn!(
                        range = %cidr,
                        probed,
                        total_hosts,
                        "scan deadline reached, returning partial results"
                    );
                    break;
                }
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(range = %cidr, found = devices.len(), probed, elapsed_ms, "network scan finished");

        Ok(ScanReport {
            range: cidr.to_string(),
            devices,
            probed,
            total_hosts,
            timed_out,
            started_at,
            elapsed_ms,
        })
    }
}

async fn probe_host(probe: &dyn HostProbe, addr: Ipv4Addr, smb_port: u16) -> Option<DiscoveredDevice> {
    if !probe.is_alive(addr).await {
        return None;
    }

    let (hostname, mac_address, smb_available) = tokio::join!(
        probe.hostname(addr),
        probe.mac_address(addr),
        probe.port_open(addr, smb_port)
    );

    Some(DiscoveredDevice {
        address: addr,
        hostname,
        mac_address,
        smb_available,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeProbe {
        alive: HashSet<Ipv4Addr>,
        smb: HashSet<Ipv4Addr>,
        latency: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        pings: AtomicUsize,
    }

    #[async_trait]
    impl HostProbe for FakeProbe {
        async fn is_alive(&self, addr: Ipv4Addr) -> bool {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.pings.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.alive.contains(&addr)
        }

        async fn hostname(&self, addr: Ipv4Addr) -> Option<String> {
            (addr.octets()[3] == 10).then(|| "nas.local".to_string())
        }

        async fn mac_address(&self, _addr: Ipv4Addr) -> Option<String> {
            None
        }

        async fn port_open(&self, addr: Ipv4Addr, port: u16) -> bool {
            port == AppConfig::SMB_PORT && self.smb.contains(&addr)
        }
    }

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 1, last)
    }

    #[tokio::test]
    async fn test_scan_enriches_live_hosts() {
        let probe = Arc::new(FakeProbe {
            alive: [addr(1), addr(10)].into_iter().collect(),
            smb: [addr(10)].into_iter().collect(),
            ..Default::default()
        });
        let scanner = NetworkScanner::new(probe.clone());

        let report = scanner.scan("192.168.1.0/24").await.unwrap();
        assert!(!report.timed_out);
        assert_eq!(report.error_kind(), None);
        assert_eq!(report.total_hosts, 254);
        assert_eq!(report.probed, 254);
        assert_eq!(probe.pings.load(Ordering::SeqCst), 254);

        let mut devices = report.devices;
        devices.sort_by_key(|d| d.address);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].hostname, None);
        assert_eq!(devices[0].hostname_or_unknown(), "Unknown");
        assert!(!devices[0].smb_available);
        assert_eq!(devices[1].hostname.as_deref(), Some("nas.local"));
        assert!(devices[1].smb_available);
        assert_eq!(devices[1].mac_address, None);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let probe = Arc::new(FakeProbe {
            latency: Duration::from_millis(5),
            ..Default::default()
        });
        let scanner = NetworkScanner::new(probe.clone()).with_options(ScanOptions {
            concurrency: Some(8),
            ..Default::default()
        });

        scanner.scan("10.1.2.0/24").await.unwrap();
        let max = probe.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 8, "max in flight was {max}");
        assert!(max >= 2);
    }

    #[tokio::test]
    async fn test_global_deadline_returns_partial_results() {
        let probe = Arc::new(FakeProbe {
            alive: [addr(1)].into_iter().collect(),
            latency: Duration::from_secs(30),
            ..Default::default()
        });
        let scanner = NetworkScanner::new(probe).with_options(ScanOptions {
            timeout: Duration::from_millis(200),
            ..Default::default()
        });

        let started = Instant::now();
        let report = scanner.scan("192.168.1.0/24").await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(report.timed_out);
        assert_eq!(report.error_kind(), Some(ErrorKind::ScanTimeout));
        assert!(report.devices.is_empty());
        assert_eq!(report.probed, 0);
    }

    #[tokio::test]
    async fn test_scan_is_restartable() {
        let probe = Arc::new(FakeProbe {
            alive: [addr(1)].into_iter().collect(),
            ..Default::default()
        });
        let scanner = NetworkScanner::new(probe.clone());

        let first: Vec<_> = scanner
            .devices("192.168.1.0/30".parse().unwrap())
            .collect()
            .await;
        let second: Vec<_> = scanner
            .devices("192.168.1.0/30".parse().unwrap())
            .collect()
            .await;
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(probe.pings.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_invalid_range_is_an_error() {
        let scanner = NetworkScanner::new(Arc::new(FakeProbe::default()));
        let err = scanner.scan("not-a-range").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRange);
    }

    #[tokio::test]
    async fn test_empty_documentation_range() {
        let scanner = NetworkScanner::system().with_options(ScanOptions {
            timeout: Duration::from_secs(15),
            ..Default::default()
        });

        let report = scanner.scan("203.0.113.0/30").await.unwrap();
        assert!(report.devices.is_empty());
        assert_eq!(report.total_hosts, 2);
    }
}
