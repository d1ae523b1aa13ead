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

//! Best-effort host enrichment: reverse DNS and ARP lookups.
//!
//! Every function here returns `None` on any failure. Callers treat that as
//! "unknown", never as an error.

use std::ffi::CStr;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::common::config::AppConfig;

/// Large enough for any fully qualified domain name.
const MAX_HOSTNAME_LEN: usize = 1025;

/// Resolve `addr` to a hostname, giving up after `timeout`.
///
/// `getnameinfo` has no timeout of its own, so it runs on the blocking pool
/// and is abandoned when the deadline passes.
pub async fn reverse_lookup(addr: Ipv4Addr, timeout: Duration) -> Option<String> {
    let lookup = tokio::task::spawn_blocking(move || getnameinfo(addr));
    match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(name)) => name,
        Ok(Err(e)) => {
            tracing::debug!(address = %addr, error = %e, "reverse lookup task failed");
            None
        }
        Err(_) => {
            tracing::trace!(address = %addr, "reverse lookup timed out");
            None
        }
    }
}

fn getnameinfo(addr: Ipv4Addr) -> Option<String> {
    // SAFETY: sockaddr_in is plain old data; all-zero is a valid value
    let mut sin: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    sin.sin_family = libc::AF_INET as libc::sa_family_t;
    sin.sin_addr = libc::in_addr {
        s_addr: u32::from(addr).to_be(),
    };

    let mut host = [0 as libc::c_char; MAX_HOSTNAME_LEN];
    // SAFETY: sin is a fully initialized sockaddr_in whose size we pass;
    // host is a writable buffer of the stated length and no service buffer
    // is requested
    let rc = unsafe {
        libc::getnameinfo(
            &sin as *const libc::sockaddr_in as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            host.as_mut_ptr(),
            host.len() as libc::socklen_t,
            std::ptr::null_mut(),
            0,
            libc::NI_NAMEREQD,
        )
    };
    if rc != 0 {
        return None;
    }

    // SAFETY: on success getnameinfo wrote a NUL-terminated string into host
    let name = unsafe { CStr::from_ptr(host.as_ptr()) }
        .to_string_lossy()
        .trim_end_matches('.')
        .to_string();
    if name.is_empty() || name == addr.to_string() {
        None
    } else {
        Some(name)
    }
}

/// MAC address of `addr` from the kernel neighbour table, if known.
pub async fn lookup_mac(addr: Ipv4Addr) -> Option<String> {
    let content = tokio::fs::read_to_string(AppConfig::ARP_TABLE_PATH)
        .await
        .ok()?;
    parse_arp_table(&content, addr)
}

/// Find `addr` in `/proc/net/arp` content.
///
/// ```text
/// IP address       HW type     Flags       HW address            Mask     Device
/// 192.168.1.1      0x1         0x2         a4:2b:b0:12:34:56     *        eth0
/// ```
///
/// Incomplete entries (all-zero hardware address) count as unknown.
pub fn parse_arp_table(content: &str, addr: Ipv4Addr) -> Option<String> {
    let wanted = addr.to_string();
    content.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[0] != wanted {
            return None;
        }
        let mac = fields[3].to_ascii_lowercase();
        if mac == "00:00:00:00:00:00" {
            None
        } else {
            Some(mac)
        }
    })
}
