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

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::common::config::AppConfig;
use crate::error::Error;

/// An IPv4 network in CIDR notation.
///
/// Parsing is lenient about host bits: `192.168.1.77/24` is accepted and
/// normalized to `192.168.1.0/24`. A bare address means `/32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    fn mask(&self) -> u32 {
        match self.prefix {
            0 => 0,
            p => u32::MAX << (32 - u32::from(p)),
        }
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !self.mask())
    }

    /// Usable host addresses.
    ///
    /// Network and broadcast addresses are excluded, except on `/31`
    /// point-to-point links where both addresses are hosts and on `/32`
    /// which is the single address itself.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> + Send + 'static {
        let first = u32::from(self.network);
        let last = u32::from(self.broadcast());
        let (start, end) = if self.prefix >= 31 {
            (first, last)
        } else {
            (first + 1, last - 1)
        };
        (start..=end).map(Ipv4Addr::from)
    }

    pub fn host_count(&self) -> usize {
        match self.prefix {
            32 => 1,
            31 => 2,
            p => (1usize << (32 - u32::from(p))) - 2,
        }
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & self.mask() == u32::from(self.network)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let (addr, prefix) = match input.split_once('/') {
            Some((addr, prefix)) => {
                let prefix: u8 = prefix
                    .parse()
                    .map_err(|_| Error::invalid_range(s, "prefix length is not a number"))?;
                (addr, prefix)
            }
            None => (input, 32),
        };

        if prefix > 32 {
            return Err(Error::invalid_range(s, "prefix length must be at most 32"));
        }
        if prefix < AppConfig::MIN_SCAN_PREFIX {
            return Err(Error::invalid_range(
                s,
                format!(
                    "range too large, use a prefix of /{} or longer",
                    AppConfig::MIN_SCAN_PREFIX
                ),
            ));
        }

        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| Error::invalid_range(s, "not an IPv4 address"))?;

        let mut cidr = Ipv4Cidr {
            network: addr,
            prefix,
        };
        cidr.network = Ipv4Addr::from(u32::from(addr) & cidr.mask());
        Ok(cidr)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}
