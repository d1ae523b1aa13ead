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

pub mod cidr;
pub mod prober;
pub mod resolve;
pub mod scanner;

pub use cidr::Ipv4Cidr;
pub use prober::{
    probe_port, ConnectionReport, ConnectivityProber, ListOutcome, ProbeFailure, ShareLister,
    SmbclientLister,
};
pub use scanner::{
    DiscoveredDevice, HostProbe, NetworkScanner, ScanOptions, ScanReport, SystemHostProbe,
};
