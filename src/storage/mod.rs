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

//! Storage status module.
//!
//! This module reads the live mount table, queries filesystem capacity, and
//! reports mounted network shares.

pub mod fs_stats;
pub mod info;
pub mod mount_table;
pub mod reader;

pub use fs_stats::{FsStatsProvider, StatvfsProvider};
pub use info::{MountRecord, StorageStats};
pub use mount_table::{MountEntry, MountTable, SystemMountTable};
pub use reader::StatusReporter;
