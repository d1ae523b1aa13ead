use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::utils::bytes_to_gib;

/// Capacity and usage of a mounted filesystem.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct StorageStats {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    /// `used / total * 100`, or `0.0` when the filesystem reports no capacity.
    pub usage_percent: f64,
}

impl StorageStats {
    pub fn new(total_bytes: u64, used_bytes: u64, free_bytes: u64) -> Self {
        let usage_percent = if total_bytes == 0 {
            0.0
        } else {
            used_bytes as f64 / total_bytes as f64 * 100.0
        };
        Self {
            total_bytes,
            used_bytes,
            free_bytes,
            usage_percent,
        }
    }

    /// Build stats from total and available bytes, deriving used space.
    pub fn from_total_and_free(total_bytes: u64, free_bytes: u64) -> Self {
        Self::new(total_bytes, total_bytes.saturating_sub(free_bytes), free_bytes)
    }

    pub fn total_gib(&self) -> f64 {
        bytes_to_gib(self.total_bytes)
    }

    pub fn used_gib(&self) -> f64 {
        bytes_to_gib(self.used_bytes)
    }

    pub fn free_gib(&self) -> f64 {
        bytes_to_gib(self.free_bytes)
    }
}

/// A network share currently present in the OS mount table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MountRecord {
    pub source: String,
    pub mount_point: PathBuf,
    pub filesystem_type: String,
    pub options: String,
    /// Best-effort; absent when the stats query failed.
    pub usage: Option<StorageStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_percent_zero_capacity() {
        let stats = StorageStats::new(0, 0, 0);
        assert_eq!(stats.usage_percent, 0.0);

        let stats = StorageStats::from_total_and_free(0, 0);
        assert_eq!(stats.usage_percent, 0.0);
        assert_eq!(stats.used_bytes, 0);
    }

    #[test]
    fn test_usage_percent() {
        let stats = StorageStats::from_total_and_free(1000, 250);
        assert_eq!(stats.used_bytes, 750);
        assert_eq!(stats.usage_percent, 75.0);
    }

    #[test]
    fn test_free_larger_than_total_saturates() {
        let stats = StorageStats::from_total_and_free(100, 200);
        assert_eq!(stats.used_bytes, 0);
        assert_eq!(stats.usage_percent, 0.0);
    }
}
