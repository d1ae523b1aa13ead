/// Application configuration constants
pub struct AppConfig;

impl AppConfig {
    // Persisted configuration
    pub const DEFAULT_CONFIG_PATH: &'static str = "config/storage_config.json";
    pub const CONFIG_PATH_ENV: &'static str = "PINAS_CONFIG";
    pub const DEFAULT_PASSWORD_ENV: &'static str = "SMB_PASSWORD";
    pub const DEFAULT_MOUNT_POINT: &'static str = "/mnt/pi-nas";
    pub const DEFAULT_MEDIA_DIR: &'static str = "media/uploads";
    pub const REMOTE_MEDIA_SUBDIR: &'static str = "media";

    // Ports
    pub const SMB_PORT: u16 = 445;
    pub const NFS_PORT: u16 = 2049;
    pub const DEFAULT_API_PORT: u16 = 8080;

    // Mount
    pub const DEFAULT_MOUNT_TIMEOUT_SECS: u64 = 30;
    pub const MIN_MOUNT_TIMEOUT_SECS: u64 = 5;
    pub const MAX_MOUNT_TIMEOUT_SECS: u64 = 120;
    pub const UNMOUNT_TIMEOUT_SECS: u64 = 10;
    pub const CREDENTIAL_FILE_PREFIX: &'static str = ".pinas-creds-";

    // Storage status
    /// Bound on each mount-table read and filesystem statistics query. A
    /// hung CIFS server blocks `statvfs` for as long as the kernel waits.
    pub const STATS_TIMEOUT_SECS: u64 = 5;

    // Connectivity probe
    pub const CONNECT_TIMEOUT_SECS: u64 = 5;
    pub const SHARE_LIST_TIMEOUT_SECS: u64 = 10;

    // Network scan
    pub const DEFAULT_SCAN_RANGE: &'static str = "192.168.1.0/24";
    /// Shortest prefix accepted for a scan (a /16 is 65534 hosts).
    pub const MIN_SCAN_PREFIX: u8 = 16;
    pub const DEFAULT_SCAN_CONCURRENCY: usize = 32;
    pub const MAX_SCAN_CONCURRENCY: usize = 64;
    pub const PING_TIMEOUT_SECS: u64 = 1;
    pub const PING_WAIT_GRACE_MS: u64 = 1000;
    pub const SMB_PROBE_TIMEOUT_MS: u64 = 1000;
    pub const REVERSE_DNS_TIMEOUT_MS: u64 = 1000;
    pub const SCAN_GLOBAL_TIMEOUT_SECS: u64 = 60;
    pub const ARP_TABLE_PATH: &'static str = "/proc/net/arp";
}

/// Environment-specific configuration
pub struct EnvConfig;

impl EnvConfig {
    /// Number of reachability probes allowed in flight for a scan.
    ///
    /// Honors an explicit request, otherwise scales with the host's CPUs,
    /// and never exceeds [`AppConfig::MAX_SCAN_CONCURRENCY`] or the number
    /// of addresses to probe.
    pub fn scan_concurrency(requested: Option<usize>, total_hosts: usize) -> usize {
        let wanted = requested.unwrap_or_else(|| {
            std::cmp::max(AppConfig::DEFAULT_SCAN_CONCURRENCY, num_cpus::get() * 4)
        });
        wanted
            .clamp(1, AppConfig::MAX_SCAN_CONCURRENCY)
            .min(total_hosts.max(1))
    }

    /// Clamp a mount timeout into the supported window.
    pub fn clamp_mount_timeout(seconds: u64) -> u64 {
        seconds.clamp(
            AppConfig::MIN_MOUNT_TIMEOUT_SECS,
            AppConfig::MAX_MOUNT_TIMEOUT_SECS,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_concurrency_is_capped() {
        assert_eq!(EnvConfig::scan_concurrency(Some(1000), 254), 64);
        assert_eq!(EnvConfig::scan_concurrency(Some(0), 254), 1);
        assert_eq!(EnvConfig::scan_concurrency(Some(16), 2), 2);
        let default = EnvConfig::scan_concurrency(None, 254);
        assert!((32..=64).contains(&default));
    }

    #[test]
    fn test_clamp_mount_timeout() {
        assert_eq!(EnvConfig::clamp_mount_timeout(1), 5);
        assert_eq!(EnvConfig::clamp_mount_timeout(30), 30);
        assert_eq!(EnvConfig::clamp_mount_timeout(600), 120);
    }
}
