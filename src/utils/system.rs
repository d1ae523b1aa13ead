/// Real user and group id of this process, used for the `uid=`/`gid=`
/// ownership mapping of CIFS mounts.
pub fn current_uid_gid() -> (u32, u32) {
    // SAFETY: getuid/getgid never fail and take no pointers
    unsafe { (libc::getuid(), libc::getgid()) }
}

pub fn is_root() -> bool {
    // SAFETY: geteuid never fails and takes no pointers
    unsafe { libc::geteuid() == 0 }
}

/// Warn once at startup when mount operations are likely to be refused.
pub fn warn_if_unprivileged(use_sudo: bool) {
    if !use_sudo && !is_root() {
        tracing::warn!(
            "running without root privileges; mount and unmount will likely fail (use --sudo)"
        );
    }
}
