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

//! The seam between the mount manager and the OS mount facility.
//!
//! [`MountExecutor`] returns raw results only; turning them into the error
//! taxonomy, enforcing timeouts and serializing per mount point is the
//! manager's job. That keeps the state machine testable without privileged
//! OS calls.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Protocol;
use crate::utils::{run_command_with_timeout, CommandOutput};

/// Everything the OS needs to attach one share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountParams {
    pub protocol: Protocol,
    /// `//server/share` for SMB, `server:/share` for NFS.
    pub source: String,
    pub target: PathBuf,
    /// Comma-separated `-o` options.
    pub options: String,
    /// Credential file referenced from `options`, if any.
    pub credentials_path: Option<PathBuf>,
    /// Upper bound the executor should apply to the OS call itself.
    pub timeout: Duration,
}

impl MountParams {
    /// Build the option string for a mount.
    ///
    /// SMB mounts map ownership to the invoking user and group and force a
    /// UTF-8 charset. A non-default port is passed through explicitly.
    pub fn build_options(
        protocol: Protocol,
        port: u16,
        credentials_path: Option<&Path>,
        uid: u32,
        gid: u32,
    ) -> String {
        let mut options = Vec::new();
        match protocol {
            Protocol::Smb => {
                if let Some(path) = credentials_path {
                    options.push(format!("credentials={}", path.display()));
                } else {
                    options.push("guest".to_string());
                }
                options.push(format!("uid={uid}"));
                options.push(format!("gid={gid}"));
                options.push("iocharset=utf8".to_string());
            }
            Protocol::Nfs => {}
        }
        if port != protocol.default_port() {
            options.push(format!("port={port}"));
        }
        options.join(",")
    }
}

/// Capability to invoke the OS mount and unmount facilities.
#[async_trait]
pub trait MountExecutor: Send + Sync {
    async fn mount(&self, params: &MountParams) -> io::Result<CommandOutput>;

    /// Unmount `target`, forcibly when `force` is set. `timeout` bounds the
    /// OS call itself.
    async fn unmount(
        &self,
        target: &Path,
        force: bool,
        timeout: Duration,
    ) -> io::Result<CommandOutput>;
}

/// Executor that shells out to `mount` and `umount`.
#[derive(Debug, Clone, Default)]
pub struct CommandMountExecutor {
    use_sudo: bool,
}

impl CommandMountExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix every invocation with non-interactive `sudo -n`.
    pub fn with_sudo(mut self, use_sudo: bool) -> Self {
        self.use_sudo = use_sudo;
        self
    }

    /// Program and argument vector for `tool args...`, honoring sudo.
    pub fn command_line(&self, tool: &str, args: Vec<String>) -> (String, Vec<String>) {
        if self.use_sudo {
            let mut full = vec!["-n".to_string(), tool.to_string()];
            full.extend(args);
            ("sudo".to_string(), full)
        } else {
            (tool.to_string(), args)
        }
    }

    pub fn mount_args(params: &MountParams) -> Vec<String> {
        let mut args = vec![
            "-t".to_string(),
            params.protocol.fs_type().to_string(),
            params.source.clone(),
            params.target.display().to_string(),
        ];
        if !params.options.is_empty() {
            args.push("-o".to_string());
            args.push(params.options.clone());
        }
        args
    }
}

#[async_trait]
impl MountExecutor for CommandMountExecutor {
    async fn mount(&self, params: &MountParams) -> io::Result<CommandOutput> {
        let (program, args) = self.command_line("mount", Self::mount_args(params));
        tracing::debug!(program = %program, source = %params.source, target = %params.target.display(), "invoking mount");
        run_command_with_timeout(&program, &args, params.timeout).await
    }

    async fn unmount(
        &self,
        target: &Path,
        force: bool,
        timeout: Duration,
    ) -> io::Result<CommandOutput> {
        let mut args = Vec::new();
        if force {
            args.push("-f".to_string());
        }
        args.push(target.display().to_string());
        let (program, args) = self.command_line("umount", args);
        tracing::debug!(program = %program, target = %target.display(), force, "invoking umount");
        run_command_with_timeout(&program, &args, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smb_options() {
        let options = MountParams::build_options(
            Protocol::Smb,
            445,
            Some(Path::new("/tmp/.pinas-creds-abc")),
            1000,
            1000,
        );
        assert_eq!(
            options,
            "credentials=/tmp/.pinas-creds-abc,uid=1000,gid=1000,iocharset=utf8"
        );

        let options = MountParams::build_options(Protocol::Smb, 4450, None, 0, 0);
        assert_eq!(options, "guest,uid=0,gid=0,iocharset=utf8,port=4450");
    }

    #[test]
    fn test_nfs_options() {
        assert_eq!(MountParams::build_options(Protocol::Nfs, 2049, None, 0, 0), "");
        assert_eq!(
            MountParams::build_options(Protocol::Nfs, 20490, None, 0, 0),
            "port=20490"
        );
    }

    #[test]
    fn test_command_line_with_sudo() {
        let params = MountParams {
            protocol: Protocol::Smb,
            source: "//10.0.0.5/media".to_string(),
            target: PathBuf::from("/mnt/pi-nas"),
            options: "guest".to_string(),
            credentials_path: None,
            timeout: Duration::from_secs(30),
        };

        let plain = CommandMountExecutor::new();
        let (program, args) = plain.command_line("mount", CommandMountExecutor::mount_args(&params));
        assert_eq!(program, "mount");
        assert_eq!(
            args,
            vec!["-t", "cifs", "//10.0.0.5/media", "/mnt/pi-nas", "-o", "guest"]
        );

        let sudo = CommandMountExecutor::new().with_sudo(true);
        let (program, args) = sudo.command_line("umount", vec!["/mnt/pi-nas".to_string()]);
        assert_eq!(program, "sudo");
        assert_eq!(args, vec!["-n", "umount", "/mnt/pi-nas"]);
    }
}
