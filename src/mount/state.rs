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

//! Lifecycle of a single mount point.
//!
//! ```text
//! Unconfigured -> Configured -> Mounting -> Mounted -> Unmounting -> Configured
//!                                  |                        |
//!                                  v                        v
//!                             MountFailed              UnmountFailed
//!                                  \________> Configured <__/
//! ```
//!
//! Nothing persists this state. [`MountState::observe`] derives the resting
//! state from configuration and the live mount table; the transient states
//! only exist for the duration of a mount manager call.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::StorageConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MountState {
    Unconfigured,
    Configured,
    Mounting,
    Mounted,
    Unmounting,
    MountFailed,
    UnmountFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountEvent {
    Configure,
    MountRequested,
    MountSucceeded,
    MountFailed,
    UnmountRequested,
    UnmountSucceeded,
    UnmountFailed,
    /// Leave a transient failure state.
    Recover,
}

impl MountState {
    /// Resting state for a configuration given whether its mount point is
    /// currently in the mount table.
    pub fn observe(config: &StorageConfig, mounted: bool) -> Self {
        if mounted {
            MountState::Mounted
        } else if config.enabled && config.is_complete() {
            MountState::Configured
        } else {
            MountState::Unconfigured
        }
    }

    /// Apply `event`. Events that make no sense in the current state leave
    /// it unchanged.
    pub fn next(self, event: MountEvent) -> Self {
        use MountEvent as E;
        use MountState as S;

        match (self, event) {
            (S::Unconfigured, E::Configure) => S::Configured,
            (S::Configured, E::MountRequested) => S::Mounting,
            // Idempotent mount of an already-mounted point
            (S::Mounted, E::MountRequested) => S::Mounted,
            (S::Mounting, E::MountSucceeded) => S::Mounted,
            (S::Mounting, E::MountFailed) => S::MountFailed,
            (S::Mounted, E::UnmountRequested) => S::Unmounting,
            // Unmounting something that is not mounted is a no-op
            (S::Configured, E::UnmountRequested) => S::Configured,
            (S::Unmounting, E::UnmountSucceeded) => S::Configured,
            (S::Unmounting, E::UnmountFailed) => S::UnmountFailed,
            (S::MountFailed, E::Recover) => S::Configured,
            // The share is still attached after a failed unmount
            (S::UnmountFailed, E::Recover) => S::Mounted,
            (state, _) => state,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MountState::Mounting
                | MountState::Unmounting
                | MountState::MountFailed
                | MountState::UnmountFailed
        )
    }
}

impl fmt::Display for MountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MountState::Unconfigured => "unconfigured",
            MountState::Configured => "configured",
            MountState::Mounting => "mounting",
            MountState::Mounted => "mounted",
            MountState::Unmounting => "unmounting",
            MountState::MountFailed => "mount failed",
            MountState::UnmountFailed => "unmount failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_lifecycle() {
        let state = MountState::Unconfigured
            .next(MountEvent::Configure)
            .next(MountEvent::MountRequested);
        assert_eq!(state, MountState::Mounting);

        let state = state.next(MountEvent::MountSucceeded);
        assert_eq!(state, MountState::Mounted);

        let state = state.next(MountEvent::UnmountRequested);
        assert_eq!(state, MountState::Unmounting);
        assert_eq!(state.next(MountEvent::UnmountSucceeded), MountState::Configured);
    }

    #[test]
    fn test_failures_return_to_resting_state() {
        let failed = MountState::Mounting.next(MountEvent::MountFailed);
        assert_eq!(failed, MountState::MountFailed);
        assert!(failed.is_transient());
        assert_eq!(failed.next(MountEvent::Recover), MountState::Configured);

        let failed = MountState::Unmounting.next(MountEvent::UnmountFailed);
        assert_eq!(failed, MountState::UnmountFailed);
        assert_eq!(failed.next(MountEvent::Recover), MountState::Mounted);
    }

    #[test]
    fn test_invalid_events_are_ignored() {
        assert_eq!(
            MountState::Unconfigured.next(MountEvent::MountRequested),
            MountState::Unconfigured
        );
        assert_eq!(
            MountState::Mounted.next(MountEvent::MountSucceeded),
            MountState::Mounted
        );
    }

    #[test]
    fn test_observe() {
        let mut config = StorageConfig::default();
        assert_eq!(MountState::observe(&config, false), MountState::Unconfigured);

        config.server_address = "10.0.0.5".to_string();
        config.share_name = "media".to_string();
        config.username = "pi".to_string();
        config.mount_point = "/mnt/pi-nas".to_string();
        assert_eq!(MountState::observe(&config, false), MountState::Unconfigured);

        config.enabled = true;
        assert_eq!(MountState::observe(&config, false), MountState::Configured);
        assert_eq!(MountState::observe(&config, true), MountState::Mounted);
    }
}
