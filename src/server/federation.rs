// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server-to-server federation state.
//!
//! Each configured remote server is dialed by sending our own
//! announcement to every locator it lists. A remote counts as federated
//! once its reciprocal announcement arrives; until then (and again after
//! a lease loss) the server runs in a degraded, partially connected
//! state and keeps announcing on its normal cadence - retry is implicit,
//! there is no separate reconnect loop.
//!
//! There is no leader election and no quorum: every server keeps its own
//! participant view and gossips it to federated peers; consistency
//! across the federation is eventual.

use crate::identity::{Identity, Locator, RemoteServerDescriptor};
use std::collections::HashMap;

/// Connection state of the configured remote servers.
#[derive(Debug)]
pub struct Federation {
    remotes: HashMap<Identity, RemoteServer>,
}

#[derive(Debug)]
struct RemoteServer {
    descriptor: RemoteServerDescriptor,
    established: bool,
}

impl Federation {
    /// Build federation state from the configured descriptors.
    pub fn new(descriptors: &[RemoteServerDescriptor]) -> Self {
        let remotes = descriptors
            .iter()
            .map(|descriptor| {
                (
                    descriptor.prefix,
                    RemoteServer {
                        descriptor: descriptor.clone(),
                        established: false,
                    },
                )
            })
            .collect();
        Self { remotes }
    }

    /// Every configured remote locator, for the announcement fan-out.
    pub fn targets(&self) -> Vec<Locator> {
        self.remotes
            .values()
            .flat_map(|remote| remote.descriptor.locators.iter().copied())
            .collect()
    }

    /// Whether `prefix` is a configured remote server.
    pub fn is_remote(&self, prefix: &Identity) -> bool {
        self.remotes.contains_key(prefix)
    }

    /// Record a reciprocal announcement from a configured remote.
    ///
    /// Returns true only on the transition to established, so callers
    /// can log federation once per outage.
    pub fn mark_established(&mut self, prefix: &Identity) -> bool {
        match self.remotes.get_mut(prefix) {
            Some(remote) if !remote.established => {
                remote.established = true;
                true
            }
            _ => false,
        }
    }

    /// Record loss of a configured remote (lease expiry or withdrawal).
    /// Announcements to it continue; it re-establishes on its next
    /// reciprocal announcement.
    pub fn mark_lost(&mut self, prefix: &Identity) {
        if let Some(remote) = self.remotes.get_mut(prefix) {
            remote.established = false;
        }
    }

    /// Whether a configured remote is currently established.
    pub fn is_established(&self, prefix: &Identity) -> bool {
        self.remotes
            .get(prefix)
            .map(|remote| remote.established)
            .unwrap_or(false)
    }

    /// Number of configured remotes.
    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    /// Number of currently established remotes.
    pub fn established_count(&self) -> usize {
        self.remotes.values().filter(|r| r.established).count()
    }
}

/// Federation error types. Never fatal: callers log and carry on in
/// degraded mode.
#[derive(Debug)]
pub enum FederationError {
    /// Announcement to a remote locator failed.
    Unreachable { prefix: Identity, reason: String },
}

impl std::fmt::Display for FederationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreachable { prefix, reason } => {
                write!(f, "Remote server {} unreachable: {}", prefix, reason)
            }
        }
    }
}

impl std::error::Error for FederationError {}
