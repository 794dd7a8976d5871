// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-peer lease bookkeeping.
//!
//! The tracker holds one record per known identity - local participants
//! and federated servers alike - and decides whether an inbound
//! announcement is a first discovery or a liveliness renewal. All
//! methods take `now` explicitly so timeout behavior is testable without
//! wall-clock sleeps.

use crate::identity::{Identity, Locator};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Kind of liveliness transition observed for an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First announcement from a previously unknown identity.
    Discovered,
    /// Lease expired without a renewing announcement (ungraceful loss).
    Dropped,
    /// Explicit withdrawal (graceful departure).
    Removed,
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discovered => write!(f, "discovered"),
            Self::Dropped => write!(f, "dropped"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// Record of one tracked peer.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    /// Peer identity prefix.
    pub identity: Identity,

    /// Peer name from its announcement, if any.
    pub name: Option<String>,

    /// Locators the peer can be reached at.
    pub locators: Vec<Locator>,

    /// True when the peer is itself a discovery server.
    pub is_server: bool,

    /// When the peer was first seen.
    pub discovered_at: Instant,

    /// Lease deadline; the peer is lost once `deadline <= now`.
    pub deadline: Instant,
}

/// Lease table over all known identities.
#[derive(Debug)]
pub struct LivelinessTracker {
    peers: HashMap<Identity, PeerRecord>,
    lease_duration: Duration,
}

impl LivelinessTracker {
    /// Create an empty tracker with the given lease duration.
    pub fn new(lease_duration: Duration) -> Self {
        Self {
            peers: HashMap::new(),
            lease_duration,
        }
    }

    /// Record an announcement from `identity` at `now`.
    ///
    /// Resets the lease deadline to `now + lease_duration` and updates
    /// name/locators. Returns `Some(Discovered)` only for a previously
    /// unknown identity; renewals within a lease window return `None`,
    /// so duplicate announcements never produce duplicate events.
    pub fn refresh(
        &mut self,
        identity: Identity,
        name: Option<String>,
        locators: Vec<Locator>,
        is_server: bool,
        now: Instant,
    ) -> Option<Transition> {
        let deadline = now + self.lease_duration;
        match self.peers.get_mut(&identity) {
            Some(record) => {
                record.deadline = deadline;
                if name.is_some() {
                    record.name = name;
                }
                if !locators.is_empty() {
                    record.locators = locators;
                }
                record.is_server |= is_server;
                None
            }
            None => {
                self.peers.insert(
                    identity,
                    PeerRecord {
                        identity,
                        name,
                        locators,
                        is_server,
                        discovered_at: now,
                        deadline,
                    },
                );
                Some(Transition::Discovered)
            }
        }
    }

    /// Remove and return every record whose lease deadline has passed.
    ///
    /// Each expired identity is returned exactly once; repeated sweeps
    /// at the same instant yield nothing further.
    pub fn sweep(&mut self, now: Instant) -> Vec<PeerRecord> {
        let expired: Vec<Identity> = self
            .peers
            .iter()
            .filter(|(_, record)| record.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.peers.remove(&id))
            .collect()
    }

    /// Explicit withdrawal of an identity.
    ///
    /// Distinct from lease expiry: callers emit `Removed`, never
    /// `Dropped`, even when the lease had already run out.
    pub fn remove(&mut self, identity: &Identity) -> Option<PeerRecord> {
        self.peers.remove(identity)
    }

    /// Look up a tracked peer.
    pub fn get(&self, identity: &Identity) -> Option<&PeerRecord> {
        self.peers.get(identity)
    }

    /// Whether an identity is currently tracked.
    pub fn contains(&self, identity: &Identity) -> bool {
        self.peers.contains_key(identity)
    }

    /// Iterate over all tracked peers.
    pub fn peers(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.values()
    }

    /// Number of tracked peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// True when no peer is tracked.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_identity(id: u8) -> Identity {
        let mut bytes = [0u8; 12];
        bytes[0] = id;
        Identity::from_bytes(bytes)
    }

    fn lease() -> Duration {
        Duration::from_secs(8)
    }

    #[test]
    fn test_first_refresh_is_discovery() {
        let mut tracker = LivelinessTracker::new(lease());
        let now = Instant::now();

        let transition = tracker.refresh(make_identity(1), None, vec![], false, now);

        assert_eq!(transition, Some(Transition::Discovered));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_renewal_within_lease_is_silent() {
        let mut tracker = LivelinessTracker::new(lease());
        let id = make_identity(1);
        let t0 = Instant::now();

        tracker.refresh(id, None, vec![], false, t0);
        let t1 = t0 + Duration::from_secs(3);
        assert_eq!(tracker.refresh(id, None, vec![], false, t1), None);

        // Deadline moved to t1 + lease.
        assert_eq!(tracker.get(&id).unwrap().deadline, t1 + lease());
    }

    #[test]
    fn test_sweep_drops_expired_exactly_once() {
        let mut tracker = LivelinessTracker::new(lease());
        let id = make_identity(1);
        let t0 = Instant::now();
        tracker.refresh(id, Some("peer".into()), vec![], false, t0);

        // Before the deadline nothing expires.
        assert!(tracker.sweep(t0 + Duration::from_secs(7)).is_empty());

        let dropped = tracker.sweep(t0 + lease());
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].identity, id);
        assert_eq!(dropped[0].name.as_deref(), Some("peer"));

        // Repeated sweeps yield nothing further.
        assert!(tracker.sweep(t0 + lease()).is_empty());
        assert!(tracker.sweep(t0 + Duration::from_secs(100)).is_empty());
    }

    #[test]
    fn test_refresh_extends_lease_past_sweep() {
        let mut tracker = LivelinessTracker::new(lease());
        let id = make_identity(1);
        let t0 = Instant::now();
        tracker.refresh(id, None, vec![], false, t0);
        tracker.refresh(id, None, vec![], false, t0 + Duration::from_secs(6));

        // The first deadline has passed but the renewal moved it.
        assert!(tracker.sweep(t0 + lease()).is_empty());
        assert!(tracker.contains(&id));
    }

    #[test]
    fn test_remove_is_distinct_from_expiry() {
        let mut tracker = LivelinessTracker::new(lease());
        let id = make_identity(1);
        let t0 = Instant::now();
        tracker.refresh(id, None, vec![], false, t0);

        // Lease already ran out, but an explicit withdrawal still wins.
        let record = tracker.remove(&id);
        assert!(record.is_some());
        assert!(tracker.sweep(t0 + Duration::from_secs(100)).is_empty());
        assert!(tracker.remove(&id).is_none());
    }

    #[test]
    fn test_rediscovery_after_drop() {
        let mut tracker = LivelinessTracker::new(lease());
        let id = make_identity(1);
        let t0 = Instant::now();

        assert_eq!(
            tracker.refresh(id, None, vec![], false, t0),
            Some(Transition::Discovered)
        );
        tracker.sweep(t0 + lease());
        assert_eq!(
            tracker.refresh(id, None, vec![], false, t0 + Duration::from_secs(20)),
            Some(Transition::Discovered)
        );
    }

    #[test]
    fn test_refresh_updates_name_and_locators() {
        let mut tracker = LivelinessTracker::new(lease());
        let id = make_identity(1);
        let now = Instant::now();
        let loc: Locator = "127.0.0.1:7500".parse().unwrap();

        tracker.refresh(id, None, vec![], false, now);
        tracker.refresh(id, Some("late-name".into()), vec![loc], false, now);

        let record = tracker.get(&id).unwrap();
        assert_eq!(record.name.as_deref(), Some("late-name"));
        assert_eq!(record.locators, vec![loc]);
    }

    #[test]
    fn test_server_flag_is_sticky() {
        let mut tracker = LivelinessTracker::new(lease());
        let id = make_identity(1);
        let now = Instant::now();

        tracker.refresh(id, None, vec![], true, now);
        tracker.refresh(id, None, vec![], false, now);

        assert!(tracker.get(&id).unwrap().is_server);
    }

    #[test]
    fn test_sweep_only_touches_expired() {
        let mut tracker = LivelinessTracker::new(lease());
        let t0 = Instant::now();
        tracker.refresh(make_identity(1), None, vec![], false, t0);
        tracker.refresh(make_identity(2), None, vec![], false, t0 + Duration::from_secs(5));

        let dropped = tracker.sweep(t0 + lease());
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].identity, make_identity(1));
        assert_eq!(tracker.len(), 1);
    }
}
