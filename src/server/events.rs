// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery event observer interface.
//!
//! Applications observe the participant view through a
//! [`DiscoveryEventSink`]. The server calls `on_transition` outside the
//! peer-table lock, and the contract is enqueue-and-return: a sink that
//! does expensive work must hand the event off (see [`ChannelSink`])
//! rather than block the discovery loop.

use super::tracker::Transition;
use crate::identity::Identity;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Observer notified of participant liveliness transitions.
pub trait DiscoveryEventSink: Send + Sync {
    /// Called once per transition of `identity`.
    fn on_transition(&self, identity: &Identity, kind: Transition, name: Option<&str>);
}

/// Default sink: keeps a signed running count of live participants and
/// logs every transition.
///
/// +1 on discovery, -1 on drop or removal. The tracker's idempotent
/// refresh guarantees at most one discovery per identity per lifetime,
/// so for a well-ordered stream the count never goes negative.
#[derive(Debug, Default)]
pub struct ParticipantCounter {
    count: AtomicI64,
}

impl ParticipantCounter {
    /// Create a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current live-participant count.
    pub fn count(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }
}

impl DiscoveryEventSink for ParticipantCounter {
    fn on_transition(&self, identity: &Identity, kind: Transition, name: Option<&str>) {
        let total = match kind {
            Transition::Discovered => self.count.fetch_add(1, Ordering::SeqCst) + 1,
            Transition::Dropped | Transition::Removed => {
                self.count.fetch_sub(1, Ordering::SeqCst) - 1
            }
        };
        info!(
            "Participant \"{}\" {}, total {}",
            name.unwrap_or(&identity.to_string()),
            kind,
            total
        );
    }
}

/// A single delivered discovery event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryEvent {
    pub identity: Identity,
    pub kind: Transition,
    pub name: Option<String>,
}

/// Sink that forwards events into an unbounded channel.
///
/// Lets a consumer process events at its own pace. A closed receiver is
/// tolerated: delivery failures never propagate into the discovery loop.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DiscoveryEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving end for the consumer.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DiscoveryEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DiscoveryEventSink for ChannelSink {
    fn on_transition(&self, identity: &Identity, kind: Transition, name: Option<&str>) {
        let event = DiscoveryEvent {
            identity: *identity,
            kind,
            name: name.map(str::to_string),
        };
        if self.tx.send(event).is_err() {
            debug!("Event receiver gone, dropping {} for {}", kind, identity);
        }
    }
}
