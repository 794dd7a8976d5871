// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Waypost - centralized discovery server for pub/sub peer networks.
//!
//! In an unmanaged peer network every node multicasts its presence and
//! discovery traffic grows quadratically with node count. Waypost is the
//! rendezvous point that replaces this: participants announce only to
//! the server, which tracks their leases and redistributes the
//! reachability view, cutting discovery traffic to near-linear.
//!
//! - Liveliness via lease expiry: a peer that stops announcing is
//!   dropped after `lease_duration`; graceful withdrawal is reported
//!   separately.
//! - Federation: several servers can be chained; each announces to its
//!   configured remotes and gossips its participant view, converging
//!   eventually.
//! - Observer model: applications watch the DISCOVERED/DROPPED/REMOVED
//!   stream through a [`DiscoveryEventSink`].
//!
//! # Example
//!
//! ```ignore
//! use waypost::{DiscoveryServer, ServerConfig};
//!
//! let config = ServerConfig::default(); // 127.0.0.1:11811, lease 8s
//! let server = DiscoveryServer::new(config)?;
//! server.start().await?;
//! ```

pub mod config;
pub mod identity;
pub mod security;
pub mod server;

pub use config::{ConfigError, ServerConfig};
pub use identity::{Identity, Locator, LocatorKind, ParseError, RemoteServerDescriptor};
pub use security::{SecurityContext, SecurityError};
pub use server::{
    AnnounceBody, Announcement, AnnouncementSocket, ChannelSink, DiscoveryEvent,
    DiscoveryEventSink, DiscoveryServer, Federation, FederationError, LivelinessTracker,
    ParticipantCounter, PeerRecord, PeerSummary, ServerError, ServerState, Transition,
    TransportError,
};
