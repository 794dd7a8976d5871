// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Announcement wire protocol.
//!
//! One JSON document per UDP datagram. This is the server's own
//! presence protocol, not interoperable with SPDP/SEDP wire encodings.
//!
//! ```text
//! {"type":"announce","prefix":"...","name":"...","locators":[...],
//!  "server":true,"view":[...]}
//! {"type":"withdraw","prefix":"..."}
//! ```

use crate::identity::{Identity, Locator};
use serde::{Deserialize, Serialize};

/// Messages exchanged between participants and discovery servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Announcement {
    /// Presence announcement; doubles as lease renewal.
    #[serde(rename = "announce")]
    Announce(AnnounceBody),

    /// Graceful departure.
    #[serde(rename = "withdraw")]
    Withdraw { prefix: Identity },
}

impl Announcement {
    /// Identity of the sender.
    pub fn prefix(&self) -> Identity {
        match self {
            Self::Announce(body) => body.prefix,
            Self::Withdraw { prefix } => *prefix,
        }
    }

    /// Encode to a JSON datagram, enforcing the size limit.
    pub fn encode(&self, max_size: usize) -> Result<Vec<u8>, ProtocolError> {
        let bytes =
            serde_json::to_vec(self).map_err(|e| ProtocolError::Serialize(e.to_string()))?;
        if bytes.len() > max_size {
            return Err(ProtocolError::TooLarge {
                size: bytes.len(),
                max: max_size,
            });
        }
        Ok(bytes)
    }

    /// Decode a received datagram.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::Invalid(e.to_string()))
    }
}

/// Body of an `announce` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnounceBody {
    /// Sender identity.
    pub prefix: Identity,

    /// Sender name.
    #[serde(default)]
    pub name: Option<String>,

    /// Locators the sender listens on.
    #[serde(default)]
    pub locators: Vec<Locator>,

    /// True when the sender is itself a discovery server.
    #[serde(default)]
    pub server: bool,

    /// The sender's current participant view, gossiped so federated
    /// servers converge. Empty for plain participants.
    #[serde(default)]
    pub view: Vec<PeerSummary>,
}

/// One entry of a gossiped participant view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSummary {
    pub prefix: Identity,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub locators: Vec<Locator>,
    #[serde(default)]
    pub server: bool,
}

/// Protocol error types.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    Invalid(String),
    Serialize(String),
    TooLarge { size: usize, max: usize },
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid(s) => write!(f, "Invalid message: {}", s),
            Self::Serialize(s) => write!(f, "Serialize error: {}", s),
            Self::TooLarge { size, max } => {
                write!(f, "Message too large: {} > {}", size, max)
            }
        }
    }
}

impl std::error::Error for ProtocolError {}
