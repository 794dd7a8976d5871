// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Identity and locator types shared by configuration and protocol.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// Server/participant identity - opaque 12-byte prefix, unique per instance.
///
/// Rendered as dotted hex (`"57.50.30.5f..."`). Parsing accepts both the
/// dotted form and plain 24-character hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(pub [u8; 12]);

impl Identity {
    /// Byte length of an identity prefix.
    pub const LEN: usize = 12;

    /// Create an identity from raw prefix bytes.
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Raw prefix bytes.
    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl FromStr for Identity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: String = s.chars().filter(|c| *c != '.').collect();
        if hex.len() != Self::LEN * 2 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ParseError::InvalidIdentity(s.to_string()));
        }
        let mut bytes = [0u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| ParseError::InvalidIdentity(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Transport kind of a locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocatorKind {
    Udpv4,
    Udpv6,
}

/// Network endpoint where a participant or server can be reached.
///
/// Equality is structural: kind + address + port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Locator {
    pub kind: LocatorKind,
    pub address: IpAddr,
    pub port: u16,
}

impl Locator {
    /// Create a locator from an address and port; kind follows the family.
    pub fn new(address: IpAddr, port: u16) -> Self {
        let kind = match address {
            IpAddr::V4(_) => LocatorKind::Udpv4,
            IpAddr::V6(_) => LocatorKind::Udpv6,
        };
        Self {
            kind,
            address,
            port,
        }
    }

    /// Convert to a socket address for transport calls.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl From<SocketAddr> for Locator {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

impl FromStr for Locator {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: SocketAddr = s
            .parse()
            .map_err(|_| ParseError::InvalidLocator(s.to_string()))?;
        Ok(addr.into())
    }
}

impl Serialize for Locator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Locator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Identity + listening locators of a federated peer server.
///
/// The set of descriptors a server federates with is fixed at
/// configuration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteServerDescriptor {
    /// Remote server's identity prefix.
    pub prefix: Identity,

    /// Remote server's listening locators, in announcement order.
    pub locators: Vec<Locator>,
}

impl RemoteServerDescriptor {
    /// Create a descriptor for a remote server.
    pub fn new(prefix: Identity, locators: Vec<Locator>) -> Self {
        Self { prefix, locators }
    }
}

impl FromStr for RemoteServerDescriptor {
    type Err = ParseError;

    /// Parse the CLI form `prefix@host:port[,host:port...]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, rest) = s
            .split_once('@')
            .ok_or_else(|| ParseError::InvalidDescriptor(s.to_string()))?;
        let prefix: Identity = prefix.parse()?;
        let locators: Vec<Locator> = rest
            .split(',')
            .map(str::parse)
            .collect::<Result<_, _>>()?;
        if locators.is_empty() {
            return Err(ParseError::InvalidDescriptor(s.to_string()));
        }
        Ok(Self { prefix, locators })
    }
}

/// Parse error types.
#[derive(Debug, Clone)]
pub enum ParseError {
    InvalidIdentity(String),
    InvalidLocator(String),
    InvalidDescriptor(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidIdentity(s) => write!(f, "Invalid identity prefix: {}", s),
            Self::InvalidLocator(s) => write!(f, "Invalid locator: {}", s),
            Self::InvalidDescriptor(s) => {
                write!(f, "Invalid remote server descriptor: {}", s)
            }
        }
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_dotted_roundtrip() {
        let id: Identity = "57.50.30.5f.57.41.59.50.4f.53.54.30".parse().unwrap();
        assert_eq!(id.to_string(), "57.50.30.5f.57.41.59.50.4f.53.54.30");
    }

    #[test]
    fn test_identity_plain_hex() {
        let dotted: Identity = "44.53.00.5f.45.50.52.4f.53.49.4d.41".parse().unwrap();
        let plain: Identity = "4453005f4550524f53494d41".parse().unwrap();
        assert_eq!(dotted, plain);
    }

    #[test]
    fn test_identity_invalid() {
        assert!("".parse::<Identity>().is_err());
        assert!("44.53.00".parse::<Identity>().is_err());
        assert!("zz.53.00.5f.45.50.52.4f.53.49.4d.41".parse::<Identity>().is_err());
    }

    #[test]
    fn test_identity_serde() {
        let id = Identity::from_bytes(*b"waypost-srv0");
        let json = serde_json::to_string(&id).unwrap();
        let back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn test_locator_parse() {
        let loc: Locator = "127.0.0.1:11811".parse().unwrap();
        assert_eq!(loc.kind, LocatorKind::Udpv4);
        assert_eq!(loc.port, 11811);
        assert_eq!(loc.to_string(), "127.0.0.1:11811");
    }

    #[test]
    fn test_locator_v6_kind() {
        let loc: Locator = "[::1]:11811".parse().unwrap();
        assert_eq!(loc.kind, LocatorKind::Udpv6);
    }

    #[test]
    fn test_locator_structural_equality() {
        let a: Locator = "10.0.0.1:7400".parse().unwrap();
        let b: Locator = "10.0.0.1:7400".parse().unwrap();
        let c: Locator = "10.0.0.1:7401".parse().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_descriptor_parse() {
        let desc: RemoteServerDescriptor =
            "44.53.01.5f.45.50.52.4f.53.49.4d.41@127.0.0.1:11812"
                .parse()
                .unwrap();
        assert_eq!(desc.locators.len(), 1);
        assert_eq!(desc.locators[0].port, 11812);
    }

    #[test]
    fn test_descriptor_multiple_locators() {
        let desc: RemoteServerDescriptor =
            "44.53.01.5f.45.50.52.4f.53.49.4d.41@10.0.0.1:11812,10.0.0.2:11812"
                .parse()
                .unwrap();
        assert_eq!(desc.locators.len(), 2);
    }

    #[test]
    fn test_descriptor_missing_at() {
        assert!("127.0.0.1:11812".parse::<RemoteServerDescriptor>().is_err());
    }
}
