// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP announcement transport.
//!
//! Thin wrapper around [`tokio::net::UdpSocket`]: one announcement per
//! datagram. Everything above this module deals in [`Announcement`]
//! values and [`Locator`]s, never raw sockets.

use super::protocol::{Announcement, ProtocolError};
use crate::identity::Locator;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// A bound announcement socket. Cheap to clone; the underlying socket
/// is shared.
#[derive(Clone)]
pub struct AnnouncementSocket {
    socket: Arc<UdpSocket>,
    max_datagram_size: usize,
}

impl AnnouncementSocket {
    /// Bind to a locator. Port 0 selects an ephemeral port; use
    /// [`local_locator`](Self::local_locator) to learn the actual one.
    pub async fn bind(
        locator: &Locator,
        ttl: u32,
        max_datagram_size: usize,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(locator.socket_addr())
            .await
            .map_err(|e| TransportError::Bind(locator.to_string(), e.to_string()))?;
        socket.set_ttl(ttl).map_err(TransportError::from)?;
        Ok(Self {
            socket: Arc::new(socket),
            max_datagram_size,
        })
    }

    /// The locator this socket is actually bound to.
    pub fn local_locator(&self) -> Result<Locator, TransportError> {
        Ok(self.socket.local_addr().map_err(TransportError::from)?.into())
    }

    /// Send one announcement to a target locator.
    pub async fn send(
        &self,
        announcement: &Announcement,
        target: &Locator,
    ) -> Result<(), TransportError> {
        let bytes = announcement.encode(self.max_datagram_size)?;
        self.socket
            .send_to(&bytes, target.socket_addr())
            .await
            .map_err(TransportError::from)?;
        Ok(())
    }

    /// Receive and decode one announcement.
    ///
    /// `buf` must be at least `max_datagram_size` bytes; callers keep a
    /// reusable buffer across receives.
    pub async fn recv(
        &self,
        buf: &mut [u8],
    ) -> Result<(Announcement, SocketAddr), TransportError> {
        let (len, source) = self
            .socket
            .recv_from(buf)
            .await
            .map_err(TransportError::from)?;
        let announcement = Announcement::decode(&buf[..len])?;
        Ok((announcement, source))
    }

    /// Maximum datagram size this socket accepts.
    pub fn max_datagram_size(&self) -> usize {
        self.max_datagram_size
    }
}

/// Transport error types.
#[derive(Debug)]
pub enum TransportError {
    /// The requested locator could not be bound.
    Bind(String, String),
    /// Socket-level failure.
    Io(String),
    /// Malformed or oversized announcement.
    Protocol(ProtocolError),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bind(locator, e) => write!(f, "Cannot bind {}: {}", locator, e),
            Self::Io(s) => write!(f, "I/O error: {}", s),
            Self::Protocol(e) => write!(f, "Protocol error: {}", e),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<ProtocolError> for TransportError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}
