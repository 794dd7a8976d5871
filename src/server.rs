// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery server core implementation.

use crate::config::{ConfigError, ServerConfig};
use crate::identity::{Identity, Locator};
use crate::security::{SecurityContext, SecurityError};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub mod events;
pub mod federation;
pub mod protocol;
pub mod tracker;
pub mod transport;

pub use events::{ChannelSink, DiscoveryEvent, DiscoveryEventSink, ParticipantCounter};
pub use federation::{Federation, FederationError};
pub use protocol::{AnnounceBody, Announcement, PeerSummary};
pub use tracker::{LivelinessTracker, PeerRecord, Transition};
pub use transport::{AnnouncementSocket, TransportError};

/// How long [`DiscoveryServer::stop`] waits for tasks to finish before
/// aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Server lifecycle states. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Discovery server - centralized rendezvous point for a pub/sub peer
/// network.
///
/// Participants announce only to the server; the server tracks their
/// leases, redistributes the resulting view, and federates with other
/// servers configured in [`ServerConfig::remote_servers`].
#[derive(Clone)]
pub struct DiscoveryServer {
    config: Arc<ServerConfig>,
    security: Arc<Option<SecurityContext>>,
    tracker: Arc<RwLock<LivelinessTracker>>,
    federation: Arc<RwLock<Federation>>,
    sink: Arc<dyn DiscoveryEventSink>,
    state: Arc<RwLock<ServerState>>,
    bound: Arc<RwLock<Vec<Locator>>>,
    sockets: Arc<RwLock<Vec<AnnouncementSocket>>>,
    tasks: Arc<std::sync::Mutex<Vec<JoinHandle<()>>>>,
    shutdown: Arc<Notify>,
    stopping: Arc<AtomicBool>,
}

impl DiscoveryServer {
    /// Create a server with the default counting sink.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        Self::with_sink(config, Arc::new(ParticipantCounter::new()))
    }

    /// Create a server delivering discovery events to `sink`.
    pub fn with_sink(
        config: ServerConfig,
        sink: Arc<dyn DiscoveryEventSink>,
    ) -> Result<Self, ServerError> {
        config.validate().map_err(ServerError::Config)?;
        let security =
            SecurityContext::from_properties(&config.security).map_err(ServerError::Security)?;

        let tracker = LivelinessTracker::new(config.lease_duration());
        let federation = Federation::new(&config.remote_servers);

        Ok(Self {
            config: Arc::new(config),
            security: Arc::new(security),
            tracker: Arc::new(RwLock::new(tracker)),
            federation: Arc::new(RwLock::new(federation)),
            sink,
            state: Arc::new(RwLock::new(ServerState::Created)),
            bound: Arc::new(RwLock::new(Vec::new())),
            sockets: Arc::new(RwLock::new(Vec::new())),
            tasks: Arc::new(std::sync::Mutex::new(Vec::new())),
            shutdown: Arc::new(Notify::new()),
            stopping: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Bind the configured locators and launch the announcement,
    /// receive and sweep tasks.
    ///
    /// Bind failures are fatal; the server does not retry and ends up
    /// `Stopped`. Federation, by contrast, is attempted forever on the
    /// announcement cadence and never fails startup.
    pub async fn start(&self) -> Result<(), ServerError> {
        {
            let mut state = self.state.write().await;
            if *state != ServerState::Created {
                return Err(ServerError::InvalidState(*state));
            }
            *state = ServerState::Starting;
        }

        if let Some(ctx) = self.security.as_ref() {
            info!("Security enabled: auth={}", ctx.authentication);
            if let Some(access) = &ctx.access_control {
                info!("Access control plugin: {}", access);
            }
            if let Some(crypto) = &ctx.cryptography {
                info!("Cryptographic plugin: {}", crypto);
            }
        }

        let mut sockets = Vec::new();
        let mut bound = Vec::new();
        for locator in &self.config.listen_locators {
            let result = AnnouncementSocket::bind(
                locator,
                self.config.ttl,
                self.config.max_datagram_size,
            )
            .await
            .and_then(|socket| Ok((socket.local_locator()?, socket)));
            match result {
                Ok((local, socket)) => {
                    bound.push(local);
                    sockets.push(socket);
                }
                Err(e) => {
                    // No retry path: a failed start is terminal.
                    *self.state.write().await = ServerState::Stopped;
                    return Err(ServerError::Bind(e.to_string()));
                }
            }
        }

        *self.bound.write().await = bound.clone();
        *self.sockets.write().await = sockets.clone();

        for locator in &bound {
            info!("Discovery server {} listening on {}", self.config.identity, locator);
        }
        let remote_count = self.federation.read().await.remote_count();
        if remote_count > 0 {
            info!("Federating with {} remote server(s)", remote_count);
        }

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(Self::announcer_task(
            self.config.clone(),
            bound,
            sockets[0].clone(),
            self.tracker.clone(),
            self.shutdown.clone(),
            self.stopping.clone(),
        )));
        tasks.push(tokio::spawn(Self::sweeper_task(
            self.config.clone(),
            self.tracker.clone(),
            self.federation.clone(),
            self.sink.clone(),
            self.shutdown.clone(),
            self.stopping.clone(),
        )));
        for socket in sockets {
            tasks.push(tokio::spawn(Self::receive_task(
                self.config.clone(),
                socket,
                self.tracker.clone(),
                self.federation.clone(),
                self.sink.clone(),
                self.shutdown.clone(),
                self.stopping.clone(),
            )));
        }
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).extend(tasks);

        *self.state.write().await = ServerState::Running;
        Ok(())
    }

    /// Run until [`shutdown`](Self::shutdown) is signalled, then stop.
    pub async fn run(&self) -> Result<(), ServerError> {
        self.start().await?;

        let notified = self.shutdown.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if !self.stopping.load(Ordering::SeqCst) {
            notified.await;
        }

        self.stop().await;
        Ok(())
    }

    /// Signal the server to shut down.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    /// Graceful stop: signal the tasks, join them (bounded, abort as
    /// fallback), send a withdrawal announcement and release the
    /// transport.
    pub async fn stop(&self) {
        {
            let mut state = self.state.write().await;
            match *state {
                ServerState::Stopping | ServerState::Stopped => return,
                _ => *state = ServerState::Stopping,
            }
        }
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();

        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        for mut task in tasks {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }

        // Withdrawal announcement so peers observe a graceful departure
        // rather than a lease timeout.
        let socket = self.sockets.read().await.first().cloned();
        if let Some(socket) = socket {
            let withdraw = Announcement::Withdraw {
                prefix: self.config.identity,
            };
            let targets = {
                let tracker = self.tracker.read().await;
                let federation = self.federation.read().await;
                announce_targets(&tracker, &federation, &[])
            };
            for target in targets {
                if let Err(e) = socket.send(&withdraw, &target).await {
                    debug!("Withdrawal to {} failed: {}", target, e);
                }
            }
        }

        self.sockets.write().await.clear();
        *self.state.write().await = ServerState::Stopped;
        info!("Discovery server {} stopped", self.config.identity);
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ServerState {
        *self.state.read().await
    }

    /// Whether the server is in the running state.
    pub async fn is_running(&self) -> bool {
        self.state().await == ServerState::Running
    }

    /// Number of currently tracked peers (participants and servers).
    pub async fn participant_count(&self) -> usize {
        self.tracker.read().await.len()
    }

    /// Number of configured remotes with established federation.
    pub async fn federated_count(&self) -> usize {
        self.federation.read().await.established_count()
    }

    /// Locators actually bound, resolved after `start` (relevant when a
    /// configured locator uses port 0).
    pub async fn local_locators(&self) -> Vec<Locator> {
        self.bound.read().await.clone()
    }

    /// Periodic self-announcement to federated servers and known peers.
    ///
    /// Runs decoupled from inbound processing so a receive burst can
    /// never delay the server's own liveliness renewal.
    async fn announcer_task(
        config: Arc<ServerConfig>,
        advertised: Vec<Locator>,
        socket: AnnouncementSocket,
        tracker: Arc<RwLock<LivelinessTracker>>,
        shutdown: Arc<Notify>,
        stopping: Arc<AtomicBool>,
    ) {
        let mut ticker = tokio::time::interval(config.announcement_period());
        loop {
            if stopping.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    Self::announce_once(&config, &advertised, &socket, &tracker).await;
                }
                _ = shutdown.notified() => {
                    debug!("Announcer shutting down");
                    break;
                }
            }
        }
    }

    async fn announce_once(
        config: &ServerConfig,
        advertised: &[Locator],
        socket: &AnnouncementSocket,
        tracker: &Arc<RwLock<LivelinessTracker>>,
    ) {
        let (view, peer_targets) = {
            let tracker = tracker.read().await;
            let view: Vec<PeerSummary> = tracker
                .peers()
                .map(|record| PeerSummary {
                    prefix: record.identity,
                    name: record.name.clone(),
                    locators: record.locators.clone(),
                    server: record.is_server,
                })
                .collect();
            let targets: Vec<(Locator, Identity)> = tracker
                .peers()
                .flat_map(|record| {
                    record
                        .locators
                        .iter()
                        .map(|loc| (*loc, record.identity))
                        .collect::<Vec<_>>()
                })
                .collect();
            (view, targets)
        };

        let announce = Announcement::Announce(AnnounceBody {
            prefix: config.identity,
            name: Some(config.name.clone()),
            locators: advertised.to_vec(),
            server: true,
            view,
        });

        let own: HashSet<SocketAddr> = advertised.iter().map(Locator::socket_addr).collect();
        let mut sent: HashSet<SocketAddr> = HashSet::new();

        // Configured remotes first: every listed locator, every period,
        // whether federation is established yet or not.
        for remote in &config.remote_servers {
            for locator in &remote.locators {
                if own.contains(&locator.socket_addr()) || !sent.insert(locator.socket_addr()) {
                    continue;
                }
                if let Err(e) = socket.send(&announce, locator).await {
                    warn!(
                        "{}",
                        FederationError::Unreachable {
                            prefix: remote.prefix,
                            reason: e.to_string(),
                        }
                    );
                }
            }
        }

        // Then every tracked peer, so participants receive the view and
        // passively discovered servers see our renewals.
        for (locator, identity) in peer_targets {
            if own.contains(&locator.socket_addr()) || !sent.insert(locator.socket_addr()) {
                continue;
            }
            if let Err(e) = socket.send(&announce, &locator).await {
                debug!("Announcement to {} ({}) failed: {}", locator, identity, e);
            }
        }
    }

    /// Periodic lease sweep; emits `Dropped` for expired peers.
    async fn sweeper_task(
        config: Arc<ServerConfig>,
        tracker: Arc<RwLock<LivelinessTracker>>,
        federation: Arc<RwLock<Federation>>,
        sink: Arc<dyn DiscoveryEventSink>,
        shutdown: Arc<Notify>,
        stopping: Arc<AtomicBool>,
    ) {
        let mut ticker = tokio::time::interval(config.sweep_interval());
        loop {
            if stopping.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    let dropped = tracker.write().await.sweep(Instant::now());
                    for record in dropped {
                        if record.is_server {
                            federation.write().await.mark_lost(&record.identity);
                            warn!("Federated server {} lease expired", record.identity);
                        }
                        sink.on_transition(
                            &record.identity,
                            Transition::Dropped,
                            record.name.as_deref(),
                        );
                    }
                }
                _ = shutdown.notified() => {
                    debug!("Sweeper shutting down");
                    break;
                }
            }
        }
    }

    /// Inbound announcement processing for one bound socket.
    async fn receive_task(
        config: Arc<ServerConfig>,
        socket: AnnouncementSocket,
        tracker: Arc<RwLock<LivelinessTracker>>,
        federation: Arc<RwLock<Federation>>,
        sink: Arc<dyn DiscoveryEventSink>,
        shutdown: Arc<Notify>,
        stopping: Arc<AtomicBool>,
    ) {
        let mut buf = vec![0u8; config.max_datagram_size];
        loop {
            if stopping.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                result = socket.recv(&mut buf) => {
                    match result {
                        Ok((announcement, source)) => {
                            Self::process_announcement(
                                &config,
                                &socket,
                                announcement,
                                source,
                                &tracker,
                                &federation,
                                &sink,
                            )
                            .await;
                        }
                        Err(TransportError::Protocol(e)) => {
                            debug!("Ignoring malformed datagram: {}", e);
                        }
                        Err(e) => {
                            warn!("Receive error: {}", e);
                        }
                    }
                }
                _ = shutdown.notified() => {
                    debug!("Receive loop shutting down");
                    break;
                }
            }
        }
    }

    /// Apply one inbound announcement to the peer table and emit the
    /// resulting transitions.
    ///
    /// Sink dispatch happens after the table lock is released, so a
    /// slow observer cannot stall refresh or sweep.
    async fn process_announcement(
        config: &ServerConfig,
        socket: &AnnouncementSocket,
        announcement: Announcement,
        source: SocketAddr,
        tracker: &Arc<RwLock<LivelinessTracker>>,
        federation: &Arc<RwLock<Federation>>,
        sink: &Arc<dyn DiscoveryEventSink>,
    ) {
        if announcement.prefix() == config.identity {
            return;
        }

        match announcement {
            Announcement::Announce(body) => {
                let now = Instant::now();
                let locators = if body.locators.is_empty() {
                    vec![source.into()]
                } else {
                    body.locators.clone()
                };

                let transition = tracker.write().await.refresh(
                    body.prefix,
                    body.name.clone(),
                    locators,
                    body.server,
                    now,
                );

                if body.server {
                    let newly = federation.write().await.mark_established(&body.prefix);
                    if newly {
                        info!("Federated with server {} at {}", body.prefix, source);
                    }
                }

                if let Some(kind) = transition {
                    debug!("Peer {} announced from {}", body.prefix, source);
                    sink.on_transition(&body.prefix, kind, body.name.as_deref());
                }

                // Merge the gossiped view so federated servers converge
                // on one participant set.
                for entry in body.view {
                    if entry.prefix == config.identity || entry.prefix == body.prefix {
                        continue;
                    }
                    let transition = tracker.write().await.refresh(
                        entry.prefix,
                        entry.name.clone(),
                        entry.locators,
                        entry.server,
                        now,
                    );
                    if let Some(kind) = transition {
                        sink.on_transition(&entry.prefix, kind, entry.name.as_deref());
                    }
                }
            }

            Announcement::Withdraw { prefix } => {
                let record = tracker.write().await.remove(&prefix);
                let Some(record) = record else {
                    debug!("Withdrawal for unknown peer {}", prefix);
                    return;
                };

                info!("Peer {} withdrew", prefix);
                if record.is_server {
                    federation.write().await.mark_lost(&prefix);
                }
                sink.on_transition(&prefix, Transition::Removed, record.name.as_deref());

                // Relay the withdrawal to configured remotes exactly
                // once: the identity is gone from the table now, so a
                // relayed copy coming back is ignored.
                let withdraw = Announcement::Withdraw { prefix };
                for remote in &config.remote_servers {
                    if remote.prefix == prefix {
                        continue;
                    }
                    for locator in &remote.locators {
                        if let Err(e) = socket.send(&withdraw, locator).await {
                            debug!("Withdrawal relay to {} failed: {}", locator, e);
                        }
                    }
                }
            }
        }
    }
}

/// Build the deduplicated announcement target list: configured remote
/// locators plus every tracked peer's locators, minus our own.
fn announce_targets(
    tracker: &LivelinessTracker,
    federation: &Federation,
    own: &[Locator],
) -> Vec<Locator> {
    let own: HashSet<SocketAddr> = own.iter().map(Locator::socket_addr).collect();
    let mut seen: HashSet<SocketAddr> = HashSet::new();
    let mut targets = Vec::new();
    for locator in federation
        .targets()
        .into_iter()
        .chain(tracker.peers().flat_map(|r| r.locators.iter().copied()))
    {
        if !own.contains(&locator.socket_addr()) && seen.insert(locator.socket_addr()) {
            targets.push(locator);
        }
    }
    targets
}

/// Server error types.
#[derive(Debug)]
pub enum ServerError {
    Config(ConfigError),
    Security(SecurityError),
    Bind(String),
    InvalidState(ServerState),
    Io(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Configuration error: {}", e),
            Self::Security(e) => write!(f, "Security error: {}", e),
            Self::Bind(s) => write!(f, "Bind error: {}", s),
            Self::InvalidState(state) => {
                write!(f, "Operation invalid in state {}", state)
            }
            Self::Io(s) => write!(f, "I/O error: {}", s),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<ConfigError> for ServerError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
