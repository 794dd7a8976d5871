// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multi-node discovery integration tests.
//!
//! Exercises the full announcement path over loopback UDP: participant
//! lifecycle (discovered, dropped, removed), two-server federation and
//! view gossip. Lease durations are kept short so lease expiry is
//! observable within a few seconds of wall-clock time.

use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedReceiver;
use waypost::{
    AnnounceBody, Announcement, ChannelSink, DiscoveryEvent, DiscoveryServer, Identity, Locator,
    RemoteServerDescriptor, ServerConfig, ServerState, Transition,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(15);

fn make_identity(id: u8) -> Identity {
    let mut bytes = [0u8; 12];
    bytes[0] = id;
    bytes[11] = 0xee;
    Identity::from_bytes(bytes)
}

fn test_config(identity: Identity) -> ServerConfig {
    ServerConfig {
        identity,
        name: format!("test-server-{:02x}", identity.as_bytes()[0]),
        listen_locators: vec!["127.0.0.1:0".parse().unwrap()],
        lease_duration_secs: 2,
        announcement_period_secs: 1,
        ..Default::default()
    }
}

/// A fake participant: a bare UDP socket speaking the announcement
/// protocol.
struct TestParticipant {
    socket: UdpSocket,
    identity: Identity,
    name: String,
}

impl TestParticipant {
    async fn new(id: u8, name: &str) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        Self {
            socket,
            identity: make_identity(id),
            name: name.to_string(),
        }
    }

    fn locator(&self) -> Locator {
        self.socket.local_addr().unwrap().into()
    }

    async fn announce_to(&self, target: &Locator) {
        let msg = Announcement::Announce(AnnounceBody {
            prefix: self.identity,
            name: Some(self.name.clone()),
            locators: vec![self.locator()],
            server: false,
            view: vec![],
        });
        let bytes = msg.encode(64 * 1024).unwrap();
        self.socket
            .send_to(&bytes, target.socket_addr())
            .await
            .unwrap();
    }

    async fn withdraw_from(&self, target: &Locator) {
        let msg = Announcement::Withdraw {
            prefix: self.identity,
        };
        let bytes = msg.encode(64 * 1024).unwrap();
        self.socket
            .send_to(&bytes, target.socket_addr())
            .await
            .unwrap();
    }
}

/// Wait for the next event for `identity`, ignoring others.
async fn wait_for(
    rx: &mut UnboundedReceiver<DiscoveryEvent>,
    identity: Identity,
) -> DiscoveryEvent {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if event.identity == identity {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for discovery event")
}

#[tokio::test]
async fn participant_discovered_then_dropped_on_lease_expiry() {
    let (sink, mut events) = ChannelSink::new();
    let server =
        DiscoveryServer::with_sink(test_config(make_identity(0xa0)), std::sync::Arc::new(sink))
            .unwrap();
    server.start().await.unwrap();
    let locator = server.local_locators().await[0];

    let participant = TestParticipant::new(1, "sensor-1").await;
    participant.announce_to(&locator).await;

    let discovered = wait_for(&mut events, participant.identity).await;
    assert_eq!(discovered.kind, Transition::Discovered);
    assert_eq!(discovered.name.as_deref(), Some("sensor-1"));
    assert_eq!(server.participant_count().await, 1);

    // Never announce again: the lease (2s) runs out and the sweeper
    // reports an ungraceful drop.
    let dropped = wait_for(&mut events, participant.identity).await;
    assert_eq!(dropped.kind, Transition::Dropped);
    assert_eq!(server.participant_count().await, 0);

    server.stop().await;
}

#[tokio::test]
async fn renewal_within_lease_emits_no_duplicate_events() {
    let (sink, mut events) = ChannelSink::new();
    let server =
        DiscoveryServer::with_sink(test_config(make_identity(0xa1)), std::sync::Arc::new(sink))
            .unwrap();
    server.start().await.unwrap();
    let locator = server.local_locators().await[0];

    let participant = TestParticipant::new(2, "renewer").await;
    participant.announce_to(&locator).await;
    let discovered = wait_for(&mut events, participant.identity).await;
    assert_eq!(discovered.kind, Transition::Discovered);

    // Renew a few times inside the lease window.
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        participant.announce_to(&locator).await;
    }

    // No event may have been emitted for the renewals.
    assert!(events.try_recv().is_err());
    assert_eq!(server.participant_count().await, 1);

    server.stop().await;
}

#[tokio::test]
async fn withdrawal_is_removed_not_dropped() {
    let (sink, mut events) = ChannelSink::new();
    let server =
        DiscoveryServer::with_sink(test_config(make_identity(0xa2)), std::sync::Arc::new(sink))
            .unwrap();
    server.start().await.unwrap();
    let locator = server.local_locators().await[0];

    let participant = TestParticipant::new(3, "leaver").await;
    participant.announce_to(&locator).await;
    wait_for(&mut events, participant.identity).await;

    participant.withdraw_from(&locator).await;
    let removed = wait_for(&mut events, participant.identity).await;
    assert_eq!(removed.kind, Transition::Removed);
    assert_eq!(server.participant_count().await, 0);

    server.stop().await;
}

#[tokio::test]
async fn two_servers_federate_within_one_announcement_period() {
    // Server A federates with nobody; server B lists A. A must still
    // learn B's identity passively through B's announcements.
    let (sink_a, mut events_a) = ChannelSink::new();
    let server_a =
        DiscoveryServer::with_sink(test_config(make_identity(0xb1)), std::sync::Arc::new(sink_a))
            .unwrap();
    server_a.start().await.unwrap();
    let locator_a = server_a.local_locators().await[0];

    let (sink_b, mut events_b) = ChannelSink::new();
    let mut config_b = test_config(make_identity(0xb2));
    config_b.remote_servers = vec![RemoteServerDescriptor::new(
        make_identity(0xb1),
        vec![locator_a],
    )];
    let server_b = DiscoveryServer::with_sink(config_b, std::sync::Arc::new(sink_b)).unwrap();
    server_b.start().await.unwrap();

    // A sees B (passive), B sees A (reciprocal announcement).
    let b_at_a = wait_for(&mut events_a, make_identity(0xb2)).await;
    assert_eq!(b_at_a.kind, Transition::Discovered);
    let a_at_b = wait_for(&mut events_b, make_identity(0xb1)).await;
    assert_eq!(a_at_b.kind, Transition::Discovered);

    assert_eq!(server_b.federated_count().await, 1);

    server_b.stop().await;
    server_a.stop().await;
}

#[tokio::test]
async fn gossiped_view_and_withdrawal_relay_reach_federated_peer() {
    let (sink_a, mut events_a) = ChannelSink::new();
    let server_a =
        DiscoveryServer::with_sink(test_config(make_identity(0xc1)), std::sync::Arc::new(sink_a))
            .unwrap();
    server_a.start().await.unwrap();
    let locator_a = server_a.local_locators().await[0];

    let (sink_b, mut events_b) = ChannelSink::new();
    let mut config_b = test_config(make_identity(0xc2));
    config_b.remote_servers = vec![RemoteServerDescriptor::new(
        make_identity(0xc1),
        vec![locator_a],
    )];
    let server_b = DiscoveryServer::with_sink(config_b, std::sync::Arc::new(sink_b)).unwrap();
    server_b.start().await.unwrap();
    let locator_b = server_b.local_locators().await[0];

    // Participant registers at B only; A must learn it from B's
    // gossiped view.
    let participant = TestParticipant::new(4, "gossiped").await;
    participant.announce_to(&locator_b).await;

    let at_b = wait_for(&mut events_b, participant.identity).await;
    assert_eq!(at_b.kind, Transition::Discovered);
    let at_a = wait_for(&mut events_a, participant.identity).await;
    assert_eq!(at_a.kind, Transition::Discovered);
    assert_eq!(at_a.name.as_deref(), Some("gossiped"));

    // Graceful withdrawal at B is relayed to A: both report REMOVED,
    // neither waits for lease expiry.
    participant.withdraw_from(&locator_b).await;
    let removed_b = wait_for(&mut events_b, participant.identity).await;
    assert_eq!(removed_b.kind, Transition::Removed);
    let removed_a = wait_for(&mut events_a, participant.identity).await;
    assert_eq!(removed_a.kind, Transition::Removed);

    server_b.stop().await;
    server_a.stop().await;
}

#[tokio::test]
async fn stopping_server_withdraws_from_peers() {
    let (sink_a, mut events_a) = ChannelSink::new();
    let server_a =
        DiscoveryServer::with_sink(test_config(make_identity(0xd1)), std::sync::Arc::new(sink_a))
            .unwrap();
    server_a.start().await.unwrap();
    let locator_a = server_a.local_locators().await[0];

    let mut config_b = test_config(make_identity(0xd2));
    config_b.remote_servers = vec![RemoteServerDescriptor::new(
        make_identity(0xd1),
        vec![locator_a],
    )];
    let server_b = DiscoveryServer::new(config_b).unwrap();
    server_b.start().await.unwrap();

    // Wait until A tracks B, then stop B gracefully.
    let discovered = wait_for(&mut events_a, make_identity(0xd2)).await;
    assert_eq!(discovered.kind, Transition::Discovered);

    server_b.stop().await;
    assert_eq!(server_b.state().await, ServerState::Stopped);

    let removed = wait_for(&mut events_a, make_identity(0xd2)).await;
    assert_eq!(removed.kind, Transition::Removed);

    server_a.stop().await;
}
