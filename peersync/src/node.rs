//! Node state machine: peer discovery, clock synchronization, timers
//!
//! The node runs a single event loop over one UDP socket. Handlers never
//! touch the socket directly; outgoing packets are queued on an outbox
//! that the loop drains after every event, which keeps the whole state
//! machine synchronous and testable.

use crate::clock::{apply_offset, compute_offset, NaturalClock};
use crate::packets::{hex_prefix, Packet, MAX_PACKET_SIZE};
use crate::peers::PeerSet;
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::net::{SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Synchronization level of the administratively chosen time source.
pub const CLOCK_LEADER: u8 = 0;
/// Synchronization level of a node with no upstream.
pub const CLOCK_UNSYNCHRONIZED: u8 = 255;

/// Delay before a fresh leader sends its first SYNC_START.
const LEADER_SYNC_DELAY: Duration = Duration::from_secs(2);
/// Period between SYNC_START rounds.
const SYNC_START_PERIOD: Duration = Duration::from_secs(5);
/// How long a follower trusts its upstream without a new SYNC_START.
const SYNC_CHECK_DELAY: Duration = Duration::from_secs(20);
/// How long a follower waits for DELAY_RESPONSE before giving up.
const DELAY_RESPONSE_WAIT: Duration = Duration::from_secs(5);
/// Acceptance window for DELAY_REQUEST after our last SYNC_START round.
const DELAY_REQUEST_WINDOW_MS: u64 = 5_000;

/// Receive timeout pumping the periodic timers.
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);

pub struct Node {
    clock: NaturalClock,

    // Networking
    my_addresses: Vec<SocketAddrV4>,
    known_peer: Option<SocketAddrV4>,

    // Peers
    peer_list: PeerSet,
    waiting_for_hello_reply: bool,
    waiting_for_ack_connect: PeerSet,
    asked_to_synchronize: PeerSet,

    // Clock synchronization
    sync_level: u8,
    offset_ms: i64,
    synchronized_peer: Option<SocketAddrV4>,
    next_sync_start: Option<Instant>,
    next_sync_check: Option<Instant>,
    last_sync_start: Option<u64>,

    // In-flight synchronization handshake
    synchronizing: bool,
    synchronizing_level: u8,
    peer_to_sync: Option<SocketAddrV4>,
    delay_response_deadline: Option<Instant>,
    t1: u64,
    t2: u64,
    t3: u64,
    t4: u64,

    outbox: VecDeque<(Packet, SocketAddrV4)>,
}

impl Node {
    pub fn new(
        my_addresses: Vec<SocketAddrV4>,
        known_peer: Option<SocketAddrV4>,
        clock: NaturalClock,
    ) -> Self {
        Node {
            clock,
            my_addresses,
            known_peer,
            peer_list: PeerSet::new(),
            waiting_for_hello_reply: false,
            waiting_for_ack_connect: PeerSet::new(),
            asked_to_synchronize: PeerSet::new(),
            sync_level: CLOCK_UNSYNCHRONIZED,
            offset_ms: 0,
            synchronized_peer: None,
            next_sync_start: None,
            next_sync_check: None,
            last_sync_start: None,
            synchronizing: false,
            synchronizing_level: 0,
            peer_to_sync: None,
            delay_response_deadline: None,
            t1: 0,
            t2: 0,
            t3: 0,
            t4: 0,
            outbox: VecDeque::new(),
        }
    }

    /// Sends the initial HELLO to the configured peer, if any.
    pub fn start_discovery(&mut self) {
        if let Some(peer) = self.known_peer {
            self.waiting_for_hello_reply = true;
            self.send(Packet::Hello, peer);
            info!("sent HELLO to known peer {}", peer);
        }
    }

    /// Main loop: pump timers, receive with a 1-second timeout, handle.
    pub async fn run(mut self, socket: UdpSocket) -> std::io::Result<()> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];

        loop {
            self.check_timers();
            self.flush(&socket).await;

            match timeout(RECEIVE_TIMEOUT, socket.recv_from(&mut buf)).await {
                Err(_) => continue, // receive timeout; timers run next iteration
                Ok(Err(e)) => {
                    error!("recvfrom failed: {}", e);
                    continue;
                }
                Ok(Ok((len, from))) => {
                    let SocketAddr::V4(sender) = from else {
                        debug!("ignoring non-IPv4 datagram from {}", from);
                        continue;
                    };
                    self.handle_datagram(&buf[..len], sender);
                    self.flush(&socket).await;
                }
            }
        }
    }

    async fn flush(&mut self, socket: &UdpSocket) {
        while let Some((packet, dest)) = self.outbox.pop_front() {
            let encoded = match packet.encode() {
                Ok(encoded) => encoded,
                Err(e) => {
                    error!("refusing to send {} to {}: {}", packet.kind(), dest, e);
                    continue;
                }
            };
            match socket.send_to(&encoded, SocketAddr::V4(dest)).await {
                Ok(sent) if sent == encoded.len() => {
                    debug!("sent {} to {}", packet.kind(), dest);
                }
                Ok(_) => error!("incomplete {} sent to {}", packet.kind(), dest),
                Err(e) => error!("failed to send {} to {}: {}", packet.kind(), dest, e),
            }
        }
    }

    fn send(&mut self, packet: Packet, dest: SocketAddrV4) {
        self.outbox.push_back((packet, dest));
    }

    fn is_own_address(&self, addr: &SocketAddrV4) -> bool {
        self.my_addresses.contains(addr)
    }

    /// Synchronized clock: natural clock with the offset applied, or the
    /// plain natural clock while unsynchronized.
    pub fn synchronized_time(&self) -> u64 {
        let natural = self.clock.now_ms();
        if self.sync_level == CLOCK_UNSYNCHRONIZED {
            natural
        } else {
            apply_offset(natural, self.offset_ms)
        }
    }

    /// Decodes and dispatches one received datagram.
    pub fn handle_datagram(&mut self, raw: &[u8], sender: SocketAddrV4) {
        let packet = match Packet::decode(raw) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("discarding datagram from {}: {} [{}]", sender, e, hex_prefix(raw));
                return;
            }
        };
        debug!("received {} from {}", packet.kind(), sender);

        match packet {
            Packet::Hello => self.handle_hello(sender, raw),
            Packet::HelloReply { peers } => self.handle_hello_reply(sender, peers, raw),
            Packet::Connect => self.handle_connect(sender, raw),
            Packet::AckConnect => self.handle_ack_connect(sender, raw),
            Packet::SyncStart { sync_level, timestamp } => {
                self.handle_sync_start(sender, sync_level, timestamp, raw)
            }
            Packet::DelayRequest => self.handle_delay_request(sender, raw),
            Packet::DelayResponse { sync_level, timestamp } => {
                self.handle_delay_response(sender, sync_level, timestamp, raw)
            }
            Packet::Leader { sync_level } => self.handle_leader(sync_level, sender, raw),
            Packet::GetTime => self.handle_get_time(sender, raw),
            Packet::Time { .. } => {
                warn!("unexpected TIME from {} [{}]", sender, hex_prefix(raw));
            }
        }
    }

    fn handle_hello(&mut self, sender: SocketAddrV4, raw: &[u8]) {
        if self.is_own_address(&sender) {
            warn!("ignoring HELLO from own address {} [{}]", sender, hex_prefix(raw));
            return;
        }

        // Reply with everything we know except the requester and ourselves,
        // computed before the requester joins the list.
        let peers: Vec<SocketAddrV4> = self
            .peer_list
            .iter()
            .filter(|p| **p != sender && !self.is_own_address(p))
            .copied()
            .collect();
        let reply = Packet::HelloReply { peers };

        if reply.encode().is_err() {
            warn!("HELLO_REPLY for {} too large, dropping HELLO [{}]", sender, hex_prefix(raw));
            return;
        }
        if !self.peer_list.insert(sender) {
            warn!("peer list full, dropping HELLO from {} [{}]", sender, hex_prefix(raw));
            return;
        }
        self.send(reply, sender);
    }

    fn handle_hello_reply(&mut self, sender: SocketAddrV4, peers: Vec<SocketAddrV4>, raw: &[u8]) {
        if !self.waiting_for_hello_reply || self.known_peer != Some(sender) {
            warn!("unexpected HELLO_REPLY from {} [{}]", sender, hex_prefix(raw));
            return;
        }
        if self.is_own_address(&sender) {
            warn!("ignoring HELLO_REPLY from own address {} [{}]", sender, hex_prefix(raw));
            return;
        }
        for peer in &peers {
            if peer.port() == 0 || *peer == sender || self.is_own_address(peer) {
                warn!("invalid peer {} in HELLO_REPLY from {} [{}]", peer, sender, hex_prefix(raw));
                return;
            }
        }

        self.waiting_for_hello_reply = false;

        for peer in peers {
            self.waiting_for_ack_connect.insert(peer);
            self.send(Packet::Connect, peer);
        }
        self.peer_list.insert(sender);
        info!("discovered {} peers via {}", self.waiting_for_ack_connect.len(), sender);
    }

    fn handle_connect(&mut self, sender: SocketAddrV4, raw: &[u8]) {
        if self.peer_list.is_full() && !self.peer_list.contains(&sender) {
            warn!("peer list full, dropping CONNECT from {} [{}]", sender, hex_prefix(raw));
            return;
        }
        if self.is_own_address(&sender) {
            warn!("ignoring CONNECT from own address {} [{}]", sender, hex_prefix(raw));
            return;
        }
        self.send(Packet::AckConnect, sender);
        self.peer_list.insert(sender);
    }

    fn handle_ack_connect(&mut self, sender: SocketAddrV4, raw: &[u8]) {
        if !self.waiting_for_ack_connect.contains(&sender) {
            warn!("unexpected ACK_CONNECT from {} [{}]", sender, hex_prefix(raw));
            return;
        }
        if self.peer_list.is_full() && !self.peer_list.contains(&sender) {
            warn!("peer list full, dropping ACK_CONNECT from {} [{}]", sender, hex_prefix(raw));
            return;
        }
        if self.is_own_address(&sender) {
            warn!("ignoring ACK_CONNECT from own address {} [{}]", sender, hex_prefix(raw));
            return;
        }
        self.waiting_for_ack_connect.remove(&sender);
        self.peer_list.insert(sender);
    }

    fn handle_sync_start(&mut self, sender: SocketAddrV4, level: u8, timestamp: u64, raw: &[u8]) {
        let receive_time = self.clock.now_ms();

        if level >= CLOCK_UNSYNCHRONIZED - 1 || !self.peer_list.contains(&sender) {
            warn!("dropping SYNC_START from {} (level {}) [{}]", sender, level, hex_prefix(raw));
            return;
        }

        if self.synchronizing {
            return;
        }

        let synchronized_to_sender =
            self.sync_level < CLOCK_UNSYNCHRONIZED && self.synchronized_peer == Some(sender);

        if synchronized_to_sender {
            if level >= self.sync_level {
                // Our upstream is no longer above us; stand alone again.
                info!("upstream {} now at level {}, dropping to unsynchronized", sender, level);
                self.become_unsynchronized();
                return;
            }
            self.next_sync_check = Some(Instant::now() + SYNC_CHECK_DELAY);
        } else {
            let candidate = u16::from(level) + 1;
            // Accept only a strict improvement, and never mint the
            // reserved level 254.
            if candidate >= u16::from(self.sync_level)
                || candidate > u16::from(CLOCK_UNSYNCHRONIZED - 2)
            {
                return;
            }
        }

        self.synchronizing = true;
        self.synchronizing_level = level;
        self.t1 = timestamp;
        self.t2 = receive_time;
        self.peer_to_sync = Some(sender);

        self.t3 = self.clock.now_ms();
        self.send(Packet::DelayRequest, sender);
        self.delay_response_deadline = Some(Instant::now() + DELAY_RESPONSE_WAIT);
    }

    fn handle_delay_request(&mut self, sender: SocketAddrV4, raw: &[u8]) {
        let synchronized_receive_time = self.synchronized_time();
        let receive_time = self.clock.now_ms();

        let in_window = self
            .last_sync_start
            .is_some_and(|start| receive_time <= start + DELAY_REQUEST_WINDOW_MS);
        if !self.asked_to_synchronize.contains(&sender) || !in_window {
            warn!("unknown or late DELAY_REQUEST from {} [{}]", sender, hex_prefix(raw));
            return;
        }

        self.send(
            Packet::DelayResponse {
                sync_level: self.sync_level,
                timestamp: synchronized_receive_time,
            },
            sender,
        );
    }

    fn handle_delay_response(&mut self, sender: SocketAddrV4, level: u8, timestamp: u64, raw: &[u8]) {
        if !self.synchronizing || self.peer_to_sync != Some(sender) {
            warn!("not synchronizing with {}, dropping DELAY_RESPONSE [{}]", sender, hex_prefix(raw));
            return;
        }
        if level != self.synchronizing_level || timestamp < self.t1 {
            warn!("inconsistent DELAY_RESPONSE from {} [{}]", sender, hex_prefix(raw));
            return;
        }

        self.t4 = timestamp;

        // If we were not eligible to be anyone's upstream and this sync
        // makes us eligible, start our own rounds at once.
        if self.sync_level >= CLOCK_UNSYNCHRONIZED - 1
            && u16::from(level) + 1 < u16::from(CLOCK_UNSYNCHRONIZED - 1)
        {
            self.next_sync_start = Some(Instant::now());
        }

        self.sync_level = level + 1;
        self.offset_ms = compute_offset(self.t1, self.t2, self.t3, self.t4);
        self.synchronized_peer = Some(sender);
        self.next_sync_check = Some(Instant::now() + SYNC_CHECK_DELAY);

        self.synchronizing = false;
        self.delay_response_deadline = None;

        info!(
            "synchronized to {} at level {} (offset {} ms)",
            sender, self.sync_level, self.offset_ms
        );
    }

    fn handle_leader(&mut self, level: u8, sender: SocketAddrV4, raw: &[u8]) {
        match level {
            CLOCK_LEADER => {
                info!("became leader (directive from {})", sender);
                self.sync_level = CLOCK_LEADER;
                self.next_sync_start = Some(Instant::now() + LEADER_SYNC_DELAY);
            }
            CLOCK_UNSYNCHRONIZED => {
                if self.sync_level != CLOCK_LEADER {
                    warn!("LEADER 255 sent to non-leader by {} [{}]", sender, hex_prefix(raw));
                    return;
                }
                info!("stepping down as leader (directive from {})", sender);
                self.sync_level = CLOCK_UNSYNCHRONIZED;
            }
            other => {
                warn!("LEADER with unexpected level {} from {} [{}]", other, sender, hex_prefix(raw));
            }
        }
    }

    fn handle_get_time(&mut self, sender: SocketAddrV4, _raw: &[u8]) {
        let reply = Packet::Time {
            sync_level: self.sync_level,
            timestamp: self.synchronized_time(),
        };
        self.send(reply, sender);
    }

    fn become_unsynchronized(&mut self) {
        self.sync_level = CLOCK_UNSYNCHRONIZED;
        self.offset_ms = 0;
        self.synchronized_peer = None;
        self.next_sync_check = None;
    }

    /// Fires every due deadline. Called at the top of each loop pass, so
    /// timer resolution is bounded by the receive timeout.
    pub fn check_timers(&mut self) {
        let now = Instant::now();

        // A follower whose upstream went quiet falls back to unsynchronized.
        if self.sync_level > CLOCK_LEADER
            && self.sync_level < CLOCK_UNSYNCHRONIZED
            && self.next_sync_check.is_some_and(|deadline| now >= deadline)
        {
            info!("no SYNC_START from upstream in time, dropping to unsynchronized");
            self.become_unsynchronized();
        }

        // A handshake with no DELAY_RESPONSE is abandoned.
        if self.synchronizing
            && self.delay_response_deadline.is_some_and(|deadline| now >= deadline)
        {
            warn!("DELAY_RESPONSE timed out, abandoning handshake");
            self.synchronizing = false;
            self.delay_response_deadline = None;
            self.peer_to_sync = None;
        }

        // Source a SYNC_START round if we are eligible and due.
        if self.sync_level < CLOCK_UNSYNCHRONIZED - 1
            && self.next_sync_start.is_some_and(|deadline| now >= deadline)
        {
            if !self.peer_list.is_empty() {
                let peers: Vec<SocketAddrV4> = self.peer_list.iter().copied().collect();
                for peer in peers {
                    let packet = Packet::SyncStart {
                        sync_level: self.sync_level,
                        timestamp: self.synchronized_time(),
                    };
                    self.send(packet, peer);
                }
                self.asked_to_synchronize = self.peer_list.clone();
                debug!("sent SYNC_START to {} peers", self.asked_to_synchronize.len());
            }
            self.last_sync_start = Some(self.clock.now_ms());
            self.next_sync_start = Some(now + SYNC_START_PERIOD);
        }
    }
}
