// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reception thread.
//!
//! Polls the three inbound sockets with a bounded timeout, decodes frames
//! and routes them: data to the dispatch queue, requests to local service
//! providers, responses to waiting requesters. With access control enabled,
//! frames from unknown peers are parked until the access-control thread has
//! decided on them.

use super::Shared;
use crate::config::{MAX_DATAGRAM_SIZE, MAX_PENDING_FRAMES_PER_PEER, MAX_TRACKED_PEERS};
use crate::context::metrics::TransportMetrics;
use crate::protocol::{self, Frame};
use crate::security::{AccessChannels, AccessDecision, ConnectionRequest, Credentials};
use crate::transport::InboundSockets;
use mio::{Events, Interest, Poll, Token};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

pub(super) const WAKER_TOKEN: Token = Token(0);
const SUBSCRIBER_TOKEN: Token = Token(1);
const REPLIER_TOKEN: Token = Token(2);
const RESPONSE_TOKEN: Token = Token(3);

const MAX_EVENTS: usize = 64;

enum PeerAccess {
    Allowed,
    Denied,
    /// Waiting for a decision; frames received meanwhile.
    Pending(Vec<Frame>),
}

pub(super) struct Reception {
    shared: Arc<Shared>,
    poll: Poll,
    sockets: InboundSockets,
    access: Option<AccessChannels>,
    peers: HashMap<SocketAddr, PeerAccess>,
    buf: Vec<u8>,
}

impl Reception {
    pub(super) fn new(
        shared: Arc<Shared>,
        poll: Poll,
        mut sockets: InboundSockets,
        access: Option<AccessChannels>,
    ) -> io::Result<Self> {
        let registry = poll.registry();
        registry.register(&mut sockets.subscriber, SUBSCRIBER_TOKEN, Interest::READABLE)?;
        registry.register(&mut sockets.replier, REPLIER_TOKEN, Interest::READABLE)?;
        registry.register(
            &mut sockets.response_receiver,
            RESPONSE_TOKEN,
            Interest::READABLE,
        )?;

        Ok(Self {
            shared,
            poll,
            sockets,
            access,
            peers: HashMap::new(),
            buf: vec![0u8; MAX_DATAGRAM_SIZE],
        })
    }

    pub(super) fn spawn(self) -> io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("plexus-reception".into())
            .spawn(move || self.run())
    }

    fn run(mut self) {
        let mut events = Events::with_capacity(MAX_EVENTS);
        let timeout = self.shared.config.poll_timeout;
        log::debug!("[Reception] thread started timeout={:?}", timeout);

        while !self.shared.exit.load(Ordering::Acquire) {
            if let Err(e) = self.poll.poll(&mut events, Some(timeout)) {
                if e.kind() != io::ErrorKind::Interrupted {
                    log::debug!("[Reception] poll error: {}", e);
                }
                continue;
            }

            for event in events.iter() {
                let token = event.token();
                if token != WAKER_TOKEN {
                    self.drain(token);
                }
            }
            self.apply_decisions();
        }

        log::debug!("[Reception] thread exiting");
    }

    /// Read until the socket reports `WouldBlock` or shutdown is requested.
    fn drain(&mut self, token: Token) {
        loop {
            if self.shared.exit.load(Ordering::Acquire) {
                return;
            }
            let socket = match token {
                SUBSCRIBER_TOKEN => &self.sockets.subscriber,
                REPLIER_TOKEN => &self.sockets.replier,
                RESPONSE_TOKEN => &self.sockets.response_receiver,
                _ => return,
            };
            let (len, from) = match socket.recv_from(&mut self.buf) {
                Ok(r) => r,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    log::debug!("[Reception] recv error on {:?}: {}", token, e);
                    return;
                }
            };
            TransportMetrics::bump(&self.shared.metrics.frames_received);

            match protocol::decode(&self.buf[..len]) {
                Ok((frame, credentials)) => self.admit(from, frame, credentials),
                Err(e) => {
                    TransportMetrics::bump(&self.shared.metrics.frames_malformed);
                    log::debug!("[Reception] malformed datagram from {}: {}", from, e);
                }
            }
        }
    }

    /// Gate a frame through access control, then process it.
    fn admit(&mut self, from: SocketAddr, frame: Frame, credentials: Option<Credentials>) {
        let Some(access) = self.access.as_ref() else {
            self.process(frame);
            return;
        };

        match self.peers.get_mut(&from) {
            Some(PeerAccess::Allowed) => {}
            Some(PeerAccess::Denied) => {
                TransportMetrics::bump(&self.shared.metrics.frames_denied);
                return;
            }
            Some(PeerAccess::Pending(parked)) => {
                if parked.len() < MAX_PENDING_FRAMES_PER_PEER {
                    parked.push(frame);
                } else {
                    log::debug!("[Reception] pending queue full for {}, dropping", from);
                }
                return;
            }
            None => {
                if self.peers.len() >= MAX_TRACKED_PEERS {
                    let forgotten = forget_decided(&mut self.peers);
                    log::debug!(
                        "[Reception] peer table full, forgot {} decided peers",
                        forgotten
                    );
                    if self.peers.len() >= MAX_TRACKED_PEERS {
                        log::debug!(
                            "[Reception] too many pending peers, dropping frame from {}",
                            from
                        );
                        return;
                    }
                }
                let request = ConnectionRequest {
                    peer: from,
                    credentials,
                };
                if access.requests.send(request).is_err() {
                    log::warn!("[Reception] access control gone, denying {}", from);
                    self.peers.insert(from, PeerAccess::Denied);
                    TransportMetrics::bump(&self.shared.metrics.frames_denied);
                    return;
                }
                log::debug!("[Reception] new peer {} awaiting access decision", from);
                self.peers.insert(from, PeerAccess::Pending(vec![frame]));
                return;
            }
        }

        self.process(frame);
    }

    fn apply_decisions(&mut self) {
        let decisions: Vec<AccessDecision> = match self.access.as_ref() {
            Some(access) => access.decisions.try_iter().collect(),
            None => return,
        };

        for decision in decisions {
            let state = if decision.allowed {
                PeerAccess::Allowed
            } else {
                PeerAccess::Denied
            };
            let Some(PeerAccess::Pending(parked)) = self.peers.insert(decision.peer, state) else {
                continue;
            };
            if decision.allowed {
                for frame in parked {
                    self.process(frame);
                }
            } else {
                self.shared
                    .metrics
                    .frames_denied
                    .fetch_add(parked.len() as u64, Ordering::Relaxed);
            }
        }
    }

    fn process(&self, frame: Frame) {
        match frame {
            Frame::Data(data) => self.shared.deliver_remote(data),
            Frame::Request(request) => self.shared.serve_request(request),
            Frame::Response(response) => self.shared.complete_request(response),
        }
    }
}

/// Drop allowed and denied entries, keeping peers still awaiting a decision.
/// Returns how many entries were removed.
fn forget_decided(peers: &mut HashMap<SocketAddr, PeerAccess>) -> usize {
    let before = peers.len();
    peers.retain(|_, access| matches!(access, PeerAccess::Pending(_)));
    before - peers.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_forget_decided_keeps_pending() {
        let mut peers = HashMap::new();
        for port in 0..MAX_TRACKED_PEERS as u16 {
            let access = if port % 2 == 0 {
                PeerAccess::Allowed
            } else {
                PeerAccess::Denied
            };
            peers.insert(peer(port), access);
        }
        peers.insert(peer(60_000), PeerAccess::Pending(Vec::new()));

        assert_eq!(forget_decided(&mut peers), MAX_TRACKED_PEERS);
        assert_eq!(peers.len(), 1);
        assert!(matches!(peers.get(&peer(60_000)), Some(PeerAccess::Pending(_))));
    }

    #[test]
    fn test_forget_decided_on_empty_table() {
        let mut peers = HashMap::new();
        assert_eq!(forget_decided(&mut peers), 0);
    }
}
