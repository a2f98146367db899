// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery interface consumed by the transport context.
//!
//! The context only needs four things from discovery: announce a local
//! endpoint, query known endpoints, and be told when endpoints appear or
//! disappear. How announcements travel between processes (broadcast,
//! heartbeats, timeouts) is up to the implementation.
//!
//! [`LocalDiscovery`] is the in-process implementation: a shared directory
//! that several contexts can point at. It is what the tests use to stand in
//! for separate processes.
//!
//! # Example
//!
//! ```rust,no_run
//! use plexus::{Context, LocalDiscovery};
//! use std::sync::Arc;
//!
//! let msgs = Arc::new(LocalDiscovery::new());
//! let srvs = Arc::new(LocalDiscovery::new());
//!
//! // Both contexts see each other's endpoints.
//! let a = Context::builder().discovery(msgs.clone(), srvs.clone()).build()?;
//! let b = Context::builder().discovery(msgs, srvs).build()?;
//! # Ok::<(), plexus::Error>(())
//! ```

use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;

/// Network locator of a remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(SocketAddr);

impl Address {
    #[inline]
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    #[inline]
    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "udp://{}", self.0)
    }
}

/// Role of an announced endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EndpointKind {
    /// Publishes on the topic. Address is the sending socket.
    Publisher,
    /// Wants the topic. Address is the receiving socket.
    Subscriber,
    /// Serves requests for a service. Address is the replier socket.
    ServiceProvider,
}

/// One announced endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DiscoveryEvent {
    pub kind: EndpointKind,
    pub topic: String,
    pub address: Address,
}

/// Callback fired for discovered or lost endpoints.
pub type DiscoveryCallback = Arc<dyn Fn(&DiscoveryEvent) + Send + Sync>;

/// Discovery service as seen by the transport context.
///
/// Implementations must not hold internal locks while invoking callbacks:
/// callbacks take context locks and may run on the announcing thread.
pub trait Discovery: Send + Sync {
    /// Announce a local endpoint.
    fn announce(&self, kind: EndpointKind, topic: &str, address: Address);

    /// Addresses currently known for `(kind, topic)`.
    fn query(&self, kind: EndpointKind, topic: &str) -> BTreeSet<Address>;

    /// Register a callback for new endpoints. Endpoints already known are
    /// reported to the new callback as well.
    fn on_discovered(&self, callback: DiscoveryCallback);

    /// Register a callback for endpoints that went away.
    fn on_lost(&self, callback: DiscoveryCallback);

    /// Forget every endpoint announced with `address`. Called when a context
    /// shuts down; implementations relying on timeouts may ignore it.
    fn withdraw(&self, _address: Address) {}
}

/// In-process discovery directory.
#[derive(Default)]
pub struct LocalDiscovery {
    entries: RwLock<BTreeSet<DiscoveryEvent>>,
    discovered: RwLock<Vec<DiscoveryCallback>>,
    lost: RwLock<Vec<DiscoveryCallback>>,
}

impl LocalDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of announced endpoints.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn fire(callbacks: &RwLock<Vec<DiscoveryCallback>>, events: &[DiscoveryEvent]) {
        if events.is_empty() {
            return;
        }
        let callbacks: Vec<DiscoveryCallback> = callbacks.read().clone();
        for event in events {
            for cb in &callbacks {
                cb(event);
            }
        }
    }
}

impl Discovery for LocalDiscovery {
    fn announce(&self, kind: EndpointKind, topic: &str, address: Address) {
        let event = DiscoveryEvent {
            kind,
            topic: topic.to_string(),
            address,
        };
        let inserted = self.entries.write().insert(event.clone());
        if inserted {
            log::debug!(
                "[Discovery] announce {:?} topic='{}' addr={}",
                kind,
                topic,
                address
            );
            Self::fire(&self.discovered, &[event]);
        }
    }

    fn query(&self, kind: EndpointKind, topic: &str) -> BTreeSet<Address> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.kind == kind && e.topic == topic)
            .map(|e| e.address)
            .collect()
    }

    fn on_discovered(&self, callback: DiscoveryCallback) {
        self.discovered.write().push(Arc::clone(&callback));
        let known: Vec<DiscoveryEvent> = self.entries.read().iter().cloned().collect();
        for event in &known {
            callback(event);
        }
    }

    fn on_lost(&self, callback: DiscoveryCallback) {
        self.lost.write().push(callback);
    }

    fn withdraw(&self, address: Address) {
        let removed: Vec<DiscoveryEvent> = {
            let mut entries = self.entries.write();
            let gone: Vec<DiscoveryEvent> = entries
                .iter()
                .filter(|e| e.address == address)
                .cloned()
                .collect();
            for event in &gone {
                entries.remove(event);
            }
            gone
        };
        if !removed.is_empty() {
            log::debug!(
                "[Discovery] withdraw addr={} ({} endpoints)",
                address,
                removed.len()
            );
        }
        Self::fire(&self.lost, &removed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn addr(port: u16) -> Address {
        Address::new(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    #[test]
    fn test_announce_and_query() {
        let disc = LocalDiscovery::new();
        disc.announce(EndpointKind::Subscriber, "chatter", addr(1000));
        disc.announce(EndpointKind::Subscriber, "chatter", addr(1001));
        disc.announce(EndpointKind::Publisher, "chatter", addr(1002));

        let subs = disc.query(EndpointKind::Subscriber, "chatter");
        assert_eq!(subs.len(), 2);
        assert!(subs.contains(&addr(1000)));
        assert!(disc
            .query(EndpointKind::Subscriber, "other")
            .is_empty());
    }

    #[test]
    fn test_duplicate_announce_fires_once() {
        let disc = LocalDiscovery::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        disc.on_discovered(Arc::new(move |e| s.lock().push(e.clone())));

        disc.announce(EndpointKind::Publisher, "t", addr(1));
        disc.announce(EndpointKind::Publisher, "t", addr(1));

        assert_eq!(seen.lock().len(), 1);
        assert_eq!(disc.len(), 1);
    }

    #[test]
    fn test_late_callback_gets_replay() {
        let disc = LocalDiscovery::new();
        disc.announce(EndpointKind::Subscriber, "a", addr(1));
        disc.announce(EndpointKind::Subscriber, "b", addr(2));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        disc.on_discovered(Arc::new(move |e| s.lock().push(e.topic.clone())));

        let mut topics = seen.lock().clone();
        topics.sort();
        assert_eq!(topics, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_withdraw_fires_lost() {
        let disc = LocalDiscovery::new();
        let lost = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&lost);
        disc.on_lost(Arc::new(move |e| l.lock().push(e.clone())));

        disc.announce(EndpointKind::Subscriber, "a", addr(1));
        disc.announce(EndpointKind::Publisher, "b", addr(1));
        disc.announce(EndpointKind::Publisher, "b", addr(2));
        disc.withdraw(addr(1));

        assert_eq!(lost.lock().len(), 2);
        assert_eq!(disc.len(), 1);
        assert!(disc.query(EndpointKind::Subscriber, "a").is_empty());
    }

    #[test]
    fn test_callback_may_reenter_directory() {
        let disc = Arc::new(LocalDiscovery::new());
        let d = Arc::clone(&disc);
        let counts = Arc::new(Mutex::new(Vec::new()));
        let c = Arc::clone(&counts);
        disc.on_discovered(Arc::new(move |e| {
            // Would deadlock if the directory lock were held here.
            c.lock().push(d.query(e.kind, &e.topic).len());
        }));

        disc.announce(EndpointKind::Publisher, "t", addr(1));
        assert_eq!(*counts.lock(), vec![1]);
    }

    #[test]
    fn test_address_display() {
        assert_eq!(addr(7000).to_string(), "udp://127.0.0.1:7000");
    }
}
