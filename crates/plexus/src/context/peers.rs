// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Remote endpoints learned from discovery.

use crate::discovery::{Address, DiscoveryEvent, EndpointKind};
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;

/// Topic name matching every topic.
pub const WILDCARD_TOPIC: &str = "*";

#[derive(Debug, Default)]
pub(crate) struct PeerTable {
    subscribers: HashMap<String, BTreeSet<Address>>,
    publishers: HashMap<String, BTreeSet<Address>>,
    providers: HashMap<String, BTreeSet<Address>>,
}

impl PeerTable {
    fn table_mut(&mut self, kind: EndpointKind) -> &mut HashMap<String, BTreeSet<Address>> {
        match kind {
            EndpointKind::Subscriber => &mut self.subscribers,
            EndpointKind::Publisher => &mut self.publishers,
            EndpointKind::ServiceProvider => &mut self.providers,
        }
    }

    fn table(&self, kind: EndpointKind) -> &HashMap<String, BTreeSet<Address>> {
        match kind {
            EndpointKind::Subscriber => &self.subscribers,
            EndpointKind::Publisher => &self.publishers,
            EndpointKind::ServiceProvider => &self.providers,
        }
    }

    pub(crate) fn insert(&mut self, event: &DiscoveryEvent) -> bool {
        self.table_mut(event.kind)
            .entry(event.topic.clone())
            .or_default()
            .insert(event.address)
    }

    pub(crate) fn remove(&mut self, event: &DiscoveryEvent) -> bool {
        let table = self.table_mut(event.kind);
        let Some(set) = table.get_mut(&event.topic) else {
            return false;
        };
        let removed = set.remove(&event.address);
        if set.is_empty() {
            table.remove(&event.topic);
        }
        removed
    }

    /// Destinations for a data frame on `topic`: exact and wildcard
    /// subscribers, minus `own`.
    pub(crate) fn data_destinations(&self, topic: &str, own: SocketAddr) -> BTreeSet<SocketAddr> {
        [topic, WILDCARD_TOPIC]
            .iter()
            .filter_map(|t| self.subscribers.get(*t))
            .flatten()
            .map(Address::socket_addr)
            .filter(|addr| *addr != own)
            .collect()
    }

    /// First provider of `service` that is not `own`.
    pub(crate) fn provider(&self, service: &str, own: SocketAddr) -> Option<SocketAddr> {
        self.providers
            .get(service)?
            .iter()
            .map(Address::socket_addr)
            .find(|addr| *addr != own)
    }

    pub(crate) fn count(&self, kind: EndpointKind, topic: &str) -> usize {
        self.table(kind).get(topic).map_or(0, BTreeSet::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EndpointKind, topic: &str, port: u16) -> DiscoveryEvent {
        DiscoveryEvent {
            kind,
            topic: topic.into(),
            address: Address::new(SocketAddr::from(([127, 0, 0, 1], port))),
        }
    }

    fn sock(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_destinations_include_wildcard_and_skip_own() {
        let mut peers = PeerTable::default();
        peers.insert(&event(EndpointKind::Subscriber, "chatter", 1));
        peers.insert(&event(EndpointKind::Subscriber, "chatter", 2));
        peers.insert(&event(EndpointKind::Subscriber, WILDCARD_TOPIC, 3));
        peers.insert(&event(EndpointKind::Subscriber, "other", 4));

        let dests = peers.data_destinations("chatter", sock(2));
        assert_eq!(dests.into_iter().collect::<Vec<_>>(), vec![sock(1), sock(3)]);
    }

    #[test]
    fn test_wildcard_subscriber_listed_once() {
        let mut peers = PeerTable::default();
        peers.insert(&event(EndpointKind::Subscriber, "t", 1));
        peers.insert(&event(EndpointKind::Subscriber, WILDCARD_TOPIC, 1));
        assert_eq!(peers.data_destinations("t", sock(9)).len(), 1);
    }

    #[test]
    fn test_remove_and_provider_lookup() {
        let mut peers = PeerTable::default();
        peers.insert(&event(EndpointKind::ServiceProvider, "add", 5));
        peers.insert(&event(EndpointKind::ServiceProvider, "add", 6));
        assert_eq!(peers.provider("add", sock(5)), Some(sock(6)));
        assert_eq!(peers.count(EndpointKind::ServiceProvider, "add"), 2);

        assert!(peers.remove(&event(EndpointKind::ServiceProvider, "add", 6)));
        assert_eq!(peers.provider("add", sock(5)), None);
        assert!(!peers.remove(&event(EndpointKind::Publisher, "add", 6)));
    }
}
