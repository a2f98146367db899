// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-node topic and service table.
//!
//! Pure data: no locking of its own. Every registry lives inside the context
//! state and is only touched with the context lock held.

use crate::dispatch::handler::{RawCallback, ServiceHandler, SubscriptionHandler};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Local state of one topic for one node.
#[derive(Debug, Clone, Default)]
pub struct TopicEntry {
    pub advertised_by_me: bool,
    pub subscribed: bool,
    callback: Option<SubscriptionHandler>,
}

impl TopicEntry {
    pub fn callback(&self) -> Option<&SubscriptionHandler> {
        self.callback.as_ref()
    }

    fn is_unused(&self) -> bool {
        !self.advertised_by_me && !self.subscribed
    }
}

#[derive(Default)]
pub struct TopicRegistry {
    topics: BTreeMap<String, TopicEntry>,
    services: BTreeMap<String, Arc<dyn ServiceHandler>>,
    subscribe_all: Option<RawCallback>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `topic` advertised. Returns `true` if it was not already.
    pub fn advertise(&mut self, topic: &str) -> bool {
        let entry = self.topics.entry(topic.to_string()).or_default();
        let newly = !entry.advertised_by_me;
        entry.advertised_by_me = true;
        newly
    }

    /// Clear the advertised flag. Returns `true` if it was set.
    pub fn unadvertise(&mut self, topic: &str) -> bool {
        let Some(entry) = self.topics.get_mut(topic) else {
            return false;
        };
        let was = entry.advertised_by_me;
        entry.advertised_by_me = false;
        if entry.is_unused() {
            self.topics.remove(topic);
        }
        was
    }

    /// Install `handler` as the topic's only callback, returning the one it
    /// replaced.
    pub fn subscribe(
        &mut self,
        topic: &str,
        handler: SubscriptionHandler,
    ) -> Option<SubscriptionHandler> {
        let entry = self.topics.entry(topic.to_string()).or_default();
        entry.subscribed = true;
        entry.callback.replace(handler)
    }

    /// Clear subscription and callback. Returns `true` if subscribed.
    pub fn unsubscribe(&mut self, topic: &str) -> bool {
        let Some(entry) = self.topics.get_mut(topic) else {
            return false;
        };
        let was = entry.subscribed;
        entry.subscribed = false;
        entry.callback = None;
        if entry.is_unused() {
            self.topics.remove(topic);
        }
        was
    }

    pub fn entry(&self, topic: &str) -> Option<&TopicEntry> {
        self.topics.get(topic)
    }

    pub fn is_advertised(&self, topic: &str) -> bool {
        self.topics.get(topic).is_some_and(|e| e.advertised_by_me)
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.topics.get(topic).is_some_and(|e| e.subscribed)
    }

    pub fn handler(&self, topic: &str) -> Option<&SubscriptionHandler> {
        self.topics.get(topic).and_then(|e| e.callback.as_ref())
    }

    pub fn advertised_topics(&self) -> Vec<String> {
        self.topics
            .iter()
            .filter(|(_, e)| e.advertised_by_me)
            .map(|(t, _)| t.clone())
            .collect()
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        self.topics
            .iter()
            .filter(|(_, e)| e.subscribed)
            .map(|(t, _)| t.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty() && self.services.is_empty() && self.subscribe_all.is_none()
    }

    /// Install the catch-all raw callback (last writer wins).
    pub fn set_subscribe_all(&mut self, callback: RawCallback) -> Option<RawCallback> {
        self.subscribe_all.replace(callback)
    }

    pub fn clear_subscribe_all(&mut self) -> bool {
        self.subscribe_all.take().is_some()
    }

    pub fn subscribe_all(&self) -> Option<&RawCallback> {
        self.subscribe_all.as_ref()
    }

    pub fn advertise_service(&mut self, service: &str, handler: Arc<dyn ServiceHandler>) -> bool {
        self.services
            .insert(service.to_string(), handler)
            .is_none()
    }

    pub fn unadvertise_service(&mut self, service: &str) -> bool {
        self.services.remove(service).is_some()
    }

    pub fn service(&self, service: &str) -> Option<&Arc<dyn ServiceHandler>> {
        self.services.get(service)
    }

    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }
}
