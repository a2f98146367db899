// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Public node handle.
//!
//! A [`Node`] is a thin façade over its [`Context`]: it owns nothing but an
//! identifier, and its topic table lives in the context state. Dropping a
//! node removes its subscriptions and services.
//!
//! # Example
//!
//! ```rust,no_run
//! use plexus::{Context, Node};
//!
//! let ctx = Context::builder().build()?;
//! let talker = Node::with_context(&ctx);
//! let listener = Node::with_context(&ctx);
//!
//! listener.subscribe::<String, _>("chatter", |topic, msg| {
//!     println!("[{}] {}", topic, msg);
//! })?;
//!
//! talker.advertise("chatter")?;
//! talker.publish("chatter", &"hello".to_string())?;
//! # Ok::<(), plexus::Error>(())
//! ```

pub mod registry;

use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::context::{Context, NodeId};
use crate::dispatch::handler::{service_handler, SubscriptionHandler};
use crate::error::Result;
use crate::message::{encode_to_vec, Message, MessageInfo};
use crate::stats::TopicStatisticsSnapshot;
use std::sync::Arc;
use std::time::Duration;

pub struct Node {
    id: NodeId,
    ctx: Arc<Context>,
}

impl Node {
    /// Node on the process default context.
    pub fn new() -> Result<Self> {
        Ok(Self::with_context(&Context::default_instance()?))
    }

    /// Node on an explicit context.
    pub fn with_context(ctx: &Arc<Context>) -> Self {
        let id = ctx.shared().next_node_id();
        log::debug!("[Node] node={} created on {}", id, ctx.sender_id());
        Self {
            id,
            ctx: Arc::clone(ctx),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Declare that this node publishes on `topic` and announce it.
    /// Repeating the call only re-announces.
    pub fn advertise(&self, topic: &str) -> Result<()> {
        self.ctx.shared().advertise(self.id, topic)
    }

    /// Stop advertising `topic`. Peers are not notified; they drop the
    /// address through discovery expiry.
    pub fn unadvertise(&self, topic: &str) -> Result<()> {
        self.ctx.shared().unadvertise(self.id, topic)
    }

    /// Encode `msg` and publish it. Returns once the message is handed to the
    /// transport; local callbacks run later on the dispatcher thread.
    pub fn publish<M: Message>(&self, topic: &str, msg: &M) -> Result<()> {
        let payload = encode_to_vec(msg)?;
        self.ctx.shared().publish(topic, M::type_name(), payload)
    }

    /// Publish an already encoded payload under `type_name`.
    pub fn publish_raw(&self, topic: &str, type_name: &str, payload: &[u8]) -> Result<()> {
        self.ctx.shared().publish(topic, type_name, payload.to_vec())
    }

    /// Subscribe with a typed callback. Replaces any callback this node
    /// already had for `topic`. Messages of another type are skipped.
    pub fn subscribe<M, F>(&self, topic: &str, callback: F) -> Result<()>
    where
        M: Message,
        F: Fn(&str, &M) + Send + Sync + 'static,
    {
        self.ctx
            .shared()
            .subscribe(self.id, topic, SubscriptionHandler::typed::<M, F>(callback))
    }

    /// Subscribe with a raw-bytes callback. Shares the per-topic slot with
    /// [`Node::subscribe`].
    pub fn subscribe_raw<F>(&self, topic: &str, callback: F) -> Result<()>
    where
        F: Fn(&[u8], &MessageInfo) + Send + Sync + 'static,
    {
        self.ctx
            .shared()
            .subscribe(self.id, topic, SubscriptionHandler::raw(callback))
    }

    /// Receive every topic, local and remote, as raw bytes.
    pub fn subscribe_raw_all<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&[u8], &MessageInfo) + Send + Sync + 'static,
    {
        self.ctx.shared().subscribe_all(self.id, Arc::new(callback))
    }

    /// Remove this node's callback for `topic`. No message published after
    /// this returns reaches the old callback.
    pub fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.ctx.shared().unsubscribe(self.id, topic)
    }

    pub fn unsubscribe_all(&self) {
        self.ctx.shared().unsubscribe_all(self.id);
    }

    /// Serve `service` with `handler`.
    pub fn advertise_service<Req, Rep, F>(&self, service: &str, handler: F) -> Result<()>
    where
        Req: Message,
        Rep: Message,
        F: Fn(&Req) -> Result<Rep> + Send + Sync + 'static,
    {
        self.ctx.shared().advertise_service(
            self.id,
            service,
            service_handler::<Req, Rep, F>(handler),
        )
    }

    pub fn unadvertise_service(&self, service: &str) -> Result<()> {
        self.ctx.shared().unadvertise_service(self.id, service)
    }

    /// Call `service` and wait up to `timeout` for the reply.
    pub fn request<Req, Rep>(&self, service: &str, req: &Req, timeout: Duration) -> Result<Rep>
    where
        Req: Message,
        Rep: Message,
    {
        let payload = encode_to_vec(req)?;
        let reply = self.ctx.shared().request(service, payload, timeout)?;
        Rep::decode(&reply)
    }

    /// [`Node::request`] with the default timeout.
    pub fn request_default<Req, Rep>(&self, service: &str, req: &Req) -> Result<Rep>
    where
        Req: Message,
        Rep: Message,
    {
        self.request(service, req, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn enable_topic_statistics(&self, topic: &str, enabled: bool) -> Result<()> {
        self.ctx.enable_topic_statistics(topic, enabled)
    }

    pub fn topic_statistics(&self, topic: &str) -> Option<TopicStatisticsSnapshot> {
        self.ctx.topic_statistics(topic)
    }

    pub fn advertised_topics(&self) -> Vec<String> {
        self.ctx
            .shared()
            .with_registry(self.id, |r| r.map(|r| r.advertised_topics()).unwrap_or_default())
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        self.ctx
            .shared()
            .with_registry(self.id, |r| r.map(|r| r.subscribed_topics()).unwrap_or_default())
    }

    pub fn advertised_services(&self) -> Vec<String> {
        self.ctx.shared().with_registry(self.id, |r| {
            r.map(|r| r.services().map(str::to_string).collect())
                .unwrap_or_default()
        })
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.ctx.shared().remove_node(self.id);
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("context", &self.ctx.sender_id())
            .finish()
    }
}
