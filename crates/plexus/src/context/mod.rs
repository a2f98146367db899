// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared transport context.
//!
//! A [`Context`] owns everything nodes share: the sockets, the discovery
//! handles, the topic tables, per-topic sequence counters, statistics and the
//! two background threads (reception and local dispatch), plus the optional
//! access-control thread.
//!
//! # Architecture
//!
//! ```text
//!   Node ─┐                          ┌──────────── Context ─────────────┐
//!   Node ─┼── state lock ──> topic tables / seq / stats                 │
//!   Node ─┘        │                                                    │
//!                  ├──> publisher socket ──> remote subscribers         │
//!                  └──> dispatch queue ──> plexus-dispatch ──> callbacks│
//!                                                                       │
//!   remote ──> subscriber/replier/response sockets ──> plexus-reception │
//!                  (access control) ──> dispatch queue / services       │
//!                                    └──────────────────────────────────┘
//! ```
//!
//! # Locking
//!
//! `state` is the single lock for node tables, sequences and statistics.
//! `peers` (remote endpoints learned from discovery) nests inside it and is
//! never held while taking `state`. No lock is held while user callbacks run.
//!
//! # Shutdown
//!
//! Dropping the last `Arc<Context>` sets the exit flag, wakes the reception
//! poll, joins reception then access control, drains and joins the
//! dispatcher, withdraws the context addresses from discovery and finally
//! releases the sockets.

pub mod metrics;
pub(crate) mod peers;
mod reception;

use crate::config::{ContextConfig, MAX_DATAGRAM_SIZE};
use crate::discovery::{Address, Discovery, DiscoveryEvent, EndpointKind, LocalDiscovery};
use crate::dispatch::handler::{
    call_service, RawCallback, ServiceHandler, SubscriptionHandler, TypedHandler,
};
use crate::dispatch::{self, DeliveryObserver, DispatchSender, PublishDispatcher, PublishWorkItem};
use crate::error::{Error, Result};
use crate::message::MessageInfo;
use crate::node::registry::TopicRegistry;
use crate::protocol::{self, DataFrame, Frame, RequestFrame, ResponseFrame, ResponseStatus};
use crate::security::{AccessControlHandle, AccessPolicy, Credentials, PlainCredentials};
use crate::stats::{monotonic_millis, PublicationMetadata, StatisticsTracker, TopicStatisticsSnapshot};
use crate::transport::{send_datagram, Sockets};
use crossbeam::channel::{self, Sender};
use dashmap::DashMap;
use metrics::{MetricsSnapshot, TransportMetrics};
use parking_lot::{Mutex, RwLock};
use peers::{PeerTable, WILDCARD_TOPIC};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

/// Identifier of a node within its context.
pub type NodeId = u64;

static DEFAULT_CONTEXT: OnceLock<Mutex<Weak<Context>>> = OnceLock::new();
static CONTEXT_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy)]
pub(crate) struct LocalAddrs {
    pub(crate) publisher: SocketAddr,
    pub(crate) subscriber: SocketAddr,
    pub(crate) response: SocketAddr,
    pub(crate) replier: SocketAddr,
}

/// Tables guarded by the context lock.
pub(crate) struct ContextState {
    nodes: BTreeMap<NodeId, TopicRegistry>,
    topic_pub_seq: HashMap<String, u64>,
    stats: StatisticsTracker,
    /// Topics with at least one local subscriber ("*" for catch-all).
    filter: HashSet<String>,
}

impl ContextState {
    fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            topic_pub_seq: HashMap::new(),
            stats: StatisticsTracker::new(),
            filter: HashSet::new(),
        }
    }

    fn registry_mut(&mut self, node: NodeId) -> &mut TopicRegistry {
        self.nodes.entry(node).or_default()
    }

    fn next_seq(&mut self, topic: &str) -> u64 {
        let seq = self.topic_pub_seq.entry(topic.to_string()).or_insert(0);
        *seq += 1;
        *seq
    }

    /// Whether frames for `topic` pass the receive filter.
    fn accepts(&self, topic: &str) -> bool {
        self.filter.contains(topic) || self.filter.contains(WILDCARD_TOPIC)
    }

    fn refresh_filter(&mut self, topic: &str) {
        let wanted = if topic == WILDCARD_TOPIC {
            self.nodes.values().any(|r| r.subscribe_all().is_some())
        } else {
            self.nodes.values().any(|r| r.is_subscribed(topic))
        };
        if wanted {
            self.filter.insert(topic.to_string());
        } else {
            self.filter.remove(topic);
        }
    }

    /// Handlers for `topic`, typed then raw, each in node order.
    fn local_handlers(&self, topic: &str) -> (Vec<Arc<dyn TypedHandler>>, Vec<RawCallback>) {
        let mut typed = Vec::new();
        let mut raw = Vec::new();
        for registry in self.nodes.values() {
            match registry.handler(topic) {
                Some(SubscriptionHandler::Typed(h)) => typed.push(Arc::clone(h)),
                Some(SubscriptionHandler::Raw(h)) => raw.push(Arc::clone(h)),
                None => {}
            }
        }
        for registry in self.nodes.values() {
            if let Some(h) = registry.subscribe_all() {
                raw.push(Arc::clone(h));
            }
        }
        (typed, raw)
    }

    fn local_service(&self, service: &str) -> Option<Arc<dyn ServiceHandler>> {
        self.nodes
            .values()
            .find_map(|r| r.service(service))
            .map(Arc::clone)
    }
}

/// State shared between the context handle and its threads.
pub(crate) struct Shared {
    pub(crate) config: ContextConfig,
    pub(crate) sender_id: String,
    pub(crate) state: Mutex<ContextState>,
    pub(crate) peers: RwLock<PeerTable>,
    pub(crate) msg_discovery: Arc<dyn Discovery>,
    pub(crate) srv_discovery: Arc<dyn Discovery>,
    pub(crate) pending_requests: DashMap<u64, Sender<ResponseFrame>>,
    next_request_id: AtomicU64,
    next_node_id: AtomicU64,
    pub(crate) exit: AtomicBool,
    dispatch: DispatchSender,
    pub(crate) metrics: Arc<TransportMetrics>,
    pub(crate) addrs: LocalAddrs,
    // Dropped last.
    pub(crate) sockets: Sockets,
}

fn validate_topic(topic: &str) -> Result<()> {
    if topic.is_empty() || topic == WILDCARD_TOPIC {
        return Err(Error::InvalidTopic);
    }
    Ok(())
}

fn validate_service(service: &str) -> Result<()> {
    if service.is_empty() {
        return Err(Error::InvalidService);
    }
    Ok(())
}

impl Shared {
    /// Subscribe/advertise events: info when verbose, debug otherwise.
    fn lifecycle(&self, args: std::fmt::Arguments<'_>) {
        let level = if self.config.verbose {
            log::Level::Info
        } else {
            log::Level::Debug
        };
        log::log!(level, "{}", args);
    }

    pub(crate) fn next_node_id(&self) -> NodeId {
        self.next_node_id.fetch_add(1, Ordering::Relaxed)
    }

    fn encode_frame(&self, frame: &Frame) -> Result<Vec<u8>> {
        let buf = protocol::encode(frame, self.config.credentials.as_ref())?;
        if buf.len() > MAX_DATAGRAM_SIZE {
            return Err(Error::PayloadTooLarge(buf.len()));
        }
        Ok(buf)
    }

    // ---- topics ----

    pub(crate) fn advertise(&self, node: NodeId, topic: &str) -> Result<()> {
        validate_topic(topic)?;
        let mut state = self.state.lock();
        if state.registry_mut(node).advertise(topic) {
            self.lifecycle(format_args!("[Node] advertise topic='{}' node={}", topic, node));
        }
        self.msg_discovery.announce(
            EndpointKind::Publisher,
            topic,
            Address::new(self.addrs.publisher),
        );
        Ok(())
    }

    pub(crate) fn unadvertise(&self, node: NodeId, topic: &str) -> Result<()> {
        validate_topic(topic)?;
        let mut state = self.state.lock();
        if state.registry_mut(node).unadvertise(topic) {
            self.lifecycle(format_args!("[Node] unadvertise topic='{}' node={}", topic, node));
        }
        Ok(())
    }

    pub(crate) fn subscribe(
        &self,
        node: NodeId,
        topic: &str,
        handler: SubscriptionHandler,
    ) -> Result<()> {
        validate_topic(topic)?;
        let mut state = self.state.lock();
        self.lifecycle(format_args!("[Node] subscribe topic='{}' node={}", topic, node));

        if state.registry_mut(node).subscribe(topic, handler).is_some() {
            log::debug!("[Node] replaced callback topic='{}' node={}", topic, node);
        }
        state.refresh_filter(topic);

        self.msg_discovery.announce(
            EndpointKind::Subscriber,
            topic,
            Address::new(self.addrs.subscriber),
        );
        log::debug!(
            "[Node] topic='{}' has {} known remote publishers",
            topic,
            self.peers.read().count(EndpointKind::Publisher, topic)
        );
        Ok(())
    }

    pub(crate) fn subscribe_all(&self, node: NodeId, callback: RawCallback) -> Result<()> {
        let mut state = self.state.lock();
        self.lifecycle(format_args!("[Node] subscribe all topics node={}", node));
        state.registry_mut(node).set_subscribe_all(callback);
        state.refresh_filter(WILDCARD_TOPIC);
        self.msg_discovery.announce(
            EndpointKind::Subscriber,
            WILDCARD_TOPIC,
            Address::new(self.addrs.subscriber),
        );
        Ok(())
    }

    pub(crate) fn unsubscribe(&self, node: NodeId, topic: &str) -> Result<()> {
        validate_topic(topic)?;
        let mut state = self.state.lock();
        self.lifecycle(format_args!("[Node] unsubscribe topic='{}' node={}", topic, node));
        state.registry_mut(node).unsubscribe(topic);
        state.refresh_filter(topic);
        Ok(())
    }

    pub(crate) fn unsubscribe_all(&self, node: NodeId) {
        let mut state = self.state.lock();
        if state.registry_mut(node).clear_subscribe_all() {
            self.lifecycle(format_args!("[Node] unsubscribe all topics node={}", node));
        }
        state.refresh_filter(WILDCARD_TOPIC);
    }

    pub(crate) fn remove_node(&self, node: NodeId) {
        let mut state = self.state.lock();
        let Some(registry) = state.nodes.remove(&node) else {
            return;
        };
        for topic in registry.subscribed_topics() {
            state.refresh_filter(&topic);
        }
        if registry.subscribe_all().is_some() {
            state.refresh_filter(WILDCARD_TOPIC);
        }
        log::debug!("[Node] node={} removed", node);
    }

    pub(crate) fn with_registry<R>(
        &self,
        node: NodeId,
        f: impl FnOnce(Option<&TopicRegistry>) -> R,
    ) -> R {
        let state = self.state.lock();
        f(state.nodes.get(&node))
    }

    /// Sequence, fan out to remote subscribers, enqueue local delivery.
    ///
    /// The lock is held throughout so sequence order, wire order and
    /// dispatch order agree for a topic.
    pub(crate) fn publish(&self, topic: &str, type_name: &str, payload: Vec<u8>) -> Result<()> {
        validate_topic(topic)?;
        let mut state = self.state.lock();

        let info = MessageInfo {
            topic: topic.to_string(),
            type_name: type_name.to_string(),
            sender: self.sender_id.clone(),
            seq: state.next_seq(topic),
            stamp: monotonic_millis(),
        };
        TransportMetrics::bump(&self.metrics.messages_published);

        self.fan_out(&info, &payload);

        let (typed, raw) = state.local_handlers(topic);
        if typed.is_empty() && raw.is_empty() {
            return Ok(());
        }
        let seq = info.seq;
        let item = PublishWorkItem::new(typed, raw, Arc::from(payload), info);
        self.dispatch.enqueue(item).map_err(|e| {
            TransportMetrics::bump(&self.metrics.dispatch_rejections);
            log::warn!(
                "[Context] local delivery rejected topic='{}' seq={}: {}",
                topic,
                seq,
                e
            );
            e
        })
    }

    fn fan_out(&self, info: &MessageInfo, payload: &[u8]) {
        let destinations = self
            .peers
            .read()
            .data_destinations(&info.topic, self.addrs.subscriber);
        if destinations.is_empty() {
            return;
        }

        let frame = Frame::Data(DataFrame {
            topic: info.topic.clone(),
            type_name: info.type_name.clone(),
            sender: info.sender.clone(),
            seq: info.seq,
            stamp: info.stamp,
            payload: payload.to_vec(),
        });
        let buf = match self.encode_frame(&frame) {
            Ok(buf) => buf,
            Err(e) => {
                TransportMetrics::bump(&self.metrics.remote_send_errors);
                log::warn!("[Context] cannot send topic='{}' remotely: {}", info.topic, e);
                return;
            }
        };

        for dest in destinations {
            match send_datagram(self.sockets.publisher(), &buf, dest) {
                Ok(()) => TransportMetrics::bump(&self.metrics.remote_frames_sent),
                Err(e) => {
                    TransportMetrics::bump(&self.metrics.remote_send_errors);
                    log::warn!("[Context] topic='{}': {}", info.topic, e);
                }
            }
        }
    }

    /// Queue a data frame received from a peer.
    pub(crate) fn deliver_remote(&self, frame: DataFrame) {
        let (typed, raw) = {
            let state = self.state.lock();
            if !state.accepts(&frame.topic) {
                log::debug!("[Reception] filtered topic='{}'", frame.topic);
                return;
            }
            state.local_handlers(&frame.topic)
        };
        if typed.is_empty() && raw.is_empty() {
            return;
        }

        let DataFrame {
            topic,
            type_name,
            sender,
            seq,
            stamp,
            payload,
        } = frame;
        let info = MessageInfo {
            topic,
            type_name,
            sender,
            seq,
            stamp,
        };
        if let Err(e) = self
            .dispatch
            .enqueue(PublishWorkItem::new(typed, raw, Arc::from(payload), info))
        {
            TransportMetrics::bump(&self.metrics.dispatch_rejections);
            log::warn!("[Reception] remote frame dropped: {}", e);
        }
    }

    // ---- statistics ----

    /// Called by the dispatcher before each delivery.
    fn observe(&self, item: &PublishWorkItem) {
        let meta = PublicationMetadata {
            stamp: item.info.stamp,
            seq: item.info.seq,
        };
        self.state
            .lock()
            .stats
            .observe(&item.info.topic, &item.info.sender, &meta);
    }

    pub(crate) fn set_topic_statistics(&self, topic: &str, enabled: bool) -> Result<()> {
        validate_topic(topic)?;
        self.state.lock().stats.set_enabled(topic, enabled);
        log::debug!("[Context] statistics topic='{}' enabled={}", topic, enabled);
        Ok(())
    }

    pub(crate) fn topic_statistics(&self, topic: &str) -> Option<TopicStatisticsSnapshot> {
        self.state.lock().stats.snapshot(topic)
    }

    // ---- services ----

    pub(crate) fn advertise_service(
        &self,
        node: NodeId,
        service: &str,
        handler: Arc<dyn ServiceHandler>,
    ) -> Result<()> {
        validate_service(service)?;
        let mut state = self.state.lock();
        state.registry_mut(node).advertise_service(service, handler);
        self.lifecycle(format_args!("[Node] advertise service='{}' node={}", service, node));
        self.srv_discovery.announce(
            EndpointKind::ServiceProvider,
            service,
            Address::new(self.addrs.replier),
        );
        Ok(())
    }

    pub(crate) fn unadvertise_service(&self, node: NodeId, service: &str) -> Result<()> {
        validate_service(service)?;
        let mut state = self.state.lock();
        if state.registry_mut(node).unadvertise_service(service) {
            self.lifecycle(format_args!("[Node] unadvertise service='{}' node={}", service, node));
        }
        Ok(())
    }

    /// Call `service`, locally if this context provides it.
    pub(crate) fn request(&self, service: &str, payload: Vec<u8>, timeout: Duration) -> Result<Vec<u8>> {
        validate_service(service)?;

        let local = self.state.lock().local_service(service);
        if let Some(handler) = local {
            log::debug!("[Service] '{}' served locally", service);
            return call_service(service, &handler, &payload).map_err(Error::ServiceFailed);
        }

        let provider = self
            .peers
            .read()
            .provider(service, self.addrs.replier)
            .ok_or_else(|| Error::ServiceUnavailable(service.to_string()))?;

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = channel::bounded(1);
        self.pending_requests.insert(request_id, tx);

        let frame = Frame::Request(RequestFrame {
            service: service.to_string(),
            request_id,
            reply_to: self.addrs.response,
            payload,
        });
        let sent = self
            .encode_frame(&frame)
            .and_then(|buf| send_datagram(self.sockets.requester(), &buf, provider));
        if let Err(e) = sent {
            self.pending_requests.remove(&request_id);
            return Err(e);
        }
        log::debug!(
            "[Service] '{}' request_id={} sent to {}",
            service,
            request_id,
            provider
        );

        match rx.recv_timeout(timeout) {
            Ok(reply) => match reply.status {
                ResponseStatus::Ok => Ok(reply.payload),
                ResponseStatus::Failed => Err(Error::ServiceFailed(
                    String::from_utf8_lossy(&reply.payload).into_owned(),
                )),
                ResponseStatus::Unavailable => Err(Error::ServiceUnavailable(service.to_string())),
            },
            Err(_) => {
                self.pending_requests.remove(&request_id);
                Err(Error::Timeout)
            }
        }
    }

    /// Run a request received from a peer and send the response.
    pub(crate) fn serve_request(&self, request: RequestFrame) {
        let handler = self.state.lock().local_service(&request.service);
        let (status, payload) = match handler {
            Some(handler) => match call_service(&request.service, &handler, &request.payload) {
                Ok(reply) => (ResponseStatus::Ok, reply),
                Err(msg) => (ResponseStatus::Failed, msg.into_bytes()),
            },
            None => (ResponseStatus::Unavailable, Vec::new()),
        };

        let frame = Frame::Response(ResponseFrame {
            request_id: request.request_id,
            status,
            payload,
        });
        let sent = self
            .encode_frame(&frame)
            .and_then(|buf| send_datagram(self.sockets.replier(), &buf, request.reply_to));
        if let Err(e) = sent {
            log::warn!(
                "[Service] '{}' response to {} failed: {}",
                request.service,
                request.reply_to,
                e
            );
        }
    }

    /// Hand a response to the waiting requester.
    pub(crate) fn complete_request(&self, response: ResponseFrame) {
        match self.pending_requests.remove(&response.request_id) {
            Some((_, waiter)) => {
                let _ = waiter.send(response);
            }
            None => log::debug!(
                "[Service] late or unknown response request_id={}",
                response.request_id
            ),
        }
    }

    fn withdraw(&self) {
        self.msg_discovery
            .withdraw(Address::new(self.addrs.publisher));
        self.msg_discovery
            .withdraw(Address::new(self.addrs.subscriber));
        self.srv_discovery.withdraw(Address::new(self.addrs.replier));
    }
}

/// Reference-counted transport context shared by nodes.
///
/// # Example
///
/// ```rust,no_run
/// use plexus::{Context, Node};
///
/// let ctx = Context::builder().verbose(true).build()?;
/// let node = Node::with_context(&ctx);
/// node.advertise("chatter")?;
/// # Ok::<(), plexus::Error>(())
/// ```
pub struct Context {
    shared: Arc<Shared>,
    waker: Arc<mio::Waker>,
    reception: Option<JoinHandle<()>>,
    access: Option<AccessControlHandle>,
    dispatcher: PublishDispatcher,
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    /// Standalone context configured from the environment.
    pub fn new() -> Result<Arc<Self>> {
        ContextBuilder::from_env().build()
    }

    /// Process-wide default context.
    ///
    /// Held weakly: every caller gets the same instance while one is alive,
    /// and it shuts down when the last reference goes away.
    pub fn default_instance() -> Result<Arc<Self>> {
        let slot = DEFAULT_CONTEXT.get_or_init(|| Mutex::new(Weak::new()));
        let mut current = slot.lock();
        if let Some(ctx) = current.upgrade() {
            return Ok(ctx);
        }
        let ctx = ContextBuilder::from_env().build()?;
        *current = Arc::downgrade(&ctx);
        Ok(ctx)
    }

    /// Identifier stamped on every message this context publishes.
    pub fn sender_id(&self) -> &str {
        &self.shared.sender_id
    }

    pub fn config(&self) -> &ContextConfig {
        &self.shared.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn publisher_address(&self) -> Address {
        Address::new(self.shared.addrs.publisher)
    }

    pub fn subscriber_address(&self) -> Address {
        Address::new(self.shared.addrs.subscriber)
    }

    pub fn service_address(&self) -> Address {
        Address::new(self.shared.addrs.replier)
    }

    /// Items waiting for the dispatcher.
    pub fn pending_dispatch(&self) -> usize {
        self.dispatcher.pending()
    }

    /// Toggle statistics for `topic`. Disabling discards what was collected.
    pub fn enable_topic_statistics(&self, topic: &str, enabled: bool) -> Result<()> {
        self.shared.set_topic_statistics(topic, enabled)
    }

    pub fn topic_statistics(&self, topic: &str) -> Option<TopicStatisticsSnapshot> {
        self.shared.topic_statistics(topic)
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.shared.exit.store(true, Ordering::Release);
        if let Err(e) = self.waker.wake() {
            log::debug!("[Context] waker failed: {}", e);
        }
        // Last reference dropped by a service handler: reception exits on its
        // own once the flag is seen, and access control follows when the
        // reception side of its channels goes away.
        let on_reception = self
            .reception
            .as_ref()
            .is_some_and(|h| h.thread().id() == std::thread::current().id());
        if let Some(handle) = self.reception.take() {
            if !on_reception && handle.join().is_err() {
                log::warn!("[Context] reception thread panicked");
            }
        }
        if let Some(access) = self.access.take() {
            if on_reception {
                log::debug!("[Context] dropped on reception thread, not joining");
            } else {
                access.join();
            }
        }
        self.dispatcher.shutdown();
        self.shared.withdraw();
        log::info!("[Context] {} stopped", self.shared.sender_id);
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("sender_id", &self.shared.sender_id)
            .field("addrs", &self.shared.addrs)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Context`].
pub struct ContextBuilder {
    config: ContextConfig,
    access_policy: Option<Arc<dyn AccessPolicy>>,
    discovery: Option<(Arc<dyn Discovery>, Arc<dyn Discovery>)>,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextBuilder {
    /// Loopback defaults, ignoring the environment.
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
            access_policy: None,
            discovery: None,
        }
    }

    /// Defaults taken from `PLEXUS_*` variables.
    pub fn from_env() -> Self {
        Self {
            config: ContextConfig::from_env(),
            ..Self::new()
        }
    }

    pub fn config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    pub fn host_ip(mut self, ip: IpAddr) -> Self {
        self.config.host_ip = ip;
        self
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.poll_timeout = timeout;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    /// Bound the local dispatch queue. Publishing into a full queue fails
    /// with [`Error::WouldBlock`].
    pub fn dispatch_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.dispatch_queue_capacity = Some(capacity.max(1));
        self
    }

    /// Credentials attached to outgoing frames. Unless another policy is
    /// set, peers must present the same pair.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config.credentials = Some(credentials);
        self
    }

    pub fn access_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.access_policy = Some(policy);
        self
    }

    /// Discovery instances for message topics and services.
    pub fn discovery(mut self, messages: Arc<dyn Discovery>, services: Arc<dyn Discovery>) -> Self {
        self.discovery = Some((messages, services));
        self
    }

    pub fn build(self) -> Result<Arc<Context>> {
        let ContextBuilder {
            config,
            access_policy,
            discovery,
        } = self;

        let sockets = Sockets::bind(config.host_ip)?;
        let addrs = LocalAddrs {
            publisher: sockets.publisher_addr()?,
            subscriber: sockets.subscriber_addr()?,
            response: sockets.response_addr()?,
            replier: sockets.replier_addr()?,
        };
        let inbound = sockets.inbound_clones()?;

        let (msg_discovery, srv_discovery) = discovery.unwrap_or_else(|| {
            (
                Arc::new(LocalDiscovery::new()) as Arc<dyn Discovery>,
                Arc::new(LocalDiscovery::new()) as Arc<dyn Discovery>,
            )
        });

        let policy = access_policy.or_else(|| {
            config
                .credentials
                .clone()
                .map(|c| Arc::new(PlainCredentials::new(c)) as Arc<dyn AccessPolicy>)
        });

        let metrics = Arc::new(TransportMetrics::new());
        let (dispatch_tx, dispatch_queue) = dispatch::queue(config.dispatch_queue_capacity);
        let capacity = config.dispatch_queue_capacity;

        let shared = Arc::new(Shared {
            sender_id: generate_sender_id(),
            config,
            state: Mutex::new(ContextState::new()),
            peers: RwLock::new(PeerTable::default()),
            msg_discovery,
            srv_discovery,
            pending_requests: DashMap::new(),
            next_request_id: AtomicU64::new(1),
            next_node_id: AtomicU64::new(1),
            exit: AtomicBool::new(false),
            dispatch: dispatch_tx.clone(),
            metrics: Arc::clone(&metrics),
            addrs,
            sockets,
        });

        register_discovery_callbacks(&shared);

        let observer: DeliveryObserver = {
            let weak = Arc::downgrade(&shared);
            Box::new(move |item| {
                if let Some(shared) = weak.upgrade() {
                    shared.observe(item);
                }
            })
        };
        let dispatcher =
            PublishDispatcher::spawn(dispatch_tx, dispatch_queue, observer, Arc::clone(&metrics))?;

        let poll = mio::Poll::new()?;
        let waker = Arc::new(mio::Waker::new(poll.registry(), reception::WAKER_TOKEN)?);

        let (access, channels) = match policy {
            Some(policy) => {
                let w = Arc::clone(&waker);
                let (handle, channels) = AccessControlHandle::start(policy, move || {
                    let _ = w.wake();
                })?;
                (Some(handle), Some(channels))
            }
            None => (None, None),
        };

        let reception = reception::Reception::new(Arc::clone(&shared), poll, inbound, channels)?
            .spawn()?;

        log::info!(
            "[Context] {} started sub={} rep={} queue={} access_control={}",
            shared.sender_id,
            addrs.subscriber,
            addrs.replier,
            capacity.map_or_else(|| "unbounded".to_string(), |c| c.to_string()),
            access.is_some()
        );

        Ok(Arc::new(Context {
            shared,
            waker,
            reception: Some(reception),
            access,
            dispatcher,
        }))
    }
}

fn register_discovery_callbacks(shared: &Arc<Shared>) {
    let on_found = |weak: Weak<Shared>| {
        Arc::new(move |event: &DiscoveryEvent| {
            if let Some(shared) = weak.upgrade() {
                if shared.peers.write().insert(event) {
                    log::debug!(
                        "[Discovery] {} learned {:?} topic='{}' at {}",
                        shared.sender_id,
                        event.kind,
                        event.topic,
                        event.address
                    );
                }
            }
        })
    };
    let on_gone = |weak: Weak<Shared>| {
        Arc::new(move |event: &DiscoveryEvent| {
            if let Some(shared) = weak.upgrade() {
                shared.peers.write().remove(event);
            }
        })
    };

    for discovery in [&shared.msg_discovery, &shared.srv_discovery] {
        discovery.on_discovered(on_found(Arc::downgrade(shared)));
        discovery.on_lost(on_gone(Arc::downgrade(shared)));
    }
}

/// Unique per context: timestamp, pid, thread hash and a process counter.
fn generate_sender_id() -> String {
    use std::hash::{Hash, Hasher};
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let tid_hash = {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        hasher.finish() as u32
    };
    let n = CONTEXT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(
        "{:x}-{:016x}-{:08x}-{}",
        std::process::id(),
        nanos,
        tid_hash,
        n
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> SubscriptionHandler {
        SubscriptionHandler::raw(|_, _| {})
    }

    #[test]
    fn test_sequence_per_topic() {
        let mut state = ContextState::new();
        assert_eq!(state.next_seq("a"), 1);
        assert_eq!(state.next_seq("a"), 2);
        assert_eq!(state.next_seq("b"), 1);
    }

    #[test]
    fn test_filter_tracks_any_subscribed_node() {
        let mut state = ContextState::new();
        state.registry_mut(1).subscribe("t", raw());
        state.registry_mut(2).subscribe("t", raw());
        state.refresh_filter("t");
        assert!(state.accepts("t"));

        state.registry_mut(1).unsubscribe("t");
        state.refresh_filter("t");
        assert!(state.accepts("t"));

        state.registry_mut(2).unsubscribe("t");
        state.refresh_filter("t");
        assert!(!state.accepts("t"));
    }

    #[test]
    fn test_wildcard_filter_accepts_everything() {
        let mut state = ContextState::new();
        state.registry_mut(1).set_subscribe_all(Arc::new(|_, _| {}));
        state.refresh_filter(WILDCARD_TOPIC);
        assert!(state.accepts("anything"));
    }

    #[test]
    fn test_local_handlers_ordering() {
        let mut state = ContextState::new();
        state.registry_mut(2).subscribe("t", raw());
        state
            .registry_mut(1)
            .subscribe("t", SubscriptionHandler::typed::<u32, _>(|_, _| {}));
        state.registry_mut(3).set_subscribe_all(Arc::new(|_, _| {}));

        let (typed, raw) = state.local_handlers("t");
        assert_eq!(typed.len(), 1);
        assert_eq!(raw.len(), 2);
        assert!(state.local_handlers("other").0.is_empty());
        assert_eq!(state.local_handlers("other").1.len(), 1);
    }

    #[test]
    fn test_topic_validation() {
        assert!(matches!(validate_topic(""), Err(Error::InvalidTopic)));
        assert!(matches!(validate_topic("*"), Err(Error::InvalidTopic)));
        assert!(validate_topic("chatter").is_ok());
        assert!(matches!(validate_service(""), Err(Error::InvalidService)));
    }

    #[test]
    fn test_sender_ids_unique() {
        let a = generate_sender_id();
        let b = generate_sender_id();
        assert_ne!(a, b);
    }
}
