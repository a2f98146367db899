// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Plexus - topic-based messaging core
//!
//! Publishers and subscribers exchange named, typed messages without knowing
//! where the other side lives. Discovery resolves topic names to network
//! addresses; messages between nodes of the same process never touch the
//! network.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use plexus::{Node, Result};
//!
//! fn main() -> Result<()> {
//!     let node = Node::new()?;
//!
//!     node.subscribe::<String, _>("chatter", |topic, msg| {
//!         println!("{}: {}", topic, msg);
//!     })?;
//!
//!     node.advertise("chatter")?;
//!     node.publish("chatter", &"hello".to_string())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------+
//! |  Node (per handle: topic registry)                            |
//! +---------------------------------------------------------------+
//! |  Context (per process or explicit)                            |
//! |   state lock: registries | sequences | statistics             |
//! |   plexus-dispatch   : local callbacks, FIFO                    |
//! |   plexus-reception  : inbound UDP, bounded poll + waker        |
//! |   plexus-access     : optional access-control policy           |
//! +---------------------------------------------------------------+
//! |  Discovery (trait)        |  UDP sockets (socket2 + mio)       |
//! +---------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Node`] | Advertise, publish, subscribe, services |
//! | [`Context`] | Shared sockets, threads and tables |
//! | [`Message`] | Encode/decode contract for payloads |
//! | [`Discovery`] | Endpoint announcement and lookup |
//! | [`TopicStatisticsSnapshot`] | Rate, jitter and drop counters |

pub mod config;
pub mod context;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod node;
pub mod protocol;
pub mod security;
pub mod stats;
pub mod transport;

pub use config::ContextConfig;
pub use context::metrics::{MetricsSnapshot, TransportMetrics};
pub use context::{Context, ContextBuilder, NodeId};
pub use discovery::{Address, Discovery, DiscoveryCallback, DiscoveryEvent, EndpointKind, LocalDiscovery};
pub use dispatch::handler::{RawCallback, SubscriptionHandler};
pub use dispatch::{PublishDispatcher, PublishWorkItem};
pub use error::{Error, Result};
pub use message::{Message, MessageInfo};
pub use node::registry::{TopicEntry, TopicRegistry};
pub use node::Node;
pub use security::{AccessPolicy, AllowAll, ConnectionRequest, Credentials, PeerAllowList, PlainCredentials};
pub use stats::{PublicationMetadata, Statistics, StatisticsTracker, TopicStatistics, TopicStatisticsSnapshot};
