// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Plexus configuration.
//!
//! - **Static**: compile-time constants (timeouts, datagram limits, env names)
//! - **Dynamic**: [`ContextConfig`], seeded from the environment and refined
//!   through [`crate::ContextBuilder`]
//!
//! # Environment
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `PLEXUS_IP` | Host IP the context sockets bind to |
//! | `PLEXUS_VERBOSE` | `1` logs node lifecycle events at info level |
//! | `PLEXUS_USERNAME` / `PLEXUS_PASSWORD` | Enables PLAIN access control |
//! | `PLEXUS_DISPATCH_QUEUE` | Bounds the local dispatch queue |

use crate::security::Credentials;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Receive poll timeout. The reception loop re-checks the exit flag at least
/// this often even if the waker is never triggered.
pub const RECEIVE_POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// Largest UDP payload we will try to send (IPv4, 65535 - 8 - 20).
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Frames parked per peer while its connection request is being authorized.
pub const MAX_PENDING_FRAMES_PER_PEER: usize = 64;

/// Peers remembered by access control before decided entries are forgotten.
pub const MAX_TRACKED_PEERS: usize = 1024;

/// Default timeout for service requests issued without an explicit deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Host IP override.
pub const ENV_IP: &str = "PLEXUS_IP";
/// Verbose lifecycle logging.
pub const ENV_VERBOSE: &str = "PLEXUS_VERBOSE";
/// PLAIN access-control username.
pub const ENV_USERNAME: &str = "PLEXUS_USERNAME";
/// PLAIN access-control password.
pub const ENV_PASSWORD: &str = "PLEXUS_PASSWORD";
/// Dispatch queue bound.
pub const ENV_DISPATCH_QUEUE: &str = "PLEXUS_DISPATCH_QUEUE";

/// Runtime configuration of a [`crate::Context`].
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// IP address every context socket binds to (ephemeral ports).
    pub host_ip: IpAddr,
    /// Bounded wait of the reception poll.
    pub poll_timeout: Duration,
    /// Log node lifecycle events at info level.
    pub verbose: bool,
    /// `None` = unbounded dispatch queue.
    pub dispatch_queue_capacity: Option<usize>,
    /// Credentials attached to outgoing frames and, unless another policy is
    /// installed, required from peers.
    pub credentials: Option<Credentials>,
}

impl ContextConfig {
    /// Build a configuration from the `PLEXUS_*` environment variables.
    pub fn from_env() -> Self {
        let host_ip = std::env::var(ENV_IP)
            .ok()
            .and_then(|raw| match raw.parse::<IpAddr>() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    log::warn!("[Config] ignoring invalid {}='{}'", ENV_IP, raw);
                    None
                }
            })
            .unwrap_or_else(determine_host);

        let verbose = std::env::var(ENV_VERBOSE)
            .map(|v| v == "1")
            .unwrap_or(false);

        let dispatch_queue_capacity = std::env::var(ENV_DISPATCH_QUEUE)
            .ok()
            .and_then(|raw| raw.parse::<usize>().ok())
            .filter(|cap| *cap > 0);

        let credentials = match (std::env::var(ENV_USERNAME), std::env::var(ENV_PASSWORD)) {
            (Ok(username), Ok(password)) if !username.is_empty() => {
                Some(Credentials::new(username, password))
            }
            _ => None,
        };

        Self {
            host_ip,
            poll_timeout: RECEIVE_POLL_TIMEOUT,
            verbose,
            dispatch_queue_capacity,
            credentials,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            host_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            poll_timeout: RECEIVE_POLL_TIMEOUT,
            verbose: false,
            dispatch_queue_capacity: None,
            credentials: None,
        }
    }
}

/// Primary interface address, falling back to loopback.
fn determine_host() -> IpAddr {
    match local_ip_address::local_ip() {
        Ok(ip) => ip,
        Err(e) => {
            log::debug!("[Config] no primary interface ({}), using loopback", e);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}
