// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Access control for incoming peer connections.
//!
//! UDP has no connection handshake, so the first frame received from an
//! unseen peer address is treated as its connection request. The reception
//! thread parks that peer's frames and hands a [`ConnectionRequest`] to the
//! access-control thread, which evaluates the installed [`AccessPolicy`] and
//! sends back an [`AccessDecision`].
//!
//! ```text
//! Reception thread                    Access-control thread
//!   frame from new peer
//!     -> park frame
//!     -> requests.send(req)  ------>  policy.authorize(&req)
//!                                     decisions.send(decision)
//!   waker fires  <-----------------   waker.wake()
//!   drain decisions
//!     -> replay or drop parked frames
//! ```
//!
//! The access-control thread never touches the context state lock; policies
//! run concurrently with Publish/Subscribe callers.

use crossbeam::channel::{self, Receiver, Sender};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::thread::JoinHandle;

/// PLAIN username/password pair carried in frame headers.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A peer asking to be accepted.
#[derive(Debug, Clone)]
pub struct ConnectionRequest {
    /// Source address of the first frame.
    pub peer: SocketAddr,
    /// Credentials carried by that frame, if any.
    pub credentials: Option<Credentials>,
}

/// Outcome of a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    pub peer: SocketAddr,
    pub allowed: bool,
}

/// Pluggable access-control policy.
///
/// Called on the access-control thread, once per new peer address.
pub trait AccessPolicy: Send + Sync {
    /// Return `true` to accept frames from `request.peer`.
    fn authorize(&self, request: &ConnectionRequest) -> bool;
}

/// Accepts every peer.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn authorize(&self, _request: &ConnectionRequest) -> bool {
        true
    }
}

/// Requires peers to present the exact username/password.
#[derive(Debug, Clone)]
pub struct PlainCredentials {
    expected: Credentials,
}

impl PlainCredentials {
    pub fn new(expected: Credentials) -> Self {
        Self { expected }
    }
}

impl AccessPolicy for PlainCredentials {
    fn authorize(&self, request: &ConnectionRequest) -> bool {
        request.credentials.as_ref() == Some(&self.expected)
    }
}

/// Accepts peers whose IP is in the list.
#[derive(Debug, Clone, Default)]
pub struct PeerAllowList {
    ips: HashSet<IpAddr>,
}

impl PeerAllowList {
    pub fn new(ips: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            ips: ips.into_iter().collect(),
        }
    }
}

impl AccessPolicy for PeerAllowList {
    fn authorize(&self, request: &ConnectionRequest) -> bool {
        self.ips.contains(&request.peer.ip())
    }
}

/// Reception-side ends of the access-control channels.
pub(crate) struct AccessChannels {
    pub(crate) requests: Sender<ConnectionRequest>,
    pub(crate) decisions: Receiver<AccessDecision>,
}

/// Join handle of the access-control thread.
pub(crate) struct AccessControlHandle {
    handle: JoinHandle<()>,
}

impl AccessControlHandle {
    /// Spawn the access-control thread.
    ///
    /// `wake` is invoked after each decision so the reception poll notices
    /// it immediately instead of at the next poll timeout. The thread exits
    /// once the returned [`AccessChannels`] are dropped.
    pub(crate) fn start<W>(
        policy: Arc<dyn AccessPolicy>,
        wake: W,
    ) -> std::io::Result<(Self, AccessChannels)>
    where
        W: Fn() + Send + 'static,
    {
        let (req_tx, req_rx) = channel::unbounded::<ConnectionRequest>();
        let (dec_tx, dec_rx) = channel::unbounded::<AccessDecision>();

        let handle = std::thread::Builder::new()
            .name("plexus-access".into())
            .spawn(move || access_control_loop(policy, req_rx, dec_tx, wake))?;

        Ok((
            Self { handle },
            AccessChannels {
                requests: req_tx,
                decisions: dec_rx,
            },
        ))
    }

    /// Join the thread. The channels must already be dropped.
    pub(crate) fn join(self) {
        if self.handle.join().is_err() {
            log::warn!("[AccessControl] thread panicked during shutdown");
        }
    }
}

/// Blocks on the request channel (no lock held), evaluates the policy and
/// reports back. Exits when the reception side drops its sender.
fn access_control_loop<W>(
    policy: Arc<dyn AccessPolicy>,
    requests: Receiver<ConnectionRequest>,
    decisions: Sender<AccessDecision>,
    wake: W,
) where
    W: Fn(),
{
    log::debug!("[AccessControl] thread started");
    for request in requests.iter() {
        let allowed = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            policy.authorize(&request)
        })) {
            Ok(allowed) => allowed,
            Err(_) => {
                log::warn!(
                    "[AccessControl] policy panicked for peer {}; denying",
                    request.peer
                );
                false
            }
        };

        if allowed {
            log::debug!("[AccessControl] accepted peer {}", request.peer);
        } else {
            log::warn!("[AccessControl] denied peer {}", request.peer);
        }

        if decisions
            .send(AccessDecision {
                peer: request.peer,
                allowed,
            })
            .is_err()
        {
            break;
        }
        wake();
    }
    log::debug!("[AccessControl] thread exiting");
}
