// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Access-control gating of inbound peers.

use crossbeam::channel;
use plexus::{AccessPolicy, Context, ContextBuilder, Credentials, LocalDiscovery, Node, PeerAllowList};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(2);

struct Directory {
    msgs: Arc<LocalDiscovery>,
    srvs: Arc<LocalDiscovery>,
}

impl Directory {
    fn new() -> Self {
        Self {
            msgs: Arc::new(LocalDiscovery::new()),
            srvs: Arc::new(LocalDiscovery::new()),
        }
    }

    fn builder(&self) -> ContextBuilder {
        Context::builder()
            .poll_timeout(Duration::from_millis(20))
            .discovery(self.msgs.clone(), self.srvs.clone())
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[test]
fn empty_allow_list_denies_everyone() {
    let dir = Directory::new();
    let secured = dir
        .builder()
        .access_policy(Arc::new(PeerAllowList::default()) as Arc<dyn AccessPolicy>)
        .build()
        .expect("secured context");
    let open = dir.builder().build().expect("open context");

    let listener = Node::with_context(&secured);
    let talker = Node::with_context(&open);
    let (tx, rx) = channel::unbounded();
    listener
        .subscribe::<u32, _>("t", move |_, v| {
            let _ = tx.send(*v);
        })
        .expect("subscribe");

    talker.publish("t", &1u32).expect("publish");
    talker.publish("t", &2u32).expect("publish");

    assert!(wait_until(|| secured.metrics().frames_denied >= 1));
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(secured.metrics().local_deliveries, 0);
}

#[test]
fn loopback_allow_list_accepts() {
    let dir = Directory::new();
    let policy = PeerAllowList::new([IpAddr::from([127, 0, 0, 1])]);
    let secured = dir
        .builder()
        .access_policy(Arc::new(policy))
        .build()
        .expect("secured context");
    let open = dir.builder().build().expect("open context");

    let listener = Node::with_context(&secured);
    let talker = Node::with_context(&open);
    let (tx, rx) = channel::unbounded();
    listener
        .subscribe::<u32, _>("t", move |_, v| {
            let _ = tx.send(*v);
        })
        .expect("subscribe");

    // Frames parked while the decision is pending are replayed in order.
    for i in 0..3u32 {
        talker.publish("t", &i).expect("publish");
    }
    for expected in 0..3u32 {
        assert_eq!(rx.recv_timeout(WAIT).expect("delivery"), expected);
    }
    assert_eq!(secured.metrics().frames_denied, 0);
}

#[test]
fn matching_credentials_are_accepted() {
    let dir = Directory::new();
    let creds = Credentials::new("robot", "s3cret");
    let secured = dir
        .builder()
        .credentials(creds.clone())
        .build()
        .expect("secured context");
    let peer = dir
        .builder()
        .credentials(creds)
        .build()
        .expect("peer context");

    let listener = Node::with_context(&secured);
    let talker = Node::with_context(&peer);
    let (tx, rx) = channel::unbounded();
    listener
        .subscribe_raw("t", move |payload, _| {
            let _ = tx.send(payload.to_vec());
        })
        .expect("subscribe");

    talker.publish("t", &"let me in".to_string()).expect("publish");
    assert_eq!(rx.recv_timeout(WAIT).expect("delivery"), b"let me in");
}

#[test]
fn wrong_credentials_are_denied() {
    let dir = Directory::new();
    let secured = dir
        .builder()
        .credentials(Credentials::new("robot", "s3cret"))
        .build()
        .expect("secured context");
    let intruder = dir
        .builder()
        .credentials(Credentials::new("robot", "guess"))
        .build()
        .expect("intruder context");
    let anonymous = dir.builder().build().expect("anonymous context");

    let listener = Node::with_context(&secured);
    let (tx, rx) = channel::unbounded();
    listener
        .subscribe::<u32, _>("t", move |_, v| {
            let _ = tx.send(*v);
        })
        .expect("subscribe");

    Node::with_context(&intruder)
        .publish("t", &1u32)
        .expect("publish");
    Node::with_context(&anonymous)
        .publish("t", &2u32)
        .expect("publish");

    assert!(wait_until(|| secured.metrics().frames_denied >= 2));
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn secured_context_dropped_inside_remote_service() {
    let dir = Directory::new();
    let policy = PeerAllowList::new([IpAddr::from([127, 0, 0, 1])]);
    let secured = dir
        .builder()
        .access_policy(Arc::new(policy))
        .build()
        .expect("secured context");
    let open = dir.builder().build().expect("open context");

    // The handler owns the only remaining reference to the secured context,
    // so the context is torn down on its own reception thread.
    let owner: Arc<Mutex<Option<Node>>> = Arc::new(Mutex::new(None));
    let (done_tx, done_rx) = channel::unbounded();
    let server = Node::with_context(&secured);
    let slot = Arc::clone(&owner);
    server
        .advertise_service::<u32, u32, _>("last", move |x| {
            let node = slot.lock().expect("slot").take();
            drop(node);
            let _ = done_tx.send(());
            Ok(x + 1)
        })
        .expect("advertise service");
    *owner.lock().expect("owner") = Some(server);
    drop(secured);

    let client = Node::with_context(&open);
    let reply: u32 = client.request("last", &1u32, WAIT).expect("reply");
    assert_eq!(reply, 2);
    done_rx.recv_timeout(WAIT).expect("handler returned");
    assert!(owner.lock().expect("owner").is_none());
}
