// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request/reply services, local and remote.

use plexus::{Context, Error, LocalDiscovery, Node};
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(2);

fn pair() -> (Arc<Context>, Arc<Context>) {
    let msgs = Arc::new(LocalDiscovery::new());
    let srvs = Arc::new(LocalDiscovery::new());
    let build = || {
        Context::builder()
            .poll_timeout(Duration::from_millis(20))
            .discovery(msgs.clone(), srvs.clone())
            .build()
            .expect("context")
    };
    (build(), build())
}

#[test]
fn local_service_is_called_directly() {
    let ctx = Context::builder().build().expect("context");
    let server = Node::with_context(&ctx);
    let client = Node::with_context(&ctx);

    server
        .advertise_service::<u32, u32, _>("double", |x| Ok(x * 2))
        .expect("advertise service");
    assert_eq!(server.advertised_services(), vec!["double".to_string()]);

    let reply: u32 = client.request("double", &21u32, TIMEOUT).expect("reply");
    assert_eq!(reply, 42);
    assert_eq!(ctx.metrics().frames_received, 0);
}

#[test]
fn remote_service_round_trip() {
    let (a, b) = pair();
    let server = Node::with_context(&a);
    let client = Node::with_context(&b);

    server
        .advertise_service::<String, String, _>("echo", |s| Ok(s.to_uppercase()))
        .expect("advertise service");

    let reply: String = client
        .request("echo", &"hello".to_string(), TIMEOUT)
        .expect("reply");
    assert_eq!(reply, "HELLO");
}

#[test]
fn unknown_service_is_unavailable() {
    let ctx = Context::builder().build().expect("context");
    let client = Node::with_context(&ctx);

    let result: plexus::Result<u32> = client.request("nobody", &1u32, TIMEOUT);
    assert!(matches!(result, Err(Error::ServiceUnavailable(name)) if name == "nobody"));
    assert!(matches!(
        client.request::<u32, u32>("", &1u32, TIMEOUT),
        Err(Error::InvalidService)
    ));
}

#[test]
fn provider_errors_are_reported() {
    let (a, b) = pair();
    let server = Node::with_context(&a);
    server
        .advertise_service::<u32, u32, _>("checked", |x| {
            if *x == 0 {
                Err(Error::ServiceFailed("zero not allowed".into()))
            } else {
                Ok(100 / x)
            }
        })
        .expect("advertise service");

    let local = Node::with_context(&a);
    assert!(matches!(
        local.request::<u32, u32>("checked", &0u32, TIMEOUT),
        Err(Error::ServiceFailed(msg)) if msg.contains("zero not allowed")
    ));

    let remote = Node::with_context(&b);
    assert_eq!(
        remote
            .request::<u32, u32>("checked", &4u32, TIMEOUT)
            .expect("ok"),
        25
    );
    assert!(matches!(
        remote.request::<u32, u32>("checked", &0u32, TIMEOUT),
        Err(Error::ServiceFailed(msg)) if msg.contains("zero not allowed")
    ));
}

#[test]
fn slow_provider_times_out() {
    let (a, b) = pair();
    let server = Node::with_context(&a);
    server
        .advertise_service::<u32, u32, _>("slow", |x| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(*x)
        })
        .expect("advertise service");

    let client = Node::with_context(&b);
    assert!(matches!(
        client.request::<u32, u32>("slow", &1u32, Duration::from_millis(50)),
        Err(Error::Timeout)
    ));
}

#[test]
fn unadvertised_service_disappears_locally() {
    let ctx = Context::builder().build().expect("context");
    let node = Node::with_context(&ctx);
    node.advertise_service::<u32, u32, _>("id", |x| Ok(*x))
        .expect("advertise service");
    assert_eq!(node.request::<u32, u32>("id", &5, TIMEOUT).expect("reply"), 5);

    node.unadvertise_service("id").expect("unadvertise");
    assert!(node.advertised_services().is_empty());
    assert!(matches!(
        node.request::<u32, u32>("id", &5, TIMEOUT),
        Err(Error::ServiceUnavailable(_))
    ));
}
