// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publish Latency Benchmark
//!
//! Measures the cost of `Node::publish()` for:
//! - Payload sizes with no subscriber (encode + bookkeeping only)
//! - A local subscriber (hand-off to the dispatcher)
//! - A remote subscriber in a second context (one UDP datagram)
//!
//! Plus end-to-end delivery to a local callback.

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_precision_loss)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use crossbeam::channel;
use plexus::protocol::{self, DataFrame, Frame};
use plexus::{Context, LocalDiscovery, Node};
use std::hint::black_box as bb;
use std::sync::Arc;
use std::time::Duration;

fn bench_publish_payload_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_latency_by_size");

    let ctx = Context::builder().build().expect("context creation");
    let node = Node::with_context(&ctx);
    node.advertise("bench/size").expect("advertise");

    for size in [64, 256, 1024, 4096, 16384] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let msg = vec![0xABu8; size];
            b.iter(|| {
                node.publish("bench/size", bb(&msg)).expect("publish should succeed");
            });
        });
    }

    group.finish();
}

fn bench_publish_destinations(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_latency_by_destination");
    let msg = vec![0x5Au8; 256];

    let local_ctx = Context::builder().build().expect("context creation");
    let talker = Node::with_context(&local_ctx);
    let listener = Node::with_context(&local_ctx);
    listener
        .subscribe_raw("bench/local", |payload, _| {
            bb(payload.len());
        })
        .expect("subscribe");
    group.bench_function("local_subscriber", |b| {
        b.iter(|| {
            talker.publish("bench/local", bb(&msg)).expect("publish should succeed");
        });
    });

    let msgs = Arc::new(LocalDiscovery::new());
    let srvs = Arc::new(LocalDiscovery::new());
    let build = || {
        Context::builder()
            .discovery(msgs.clone(), srvs.clone())
            .build()
            .expect("context creation")
    };
    let (ctx_a, ctx_b) = (build(), build());
    let remote_listener = Node::with_context(&ctx_a);
    let remote_talker = Node::with_context(&ctx_b);
    remote_listener
        .subscribe_raw("bench/remote", |payload, _| {
            bb(payload.len());
        })
        .expect("subscribe");
    group.bench_function("remote_subscriber", |b| {
        b.iter(|| {
            remote_talker
                .publish("bench/remote", bb(&msg))
                .expect("publish should succeed");
        });
    });

    group.finish();
}

fn bench_local_round_trip(c: &mut Criterion) {
    let ctx = Context::builder().build().expect("context creation");
    let talker = Node::with_context(&ctx);
    let listener = Node::with_context(&ctx);
    let (tx, rx) = channel::bounded::<u64>(1);
    listener
        .subscribe::<u64, _>("bench/rtt", move |_, v| {
            let _ = tx.send(*v);
        })
        .expect("subscribe");

    c.bench_function("local_publish_to_callback", |b| {
        let mut seq = 0u64;
        b.iter(|| {
            seq += 1;
            talker.publish("bench/rtt", &seq).expect("publish should succeed");
            let got = rx
                .recv_timeout(Duration::from_secs(1))
                .expect("delivery");
            bb(got);
        });
    });
}

fn bench_frame_encode(c: &mut Criterion) {
    let frame = Frame::Data(DataFrame {
        topic: "bench/frame".to_string(),
        type_name: "plexus.Bytes".to_string(),
        sender: "bench".to_string(),
        seq: 1,
        stamp: 0,
        payload: vec![0u8; 1024],
    });
    c.bench_function("frame_encode_1k", |b| {
        b.iter(|| protocol::encode(bb(&frame), None).expect("encode"));
    });
    let bytes = protocol::encode(&frame, None).expect("encode");
    c.bench_function("frame_decode_1k", |b| {
        b.iter(|| protocol::decode(bb(&bytes)).expect("decode"));
    });
}

criterion_group!(
    publish_benches,
    bench_publish_payload_sizes,
    bench_publish_destinations,
    bench_local_round_trip,
    bench_frame_encode
);
criterion_main!(publish_benches);
