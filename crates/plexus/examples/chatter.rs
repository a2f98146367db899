// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Example readability

//! Talker/listener demo.
//!
//! Runs two contexts in one process (standing in for two programs) that
//! share a discovery directory, plus a `double` service.
//!
//! ```text
//! RUST_LOG=plexus=debug cargo run -p plexus --example chatter
//! ```

use plexus::{Context, LocalDiscovery, Node, Result};
use std::sync::Arc;
use std::time::Duration;

/// A small user-defined message.
#[derive(Debug, Clone, PartialEq)]
struct Pose {
    x: f32,
    y: f32,
}

impl plexus::Message for Pose {
    fn type_name() -> &'static str {
        "demo.Pose"
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&self.x.to_le_bytes());
        buf.extend_from_slice(&self.y.to_le_bytes());
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != 8 {
            return Err(plexus::Error::Deserialization(format!(
                "Pose needs 8 bytes, got {}",
                buf.len()
            )));
        }
        let x = f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let y = f32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Ok(Self { x, y })
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== Plexus Chatter Example ===\n");

    let msgs = Arc::new(LocalDiscovery::new());
    let srvs = Arc::new(LocalDiscovery::new());
    let talker_ctx = Context::builder()
        .discovery(msgs.clone(), srvs.clone())
        .build()?;
    let listener_ctx = Context::builder().discovery(msgs, srvs).build()?;

    let listener = Node::with_context(&listener_ctx);
    listener.subscribe::<Pose, _>("pose", |topic, pose| {
        println!("[listener] {}: x={:.1} y={:.1}", topic, pose.x, pose.y);
    })?;
    listener.enable_topic_statistics("pose", true)?;
    listener.advertise_service::<u32, u32, _>("double", |x| Ok(x * 2))?;

    let talker = Node::with_context(&talker_ctx);
    talker.advertise("pose")?;
    for i in 0..10u8 {
        let pose = Pose {
            x: f32::from(i),
            y: f32::from(i) * 0.5,
        };
        talker.publish("pose", &pose)?;
        std::thread::sleep(Duration::from_millis(100));
    }

    let doubled: u32 = talker.request("double", &21u32, Duration::from_secs(1))?;
    println!("[talker] double(21) = {}", doubled);

    if let Some(stats) = listener.topic_statistics("pose") {
        println!(
            "[listener] pose: {:.1} Hz, {} dropped",
            stats.hz(),
            stats.dropped_msg_count
        );
    }
    println!("[talker] {:?}", talker_ctx.metrics());

    Ok(())
}
