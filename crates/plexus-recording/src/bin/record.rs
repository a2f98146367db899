// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! plexus-record - Record plexus topics to file.
//!
//! Usage:
//!   plexus-record --output capture.plxlog
//!   plexus-record --output capture.plxlog --topic "sensors/*" --topic chatter
//!   plexus-record --output capture.plxlog --duration 30

use clap::Parser;
use plexus::ContextBuilder;
use plexus_recording::Recorder;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "plexus-record")]
#[command(about = "Record plexus topics to file")]
#[command(version)]
struct Args {
    /// Output file path (.plxlog)
    #[arg(short, long)]
    output: PathBuf,

    /// Topic pattern to record (repeatable, supports wildcards; default: all)
    #[arg(short, long = "topic")]
    topics: Vec<String>,

    /// Duration to record (seconds, 0 = until Ctrl+C)
    #[arg(long, default_value = "0")]
    duration: u64,

    /// Host IP to bind on (overrides PLEXUS_IP)
    #[arg(long)]
    ip: Option<IpAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Quiet mode (minimal output)
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = args.log_level.parse().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .init();

    let mut builder = ContextBuilder::from_env();
    if let Some(ip) = args.ip {
        builder = builder.host_ip(ip);
    }
    let ctx = builder.build()?;

    let mut recorder = Recorder::new(&ctx);
    for pattern in &args.topics {
        recorder.add_topic(pattern.as_str());
    }

    if !args.quiet {
        info!("Plexus Recorder v{}", env!("CARGO_PKG_VERSION"));
        info!("Context: {} on {}", ctx.sender_id(), ctx.subscriber_address());
        info!("Output: {}", args.output.display());
        if args.topics.is_empty() {
            info!("Topics: all");
        } else {
            info!("Topics: {}", args.topics.join(", "));
        }
    }

    recorder.start(&args.output)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    if !args.quiet {
        info!("Recording started. Press Ctrl+C to stop.");
    }

    let start = Instant::now();
    let limit = (args.duration > 0).then(|| Duration::from_secs(args.duration));
    let mut last_report = Instant::now();

    while running.load(Ordering::SeqCst) {
        if limit.is_some_and(|limit| start.elapsed() >= limit) {
            info!("Duration limit reached");
            break;
        }

        if !args.quiet && last_report.elapsed() >= Duration::from_secs(10) {
            if let Some(stats) = recorder.stats() {
                info!(
                    "Recorded {} messages on {} topics ({:.1} MB)",
                    stats.message_count,
                    stats.topic_count,
                    stats.bytes_written as f64 / 1_048_576.0
                );
            }
            last_report = Instant::now();
        }

        std::thread::sleep(Duration::from_millis(100));
    }

    let stats = recorder.stop()?;

    if !args.quiet {
        info!("Recording stopped");
        info!("  Messages: {}", stats.message_count);
        info!("  Topics: {}", stats.topic_count);
        info!("  Duration: {:.1}s", stats.duration_secs);
        info!("  Throughput: {:.1} msg/s", stats.messages_per_second);
        if stats.write_errors > 0 {
            info!("  Write errors: {}", stats.write_errors);
        }
        info!("  File: {}", args.output.display());
    }

    Ok(())
}
