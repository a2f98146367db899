// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by publishers, the dispatcher and the reception thread.
///
/// All fields use relaxed atomics; readers only need monotonic snapshots.
#[derive(Debug, Default)]
pub struct TransportMetrics {
    pub messages_published: AtomicU64,
    pub local_deliveries: AtomicU64,
    pub handler_failures: AtomicU64,
    pub remote_frames_sent: AtomicU64,
    pub remote_send_errors: AtomicU64,
    pub frames_received: AtomicU64,
    pub frames_malformed: AtomicU64,
    pub frames_denied: AtomicU64,
    pub dispatch_rejections: AtomicU64,
}

/// Point-in-time copy of [`TransportMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_published: u64,
    pub local_deliveries: u64,
    pub handler_failures: u64,
    pub remote_frames_sent: u64,
    pub remote_send_errors: u64,
    pub frames_received: u64,
    pub frames_malformed: u64,
    pub frames_denied: u64,
    pub dispatch_rejections: u64,
}

impl TransportMetrics {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_published: self.messages_published.load(Ordering::Relaxed),
            local_deliveries: self.local_deliveries.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            remote_frames_sent: self.remote_frames_sent.load(Ordering::Relaxed),
            remote_send_errors: self.remote_send_errors.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_malformed: self.frames_malformed.load(Ordering::Relaxed),
            frames_denied: self.frames_denied.load(Ordering::Relaxed),
            dispatch_rejections: self.dispatch_rejections.load(Ordering::Relaxed),
        }
    }
}
