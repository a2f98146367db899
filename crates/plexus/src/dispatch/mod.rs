// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local delivery pipeline.
//!
//! Publishers hand a [`PublishWorkItem`] to the dispatcher and return; a
//! dedicated worker thread runs the subscriber callbacks. Callbacks therefore
//! never run on the publishing thread, and a callback may itself publish.
//!
//! ```text
//! Node::publish ──┐
//!                 ├── channel (FIFO) ──> plexus-dispatch ──> typed handlers
//! reception ──────┘                                     └──> raw handlers
//! ```
//!
//! Shutdown drains: every item enqueued before [`PublishDispatcher::shutdown`]
//! is delivered before the worker exits.

pub mod handler;

use crate::context::metrics::TransportMetrics;
use crate::error::{Error, Result};
use crate::message::MessageInfo;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use handler::{RawCallback, TypedHandler};
use std::sync::Arc;
use std::thread::JoinHandle;

/// One pending local delivery.
pub struct PublishWorkItem {
    /// Typed handlers, in registration order.
    pub local_handlers: Vec<Arc<dyn TypedHandler>>,
    /// Raw handlers, in registration order. Run after the typed ones.
    pub raw_handlers: Vec<RawCallback>,
    /// Shared immutable payload.
    pub payload: Arc<[u8]>,
    pub size: usize,
    pub info: MessageInfo,
}

impl PublishWorkItem {
    pub fn new(
        local_handlers: Vec<Arc<dyn TypedHandler>>,
        raw_handlers: Vec<RawCallback>,
        payload: Arc<[u8]>,
        info: MessageInfo,
    ) -> Self {
        let size = payload.len();
        Self {
            local_handlers,
            raw_handlers,
            payload,
            size,
            info,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.local_handlers.is_empty() && self.raw_handlers.is_empty()
    }
}

/// Hook run by the worker before the handlers of each item.
pub type DeliveryObserver = Box<dyn Fn(&PublishWorkItem) + Send>;

/// Producer side of the dispatch queue.
#[derive(Clone)]
pub(crate) struct DispatchSender {
    tx: Sender<PublishWorkItem>,
}

impl DispatchSender {
    /// Hand an item to the worker without blocking.
    ///
    /// Fails with [`Error::WouldBlock`] when the queue is bounded and full.
    pub(crate) fn enqueue(&self, item: PublishWorkItem) -> Result<()> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::WouldBlock),
            Err(TrySendError::Disconnected(_)) => Err(Error::ShuttingDown),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.tx.len()
    }
}

/// Worker thread plus its queue.
pub struct PublishDispatcher {
    sender: DispatchSender,
    shutdown_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

/// Consumer side of the dispatch queue, owned by the worker.
pub(crate) struct DispatchQueue {
    rx: Receiver<PublishWorkItem>,
}

/// Create the dispatch queue. `capacity = None` gives an unbounded queue.
pub(crate) fn queue(capacity: Option<usize>) -> (DispatchSender, DispatchQueue) {
    let (tx, rx) = match capacity {
        Some(cap) => channel::bounded(cap),
        None => channel::unbounded(),
    };
    (DispatchSender { tx }, DispatchQueue { rx })
}

impl PublishDispatcher {
    /// Create a queue and spawn its worker.
    pub fn start(
        capacity: Option<usize>,
        observer: DeliveryObserver,
        metrics: Arc<TransportMetrics>,
    ) -> Result<Self> {
        let (sender, queue) = queue(capacity);
        Self::spawn(sender, queue, observer, metrics)
    }

    /// Spawn the worker on an existing queue.
    pub(crate) fn spawn(
        sender: DispatchSender,
        queue: DispatchQueue,
        observer: DeliveryObserver,
        metrics: Arc<TransportMetrics>,
    ) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = channel::bounded(1);
        let rx = queue.rx;

        let handle = std::thread::Builder::new()
            .name("plexus-dispatch".into())
            .spawn(move || worker_loop(rx, shutdown_rx, observer, metrics))?;

        log::debug!(
            "[Dispatch] worker started (capacity={})",
            sender
                .tx
                .capacity()
                .map_or_else(|| "unbounded".to_string(), |c| c.to_string())
        );

        Ok(Self {
            sender,
            shutdown_tx,
            handle: Some(handle),
        })
    }

    /// Enqueue directly on this dispatcher.
    pub fn enqueue(&self, item: PublishWorkItem) -> Result<()> {
        self.sender.enqueue(item)
    }

    /// Items waiting for the worker.
    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    /// Signal the worker, let it drain the queue, and join it.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.shutdown_tx.send(());
        if handle.thread().id() == std::thread::current().id() {
            // Last context reference dropped from inside a callback: the
            // worker drains and exits once the callback returns.
            log::debug!("[Dispatch] shutdown requested from worker thread");
            return;
        }
        if handle.join().is_err() {
            log::warn!("[Dispatch] worker panicked during shutdown");
        }
        log::debug!("[Dispatch] worker stopped");
    }
}

impl Drop for PublishDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    rx: Receiver<PublishWorkItem>,
    shutdown_rx: Receiver<()>,
    observer: DeliveryObserver,
    metrics: Arc<TransportMetrics>,
) {
    loop {
        channel::select! {
            recv(rx) -> item => match item {
                Ok(item) => deliver(&item, &observer, &metrics),
                Err(_) => break,
            },
            recv(shutdown_rx) -> _ => {
                let mut drained = 0usize;
                while let Ok(item) = rx.try_recv() {
                    deliver(&item, &observer, &metrics);
                    drained += 1;
                }
                if drained > 0 {
                    log::debug!("[Dispatch] drained {} items at shutdown", drained);
                }
                break;
            }
        }
    }
}

/// Run every handler of `item`. A failing handler is logged and counted;
/// the remaining handlers still run.
fn deliver(item: &PublishWorkItem, observer: &DeliveryObserver, metrics: &TransportMetrics) {
    observer(item);

    let info = &item.info;
    for handler in &item.local_handlers {
        if handler.type_name() != info.type_name {
            log::debug!(
                "[Dispatch] skip handler for topic='{}': expects {}, got {}",
                info.topic,
                handler.type_name(),
                info.type_name
            );
            continue;
        }
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            handler.invoke(&item.payload, info)
        }));
        record(outcome, info, metrics);
    }

    for handler in &item.raw_handlers {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            handler(&item.payload, info);
            Ok(())
        }));
        record(outcome, info, metrics);
    }
}

fn record(
    outcome: std::thread::Result<Result<()>>,
    info: &MessageInfo,
    metrics: &TransportMetrics,
) {
    match outcome {
        Ok(Ok(())) => TransportMetrics::bump(&metrics.local_deliveries),
        Ok(Err(e)) => {
            TransportMetrics::bump(&metrics.handler_failures);
            log::warn!(
                "[Dispatch] handler for topic='{}' seq={} failed: {}",
                info.topic,
                info.seq,
                e
            );
        }
        Err(_) => {
            TransportMetrics::bump(&metrics.handler_failures);
            log::warn!(
                "[Dispatch] handler for topic='{}' seq={} panicked",
                info.topic,
                info.seq
            );
        }
    }
}
