// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic recorder.
//!
//! Subscribes to every topic of a context through a dedicated node and
//! appends each delivered message to a log file. Messages are written from
//! the context's dispatcher thread, in delivery order.

use crate::filter::TopicFilter;
use crate::format::{FormatError, LogRecord, LogWriter};
use parking_lot::Mutex;
use plexus::{Context, MessageInfo, Node};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Recorder errors.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Already recording")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("Transport error: {0}")]
    Transport(#[from] plexus::Error),
}

/// Recording statistics.
#[derive(Debug, Clone, Default)]
pub struct RecordingStats {
    /// Messages written.
    pub message_count: u64,

    /// Bytes written, header included.
    pub bytes_written: u64,

    /// Messages that could not be written.
    pub write_errors: u64,

    /// Distinct topics recorded.
    pub topic_count: usize,

    /// Recording duration in seconds.
    pub duration_secs: f64,

    /// Messages per second (average).
    pub messages_per_second: f64,
}

/// Writer state shared with the subscription callback.
struct Sink {
    writer: Option<LogWriter>,
    filter: Option<TopicFilter>,
    topics: BTreeSet<String>,
    write_errors: u64,
}

impl Sink {
    fn write(&mut self, payload: &[u8], info: &MessageInfo) {
        if let Some(filter) = &self.filter {
            if !filter.matches(&info.topic) {
                return;
            }
        }
        // Stopped: late deliveries still queued in the dispatcher are dropped.
        let Some(writer) = self.writer.as_mut() else {
            return;
        };

        let record = LogRecord {
            receive_ns: unix_nanos(),
            topic: info.topic.clone(),
            type_name: info.type_name.clone(),
            payload: payload.to_vec(),
        };
        match writer.append(&record) {
            Ok(_) => {
                if !self.topics.contains(&info.topic) {
                    tracing::debug!("Recording new topic {} ({})", info.topic, info.type_name);
                    self.topics.insert(info.topic.clone());
                }
            }
            Err(e) => {
                self.write_errors += 1;
                tracing::warn!("Failed to record message on {}: {}", info.topic, e);
            }
        }
    }

    fn stats(&self) -> RecordingStats {
        RecordingStats {
            message_count: self.writer.as_ref().map_or(0, LogWriter::record_count),
            bytes_written: self.writer.as_ref().map_or(0, LogWriter::bytes_written),
            write_errors: self.write_errors,
            topic_count: self.topics.len(),
            ..Default::default()
        }
    }
}

struct Session {
    node: Node,
    sink: Arc<Mutex<Sink>>,
    path: PathBuf,
    started: Instant,
}

/// Records messages of a context to a `.plxlog` file.
pub struct Recorder {
    ctx: Arc<Context>,
    filter: Option<TopicFilter>,
    session: Option<Session>,
}

impl Recorder {
    /// Recorder on `ctx`. Without [`Recorder::add_topic`] every topic is
    /// recorded.
    pub fn new(ctx: &Arc<Context>) -> Self {
        Self {
            ctx: Arc::clone(ctx),
            filter: None,
            session: None,
        }
    }

    /// Record topics matching `pattern` (`*` wildcards). Takes effect at
    /// the next [`Recorder::start`].
    pub fn add_topic(&mut self, pattern: impl Into<String>) {
        let pattern: String = pattern.into();
        match &mut self.filter {
            Some(filter) => filter.add(pattern),
            None => self.filter = Some(TopicFilter::include([pattern])),
        }
    }

    /// Open `path` and start recording.
    pub fn start<P: AsRef<Path>>(&mut self, path: P) -> Result<(), RecorderError> {
        if self.session.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }

        let path = path.as_ref().to_path_buf();
        let writer = LogWriter::create(&path)?;
        let sink = Arc::new(Mutex::new(Sink {
            writer: Some(writer),
            filter: self.filter.clone(),
            topics: BTreeSet::new(),
            write_errors: 0,
        }));

        let node = Node::with_context(&self.ctx);
        let cb_sink = Arc::clone(&sink);
        node.subscribe_raw_all(move |payload, info| {
            cb_sink.lock().write(payload, info);
        })?;

        tracing::info!("Started recording to {}", path.display());
        self.session = Some(Session {
            node,
            sink,
            path,
            started: Instant::now(),
        });
        Ok(())
    }

    /// Stop recording and flush the file.
    pub fn stop(&mut self) -> Result<RecordingStats, RecorderError> {
        let session = self.session.take().ok_or(RecorderError::NotRecording)?;
        session.node.unsubscribe_all();

        let (mut stats, writer) = {
            let mut sink = session.sink.lock();
            (sink.stats(), sink.writer.take())
        };
        if let Some(writer) = writer {
            writer.into_inner()?;
        }

        stats.duration_secs = session.started.elapsed().as_secs_f64();
        if stats.duration_secs > 0.0 {
            stats.messages_per_second = stats.message_count as f64 / stats.duration_secs;
        }

        tracing::info!(
            "Stopped recording {}: {} messages, {:.1}s",
            session.path.display(),
            stats.message_count,
            stats.duration_secs
        );
        Ok(stats)
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Statistics of the current session, if any.
    pub fn stats(&self) -> Option<RecordingStats> {
        self.session.as_ref().map(|s| {
            let mut stats = s.sink.lock().stats();
            stats.duration_secs = s.started.elapsed().as_secs_f64();
            stats
        })
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.session.is_some() {
            if let Err(e) = self.stop() {
                tracing::warn!("Failed to finalize recording: {}", e);
            }
        }
    }
}

fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
