// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Plexus Recording
//!
//! Records the messages flowing through a plexus context into an
//! append-only `.plxlog` file, and reads them back.
//!
//! # Quick Start
//!
//! ```bash
//! # Record every topic until Ctrl+C
//! plexus-record --output capture.plxlog
//!
//! # Record sensor topics for 30 seconds
//! plexus-record --output capture.plxlog --topic "sensors/*" --duration 30
//! ```
//!
//! ```rust,no_run
//! use plexus::Context;
//! use plexus_recording::{LogReader, Recorder};
//!
//! # fn main() -> anyhow::Result<()> {
//! let ctx = Context::new()?;
//! let mut recorder = Recorder::new(&ctx);
//! recorder.add_topic("chatter");
//! recorder.start("capture.plxlog")?;
//! // ...
//! recorder.stop()?;
//!
//! for record in LogReader::open("capture.plxlog")? {
//!     let record = record?;
//!     println!("{} {} bytes", record.topic, record.payload.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod filter;
pub mod format;
pub mod recorder;

pub use filter::TopicFilter;
pub use format::{FormatError, LogReader, LogRecord, LogWriter};
pub use recorder::{Recorder, RecorderError, RecordingStats};
