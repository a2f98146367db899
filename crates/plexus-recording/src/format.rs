// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Append-only message log (`.plxlog`).
//!
//! # Layout
//!
//! ```text
//! +---------------------------------------------------------+
//! | File Header (16 bytes)                                  |
//! |  Magic "PLXLOG\0\0" (8) | Version (4) | Flags (4)        |
//! +---------------------------------------------------------+
//! | Record 0                                                |
//! |  len (4) | crc32 (4) | body (len bytes)                  |
//! +---------------------------------------------------------+
//! | Record 1 ...                                            |
//! +---------------------------------------------------------+
//!
//! body = receive_ns (8) | topic_len (2) | type_len (2)
//!        | topic | type | payload
//! ```
//!
//! All integers are little-endian. The CRC covers the body. There is no
//! footer, so a log cut short by a crash stays readable up to the last
//! complete record.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Magic bytes: "PLXLOG\0\0"
pub const MAGIC: [u8; 8] = *b"PLXLOG\0\0";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 16;

/// Fixed part of a record body.
const BODY_FIXED: usize = 8 + 2 + 2;

/// Largest accepted record body. Larger length fields mean corruption.
pub const MAX_RECORD_SIZE: u32 = 64 * 1024 * 1024;

/// Log format errors.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u32, got: u32 },

    #[error("CRC mismatch in record at offset {offset}")]
    CrcMismatch { offset: u64 },

    #[error("Truncated record at offset {offset}")]
    Truncated { offset: u64 },

    #[error("Name too long: {0} bytes")]
    NameTooLong(usize),
}

/// One recorded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Receive time, nanoseconds since the Unix epoch.
    pub receive_ns: u64,
    pub topic: String,
    pub type_name: String,
    pub payload: Vec<u8>,
}

impl LogRecord {
    fn encode_body(&self) -> Result<Vec<u8>, FormatError> {
        let topic_len = name_len(&self.topic)?;
        let type_len = name_len(&self.type_name)?;

        let mut body =
            Vec::with_capacity(BODY_FIXED + self.topic.len() + self.type_name.len() + self.payload.len());
        body.write_u64::<LittleEndian>(self.receive_ns)?;
        body.write_u16::<LittleEndian>(topic_len)?;
        body.write_u16::<LittleEndian>(type_len)?;
        body.extend_from_slice(self.topic.as_bytes());
        body.extend_from_slice(self.type_name.as_bytes());
        body.extend_from_slice(&self.payload);
        Ok(body)
    }

    fn decode_body(body: &[u8], offset: u64) -> Result<Self, FormatError> {
        let invalid = |what: &str| FormatError::InvalidFormat(format!("{} at offset {}", what, offset));

        let mut cursor = body;
        let receive_ns = cursor.read_u64::<LittleEndian>()?;
        let topic_len = usize::from(cursor.read_u16::<LittleEndian>()?);
        let type_len = usize::from(cursor.read_u16::<LittleEndian>()?);
        if cursor.len() < topic_len + type_len {
            return Err(invalid("name lengths exceed record"));
        }

        let (topic, rest) = cursor.split_at(topic_len);
        let (type_name, payload) = rest.split_at(type_len);
        Ok(Self {
            receive_ns,
            topic: String::from_utf8(topic.to_vec()).map_err(|_| invalid("topic is not UTF-8"))?,
            type_name: String::from_utf8(type_name.to_vec())
                .map_err(|_| invalid("type is not UTF-8"))?,
            payload: payload.to_vec(),
        })
    }
}

fn name_len(name: &str) -> Result<u16, FormatError> {
    u16::try_from(name.len()).map_err(|_| FormatError::NameTooLong(name.len()))
}

fn write_header<W: Write>(w: &mut W) -> io::Result<()> {
    w.write_all(&MAGIC)?;
    w.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    w.write_u32::<LittleEndian>(0)?;
    Ok(())
}

fn read_header<R: Read>(r: &mut R) -> Result<(), FormatError> {
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => FormatError::InvalidFormat("file shorter than header".into()),
        _ => FormatError::Io(e),
    })?;
    if magic != MAGIC {
        return Err(FormatError::InvalidFormat("bad magic".into()));
    }

    let version = r.read_u32::<LittleEndian>()?;
    if version != FORMAT_VERSION {
        return Err(FormatError::VersionMismatch {
            expected: FORMAT_VERSION,
            got: version,
        });
    }
    let _flags = r.read_u32::<LittleEndian>()?;
    Ok(())
}

/// Appends records to a log file.
pub struct LogWriter<W: Write = BufWriter<File>> {
    inner: W,
    records: u64,
    bytes: u64,
}

impl LogWriter {
    /// Create (or truncate) `path` and write the header.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, FormatError> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> LogWriter<W> {
    /// Write the header to `inner`.
    pub fn new(mut inner: W) -> Result<Self, FormatError> {
        write_header(&mut inner)?;
        Ok(Self {
            inner,
            records: 0,
            bytes: HEADER_SIZE as u64,
        })
    }

    /// Append one record. Returns the bytes written.
    pub fn append(&mut self, record: &LogRecord) -> Result<u64, FormatError> {
        let body = record.encode_body()?;
        let len = u32::try_from(body.len())
            .ok()
            .filter(|len| *len <= MAX_RECORD_SIZE)
            .ok_or_else(|| FormatError::InvalidFormat(format!("record of {} bytes", body.len())))?;

        self.inner.write_u32::<LittleEndian>(len)?;
        self.inner.write_u32::<LittleEndian>(crc32fast::hash(&body))?;
        self.inner.write_all(&body)?;

        let written = 8 + u64::from(len);
        self.records += 1;
        self.bytes += written;
        Ok(written)
    }

    pub fn flush(&mut self) -> Result<(), FormatError> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// Total bytes written, header included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(mut self) -> Result<W, FormatError> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Iterates the records of a log.
///
/// Yields `Err` once on the first corrupt or truncated record and then
/// stops.
pub struct LogReader<R: Read = BufReader<File>> {
    inner: R,
    offset: u64,
    done: bool,
}

impl LogReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FormatError> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> LogReader<R> {
    /// Validate the header of `inner`.
    pub fn new(mut inner: R) -> Result<Self, FormatError> {
        read_header(&mut inner)?;
        Ok(Self {
            inner,
            offset: HEADER_SIZE as u64,
            done: false,
        })
    }

    fn next_record(&mut self) -> Result<Option<LogRecord>, FormatError> {
        let offset = self.offset;
        let truncated = |e: io::Error| match e.kind() {
            io::ErrorKind::UnexpectedEof => FormatError::Truncated { offset },
            _ => FormatError::Io(e),
        };

        let mut prefix = [0u8; 8];
        let got = read_full(&mut self.inner, &mut prefix)?;
        if got == 0 {
            return Ok(None);
        }
        if got < prefix.len() {
            return Err(FormatError::Truncated { offset });
        }

        let mut fields = &prefix[..];
        let len = fields.read_u32::<LittleEndian>()?;
        let crc = fields.read_u32::<LittleEndian>()?;
        if len > MAX_RECORD_SIZE || (len as usize) < BODY_FIXED {
            return Err(FormatError::InvalidFormat(format!(
                "record length {} at offset {}",
                len, offset
            )));
        }

        let mut body = vec![0u8; len as usize];
        self.inner.read_exact(&mut body).map_err(truncated)?;
        if crc32fast::hash(&body) != crc {
            return Err(FormatError::CrcMismatch { offset });
        }

        self.offset += 8 + u64::from(len);
        LogRecord::decode_body(&body, offset).map(Some)
    }
}

impl<R: Read> Iterator for LogReader<R> {
    type Item = Result<LogRecord, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Read until `buf` is full or EOF. Returns the bytes read.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
