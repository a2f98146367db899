// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Datagram framing between contexts.
//!
//! Every datagram carries exactly one frame:
//!
//! ```text
//! +------+------+-------+---------------------------+------------+
//! | PLX1 | kind | flags | [user:str16][pass:str16]  | body       |
//! +------+------+-------+---------------------------+------------+
//!    4      1      1       only if FLAG_CREDENTIALS
//! ```
//!
//! All integers are little-endian. `str16` is a u16 length followed by UTF-8
//! bytes, `bytes32` is a u32 length followed by raw bytes.
//!
//! | kind | body |
//! |------|------|
//! | DATA | topic:str16 type:str16 sender:str16 seq:u64 stamp:u64 payload:bytes32 |
//! | REQUEST | service:str16 request_id:u64 reply_to:str16 payload:bytes32 |
//! | RESPONSE | request_id:u64 status:u8 payload:bytes32 |

use crate::error::{Error, Result};
use crate::security::Credentials;
use std::net::SocketAddr;

pub const MAGIC: [u8; 4] = *b"PLX1";

const KIND_DATA: u8 = 0x01;
const KIND_REQUEST: u8 = 0x02;
const KIND_RESPONSE: u8 = 0x03;

const FLAG_CREDENTIALS: u8 = 0x01;

const HEADER_LEN: usize = 6;

/// Published message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub topic: String,
    pub type_name: String,
    pub sender: String,
    pub seq: u64,
    pub stamp: u64,
    pub payload: Vec<u8>,
}

/// Service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub service: String,
    pub request_id: u64,
    /// Socket the response must be sent to.
    pub reply_to: SocketAddr,
    pub payload: Vec<u8>,
}

/// Outcome carried by a [`ResponseFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    /// Handler returned an error; payload is the UTF-8 message.
    Failed,
    /// No provider for the service at this address.
    Unavailable,
}

impl ResponseStatus {
    fn to_u8(self) -> u8 {
        match self {
            ResponseStatus::Ok => 0,
            ResponseStatus::Failed => 1,
            ResponseStatus::Unavailable => 2,
        }
    }

    fn from_u8(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(ResponseStatus::Ok),
            1 => Ok(ResponseStatus::Failed),
            2 => Ok(ResponseStatus::Unavailable),
            other => Err(malformed(format!("unknown response status {}", other))),
        }
    }
}

/// Reply to a [`RequestFrame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub request_id: u64,
    pub status: ResponseStatus,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(DataFrame),
    Request(RequestFrame),
    Response(ResponseFrame),
}

impl Frame {
    fn kind(&self) -> u8 {
        match self {
            Frame::Data(_) => KIND_DATA,
            Frame::Request(_) => KIND_REQUEST,
            Frame::Response(_) => KIND_RESPONSE,
        }
    }
}

/// Encode `frame`, attaching `credentials` when present.
pub fn encode(frame: &Frame, credentials: Option<&Credentials>) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(&MAGIC);
    buf.push(frame.kind());
    buf.push(if credentials.is_some() {
        FLAG_CREDENTIALS
    } else {
        0
    });

    if let Some(creds) = credentials {
        put_str(&mut buf, &creds.username)?;
        put_str(&mut buf, &creds.password)?;
    }

    match frame {
        Frame::Data(data) => {
            put_str(&mut buf, &data.topic)?;
            put_str(&mut buf, &data.type_name)?;
            put_str(&mut buf, &data.sender)?;
            buf.extend_from_slice(&data.seq.to_le_bytes());
            buf.extend_from_slice(&data.stamp.to_le_bytes());
            put_bytes(&mut buf, &data.payload)?;
        }
        Frame::Request(req) => {
            put_str(&mut buf, &req.service)?;
            buf.extend_from_slice(&req.request_id.to_le_bytes());
            put_str(&mut buf, &req.reply_to.to_string())?;
            put_bytes(&mut buf, &req.payload)?;
        }
        Frame::Response(rep) => {
            buf.extend_from_slice(&rep.request_id.to_le_bytes());
            buf.push(rep.status.to_u8());
            put_bytes(&mut buf, &rep.payload)?;
        }
    }

    Ok(buf)
}

/// Decode a datagram into a frame and the credentials it carried.
pub fn decode(buf: &[u8]) -> Result<(Frame, Option<Credentials>)> {
    if buf.len() < HEADER_LEN {
        return Err(malformed(format!("datagram too short ({} bytes)", buf.len())));
    }
    if buf[0..4] != MAGIC {
        return Err(malformed("bad magic".to_string()));
    }
    let kind = buf[4];
    let flags = buf[5];

    let mut cursor = Cursor::new(&buf[HEADER_LEN..]);

    let credentials = if flags & FLAG_CREDENTIALS != 0 {
        let username = cursor.str16()?;
        let password = cursor.str16()?;
        Some(Credentials { username, password })
    } else {
        None
    };

    let frame = match kind {
        KIND_DATA => Frame::Data(DataFrame {
            topic: cursor.str16()?,
            type_name: cursor.str16()?,
            sender: cursor.str16()?,
            seq: cursor.u64()?,
            stamp: cursor.u64()?,
            payload: cursor.bytes32()?,
        }),
        KIND_REQUEST => {
            let service = cursor.str16()?;
            let request_id = cursor.u64()?;
            let reply_raw = cursor.str16()?;
            let reply_to = reply_raw
                .parse::<SocketAddr>()
                .map_err(|_| malformed(format!("bad reply address '{}'", reply_raw)))?;
            Frame::Request(RequestFrame {
                service,
                request_id,
                reply_to,
                payload: cursor.bytes32()?,
            })
        }
        KIND_RESPONSE => Frame::Response(ResponseFrame {
            request_id: cursor.u64()?,
            status: ResponseStatus::from_u8(cursor.u8()?)?,
            payload: cursor.bytes32()?,
        }),
        other => return Err(malformed(format!("unknown frame kind 0x{:02x}", other))),
    };

    if cursor.remaining() != 0 {
        return Err(malformed(format!(
            "{} trailing bytes after frame",
            cursor.remaining()
        )));
    }

    Ok((frame, credentials))
}

fn malformed(reason: String) -> Error {
    Error::Deserialization(format!("frame: {}", reason))
}

fn put_str(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| Error::Serialization(format!("string of {} bytes exceeds u16", s.len())))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| Error::PayloadTooLarge(bytes.len()))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(malformed(format!(
                "truncated: need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u64(&mut self) -> Result<u64> {
        let raw = self.take(8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(raw);
        Ok(u64::from_le_bytes(bytes))
    }

    fn str16(&mut self) -> Result<String> {
        let raw = self.take(2)?;
        let len = usize::from(u16::from_le_bytes([raw[0], raw[1]]));
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| malformed("invalid utf-8 string".to_string()))
    }

    fn bytes32(&mut self) -> Result<Vec<u8>> {
        let raw = self.take(4)?;
        let len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        Ok(self.take(len)?.to_vec())
    }
}
