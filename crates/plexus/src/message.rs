// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message serialization contract.
//!
//! Plexus does not impose a wire format for payloads: a message is an opaque
//! byte buffer plus a type tag. Types implement [`Message`] to say how they
//! turn into bytes and back.

use crate::error::{Error, Result};

/// Encode/decode contract for published types.
///
/// # Example
///
/// ```rust
/// use plexus::{Error, Message, Result};
///
/// struct Pose { x: f32, y: f32 }
///
/// impl Message for Pose {
///     fn type_name() -> &'static str { "demo.Pose" }
///
///     fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
///         buf.extend_from_slice(&self.x.to_le_bytes());
///         buf.extend_from_slice(&self.y.to_le_bytes());
///         Ok(())
///     }
///
///     fn decode(buf: &[u8]) -> Result<Self> {
///         if buf.len() != 8 {
///             return Err(Error::Deserialization("Pose needs 8 bytes".into()));
///         }
///         let x = f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
///         let y = f32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
///         Ok(Pose { x, y })
///     }
/// }
/// ```
pub trait Message: Sized + Send + Sync + 'static {
    /// Type tag carried alongside every payload.
    fn type_name() -> &'static str;

    /// Append the encoded form of `self` to `buf`.
    fn encode(&self, buf: &mut Vec<u8>) -> Result<()>;

    /// Decode a value from a complete payload.
    fn decode(buf: &[u8]) -> Result<Self>;
}

/// Metadata delivered with every message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInfo {
    /// Topic the message was published on.
    pub topic: String,
    /// Type tag set by the publisher.
    pub type_name: String,
    /// Identifier of the publishing context.
    pub sender: String,
    /// Per-(topic, sender) sequence number, starting at 1.
    pub seq: u64,
    /// Publication timestamp in milliseconds (publisher's monotonic clock).
    pub stamp: u64,
}

impl MessageInfo {
    #[inline]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Message for Vec<u8> {
    fn type_name() -> &'static str {
        "plexus.Bytes"
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(self);
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        Ok(buf.to_vec())
    }
}

impl Message for String {
    fn type_name() -> &'static str {
        "plexus.String"
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(self.as_bytes());
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        String::from_utf8(buf.to_vec()).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

macro_rules! impl_message_for_primitive {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl Message for $ty {
                fn type_name() -> &'static str {
                    $name
                }

                fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
                    buf.extend_from_slice(&self.to_le_bytes());
                    Ok(())
                }

                fn decode(buf: &[u8]) -> Result<Self> {
                    let bytes = buf.try_into().map_err(|_| {
                        Error::Deserialization(format!(
                            "{} needs {} bytes, got {}",
                            $name,
                            std::mem::size_of::<$ty>(),
                            buf.len()
                        ))
                    })?;
                    Ok(<$ty>::from_le_bytes(bytes))
                }
            }
        )*
    };
}

impl_message_for_primitive! {
    u32 => "plexus.UInt32",
    u64 => "plexus.UInt64",
    i32 => "plexus.Int32",
    i64 => "plexus.Int64",
    f32 => "plexus.Float32",
    f64 => "plexus.Float64",
}

/// Encode a message into a fresh buffer.
pub(crate) fn encode_to_vec<M: Message>(msg: &M) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    msg.encode(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_rejects_invalid_utf8() {
        let err = String::decode(&[0xff, 0xfe]).expect_err("invalid utf8");
        assert!(matches!(err, Error::Deserialization(_)));
    }

    #[test]
    fn test_primitive_length_checked() {
        assert!(u64::decode(&[1, 2, 3]).is_err());
        let buf = encode_to_vec(&42u64).expect("encode");
        assert_eq!(buf.len(), 8);
        assert_eq!(u64::decode(&buf).expect("decode"), 42);
    }

    #[test]
    fn test_type_names_are_distinct() {
        let names = [
            <Vec<u8>>::type_name(),
            String::type_name(),
            u32::type_name(),
            u64::type_name(),
            i32::type_name(),
            i64::type_name(),
            f32::type_name(),
            f64::type_name(),
        ];
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }
}
