//! Binary frame codec.
//!
//! All integers are big-endian and unsigned:
//!
//! ```text
//! Simple frame:   [2B kind][4B payloadLen][payloadLen bytes]
//! Extended frame: [2B kind][4B metaLen][metaLen bytes][4B binLen][binLen bytes]
//! ```
//!
//! The kind comes first so a receiver can route a frame before paying for
//! any payload parsing. Every section is length-prefixed, which keeps the
//! format binary-safe and lets decoders hand out zero-copy [`Bytes`] slices.
//!
//! Routing only ever decodes the kind ([`decode_kind`]); the remainder is
//! handed to the handler, which decodes it with [`decode_meta`] or
//! [`decode_extended`].

use std::ops::Range;

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::kinds::MessageKind;

/// Size of the kind tag.
pub const KIND_LEN: usize = 2;
/// Size of a section length prefix.
pub const LEN_PREFIX: usize = 4;

/// Errors produced while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A length prefix claims more bytes than the buffer holds.
    #[error("{section} truncated: need {declared} bytes, {available} available")]
    Truncated {
        /// Which part of the frame was being read.
        section: &'static str,
        /// Bytes required.
        declared: usize,
        /// Bytes actually present.
        available: usize,
    },

    /// A section does not fit in a 32-bit length prefix.
    #[error("{section} of {len} bytes exceeds the 32-bit length prefix")]
    PayloadTooLarge {
        /// Which part of the frame was being written.
        section: &'static str,
        /// Actual section length.
        len: usize,
    },

    /// Structured section could not be (de)serialized.
    #[error("meta section is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

// ─────────────────────────────────────────────────────────────────────────────
// Frame types
// ─────────────────────────────────────────────────────────────────────────────

/// A simple frame: kind plus one length-prefixed payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Message kind.
    pub kind: MessageKind,
    /// Raw payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame.
    pub fn new(kind: MessageKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Result<Bytes> {
        encode(self.kind, &self.payload)
    }

    /// Decode a complete simple frame. Bytes after the payload are ignored.
    pub fn decode(data: &Bytes) -> Result<Self> {
        let kind = read_kind(data)?;
        let payload = section_bounds(data, KIND_LEN, "payload")?;
        Ok(Self {
            kind,
            payload: data.slice(payload),
        })
    }
}

/// An extended frame: kind, a structured meta section, and an opaque binary
/// section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtendedFrame {
    /// Message kind.
    pub kind: MessageKind,
    /// Serialized meta section (JSON text).
    pub meta: Bytes,
    /// Opaque binary body.
    pub binary: Bytes,
}

impl ExtendedFrame {
    /// Encode to wire bytes.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(
            KIND_LEN + 2 * LEN_PREFIX + self.meta.len() + self.binary.len(),
        );
        buf.put_u16(self.kind.value());
        put_section(&mut buf, "meta", &self.meta)?;
        put_section(&mut buf, "binary", &self.binary)?;
        Ok(buf.freeze())
    }

    /// Decode a complete extended frame.
    pub fn decode(data: &Bytes) -> Result<Self> {
        let kind = read_kind(data)?;
        let meta = section_bounds(data, KIND_LEN, "meta")?;
        let binary = section_bounds(data, meta.end, "binary")?;
        Ok(Self {
            kind,
            meta: data.slice(meta),
            binary: data.slice(binary),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────────────────────────

/// Encode `[kind][len(payload)][payload]`.
pub fn encode(kind: MessageKind, payload: &[u8]) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(KIND_LEN + LEN_PREFIX + payload.len());
    buf.put_u16(kind.value());
    put_section(&mut buf, "payload", payload)?;
    Ok(buf.freeze())
}

/// Encode a frame with no payload: the length is written as zero.
pub fn encode_nil(kind: MessageKind) -> Bytes {
    let mut buf = BytesMut::with_capacity(KIND_LEN + LEN_PREFIX);
    buf.put_u16(kind.value());
    buf.put_u32(0);
    buf.freeze()
}

/// Encode a frame whose payload is `data` serialized as JSON.
pub fn encode_json<T: Serialize + ?Sized>(kind: MessageKind, data: &T) -> Result<Bytes> {
    let json = serde_json::to_vec(data)?;
    encode(kind, &json)
}

/// Encode `data` as a bare `[len][json]` section with no kind tag.
///
/// This is the body shape handlers read back with [`decode_meta`]; it is
/// what a simple JSON frame looks like once [`decode_kind`] stripped the
/// tag.
pub fn encode_meta<T: Serialize + ?Sized>(data: &T) -> Result<Bytes> {
    let json = serde_json::to_vec(data)?;
    let mut buf = BytesMut::with_capacity(LEN_PREFIX + json.len());
    put_section(&mut buf, "meta", &json)?;
    Ok(buf.freeze())
}

/// Encode `[kind][len(meta)][meta json][len(binary)][binary]`.
pub fn encode_extended<T: Serialize + ?Sized>(
    kind: MessageKind,
    meta: &T,
    binary: &[u8],
) -> Result<Bytes> {
    ExtendedFrame {
        kind,
        meta: Bytes::from(serde_json::to_vec(meta)?),
        binary: Bytes::copy_from_slice(binary),
    }
    .encode()
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────────────────────────

/// Split the kind tag off the front of a frame.
///
/// Fails soft: a buffer shorter than the tag yields [`MessageKind::ERR`]
/// and an empty remainder so it routes to the fallback handler.
pub fn decode_kind(data: &Bytes) -> (MessageKind, Bytes) {
    match read_kind(data) {
        Ok(kind) => (kind, data.slice(KIND_LEN..)),
        Err(_) => (MessageKind::ERR, Bytes::new()),
    }
}

/// Read a `[len][json]` section and deserialize it.
pub fn decode_meta<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    let meta = section_bounds(data, 0, "meta")?;
    Ok(serde_json::from_slice(&data[meta])?)
}

/// Read `[len][json][len][binary]`, deserializing the meta section and
/// returning the binary section as a zero-copy slice.
pub fn decode_extended<T: DeserializeOwned>(data: &Bytes) -> Result<(T, Bytes)> {
    let meta = section_bounds(data, 0, "meta")?;
    let binary = section_bounds(data, meta.end, "binary")?;
    let parsed = serde_json::from_slice(&data[meta])?;
    Ok((parsed, data.slice(binary)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn read_kind(data: &[u8]) -> Result<MessageKind> {
    match data {
        [hi, lo, ..] => Ok(MessageKind(u16::from_be_bytes([*hi, *lo]))),
        _ => Err(CodecError::Truncated {
            section: "kind",
            declared: KIND_LEN,
            available: data.len(),
        }),
    }
}

fn put_section(buf: &mut BytesMut, section: &'static str, data: &[u8]) -> Result<()> {
    let len = u32::try_from(data.len()).map_err(|_| CodecError::PayloadTooLarge {
        section,
        len: data.len(),
    })?;
    buf.put_u32(len);
    buf.put_slice(data);
    Ok(())
}

/// Locate the section whose length prefix starts at `offset`.
fn section_bounds(data: &[u8], offset: usize, section: &'static str) -> Result<Range<usize>> {
    let available = data.len().saturating_sub(offset);
    let Some(prefix) = data.get(offset..offset + LEN_PREFIX) else {
        return Err(CodecError::Truncated {
            section,
            declared: LEN_PREFIX,
            available,
        });
    };
    let mut len = [0u8; LEN_PREFIX];
    len.copy_from_slice(prefix);
    let declared = u32::from_be_bytes(len) as usize;

    let start = offset + LEN_PREFIX;
    let remaining = data.len() - start;
    if declared > remaining {
        return Err(CodecError::Truncated {
            section,
            declared,
            available: remaining,
        });
    }
    Ok(start..start + declared)
}
