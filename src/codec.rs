// Copyright 2016 TMQ contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

// Wire framing: a typed, token-addressed header ahead of an opaque payload.
//
// bytes  : 1          | 1    | 2    | 4*tlen | dlen
// name   : type_flags | tlen | dlen | tokens | data

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::pattern::Pattern;

pub const HEADER_BYTES: usize = 4;
pub const MAX_FRAME_LEN: usize = 2056;

pub const PUB: u8 = 0x01;
pub const SUB: u8 = 0x02;
pub const CACHE: u8 = 0x04;
pub const REMOVE: u8 = 0x08;
pub const BROKER: u8 = 0x40;
pub const BRIDGE: u8 = 0x80;

/// The legal OR-combined type-flag values observed on the wire. A tagged
/// variant keeps frame dispatch exhaustive; unknown combinations
/// never construct a `FrameKind` and are reported as `Error::Malformed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// `SUB` — payload data from publisher to subscriber.
    Data,
    /// `SUB|CACHE|BROKER` — "I am a subscriber of pattern P at address A".
    SubscribeRegister,
    /// `PUB|CACHE|BROKER` — "I am a publisher of pattern P at address A".
    PublishRegister,
    /// `PUB|CACHE` — "these addresses are subscribers to P".
    SubscriberCache,
    /// `PUB|CACHE|REMOVE` — "remove these subscriber addresses".
    SubscriberRemove,
}

impl FrameKind {
    pub fn from_flags(flags: u8) -> Option<FrameKind> {
        match flags {
            SUB => Some(FrameKind::Data),
            f if f == (SUB | CACHE | BROKER) => Some(FrameKind::SubscribeRegister),
            f if f == (PUB | CACHE | BROKER) => Some(FrameKind::PublishRegister),
            f if f == (PUB | CACHE) => Some(FrameKind::SubscriberCache),
            f if f == (PUB | CACHE | REMOVE) => Some(FrameKind::SubscriberRemove),
            _ => None,
        }
    }

    pub fn flags(self) -> u8 {
        match self {
            FrameKind::Data => SUB,
            FrameKind::SubscribeRegister => SUB | CACHE | BROKER,
            FrameKind::PublishRegister => PUB | CACHE | BROKER,
            FrameKind::SubscriberCache => PUB | CACHE,
            FrameKind::SubscriberRemove => PUB | CACHE | REMOVE,
        }
    }
}

/// A decoded control or data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub type_flags: u8,
    pub pattern: Pattern,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(type_flags: u8, pattern: Pattern, payload: Vec<u8>) -> Frame {
        Frame { type_flags, pattern, payload }
    }

    pub fn kind(&self) -> Option<FrameKind> {
        FrameKind::from_flags(self.type_flags)
    }
}

/// Standard string -> u32 token hash. Deterministic across versions; this
/// is a public contract depended on by every caller deriving a pattern
/// from a name.
pub fn hash(value: &str) -> u32 {
    let mut h: u32 = 0;
    for &b in value.as_bytes() {
        h = (65599u32.wrapping_mul(h)).wrapping_add(b as u32);
    }
    h ^ (h >> 16)
}

/// Pack a frame: `type_flags`, ordered tokens, and an opaque payload.
pub fn pack(type_flags: u8, tokens: &[u32], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_BYTES + tokens.len() * 4 + payload.len());
    out.push(type_flags);
    out.push(tokens.len() as u8);
    out.write_u16::<BigEndian>(payload.len() as u16).expect("Vec writes never fail");
    for &t in tokens {
        out.write_u32::<BigEndian>(t).expect("Vec writes never fail");
    }
    out.extend_from_slice(payload);
    out
}

pub fn pack_frame(frame: &Frame) -> Vec<u8> {
    pack(frame.type_flags, &frame.pattern.0, &frame.payload)
}

/// Decode a frame, rejecting anything shorter than the header or whose
/// declared lengths exceed the buffer.
pub fn unpack(data: &[u8]) -> Result<Frame> {
    if data.len() < HEADER_BYTES {
        return Err(Error::Malformed("frame shorter than header".into()));
    }
    let mut cur = &data[..HEADER_BYTES];
    let type_flags = cur.read_u8().expect("length checked above");
    let tlen = cur.read_u8().expect("length checked above") as usize;
    let dlen = cur.read_u16::<BigEndian>().expect("length checked above") as usize;

    let tokens_start = HEADER_BYTES;
    let tokens_end = tokens_start + tlen * 4;
    let payload_end = tokens_end + dlen;
    if data.len() < payload_end {
        return Err(Error::Malformed("frame shorter than declared lengths".into()));
    }

    let mut tokens = Vec::with_capacity(tlen);
    let mut tok_buf = &data[tokens_start..tokens_end];
    for _ in 0..tlen {
        tokens.push(tok_buf.read_u32::<BigEndian>().expect("length checked above"));
    }
    let payload = data[tokens_end..payload_end].to_vec();

    Ok(Frame::new(type_flags, Pattern::new(tokens), payload))
}
