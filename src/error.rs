// Copyright 2016 TMQ contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

// Error taxonomy for TMQ control operations and background tasks.
//
// User-initiated operations (`subscribe`, `publish`, `send`, `bind`) surface
// these synchronously. Background tasks (accept-drain handlers, broker
// fan-out) never raise; they deposit the same variants into the context's
// failure sink instead (see `context::Context::failures`).

use std::io;

use crate::pattern::Pattern;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Frame header inconsistent with buffer length, or an unrecognized
    /// combination of type-flag bits.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// An inbound frame referenced a pattern that was never subscribed to
    /// or published, as appropriate for the direction of the frame.
    #[error("pattern {0:?} is not registered on this socket")]
    KeyMissing(Pattern),

    /// `subscribe` called twice for the same pattern on the same socket.
    #[error("already subscribed to pattern {0:?}")]
    Duplicate(Pattern),

    /// `send` called for a pattern the socket never registered as a
    /// publisher of.
    #[error("socket is not a publisher of pattern {0:?}")]
    NotPublisher(Pattern),

    /// Connecting to or sending to the configured broker failed.
    #[error("broker unreachable: {0}")]
    BrokerUnreachable(#[source] io::Error),

    /// A per-destination send during fan-out or publish failed. Recorded
    /// in the failure sink; never aborts delivery to other destinations.
    #[error("peer unreachable: {0}")]
    PeerUnreachable(#[source] io::Error),

    /// `bind` failed, most commonly because the address is already in use.
    #[error("bind failed: {0}")]
    AddrInUse(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
