// Copyright 2016 TMQ contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

// Small cross-module constants and helpers shared by the reactor, the
// connection handler, and the peer socket.

use std::time::Duration;

/// Nominal reactor tick: the loop sleeps for this minus time already spent
/// accepting connections, each pass.
pub const TICK: Duration = Duration::from_millis(5);

/// Upper bound on a single frame read by a connection handler.
pub const HANDLER_READ_CAP: usize = crate::codec::MAX_FRAME_LEN;

/// The role a peer socket plays on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Broker,
    /// Reserved; treated as `Client` everywhere a role is matched on.
    Bridge,
}
