// Copyright 2016 TMQ contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

// Peer client frame handling: what a non-broker socket does with a single
// frame read off an accepted connection. `SUB` frames push onto the
// inbound queue, `PUB|CACHE` frames union addresses into `subscribed`,
// `PUB|CACHE|REMOVE` frames difference them out, and any other frame type
// is an error.

use std::cell::RefCell;
use std::rc::Rc;

use crate::addr;
use crate::codec::{Frame, FrameKind};
use crate::error::{Error, Result};
use crate::socket::SocketState;

pub(crate) fn handle_frame(frame: Frame, state: &Rc<RefCell<SocketState>>) -> Result<()> {
    let kind = frame
        .kind()
        .ok_or_else(|| Error::Malformed(format!("client received unrecognized type flags {:#x}", frame.type_flags)))?;

    let mut s = state.borrow_mut();

    match kind {
        FrameKind::Data => {
            let queue = s
                .published
                .get_mut(&frame.pattern)
                .ok_or_else(|| Error::KeyMissing(frame.pattern.clone()))?;
            // Newest-first: `recv` pops from the same end this pushes to.
            queue.push_back(frame.payload);
            Ok(())
        }
        FrameKind::SubscriberCache => {
            let addrs = addr::unpack_addresses(&frame.payload)?;
            let set = s
                .subscribed
                .get_mut(&frame.pattern)
                .ok_or_else(|| Error::KeyMissing(frame.pattern.clone()))?;
            set.extend(addrs);
            Ok(())
        }
        FrameKind::SubscriberRemove => {
            let addrs = addr::unpack_addresses(&frame.payload)?;
            let set = s
                .subscribed
                .get_mut(&frame.pattern)
                .ok_or_else(|| Error::KeyMissing(frame.pattern.clone()))?;
            // Missing individual addresses are silent.
            for a in addrs {
                set.remove(&a);
            }
            Ok(())
        }
        FrameKind::SubscribeRegister | FrameKind::PublishRegister => Err(Error::Malformed(
            "registration frame sent to a non-broker socket".into(),
        )),
    }
}
