// Copyright 2016 TMQ contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

// Broker registries and fan-out: a registration updates a registry keyed
// by pattern, then opens a fresh connection per interested peer to push
// the membership change, recording rather than propagating per-destination
// failures so one unreachable peer never aborts fan-out to the rest.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexSet;

use crate::addr::{self, Address};
use crate::codec::{self, Frame, FrameKind};
use crate::context::Inner;
use crate::error::{Error, Result};
use crate::pattern::Pattern;
use crate::{conn, socket::SocketState};

/// Per-pattern publisher/subscriber registries, present only on a socket
/// whose role is `Broker`. Insertion order is preserved so fan-out visits
/// publishers in the order they registered.
#[derive(Debug, Default)]
pub struct BrokerState {
    pub subscribers: std::collections::HashMap<Pattern, IndexSet<Address>>,
    pub publishers: std::collections::HashMap<Pattern, IndexSet<Address>>,
}

pub(crate) async fn handle_frame(frame: Frame, state: &Rc<RefCell<SocketState>>, inner: &Rc<Inner>) -> Result<()> {
    let kind = frame
        .kind()
        .ok_or_else(|| Error::Malformed(format!("broker received unrecognized type flags {:#x}", frame.type_flags)))?;

    match kind {
        FrameKind::SubscribeRegister => on_new_subscriber(frame.pattern, &frame.payload, state, inner).await,
        FrameKind::PublishRegister => on_new_publisher(frame.pattern, &frame.payload, state, inner).await,
        _ => {
            let msg = format!("broker received non-registration frame type {:#x}", frame.type_flags);
            Err(Error::Malformed(msg))
        }
    }
}

async fn on_new_subscriber(pattern: Pattern, payload: &[u8], state: &Rc<RefCell<SocketState>>, inner: &Rc<Inner>) -> Result<()> {
    let (sub_addr, _) = Address::unpack(payload)?;

    let publisher_addrs: Vec<Address> = {
        let mut s = state.borrow_mut();
        let broker = s.broker_state.as_mut().expect("handle_frame only runs on Role::Broker sockets");
        broker.subscribers.entry(pattern.clone()).or_default().insert(sub_addr);
        broker.publishers.get(&pattern).map(|set| set.iter().copied().collect()).unwrap_or_default()
    };

    // Every known publisher gets a cache frame carrying only the new
    // subscriber's address, in registration order; downstream dedup is
    // the client's job since its cache is a set.
    let cache_payload = addr::pack_addresses(&[sub_addr]);
    let cache_frame = Frame::new(codec::PUB | codec::CACHE, pattern, cache_payload);

    for publisher in publisher_addrs {
        if let Err(e) = conn::send_frame(publisher.into(), &cache_frame).await {
            log::error!("broker fan-out to publisher {publisher:?} failed: {e}");
            inner.record_failure(Error::PeerUnreachable(e));
        }
    }

    Ok(())
}

async fn on_new_publisher(pattern: Pattern, payload: &[u8], state: &Rc<RefCell<SocketState>>, inner: &Rc<Inner>) -> Result<()> {
    let (pub_addr, _) = Address::unpack(payload)?;

    let subscriber_addrs: Vec<Address> = {
        let mut s = state.borrow_mut();
        let broker = s.broker_state.as_mut().expect("handle_frame only runs on Role::Broker sockets");
        broker.publishers.entry(pattern.clone()).or_default().insert(pub_addr);
        broker.subscribers.get(&pattern).map(|set| set.iter().copied().collect()).unwrap_or_default()
    };

    // Always send the new publisher its current subscriber set, even when
    // empty, rather than omitting the frame.
    let cache_payload = addr::pack_addresses(&subscriber_addrs);
    let cache_frame = Frame::new(codec::PUB | codec::CACHE, pattern, cache_payload);

    if let Err(e) = conn::send_frame(pub_addr.into(), &cache_frame).await {
        log::error!("broker reply to new publisher {pub_addr:?} failed: {e}");
        inner.record_failure(Error::PeerUnreachable(e));
    }

    Ok(())
}
