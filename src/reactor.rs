// Copyright 2016 TMQ contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

// Cooperative loop driving every registered socket: one task repeatedly
// walks the socket list, drains each listener's pending connections with a
// non-blocking accept loop, spawns a detached handler per connection, then
// sleeps for the remainder of the tick.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::context::Inner;
use crate::global::TICK;
use crate::handler;
use crate::socket::SocketState;

pub(crate) async fn run(inner: Rc<Inner>) {
    loop {
        let tick_start = Instant::now();

        drain_all_sockets(&inner).await;
        apply_pending_removals(&inner);

        let elapsed = tick_start.elapsed();
        if elapsed < TICK {
            tokio::time::sleep(TICK - elapsed).await;
        }
    }
}

async fn drain_all_sockets(inner: &Rc<Inner>) {
    // Snapshot the registry so a handler registering a new socket mid-tick
    // (not currently possible, but kept for iterator stability) never
    // invalidates this loop.
    let snapshot = inner.sockets.borrow().clone();

    for weak in &snapshot {
        match weak.upgrade() {
            Some(state) if !state.borrow().closed => {
                accept_drain(state, inner).await;
            }
            _ => {}
        }
    }
}

async fn accept_drain(state: Rc<RefCell<SocketState>>, inner: &Rc<Inner>) {
    let listener = {
        let s = state.borrow();
        match s.listener.clone() {
            Some(l) => l,
            None => return,
        }
    };

    loop {
        match tokio::time::timeout(Duration::ZERO, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                log::trace!("accepted connection from {peer}");
                spawn_handler(stream, state.clone(), inner.clone());
            }
            Ok(Err(e)) => {
                log::error!("accept failed: {e}");
                break;
            }
            Err(_would_block) => break,
        }
    }
}

fn spawn_handler(stream: tokio::net::TcpStream, state: Rc<RefCell<SocketState>>, inner: Rc<Inner>) {
    tokio::task::spawn_local(async move {
        if let Err(e) = handler::handle_connection(stream, state, &inner).await {
            inner.record_failure(e);
        }
    });
}

fn apply_pending_removals(inner: &Rc<Inner>) {
    inner.sockets.borrow_mut().retain(|weak| match weak.upgrade() {
        Some(state) => !state.borrow().closed,
        None => false,
    });
}

// `accept_drain`'s `listener.clone()` above is why `SocketState::listener`
// is an `Rc<TcpListener>` rather than a bare one: it lets the listener be
// cloned out of a short `RefCell` borrow before any `.await`, so a borrow
// never has to be held across a suspension point.
