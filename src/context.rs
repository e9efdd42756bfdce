// Copyright 2016 TMQ contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

// Lifecycle root: owns the reactor task, the socket registry, and the
// failure sink. Socket state is `!Send` (`Rc<RefCell<_>>`), so the reactor
// and every connection handler run on a single-threaded `LocalSet` rather
// than a multi-threaded runtime.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tokio::runtime::Runtime;
use tokio::task::{JoinHandle, LocalSet};

use crate::error::Error;
use crate::reactor;
use crate::socket::SocketState;

pub(crate) struct Inner {
    pub(crate) sockets: RefCell<Vec<Weak<RefCell<SocketState>>>>,
    pub(crate) failures: RefCell<Vec<Error>>,
}

impl Inner {
    pub(crate) fn record_failure(&self, err: Error) {
        log::error!("background task failed: {err}");
        self.failures.borrow_mut().push(err);
    }
}

/// Owns the reactor task, the socket registry, and the failure sink.
/// Cheap to clone (an `Rc` underneath); every clone refers to the same
/// context.
#[derive(Clone)]
pub struct Context {
    inner: Rc<Inner>,
    runtime: Rc<Runtime>,
    local: Rc<LocalSet>,
    reactor: Rc<RefCell<Option<JoinHandle<()>>>>,
}

impl Context {
    /// Build a context and immediately start its reactor task.
    pub fn new() -> std::io::Result<Context> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let local = LocalSet::new();
        let inner = Rc::new(Inner {
            sockets: RefCell::new(Vec::new()),
            failures: RefCell::new(Vec::new()),
        });

        let reactor_inner = inner.clone();
        let handle = local.spawn_local(reactor::run(reactor_inner));

        Ok(Context {
            inner,
            runtime: Rc::new(runtime),
            local: Rc::new(local),
            reactor: Rc::new(RefCell::new(Some(handle))),
        })
    }

    pub(crate) fn register_socket(&self, socket: Weak<RefCell<SocketState>>) {
        self.inner.sockets.borrow_mut().push(socket);
    }

    pub(crate) fn record_failure(&self, err: Error) {
        self.inner.record_failure(err);
    }

    /// Failures recorded by background tasks since the context was
    /// created; consulted by tests and diagnostics.
    pub fn failures(&self) -> Vec<String> {
        self.inner.failures.borrow().iter().map(|e| e.to_string()).collect()
    }

    pub fn failure_count(&self) -> usize {
        self.inner.failures.borrow().len()
    }

    /// Drive the reactor (already spawned into the `LocalSet`) together
    /// with `fut` until `fut` completes, for embedding a single async
    /// operation in a non-async caller. Must not be called from within a
    /// task already running on this context's reactor: that nests
    /// `LocalSet::block_on` inside itself and deadlocks.
    pub fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        self.local.block_on(&self.runtime, fut)
    }

    /// Let the reactor run for one tick's worth of real time without
    /// blocking on any particular operation; handy in tests that need to
    /// observe a registration's fan-out before calling another facade
    /// method.
    pub fn run_briefly(&self, duration: std::time::Duration) {
        self.block_on(tokio::time::sleep(duration));
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // `self.reactor` is never cloned into the spawned reactor task
        // itself (only `inner` is), so its strong count reflects live
        // `Context` handles only; `inner`'s count would never reach 1
        // while the reactor task is alive.
        if Rc::strong_count(&self.reactor) == 1 {
            if let Some(handle) = self.reactor.borrow_mut().take() {
                handle.abort();
            }
            for weak in self.inner.sockets.borrow().iter() {
                if let Some(state) = weak.upgrade() {
                    state.borrow_mut().close();
                }
            }
        }
    }
}
