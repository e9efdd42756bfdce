// Copyright 2016 TMQ contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

// Peer socket state and its public façade. `SocketState` is the backend
// state, owned exclusively by the reactor-visible `Rc<RefCell<_>>`;
// `PeerSocket` is the cheap, `Clone`-able facade a caller actually holds.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use tokio::net::TcpListener;

use crate::addr::{self, Address};
use crate::broker::BrokerState;
use crate::codec::{self, Frame};
use crate::conn;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::global::Role;
use crate::pattern::Pattern;

/// Backend state for one endpoint. Exclusively owned by its `PeerSocket`;
/// the context holds only a `Weak` back-reference for iteration and
/// removal.
pub(crate) struct SocketState {
    pub(crate) role: Role,
    pub(crate) listen_addr: SocketAddr,
    pub(crate) broker_addr: Option<SocketAddr>,
    pub(crate) listener: Option<Rc<TcpListener>>,
    pub(crate) published: HashMap<Pattern, VecDeque<Vec<u8>>>,
    pub(crate) subscribed: HashMap<Pattern, HashSet<Address>>,
    pub(crate) broker_state: Option<BrokerState>,
    pub(crate) closed: bool,
}

impl SocketState {
    /// Tear down the listener and caches; idempotent.
    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.listener = None;
        self.broker_addr = None;
        self.published.clear();
        self.subscribed.clear();
    }

    fn no_broker() -> Error {
        Error::BrokerUnreachable(io::Error::new(io::ErrorKind::NotConnected, "no broker configured for this socket"))
    }
}

/// A peer endpoint: simultaneously a listener, an outbound client, and a
/// local cache of addresses learned from the broker.
#[derive(Clone)]
pub struct PeerSocket {
    ctx: Context,
    state: Rc<RefCell<SocketState>>,
}

impl PeerSocket {
    /// Create and register a new socket with `ctx`; it is not yet bound or
    /// assigned a broker.
    pub fn new(ctx: &Context, role: Role, listen_addr: SocketAddr) -> PeerSocket {
        let broker_state = if role == Role::Broker { Some(BrokerState::default()) } else { None };
        let state = Rc::new(RefCell::new(SocketState {
            role,
            listen_addr,
            broker_addr: None,
            listener: None,
            published: HashMap::new(),
            subscribed: HashMap::new(),
            broker_state,
            closed: false,
        }));
        ctx.register_socket(Rc::downgrade(&state));
        PeerSocket { ctx: ctx.clone(), state }
    }

    pub fn role(&self) -> Role {
        self.state.borrow().role
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.state.borrow().listen_addr
    }

    /// Install a non-blocking listener at `listen_addr`. `backlog` is
    /// accepted for interface parity but has no knob on
    /// `tokio::net::TcpListener`; the kernel default applies.
    pub async fn bind(&self, _backlog: u32) -> Result<()> {
        if self.state.borrow().listener.is_some() {
            return Err(Error::AddrInUse(io::Error::new(io::ErrorKind::AddrInUse, "socket is already bound")));
        }
        let addr = self.state.borrow().listen_addr;
        let listener = TcpListener::bind(addr).await.map_err(Error::AddrInUse)?;
        self.state.borrow_mut().listener = Some(Rc::new(listener));
        Ok(())
    }

    /// Remember the control-plane address used by `subscribe`/`publish`.
    pub fn set_broker(&self, addr: SocketAddr) {
        self.state.borrow_mut().broker_addr = Some(addr);
    }

    /// Register as a subscriber of `pattern` and allocate its inbound
    /// queue.
    pub async fn subscribe(&self, pattern: Pattern) -> Result<()> {
        if self.state.borrow().published.contains_key(&pattern) {
            return Err(Error::Duplicate(pattern));
        }
        let broker = self.state.borrow().broker_addr.ok_or_else(SocketState::no_broker)?;
        let payload = addr::pack_addresses(&[Address::from(self.state.borrow().listen_addr)]);
        let frame = Frame::new(codec::SUB | codec::CACHE | codec::BROKER, pattern.clone(), payload);

        conn::send_frame(broker, &frame).await.map_err(Error::BrokerUnreachable)?;
        self.state.borrow_mut().published.insert(pattern, VecDeque::new());
        Ok(())
    }

    /// Register as a publisher of `pattern`; a no-op if already registered.
    pub async fn publish(&self, pattern: Pattern) -> Result<()> {
        if self.state.borrow().subscribed.contains_key(&pattern) {
            return Ok(());
        }
        let broker = self.state.borrow().broker_addr.ok_or_else(SocketState::no_broker)?;
        let payload = addr::pack_addresses(&[Address::from(self.state.borrow().listen_addr)]);
        let frame = Frame::new(codec::PUB | codec::CACHE | codec::BROKER, pattern.clone(), payload);

        conn::send_frame(broker, &frame).await.map_err(Error::BrokerUnreachable)?;
        self.state.borrow_mut().subscribed.insert(pattern, HashSet::new());
        Ok(())
    }

    /// Deliver `data` to every cached subscriber of `pattern`. Always
    /// succeeds once the publisher check passes, even with no subscribers;
    /// per-destination failures are recorded, never propagated.
    pub async fn send(&self, pattern: &Pattern, data: &[u8]) -> Result<()> {
        let destinations: Vec<Address> = {
            let s = self.state.borrow();
            let set = s.subscribed.get(pattern).ok_or_else(|| Error::NotPublisher(pattern.clone()))?;
            set.iter().copied().collect()
        };

        let frame = Frame::new(codec::SUB, pattern.clone(), data.to_vec());
        for dest in destinations {
            if let Err(e) = conn::send_frame(dest.into(), &frame).await {
                log::error!("send to subscriber {dest:?} failed: {e}");
                self.ctx.record_failure(Error::PeerUnreachable(e));
            }
        }
        Ok(())
    }

    /// Pop the newest payload queued for `pattern` (strictly LIFO), or
    /// `None` if the queue is empty.
    pub fn recv(&self, pattern: &Pattern) -> Result<Option<Vec<u8>>> {
        let mut s = self.state.borrow_mut();
        let queue = s.published.get_mut(pattern).ok_or_else(|| Error::KeyMissing(pattern.clone()))?;
        Ok(queue.pop_back())
    }

    /// Deregister from the context and close the listener; idempotent.
    pub fn close(&self) {
        self.state.borrow_mut().close();
    }

    /// Blocking façade over [`PeerSocket::subscribe`]. Must not be called
    /// from within a task running on this socket's context.
    pub fn subscribe_blocking(&self, pattern: Pattern) -> Result<()> {
        self.ctx.block_on(self.subscribe(pattern))
    }

    /// Blocking façade over [`PeerSocket::publish`].
    pub fn publish_blocking(&self, pattern: Pattern) -> Result<()> {
        self.ctx.block_on(self.publish(pattern))
    }

    /// Blocking façade over [`PeerSocket::send`].
    pub fn send_blocking(&self, pattern: &Pattern, data: &[u8]) -> Result<()> {
        self.ctx.block_on(self.send(pattern, data))
    }

    pub(crate) fn state(&self) -> &Rc<RefCell<SocketState>> {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    fn any_addr() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn recv_is_lifo() {
        let ctx = Context::new().unwrap();
        let socket = PeerSocket::new(&ctx, Role::Client, any_addr());
        let pattern = Pattern::from([0u32, 1]);
        socket.state().borrow_mut().published.insert(pattern.clone(), VecDeque::new());

        {
            let mut s = socket.state().borrow_mut();
            let q = s.published.get_mut(&pattern).unwrap();
            q.push_back(b"first".to_vec());
            q.push_back(b"second".to_vec());
        }

        assert_eq!(socket.recv(&pattern).unwrap(), Some(b"second".to_vec()));
        assert_eq!(socket.recv(&pattern).unwrap(), Some(b"first".to_vec()));
        assert_eq!(socket.recv(&pattern).unwrap(), None);
    }

    #[test]
    fn recv_before_subscribe_is_key_missing() {
        let ctx = Context::new().unwrap();
        let socket = PeerSocket::new(&ctx, Role::Client, any_addr());
        let pattern = Pattern::from([0u32, 1]);

        assert!(matches!(socket.recv(&pattern), Err(Error::KeyMissing(p)) if p == pattern));
    }

    #[test]
    fn publish_twice_is_a_no_op() {
        let ctx = Context::new().unwrap();
        let socket = PeerSocket::new(&ctx, Role::Client, any_addr());
        let pattern = Pattern::from([0u32, 1]);
        socket.state().borrow_mut().subscribed.insert(pattern.clone(), HashSet::new());

        assert!(ctx.block_on(socket.publish(pattern)).is_ok());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn bind_twice_is_addr_in_use() {
        let ctx = Context::new().unwrap();
        let socket = PeerSocket::new(&ctx, Role::Client, any_addr());

        socket.bind(5).await.unwrap();
        assert!(matches!(socket.bind(5).await, Err(Error::AddrInUse(_))));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn send_without_publish_is_not_publisher() {
        let ctx = Context::new().unwrap();
        let socket = PeerSocket::new(&ctx, Role::Client, any_addr());
        let pattern = Pattern::from([0u32, 1]);

        assert!(matches!(socket.send(&pattern, b"data").await, Err(Error::NotPublisher(p)) if p == pattern));
    }

    // A publisher with a subscriber address already cached sends straight
    // to a plain listener with no broker involved.
    #[tokio::test(flavor = "current_thread")]
    async fn direct_publish_reaches_a_plain_listener_with_cached_address() {
        use tokio::io::AsyncReadExt;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let sub_addr = listener.local_addr().unwrap();

        let ctx = Context::new().unwrap();
        let publisher = PeerSocket::new(&ctx, Role::Client, any_addr());
        let pattern = Pattern::from([0u32, 1]);
        publisher
            .state()
            .borrow_mut()
            .subscribed
            .insert(pattern.clone(), std::iter::once(Address::from(sub_addr)).collect());

        let payload = b"houston we have lift off";
        let accept = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await.unwrap();
            buf
        });

        publisher.send(&pattern, payload).await.unwrap();
        let received = accept.await.unwrap();
        let frame = codec::unpack(&received).unwrap();

        assert_eq!(frame.type_flags, codec::SUB);
        assert_eq!(frame.pattern, pattern);
        assert_eq!(frame.payload, payload);
    }
}
