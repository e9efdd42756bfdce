// Copyright 2016 TMQ contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

// Broker-mediated scenarios: a subscriber and a publisher independently
// discover each other through a broker context, then exchange a payload
// directly.
//
// Every `Context` owns its own runtime and drives it only through
// `block_on`/`run_briefly`; these tests are plain `#[test]` functions
// rather than `#[tokio::test]` so that a context's internal
// `LocalSet::block_on` is never nested inside an ambient tokio runtime.

use std::net::SocketAddr;
use std::time::Duration;

use tmq::{Context, PeerSocket, Pattern, Role};

fn init_logging() {
    let _ = env_logger::Builder::from_default_env().is_test(true).try_init();
}

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

// A couple of reactor ticks is enough for every pending accept-drain to
// run; the tick is nominally 5ms.
fn settle(ctx: &Context) {
    ctx.run_briefly(Duration::from_millis(40));
}

// A subscriber registers first; a publisher that registers afterward
// receives that subscriber's address in its own registration reply,
// evidenced here by a subsequent send reaching the subscriber without
// either peer ever talking to the other directly.
#[test]
fn late_publisher_receives_existing_subscriber_on_registration() {
    init_logging();
    let ctx = Context::new().unwrap();

    let broker = PeerSocket::new(&ctx, Role::Broker, loopback());
    ctx.block_on(broker.bind(5)).unwrap();
    let broker_addr = broker.listen_addr();

    let subscriber = PeerSocket::new(&ctx, Role::Client, loopback());
    ctx.block_on(subscriber.bind(5)).unwrap();
    subscriber.set_broker(broker_addr);

    let pattern = Pattern::from_names(&["test", "pattern"]);
    ctx.block_on(subscriber.subscribe(pattern.clone())).unwrap();
    settle(&ctx);

    let publisher = PeerSocket::new(&ctx, Role::Client, loopback());
    ctx.block_on(publisher.bind(5)).unwrap();
    publisher.set_broker(broker_addr);
    ctx.block_on(publisher.publish(pattern.clone())).unwrap();
    settle(&ctx);

    ctx.block_on(publisher.send(&pattern, b"hello subscriber")).unwrap();
    settle(&ctx);

    assert_eq!(subscriber.recv(&pattern).unwrap(), Some(b"hello subscriber".to_vec()));
    assert_eq!(ctx.failure_count(), 0);
}

// Build broker, publisher, subscriber; drive the reactor; send; recv.
#[test]
fn publisher_and_subscriber_exchange_a_payload_through_the_broker() {
    init_logging();
    let ctx = Context::new().unwrap();

    let broker = PeerSocket::new(&ctx, Role::Broker, loopback());
    ctx.block_on(broker.bind(5)).unwrap();
    let broker_addr = broker.listen_addr();

    let publisher = PeerSocket::new(&ctx, Role::Client, loopback());
    ctx.block_on(publisher.bind(5)).unwrap();
    publisher.set_broker(broker_addr);

    let subscriber = PeerSocket::new(&ctx, Role::Client, loopback());
    ctx.block_on(subscriber.bind(5)).unwrap();
    subscriber.set_broker(broker_addr);

    let pattern = Pattern::from_names(&["rockets", "launch"]);

    ctx.block_on(publisher.publish(pattern.clone())).unwrap();
    settle(&ctx);
    ctx.block_on(subscriber.subscribe(pattern.clone())).unwrap();
    settle(&ctx);

    ctx.block_on(publisher.send(&pattern, b"3-2-1-liftoff")).unwrap();
    settle(&ctx);

    assert_eq!(subscriber.recv(&pattern).unwrap(), Some(b"3-2-1-liftoff".to_vec()));
    assert_eq!(ctx.failure_count(), 0);
}

// Repeats the broker round-trip through the blocking façade instead of
// `block_on` wrapping each call directly, confirming the synchronous entry
// points are usable from a caller that never touches `async` itself.
#[test]
fn blocking_facade_works_outside_any_runtime() {
    init_logging();
    let ctx = Context::new().unwrap();

    let broker = PeerSocket::new(&ctx, Role::Broker, loopback());
    ctx.block_on(broker.bind(5)).unwrap();
    let broker_addr = broker.listen_addr();

    let publisher = PeerSocket::new(&ctx, Role::Client, loopback());
    ctx.block_on(publisher.bind(5)).unwrap();
    publisher.set_broker(broker_addr);

    let subscriber = PeerSocket::new(&ctx, Role::Client, loopback());
    ctx.block_on(subscriber.bind(5)).unwrap();
    subscriber.set_broker(broker_addr);

    let pattern = Pattern::from_names(&["blocking", "facade"]);

    publisher.publish_blocking(pattern.clone()).unwrap();
    settle(&ctx);
    subscriber.subscribe_blocking(pattern.clone()).unwrap();
    settle(&ctx);

    publisher.send_blocking(&pattern, b"over the wire").unwrap();
    settle(&ctx);

    assert_eq!(subscriber.recv(&pattern).unwrap(), Some(b"over the wire".to_vec()));
}

// Re-subscribing to the same pattern on the same socket is rejected
// without any broker round-trip.
#[test]
fn duplicate_subscribe_is_rejected_locally() {
    init_logging();
    let ctx = Context::new().unwrap();

    let broker = PeerSocket::new(&ctx, Role::Broker, loopback());
    ctx.block_on(broker.bind(5)).unwrap();
    let broker_addr = broker.listen_addr();

    let subscriber = PeerSocket::new(&ctx, Role::Client, loopback());
    ctx.block_on(subscriber.bind(5)).unwrap();
    subscriber.set_broker(broker_addr);

    let pattern = Pattern::from_names(&["dup", "pattern"]);
    ctx.block_on(subscriber.subscribe(pattern.clone())).unwrap();

    let err = ctx.block_on(subscriber.subscribe(pattern.clone())).unwrap_err();
    assert!(matches!(err, tmq::Error::Duplicate(p) if p == pattern));
}
