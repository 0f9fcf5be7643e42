use std::{sync::Barrier, thread};

use futures_lite::future::block_on;
use tocsin::{runtime::executor::LocalQueue, AsyncEventDispatcher, Concurrent, DropIfBusy, EventDispatcher};

mod _validator;
use _validator::Validator;

#[derive(Debug, PartialEq, Eq)]
struct Ping(u8);

#[derive(Debug, PartialEq, Eq)]
struct Pong(u8);

struct Burst(usize);

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Seen {
	Ping(u8),
	Pong(u8),
}

fn log_pings(dispatcher: &EventDispatcher, v: &Validator<Seen>) {
	let v = v.clone();
	dispatcher.connect(move |ping: &Ping| v.push(Seen::Ping(ping.0)));
}

fn log_pongs(dispatcher: &EventDispatcher, v: &Validator<Seen>) {
	let v = v.clone();
	dispatcher.connect(move |pong: &Pong| v.push(Seen::Pong(pong.0)));
}

#[test]
fn send_reaches_only_listeners_of_that_type() {
	let v = Validator::new();
	let dispatcher = EventDispatcher::new();
	log_pings(&dispatcher, &v);
	log_pongs(&dispatcher, &v);

	dispatcher.send(&Ping(1));
	dispatcher.send_all([Pong(2), Pong(3)]);

	v.expect([Seen::Ping(1), Seen::Pong(2), Seen::Pong(3)]);
	assert_eq!(dispatcher.listener_count::<Ping>(), 1);
}

#[test]
fn unknown_types_are_ignored() {
	let dispatcher = EventDispatcher::new();
	dispatcher.send(&Ping(1));
	dispatcher.send_all([Ping(2)]);

	assert_eq!(dispatcher.listener_count::<Ping>(), 0);
	assert_eq!(dispatcher.queue_size::<Ping>(), 0);
	assert_eq!(dispatcher.clear::<Ping>(), 0);
	assert_eq!(dispatcher.dispatch(), 0);
}

#[test]
fn queued_events_dispatch_in_order() {
	let v = Validator::new();
	let dispatcher = EventDispatcher::new();
	log_pings(&dispatcher, &v);

	dispatcher.enqueue(Ping(1));
	dispatcher.enqueue_all([Ping(2), Ping(3)]);
	assert_eq!(dispatcher.queue_size::<Ping>(), 3);
	v.expect([]);

	assert_eq!(dispatcher.dispatch(), 3);
	assert_eq!(dispatcher.queue_size::<Ping>(), 0);
	v.expect([Seen::Ping(1), Seen::Ping(2), Seen::Ping(3)]);
}

#[test]
fn events_without_listeners_are_drained() {
	let dispatcher = EventDispatcher::new();
	dispatcher.enqueue(Ping(1));

	assert_eq!(dispatcher.dispatch(), 1);
	assert_eq!(dispatcher.queue_size::<Ping>(), 0);
}

#[test]
fn events_enqueued_while_dispatching_wait_for_the_next_dispatch() {
	let v = Validator::new();
	let dispatcher = EventDispatcher::new();
	dispatcher.connect({
		let v = v.clone();
		let inner = dispatcher.clone();
		move |ping: &Ping| {
			v.push(Seen::Ping(ping.0));
			if ping.0 > 0 {
				inner.enqueue(Ping(ping.0 - 1));
			}
		}
	});

	dispatcher.enqueue(Ping(2));
	assert_eq!(dispatcher.dispatch(), 1);
	assert_eq!(dispatcher.queue_size::<Ping>(), 1);
	assert_eq!(dispatcher.dispatch(), 1);
	assert_eq!(dispatcher.dispatch(), 1);
	assert_eq!(dispatcher.dispatch(), 0);

	v.expect([Seen::Ping(2), Seen::Ping(1), Seen::Ping(0)]);
}

#[test]
fn listeners_register_new_types_while_dispatching() {
	let v = Validator::new();
	let dispatcher = EventDispatcher::new();
	dispatcher.connect({
		let v = v.clone();
		let inner = dispatcher.clone();
		move |ping: &Ping| {
			log_pongs(&inner, &v);
			inner.send(&Pong(ping.0));
			inner.enqueue(Pong(ping.0 + 10));
		}
	});

	dispatcher.enqueue(Ping(1));
	dispatcher.dispatch();
	assert_eq!(dispatcher.listener_count::<Pong>(), 1);
	assert_eq!(dispatcher.queue_size::<Pong>(), 1);
	dispatcher.dispatch();

	v.expect([Seen::Pong(1), Seen::Pong(11)]);
}

#[test]
fn clearing_discards_queued_events() {
	let v = Validator::new();
	let dispatcher = EventDispatcher::new();
	log_pings(&dispatcher, &v);
	log_pongs(&dispatcher, &v);

	dispatcher.enqueue_all([Ping(1), Ping(2)]);
	dispatcher.enqueue(Pong(3));
	assert_eq!(dispatcher.clear::<Ping>(), 2);
	assert_eq!(dispatcher.queue_size::<Pong>(), 1);

	dispatcher.enqueue(Ping(4));
	assert_eq!(dispatcher.clear_all(), 2);
	assert_eq!(dispatcher.dispatch(), 0);
	v.expect([]);
}

#[test]
fn disconnected_listeners_stop_receiving() {
	let v = Validator::new();
	let dispatcher = EventDispatcher::new();
	let mut connection = dispatcher.connect({
		let v = v.clone();
		move |ping: &Ping| v.push(Seen::Ping(ping.0))
	});

	dispatcher.send(&Ping(1));
	connection.disconnect();
	dispatcher.send(&Ping(2));

	v.expect([Seen::Ping(1)]);
	assert_eq!(dispatcher.listener_count::<Ping>(), 0);
}

#[test]
fn async_dispatch_posts_listeners() {
	let queue = LocalQueue::new();
	let v = Validator::new();
	let dispatcher = AsyncEventDispatcher::<Concurrent, _>::new(queue.clone());
	dispatcher.connect({
		let v = v.clone();
		move |ping: &Ping| v.push(Seen::Ping(ping.0))
	});

	dispatcher.enqueue_all([Ping(1), Ping(2)]);
	assert_eq!(dispatcher.async_dispatch(), 2);
	assert_eq!(dispatcher.queue_size::<Ping>(), 0);
	v.expect([]);

	assert_eq!(queue.run(), 2);
	v.expect([Seen::Ping(1), Seen::Ping(2)]);
}

#[test]
fn async_dispatch_future_waits_for_all_types() {
	let queue = LocalQueue::new();
	let v = Validator::new();
	let dispatcher = AsyncEventDispatcher::<Concurrent, _>::new(queue.clone());
	for _ in 0..2 {
		dispatcher.connect({
			let v = v.clone();
			move |ping: &Ping| v.push(Seen::Ping(ping.0))
		});
	}
	dispatcher.connect({
		let v = v.clone();
		move |pong: &Pong| v.push(Seen::Pong(pong.0))
	});

	dispatcher.enqueue_all([Ping(1), Ping(2)]);
	dispatcher.enqueue(Pong(3));
	let done = dispatcher.async_dispatch_future();
	queue.run();
	block_on(done);

	v.expect_unordered([
		Seen::Ping(1),
		Seen::Ping(1),
		Seen::Ping(2),
		Seen::Ping(2),
		Seen::Pong(3),
	]);
}

#[test]
fn drop_if_busy_dispatcher_skips_busy_listeners() {
	let queue = LocalQueue::new();
	let v = Validator::new();
	let dispatcher = AsyncEventDispatcher::<DropIfBusy, _>::new(queue.clone());
	dispatcher.connect({
		let v = v.clone();
		move |ping: &Ping| v.push(Seen::Ping(ping.0))
	});

	// Both events are published before the listener gets to run once.
	dispatcher.enqueue_all([Ping(1), Ping(2)]);
	let done = dispatcher.async_dispatch_future();
	queue.run();
	block_on(done);
	v.expect([Seen::Ping(1)]);

	dispatcher.async_send(Ping(3));
	queue.run();
	v.expect([Seen::Ping(3)]);
}

#[test]
fn async_send_with_completes_after_listeners() {
	let queue = LocalQueue::new();
	let v = Validator::new();
	let dispatcher = AsyncEventDispatcher::<Concurrent, _>::new(queue.clone());
	dispatcher.connect({
		let v = v.clone();
		move |ping: &Ping| v.push(Seen::Ping(ping.0))
	});

	dispatcher.async_send_with(Ping(1), {
		let v = v.clone();
		move |()| v.push(Seen::Pong(0))
	});
	dispatcher.async_send_all_with([Ping(2), Ping(3)], {
		let v = v.clone();
		move |()| v.push(Seen::Pong(1))
	});
	queue.run();

	v.expect([
		Seen::Ping(1),
		Seen::Pong(0),
		Seen::Ping(2),
		Seen::Ping(3),
		Seen::Pong(1),
	]);
}

#[test]
fn async_dispatcher_sends_inline() {
	let queue = LocalQueue::new();
	let v = Validator::new();
	let dispatcher = AsyncEventDispatcher::<Concurrent, _>::new(queue.clone());
	dispatcher.connect({
		let v = v.clone();
		move |ping: &Ping| v.push(Seen::Ping(ping.0))
	});

	dispatcher.send(&Ping(1));
	dispatcher.enqueue(Ping(2));
	assert_eq!(dispatcher.dispatch(), 1);
	assert!(queue.is_empty());

	v.expect([Seen::Ping(1), Seen::Ping(2)]);
	assert_eq!(dispatcher.listener_count::<Ping>(), 1);
	assert_eq!(dispatcher.listener_count::<Pong>(), 0);
}

#[test]
fn concurrent_first_use_registers_one_dispatcher() {
	const THREADS: usize = 8;

	let v = Validator::new();
	let dispatcher = EventDispatcher::new();
	let barrier = Barrier::new(THREADS);

	thread::scope(|s| {
		for listener in 0..THREADS {
			let v = v.clone();
			let dispatcher = &dispatcher;
			let barrier = &barrier;
			s.spawn(move || {
				barrier.wait();
				dispatcher.connect(move |burst: &Burst| v.push((listener, burst.0)));
				dispatcher.enqueue(Burst(listener));
			});
		}
	});

	assert_eq!(dispatcher.listener_count::<Burst>(), THREADS);
	assert_eq!(dispatcher.queue_size::<Burst>(), THREADS);
	assert_eq!(dispatcher.dispatch(), THREADS);

	v.expect_unordered((0..THREADS).flat_map(|listener| (0..THREADS).map(move |event| (listener, event))));
}
