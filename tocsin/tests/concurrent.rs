use std::{
	num::NonZeroUsize,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	},
};

use futures_lite::future::block_on;
use tocsin::{
	runtime::executor::{LocalQueue, ThreadPool},
	AsyncSignal, ConcurrentSignal,
};

mod _validator;
use _validator::Validator;

#[test]
fn every_firing_runs_every_listener() {
	let queue = LocalQueue::new();
	let v = Validator::new();
	let signal = ConcurrentSignal::<u8, (), _>::new(queue.clone());
	signal.connect({
		let v = v.clone();
		move |x: &u8| v.push(*x)
	});

	signal.async_publish(1);
	signal.async_publish(2);
	signal.async_publish(3);
	assert_eq!(queue.len(), 3);

	assert_eq!(queue.run(), 3);
	v.expect([1, 2, 3]);
}

#[test]
fn listeners_share_one_argument() {
	let queue = LocalQueue::new();
	let signal = ConcurrentSignal::<Vec<u8>, usize, _>::new(queue.clone());
	signal.connect(Vec::len);
	signal.connect(|bytes| bytes.iter().map(|&b| usize::from(b)).sum());

	let results = signal.async_publish_future(vec![1, 2, 3]);
	queue.run();
	assert_eq!(block_on(results), [3, 6]);
}

#[test]
fn disconnect_during_firing_applies_to_the_next_one() {
	let queue = LocalQueue::new();
	let v = Validator::new();
	let signal = ConcurrentSignal::<u8, (), _>::new(queue.clone());
	let mut connection = signal.connect({
		let v = v.clone();
		move |x: &u8| v.push(*x)
	});

	signal.async_publish(1);
	connection.disconnect();
	signal.async_publish(2);
	assert!(signal.is_empty());

	queue.run();
	v.expect([1]);
}

#[test]
fn snapshot_and_disconnect_all() {
	let queue = LocalQueue::new();
	let signal = ConcurrentSignal::<u8, u8, _>::new(queue.clone());
	signal.connect(|x| *x);
	let snapshot = signal.snapshot();

	signal.disconnect_all();
	assert_eq!(snapshot.len(), 1);
	assert_eq!(signal.len(), 0);
	assert!(signal.publish(&1).is_empty());

	let results = signal.async_publish_future(1);
	assert_eq!(queue.run(), 1);
	assert!(block_on(results).is_empty());
}

#[test]
fn clones_share_listeners() {
	let queue = LocalQueue::new();
	let signal = ConcurrentSignal::<u8, u8, _>::new(queue.clone());
	signal.clone().connect(|x| x + 1);

	assert_eq!(signal.publish(&1), [2]);
}

#[test]
fn thread_pool_runs_each_invocation_once() {
	let pool = ThreadPool::new(NonZeroUsize::new(4).unwrap()).unwrap();
	let signal = ConcurrentSignal::<usize, usize, _>::new(pool.clone());
	let calls = Arc::new(AtomicUsize::new(0));
	for _ in 0..3 {
		signal.connect({
			let calls = Arc::clone(&calls);
			move |x: &usize| {
				calls.fetch_add(1, Ordering::Relaxed);
				*x
			}
		});
	}

	let futures: Vec<_> = (0..20).map(|i| signal.async_publish_future(i)).collect();
	for (i, future) in futures.into_iter().enumerate() {
		assert_eq!(block_on(future), [i, i, i]);
	}
	pool.join();

	assert_eq!(calls.load(Ordering::Relaxed), 60);
	assert_eq!(pool.panicked(), 0);
}
