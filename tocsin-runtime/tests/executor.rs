use std::{
	num::NonZeroUsize,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	},
};

use tocsin_runtime::executor::{AnyExecutor, Executor, Immediate, LocalQueue, ThreadPool};

use _validator::Validator;

#[test]
fn immediate_runs_inline() {
	let v = Validator::new();
	Immediate.post({
		let v = v.clone();
		move || v.push(1)
	});
	v.expect([1]);
}

#[test]
fn local_queue_runs_in_order() {
	let v = Validator::new();
	let queue = LocalQueue::new();
	assert!(queue.is_empty());

	for i in 0..3 {
		let v = v.clone();
		let queue_ = queue.clone();
		queue.post(move || {
			v.push(i);
			if i == 0 {
				let v = v.clone();
				queue_.post(move || v.push(10));
			}
		});
	}
	v.expect([]);
	assert_eq!(queue.len(), 3);

	assert!(queue.run_one());
	v.expect([0]);
	assert_eq!(queue.len(), 3);

	assert_eq!(queue.run_for(2), 2);
	v.expect([1, 2]);

	assert_eq!(queue.run(), 1);
	v.expect([10]);
	assert!(!queue.run_one());
}

#[test]
fn any_executor_forwards() {
	let queue = LocalQueue::new();
	let erased = AnyExecutor::new(queue.clone());
	let v = Validator::new();

	erased.clone().post({
		let v = v.clone();
		move || v.push("erased")
	});
	v.expect([]);
	assert_eq!(queue.run(), 1);
	v.expect(["erased"]);
}

#[test]
fn thread_pool_runs_everything_before_join_returns() {
	let pool = ThreadPool::builder()
		.workers(NonZeroUsize::new(3).unwrap())
		.thread_name("executor-test")
		.build()
		.unwrap();
	let count = Arc::new(AtomicUsize::new(0));

	for _ in 0..100 {
		let count = Arc::clone(&count);
		let pool_ = pool.clone();
		pool.post(move || {
			count.fetch_add(1, Ordering::AcqRel);
			let count = Arc::clone(&count);
			pool_.post(move || {
				count.fetch_add(1, Ordering::AcqRel);
			});
		});
	}

	pool.join();
	assert_eq!(count.load(Ordering::Acquire), 200);
}

#[test]
fn thread_pool_survives_panics() {
	let pool = ThreadPool::new(NonZeroUsize::new(1).unwrap()).unwrap();
	let v = Validator::new();

	pool.post(|| panic!("listener failure"));
	pool.post({
		let v = v.clone();
		move || v.push("after")
	});

	pool.join();
	assert_eq!(pool.panicked(), 1);
	v.expect(["after"]);
}

#[test]
fn work_submitted_after_join_is_dropped() {
	let pool = ThreadPool::new(NonZeroUsize::new(2).unwrap()).unwrap();
	pool.join();

	let dropped = Arc::new(());
	pool.post({
		let dropped = Arc::clone(&dropped);
		move || drop(dropped)
	});
	assert_eq!(Arc::strong_count(&dropped), 1);

	// Idempotent.
	pool.join();
}
