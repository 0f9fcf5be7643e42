#![allow(dead_code)]

use std::{
	collections::VecDeque,
	fmt::Debug,
	sync::{Arc, Mutex},
};

/// An ordered log that closures on any thread can push to.
pub struct Validator<T>(Arc<Mutex<VecDeque<T>>>);

impl<T> Clone for Validator<T> {
	fn clone(&self) -> Self {
		Self(Arc::clone(&self.0))
	}
}

impl<T> Validator<T> {
	pub fn new() -> Self {
		Self(Arc::new(Mutex::new(VecDeque::new())))
	}

	pub fn push(&self, value: T) {
		self.0.lock().unwrap().push_back(value);
	}

	pub fn len(&self) -> usize {
		self.0.lock().unwrap().len()
	}

	#[track_caller]
	pub fn expect(&self, expected: impl IntoIterator<Item = T>)
	where
		T: Debug + Eq,
	{
		let mut binding = self.0.lock().unwrap();
		let mut a = binding.drain(..);
		let mut b = expected.into_iter();
		loop {
			match (a.next(), b.next()) {
				(None, None) => break,
				(a, b) => assert_eq!(a, b),
			}
		}
	}

	/// Like [`expect`](`Validator::expect`), for entries pushed from racing threads.
	#[track_caller]
	pub fn expect_unordered(&self, expected: impl IntoIterator<Item = T>)
	where
		T: Debug + Ord,
	{
		let mut actual: Vec<T> = self.0.lock().unwrap().drain(..).collect();
		let mut expected: Vec<T> = expected.into_iter().collect();
		actual.sort();
		expected.sort();
		assert_eq!(actual, expected);
	}
}
