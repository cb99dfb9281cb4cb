use std::future::Future;

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct State {
	running: bool,
	pending: Option<u64>,
}

/// Collapses rapid buffering requests into one pass in flight plus at most one pending target.
///
/// A request arriving while a pass runs overwrites the pending slot and returns immediately.
/// The caller that started the pass keeps running passes until the slot is empty.
#[derive(Debug, Default)]
pub struct Coalescer {
	state: Mutex<State>,
}

/// What happened to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coalesced {
	/// The caller ran this many passes, the first one for its own target.
	Ran(usize),

	/// Another pass was in flight; the target was left in the pending slot.
	Deferred,
}

impl Coalescer {
	pub fn new() -> Self {
		Self::default()
	}

	/// The target waiting for the next pass, if any.
	pub fn pending(&self) -> Option<u64> {
		self.state.lock().pending
	}

	pub fn is_running(&self) -> bool {
		self.state.lock().running
	}

	pub async fn run<F, Fut>(&self, target: u64, mut pass: F) -> Coalesced
	where
		F: FnMut(u64) -> Fut,
		Fut: Future<Output = ()>,
	{
		{
			let mut state = self.state.lock();
			if state.running {
				state.pending = Some(target);
				return Coalesced::Deferred;
			}
			state.running = true;
		}

		// Resets the state if the caller stops polling mid-pass.
		let mut guard = Guard::new(self);

		let mut target = target;
		let mut passes = 0;

		loop {
			pass(target).await;
			passes += 1;

			let mut state = self.state.lock();
			match state.pending.take() {
				Some(next) => target = next,
				None => {
					// Another caller may start a pass as soon as the lock is released.
					guard.disarm();
					state.running = false;
					return Coalesced::Ran(passes);
				}
			}
		}
	}
}

struct Guard<'a> {
	coalescer: &'a Coalescer,
	armed: bool,
}

impl<'a> Guard<'a> {
	fn new(coalescer: &'a Coalescer) -> Self {
		Self { coalescer, armed: true }
	}

	fn disarm(&mut self) {
		self.armed = false;
	}
}

impl Drop for Guard<'_> {
	fn drop(&mut self) {
		if !self.armed {
			return;
		}

		let mut state = self.coalescer.state.lock();
		state.running = false;
		state.pending = None;
	}
}
