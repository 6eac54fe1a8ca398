//! Single-flight refresh coordination with a FIFO waiter queue.
//!
//! [`RefreshCoordinator`] is a two-state machine (`Idle`, `Refreshing`) that owns the waiter queue.
//! Callers never touch the phase or the queue directly: [`RefreshCoordinator::enqueue`] is the only
//! way in, and the caller that flips the machine to `Refreshing` receives the sole
//! [`RefreshEpisode`], the only handle able to settle it. Episodes own a reference to their
//! coordinator, so they can be moved into a spawned task. Settling drains the queue and returns
//! to `Idle` under a single lock acquisition, so a waiter enqueued concurrently either lands in
//! the drained batch or becomes the leader of the next episode; it is never lost.

mod metrics;
pub mod refresher;

pub use metrics::RefreshMetrics;
pub use refresher::*;

// std
use std::mem;
// crates.io
use tracing::{debug, warn};
// self
use crate::_prelude::*;

/// Coordinator phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RefreshPhase {
	/// No refresh in flight.
	#[default]
	Idle,
	/// A refresh is in flight; new waiters queue behind it.
	Refreshing,
}

/// Deferred continuation released after a successful refresh.
pub struct Waiter(Box<dyn FnOnce() + Send>);
impl Waiter {
	/// Wraps a continuation.
	pub fn new(continuation: impl 'static + FnOnce() + Send) -> Self {
		Self(Box::new(continuation))
	}

	fn release(self) {
		(self.0)()
	}
}
impl Debug for Waiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("Waiter(..)")
	}
}

/// Result of [`RefreshCoordinator::enqueue`].
#[derive(Debug)]
pub enum Admission {
	/// The caller started a new episode and must drive it.
	Lead(RefreshEpisode),
	/// A refresh is already in flight; the waiter sits at `position` (1-based).
	Queued {
		/// Queue position of the new waiter.
		position: usize,
	},
}

#[derive(Debug, Default)]
struct RefreshState {
	phase: RefreshPhase,
	waiters: VecDeque<Waiter>,
}

/// Single-flight refresh state machine.
#[derive(Debug, Default)]
pub struct RefreshCoordinator {
	state: Mutex<RefreshState>,
	metrics: RefreshMetrics,
}
impl RefreshCoordinator {
	/// Creates an idle coordinator.
	pub fn new() -> Self {
		Self::default()
	}

	/// Current phase.
	pub fn phase(&self) -> RefreshPhase {
		self.state.lock().phase
	}

	/// Number of waiters queued for the in-flight episode.
	pub fn pending(&self) -> usize {
		self.state.lock().waiters.len()
	}

	/// Episode and waiter counters.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Queues `waiter` and starts an episode if none is in flight.
	pub fn enqueue(self: &Arc<Self>, waiter: Waiter) -> Admission {
		let mut state = self.state.lock();

		state.waiters.push_back(waiter);
		self.metrics.record_queued();

		match state.phase {
			RefreshPhase::Idle => {
				state.phase = RefreshPhase::Refreshing;
				self.metrics.record_attempt();

				debug!("Refresh episode started.");

				Admission::Lead(RefreshEpisode { coordinator: self.clone(), settled: false })
			},
			RefreshPhase::Refreshing => {
				let position = state.waiters.len();

				debug!(position, "Waiter queued behind the in-flight refresh.");

				Admission::Queued { position }
			},
		}
	}

	fn drain(&self) -> VecDeque<Waiter> {
		let mut state = self.state.lock();

		state.phase = RefreshPhase::Idle;

		mem::take(&mut state.waiters)
	}
}

/// Exclusive right to settle the in-flight refresh.
///
/// Dropping an unsettled episode discards its waiters and returns the coordinator to `Idle`.
#[must_use = "an episode must be run to release its waiters"]
pub struct RefreshEpisode {
	coordinator: Arc<RefreshCoordinator>,
	settled: bool,
}
impl RefreshEpisode {
	/// Awaits `refresh`, applies `commit` or `abort` to its outcome, then settles the coordinator.
	///
	/// Both hooks run while the coordinator is still `Refreshing`, so their side effects are
	/// visible before any new episode can start. On success every waiter is released in enqueue
	/// order and the number of released waiters is returned. On failure (from either `refresh`
	/// or `commit`) `abort` sees the error, the waiters are discarded, and the error is returned.
	pub async fn run<T, E, Fut, C, A>(
		mut self,
		refresh: Fut,
		commit: C,
		abort: A,
	) -> Result<usize, E>
	where
		Fut: Future<Output = Result<T, E>>,
		C: FnOnce(T) -> Result<(), E>,
		A: FnOnce(&E),
	{
		let outcome = match refresh.await {
			Ok(value) => commit(value),
			Err(e) => Err(e),
		};

		if let Err(e) = &outcome {
			abort(e);
		}

		let waiters = self.coordinator.drain();

		self.settled = true;

		match outcome {
			Ok(()) => {
				let released = waiters.len();

				self.coordinator.metrics.record_success(released);

				debug!(released, "Refresh committed; releasing waiters.");

				for waiter in waiters {
					waiter.release();
				}

				Ok(released)
			},
			Err(e) => {
				self.coordinator.metrics.record_failure();
				self.coordinator.metrics.record_abandoned(waiters.len());

				debug!(abandoned = waiters.len(), "Refresh failed; discarding waiters.");

				Err(e)
			},
		}
	}
}
impl Drop for RefreshEpisode {
	fn drop(&mut self) {
		if self.settled {
			return;
		}

		let abandoned = self.coordinator.drain().len();

		self.coordinator.metrics.record_failure();
		self.coordinator.metrics.record_abandoned(abandoned);

		warn!(abandoned, "Refresh episode dropped before settling.");
	}
}
impl Debug for RefreshEpisode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshEpisode").field("settled", &self.settled).finish()
	}
}
