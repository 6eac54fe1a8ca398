// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for refresh episodes.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	queued: AtomicU64,
	replayed: AtomicU64,
	abandoned: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the number of refresh episodes started.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of episodes that committed new credentials.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of episodes that failed.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of waiters ever enqueued.
	pub fn queued(&self) -> u64 {
		self.queued.load(Ordering::Relaxed)
	}

	/// Returns the number of waiters released after a successful refresh.
	pub fn replayed(&self) -> u64 {
		self.replayed.load(Ordering::Relaxed)
	}

	/// Returns the number of waiters discarded by failed or interrupted episodes.
	pub fn abandoned(&self) -> u64 {
		self.abandoned.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self, replayed: usize) {
		self.success.fetch_add(1, Ordering::Relaxed);
		self.replayed.fetch_add(saturating_u64(replayed), Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_queued(&self) {
		self.queued.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_abandoned(&self, abandoned: usize) {
		self.abandoned.fetch_add(saturating_u64(abandoned), Ordering::Relaxed);
	}
}

fn saturating_u64(count: usize) -> u64 {
	u64::try_from(count).unwrap_or(u64::MAX)
}
