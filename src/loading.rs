//! Reference-counted global loading indicator.
//!
//! Each dispatch that wants a spinner calls [`LoadingIndicator::show`] and keeps the returned
//! [`LoadingGuard`] alive until it finishes. The surface is shown on the first acquisition and
//! hidden when the last guard drops, so overlapping requests produce exactly one spinner. Guards
//! release on every exit path: normal return, `?` propagation, panics, and dropped futures.

// crates.io
use tracing::{debug, warn};
// self
use crate::{_prelude::*, config::LoadingConfig, surface::LoadingSurface};

/// Snapshot of the indicator counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadingState {
	/// Outstanding guards.
	pub count: usize,
	/// Whether the surface is currently shown.
	pub shown: bool,
}

#[derive(Debug, Default)]
struct Counters {
	count: usize,
	shown: bool,
	// Bumped by `reset` so guards acquired earlier release as no-ops.
	epoch: u64,
}

/// Reference-counted spinner shared by every dispatch.
pub struct LoadingIndicator {
	surface: Arc<dyn LoadingSurface>,
	config: RwLock<LoadingConfig>,
	state: Mutex<Counters>,
}
impl LoadingIndicator {
	/// Creates an indicator driving `surface`.
	pub fn new(surface: Arc<dyn LoadingSurface>, config: LoadingConfig) -> Self {
		Self { surface, config: RwLock::new(config), state: Default::default() }
	}

	/// Acquires a guard, showing the surface if this is the first outstanding guard.
	pub fn show(self: &Arc<Self>) -> LoadingGuard {
		let mut state = self.state.lock();

		state.count += 1;

		debug!(count = state.count, "Loading acquired.");

		if !state.shown {
			let config = self.config.read();

			self.surface.show_loading(&config.title, config.mask);

			state.shown = true;
		}

		LoadingGuard { indicator: Some(self.clone()), epoch: state.epoch }
	}

	/// Forces the counter to zero and hides the surface.
	///
	/// Outstanding guards become no-ops when they drop.
	pub fn reset(&self) {
		let mut state = self.state.lock();

		debug!(count = state.count, "Loading reset.");

		state.count = 0;
		state.epoch += 1;

		if state.shown {
			self.surface.hide_loading();

			state.shown = false;
		}
	}

	/// Current counters.
	pub fn state(&self) -> LoadingState {
		let state = self.state.lock();

		LoadingState { count: state.count, shown: state.shown }
	}

	/// Replaces the presentation settings used by future shows.
	pub fn update_config(&self, config: LoadingConfig) {
		*self.config.write() = config;
	}

	fn release(&self, epoch: u64) {
		let mut state = self.state.lock();

		if state.epoch != epoch {
			return;
		}
		if state.count == 0 {
			warn!("Loading released with no outstanding guards.");

			return;
		}

		state.count -= 1;

		debug!(count = state.count, "Loading released.");

		if state.count == 0 && state.shown {
			self.surface.hide_loading();

			state.shown = false;
		}
	}
}
impl Debug for LoadingIndicator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoadingIndicator").field("state", &self.state()).finish()
	}
}

/// RAII handle returned by [`LoadingIndicator::show`]; releases exactly once on drop.
#[must_use = "dropping the guard immediately hides the indicator"]
pub struct LoadingGuard {
	indicator: Option<Arc<LoadingIndicator>>,
	epoch: u64,
}
impl LoadingGuard {
	/// Releases early; equivalent to dropping the guard.
	pub fn release(mut self) {
		if let Some(indicator) = self.indicator.take() {
			indicator.release(self.epoch);
		}
	}
}
impl Drop for LoadingGuard {
	fn drop(&mut self) {
		if let Some(indicator) = self.indicator.take() {
			indicator.release(self.epoch);
		}
	}
}
impl Debug for LoadingGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("LoadingGuard(..)")
	}
}
