//! UI collaborator contracts: notifications, navigation, and the loading spinner.
//!
//! Every call is fire-and-forget; the dispatcher never consumes a return value.

// self
use crate::_prelude::*;

/// Toast-style notification surface.
pub trait Notifier
where
	Self: Send + Sync,
{
	/// Shows a transient text notification.
	fn show_toast(&self, message: &str);

	/// Hides any visible notification.
	fn hide_toast(&self);
}

/// Navigation surface used when the session ends.
pub trait Navigator
where
	Self: Send + Sync,
{
	/// Redirects the user to the login entry point.
	fn to_login_entry(&self);
}

/// Platform spinner driven by [`LoadingIndicator`](crate::loading::LoadingIndicator).
pub trait LoadingSurface
where
	Self: Send + Sync,
{
	/// Shows the spinner.
	fn show_loading(&self, title: &str, mask: bool);

	/// Hides the spinner.
	fn hide_loading(&self);
}

/// Bundle of UI collaborators handed to the dispatcher.
#[derive(Clone)]
pub struct Surfaces {
	/// Notification surface.
	pub notifier: Arc<dyn Notifier>,
	/// Navigation surface.
	pub navigator: Arc<dyn Navigator>,
	/// Spinner surface.
	pub loading: Arc<dyn LoadingSurface>,
}
impl Surfaces {
	/// Bundles three independent collaborators.
	pub fn new(
		notifier: Arc<dyn Notifier>,
		navigator: Arc<dyn Navigator>,
		loading: Arc<dyn LoadingSurface>,
	) -> Self {
		Self { notifier, navigator, loading }
	}

	/// Uses one value for every surface.
	pub fn shared<S>(surface: Arc<S>) -> Self
	where
		S: 'static + Notifier + Navigator + LoadingSurface,
	{
		Self { notifier: surface.clone(), navigator: surface.clone(), loading: surface }
	}

	/// Surfaces that ignore every call.
	pub fn noop() -> Self {
		Self::shared(Arc::new(NoopSurface))
	}
}
impl Default for Surfaces {
	fn default() -> Self {
		Self::noop()
	}
}
impl Debug for Surfaces {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("Surfaces(..)")
	}
}

/// Surface that ignores every call.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSurface;
impl Notifier for NoopSurface {
	fn show_toast(&self, _: &str) {}

	fn hide_toast(&self) {}
}
impl Navigator for NoopSurface {
	fn to_login_entry(&self) {}
}
impl LoadingSurface for NoopSurface {
	fn show_loading(&self, _: &str, _: bool) {}

	fn hide_loading(&self) {}
}

/// Call recorded by [`RecordingSurface`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SurfaceEvent {
	/// [`Notifier::show_toast`].
	ShowToast(String),
	/// [`Notifier::hide_toast`].
	HideToast,
	/// [`Navigator::to_login_entry`].
	NavigateToLogin,
	/// [`LoadingSurface::show_loading`].
	ShowLoading,
	/// [`LoadingSurface::hide_loading`].
	HideLoading,
}

/// Surface that records every call, for tests and demos.
#[derive(Debug, Default)]
pub struct RecordingSurface(Mutex<Vec<SurfaceEvent>>);
impl RecordingSurface {
	/// All recorded events in call order.
	pub fn events(&self) -> Vec<SurfaceEvent> {
		self.0.lock().clone()
	}

	/// Texts passed to [`Notifier::show_toast`], in order.
	pub fn toasts(&self) -> Vec<String> {
		self.0
			.lock()
			.iter()
			.filter_map(|event| match event {
				SurfaceEvent::ShowToast(text) => Some(text.clone()),
				_ => None,
			})
			.collect()
	}

	/// Number of times `event` was recorded.
	pub fn count(&self, event: &SurfaceEvent) -> usize {
		self.0.lock().iter().filter(|recorded| *recorded == event).count()
	}

	/// Number of login redirects.
	pub fn navigations(&self) -> usize {
		self.count(&SurfaceEvent::NavigateToLogin)
	}

	fn push(&self, event: SurfaceEvent) {
		self.0.lock().push(event);
	}
}
impl Notifier for RecordingSurface {
	fn show_toast(&self, message: &str) {
		self.push(SurfaceEvent::ShowToast(message.to_owned()));
	}

	fn hide_toast(&self) {
		self.push(SurfaceEvent::HideToast);
	}
}
impl Navigator for RecordingSurface {
	fn to_login_entry(&self) {
		self.push(SurfaceEvent::NavigateToLogin);
	}
}
impl LoadingSurface for RecordingSurface {
	fn show_loading(&self, _: &str, _: bool) {
		self.push(SurfaceEvent::ShowLoading);
	}

	fn hide_loading(&self) {
		self.push(SurfaceEvent::HideLoading);
	}
}
