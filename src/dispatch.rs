//! Request dispatcher: sends, classifies, and hands auth failures to the refresh coordinator.
//!
//! Every call goes through [`Dispatcher::dispatch`]. A 401 (HTTP status or business `code`) in
//! dual-token mode queues a replay of the identical [`RequestSpec`] with the
//! [`RefreshCoordinator`]; the first such failure leads a single-flight refresh and every
//! queued replay is re-dispatched, in order, once the new credentials are committed. The
//! original call is always rejected with [`Error::AuthExpired`]; the attached [`Replay`]
//! handle observes the replayed result.

// crates.io
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, info, warn};
// self
use crate::{
	_prelude::*,
	auth::Session,
	config::DispatcherConfig,
	error::{AuthFailure, ConfigError, RefreshError},
	http::{RequestSpec, Response, Transport},
	loading::LoadingIndicator,
	obs::{self, OpKind, OpOutcome, OpSpan},
	refresh::{Admission, RefreshCoordinator, RefreshEpisode, TokenRefresher, Waiter},
	surface::Surfaces,
};
#[cfg(feature = "reqwest")]
use crate::{
	config::AuthMode,
	http::ReqwestTransport,
	refresh::{EndpointRefresher, UnsupportedRefresher},
};

/// Boxed future returned by [`Dispatcher::dispatch`]; it owns everything it needs.
pub type DispatchFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send>>;

#[cfg(feature = "reqwest")]
/// Dispatcher specialized for the crate's default reqwest transport.
pub type ReqwestDispatcher = Dispatcher<ReqwestTransport>;

/// Pending result of a request queued for replay after a refresh.
pub struct Replay(oneshot::Receiver<Result<Response>>);
impl Replay {
	/// Waits for the replayed request.
	///
	/// Returns `None` when the replay was abandoned because the refresh failed.
	pub async fn outcome(self) -> Option<Result<Response>> {
		self.0.await.ok()
	}
}
impl Debug for Replay {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("Replay(..)")
	}
}

/// Issues requests with session credentials and recovers from expired access tokens.
///
/// Clones share the transport, session, coordinator, and loading indicator.
pub struct Dispatcher<T>
where
	T: ?Sized + Transport,
{
	transport: Arc<T>,
	session: Arc<Session>,
	refresher: Arc<dyn TokenRefresher>,
	coordinator: Arc<RefreshCoordinator>,
	surfaces: Surfaces,
	loading: Arc<LoadingIndicator>,
	config: Arc<DispatcherConfig>,
}
impl<T> Dispatcher<T>
where
	T: ?Sized + Transport,
{
	/// Creates a dispatcher over a caller-provided transport and refresher.
	///
	/// Fails with [`ConfigError::ModeMismatch`] when `session` and `config` disagree on the
	/// authentication mode.
	pub fn with_transport(
		config: DispatcherConfig,
		session: Arc<Session>,
		transport: Arc<T>,
		refresher: Arc<dyn TokenRefresher>,
	) -> Result<Self> {
		if session.mode() != config.mode {
			return Err(
				ConfigError::ModeMismatch { session: session.mode(), dispatcher: config.mode }.into()
			);
		}

		let surfaces = Surfaces::noop();
		let loading =
			Arc::new(LoadingIndicator::new(surfaces.loading.clone(), config.loading.clone()));

		Ok(Self {
			transport,
			session,
			refresher,
			coordinator: Default::default(),
			surfaces,
			loading,
			config: Arc::new(config),
		})
	}

	/// Shares `coordinator` with other dispatchers built over the same session.
	///
	/// Each dispatcher otherwise owns its coordinator, and single-flight only spans that
	/// dispatcher and its clones.
	pub fn with_coordinator(mut self, coordinator: Arc<RefreshCoordinator>) -> Self {
		self.coordinator = coordinator;

		self
	}

	/// Replaces the UI surfaces; the loading indicator is rebuilt around the new spinner.
	pub fn with_surfaces(mut self, surfaces: Surfaces) -> Self {
		self.loading =
			Arc::new(LoadingIndicator::new(surfaces.loading.clone(), self.config.loading.clone()));
		self.surfaces = surfaces;

		self
	}

	/// Session whose credentials are attached to every request.
	pub fn session(&self) -> &Arc<Session> {
		&self.session
	}

	/// Coordinator serializing refreshes for this dispatcher and its clones.
	pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
		&self.coordinator
	}

	/// Shared loading indicator.
	pub fn loading(&self) -> &Arc<LoadingIndicator> {
		&self.loading
	}

	/// Active configuration.
	pub fn config(&self) -> &DispatcherConfig {
		&self.config
	}

	/// Sends `request` and classifies the response.
	pub fn dispatch(&self, request: RequestSpec) -> DispatchFuture {
		self.traced(request, OpKind::Dispatch)
	}

	/// `GET url`.
	pub fn get(&self, url: impl Into<String>) -> DispatchFuture {
		self.dispatch(RequestSpec::get(url))
	}

	/// `POST url` with a JSON body.
	pub fn post(&self, url: impl Into<String>, body: Value) -> DispatchFuture {
		self.dispatch(RequestSpec::post(url, body))
	}

	/// `PUT url` with a JSON body.
	pub fn put(&self, url: impl Into<String>, body: Value) -> DispatchFuture {
		self.dispatch(RequestSpec::put(url, body))
	}

	/// `DELETE url`.
	pub fn delete(&self, url: impl Into<String>) -> DispatchFuture {
		self.dispatch(RequestSpec::delete(url))
	}

	/// Returns a valid access token, refreshing first when the access token is stale and a
	/// refresh token is usable.
	///
	/// Joins the in-flight refresh if there is one. Returns an empty string when no valid token
	/// can be obtained.
	///
	/// The refresh is the shared episode, so a failure here ends the session exactly like a
	/// failed replay refresh: credentials are cleared, the login-expired toast is shown, and the
	/// login redirect is scheduled.
	pub async fn try_valid_access_token(&self) -> String {
		let token = self.session.refresh_now().valid_access_token();

		if !token.is_empty() || !self.config.mode.is_dual() || self.session.refresh_token().is_none()
		{
			return token;
		}

		let (tx, rx) = oneshot::channel();
		let waiter = Waiter::new(move || {
			let _ = tx.send(());
		});

		if let Admission::Lead(episode) = self.coordinator.enqueue(waiter) {
			// The waiter is released through the drain; the handle is not needed.
			drop(self.spawn_refresh(episode));
		}

		match rx.await {
			Ok(()) => self.session.valid_access_token(),
			Err(_) => String::new(),
		}
	}

	fn traced(&self, request: RequestSpec, kind: OpKind) -> DispatchFuture {
		let this = self.clone();

		Box::pin(async move {
			let span = OpSpan::new(kind, "dispatch");

			obs::record_op_outcome(kind, OpOutcome::Attempt);

			let result = span.instrument(this.execute(request)).await;

			obs::record_op_outcome(kind, OpOutcome::of(&result));

			result
		})
	}

	async fn execute(&self, request: RequestSpec) -> Result<Response> {
		let _loading = (!request.options.hide_loading).then(|| self.loading.show());
		let outbound = self.authorize(&request);
		let response = match self.transport.send(&outbound).await {
			Ok(response) => response,
			Err(e) => {
				warn!(
					method = %request.method,
					url = %request.url,
					error = %e,
					"Request failed before a response arrived."
				);

				if !request.options.hide_error_toast {
					self.surfaces.notifier.show_toast(&self.config.messages.network_error);
				}

				return Err(e.into());
			},
		};
		let envelope = response.envelope();

		if response.status == 401 || envelope.code == Some(401) {
			return Err(self.on_auth_failure(request, response).await);
		}
		if response.is_success() {
			if let Some(code) = envelope.code.filter(|code| !self.config.is_success_code(*code)) {
				debug!(url = %request.url, code, "Business code signals a soft failure.");

				self.surfaces
					.notifier
					.show_toast(envelope.text().unwrap_or(&self.config.messages.request_error));
			}

			return Ok(response);
		}

		debug!(url = %request.url, status = response.status, "Request failed with an HTTP error.");

		if !request.options.hide_error_toast {
			let text = envelope.msg.as_deref().filter(|msg| !msg.is_empty());

			self.surfaces.notifier.show_toast(text.unwrap_or(&self.config.messages.request_error));
		}

		Err(Error::Http { status: response.status, response })
	}

	async fn on_auth_failure(&self, request: RequestSpec, response: Response) -> Error {
		if !self.config.mode.is_dual() {
			info!(url = %request.url, "Credential rejected in single-token mode; ending the session.");

			self.session.clear();
			self.surfaces.navigator.to_login_entry();

			return Error::AuthExpired(AuthFailure::new(response, None));
		}
		if self.session.refresh_token().is_none() {
			debug!(url = %request.url, "Credential rejected without a usable refresh token.");

			return Error::AuthExpired(AuthFailure::new(response, None));
		}

		let (waiter, replay) = self.replay_waiter(request);

		match self.coordinator.enqueue(waiter) {
			Admission::Lead(episode) =>
				if let Err(e) = self.spawn_refresh(episode).await {
					warn!(error = %e, "Refresh task ended abnormally.");
				},
			Admission::Queued { position } => {
				debug!(position, "Request queued behind the in-flight refresh.");
			},
		}

		Error::AuthExpired(AuthFailure::new(response, Some(replay)))
	}

	fn replay_waiter(&self, request: RequestSpec) -> (Waiter, Replay) {
		let (tx, rx) = oneshot::channel();
		let replayer = self.clone();
		let waiter = Waiter::new(move || {
			tokio::spawn(async move {
				let result = replayer.traced(request, OpKind::Replay).await;

				let _ = tx.send(result);
			});
		});

		(waiter, Replay(rx))
	}

	fn spawn_refresh(&self, episode: RefreshEpisode) -> JoinHandle<()> {
		let this = self.clone();

		tokio::spawn(async move { this.lead_refresh(episode).await })
	}

	async fn lead_refresh(&self, episode: RefreshEpisode) {
		const KIND: OpKind = OpKind::Refresh;

		let span = OpSpan::new(KIND, "lead_refresh");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let refresh = async {
			let refresh_token =
				self.session.refresh_token().ok_or(RefreshError::MissingRefreshToken)?;

			Ok::<_, Error>(self.refresher.refresh(&refresh_token).await?)
		};
		let commit = |grant| self.session.set_credentials(grant);
		// Credentials must be gone before the coordinator idles, or a racing 401 could lead a
		// second episode with the revoked refresh token.
		let abort = |_: &Error| self.session.clear();
		let result = span.instrument(episode.run(refresh, commit, abort)).await;

		obs::record_op_outcome(KIND, OpOutcome::of(&result));

		let notifier = &self.surfaces.notifier;

		match result {
			Ok(replayed) => {
				info!(replayed, "Token refreshed; replaying queued requests.");

				notifier.hide_toast();
				notifier.show_toast(&self.config.messages.token_refresh_success);
			},
			Err(e) => {
				warn!(error = %e, "Token refresh failed; ending the session.");

				notifier.hide_toast();
				notifier.show_toast(&self.config.messages.login_expired);

				let navigator = self.surfaces.navigator.clone();
				let delay = self.config.login_redirect_delay();

				tokio::spawn(async move {
					tokio::time::sleep(delay).await;

					navigator.to_login_entry();
				});
			},
		}
	}

	fn authorize(&self, request: &RequestSpec) -> RequestSpec {
		let mut outbound = request.clone();

		if outbound.header(&self.config.auth_header).is_some() {
			return outbound;
		}

		let token = self.session.valid_access_token();

		if !token.is_empty() {
			outbound
				.headers
				.insert(self.config.auth_header.clone(), self.config.authorization_value(&token));
		}

		outbound
	}
}
#[cfg(feature = "reqwest")]
impl Dispatcher<ReqwestTransport> {
	/// Creates a dispatcher backed by a fresh reqwest client rooted at `base_url`.
	///
	/// Dual-token mode refreshes by posting to `refresh_path`, resolved against `base_url`;
	/// single-token mode never refreshes and ignores it.
	pub fn new(
		config: DispatcherConfig,
		session: Arc<Session>,
		base_url: Url,
		refresh_path: impl Into<String>,
	) -> Result<Self> {
		let client = ReqwestClient::builder().build().map_err(ConfigError::from)?;
		let transport = Arc::new(ReqwestTransport::with_client(client).with_base_url(base_url));
		let refresher: Arc<dyn TokenRefresher> = match config.mode {
			AuthMode::Single => Arc::new(UnsupportedRefresher),
			AuthMode::Dual => Arc::new(
				EndpointRefresher::new(transport.clone(), refresh_path)
					.with_success_codes(config.success_codes.iter().copied()),
			),
		};

		Self::with_transport(config, session, transport, refresher)
	}
}
impl<T> Clone for Dispatcher<T>
where
	T: ?Sized + Transport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			session: self.session.clone(),
			refresher: self.refresher.clone(),
			coordinator: self.coordinator.clone(),
			surfaces: self.surfaces.clone(),
			loading: self.loading.clone(),
			config: self.config.clone(),
		}
	}
}
impl<T> Debug for Dispatcher<T>
where
	T: ?Sized + Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Dispatcher")
			.field("mode", &self.config.mode)
			.field("session", &self.session)
			.field("refresh_phase", &self.coordinator.phase())
			.field("loading", &self.loading.state())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{
		auth::TokenGrant,
		clock::ManualClock,
		config::AuthMode,
		error::TransportError,
		http::TransportFuture,
		refresh::UnsupportedRefresher,
		store::MemoryStore,
	};

	#[derive(Default)]
	struct EchoTransport {
		seen: Mutex<Vec<RequestSpec>>,
	}
	impl Transport for EchoTransport {
		fn send<'a>(&'a self, request: &'a RequestSpec) -> TransportFuture<'a> {
			self.seen.lock().push(request.clone());

			Box::pin(async { Ok::<_, TransportError>(Response::new(200, Value::Null)) })
		}
	}

	fn session(mode: AuthMode) -> Arc<Session> {
		let clock = Arc::new(ManualClock::new(macros::datetime!(2025-01-01 00:00 UTC)));

		Arc::new(Session::new(mode, clock, Arc::new(MemoryStore::default())))
	}

	fn dispatcher(session: Arc<Session>) -> (Dispatcher<EchoTransport>, Arc<EchoTransport>) {
		let transport = Arc::new(EchoTransport::default());
		let dispatcher = Dispatcher::with_transport(
			DispatcherConfig::new(session.mode()),
			session,
			transport.clone(),
			Arc::new(UnsupportedRefresher),
		)
		.expect("Matching modes should be accepted.");

		(dispatcher, transport)
	}

	#[test]
	fn mode_mismatch_is_rejected() {
		let err = Dispatcher::with_transport(
			DispatcherConfig::new(AuthMode::Dual),
			session(AuthMode::Single),
			Arc::new(EchoTransport::default()),
			Arc::new(UnsupportedRefresher),
		)
		.expect_err("Mismatched modes must fail.");

		assert!(matches!(
			err,
			Error::Config(ConfigError::ModeMismatch {
				session: AuthMode::Single,
				dispatcher: AuthMode::Dual
			})
		));
	}

	#[tokio::test]
	async fn attaches_bearer_token_unless_caller_set_one() {
		let session = session(AuthMode::Single);

		session.set_credentials(TokenGrant::single("abc", 60)).expect("Grant should be accepted.");

		let (dispatcher, transport) = dispatcher(session);

		dispatcher.get("/me").await.expect("Echo should succeed.");
		dispatcher
			.dispatch(RequestSpec::get("/me").with_header("authorization", "Custom xyz"))
			.await
			.expect("Echo should succeed.");

		let seen = transport.seen.lock();

		assert_eq!(seen[0].header("Authorization"), Some("Bearer abc"));
		assert_eq!(seen[1].header("Authorization"), Some("Custom xyz"));
		assert_eq!(seen[1].headers.len(), 1);
	}

	#[tokio::test]
	async fn anonymous_requests_carry_no_auth_header() {
		let (dispatcher, transport) = dispatcher(session(AuthMode::Dual));

		dispatcher.post("/login", serde_json::json!({ "user": "u" })).await.expect("Echo.");

		assert!(transport.seen.lock()[0].header("Authorization").is_none());
	}

	#[tokio::test]
	async fn try_valid_access_token_without_refresh_returns_empty() {
		let (dispatcher, _) = dispatcher(session(AuthMode::Dual));

		assert_eq!(dispatcher.try_valid_access_token().await, "");
		assert_eq!(dispatcher.coordinator().metrics().attempts(), 0);
	}
}
