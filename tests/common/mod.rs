//! Shared fakes and fixtures for the dispatcher integration tests.

#![allow(dead_code)]

// std
use std::sync::atomic::{AtomicUsize, Ordering};
// crates.io
use time::macros;
use tokio::sync::Semaphore;
// self
use session_dispatch::{
	_preludet::*,
	auth::{Session, TokenGrant},
	clock::ManualClock,
	config::{AuthMode, DispatcherConfig},
	dispatch::Dispatcher,
	error::{RefreshError, TransportError},
	http::{RequestSpec, Response, Transport, TransportFuture},
	refresh::{RefreshFuture, TokenRefresher},
	store::MemoryStore,
	surface::{RecordingSurface, Surfaces},
};

pub const START: OffsetDateTime = macros::datetime!(2025-01-01 00:00 UTC);

type Handler = dyn Fn(&RequestSpec) -> Result<Response, TransportError> + Send + Sync;

/// Transport answering from a closure and recording every request it receives.
pub struct ScriptedTransport {
	handler: Box<Handler>,
	seen: Mutex<Vec<RequestSpec>>,
}
impl ScriptedTransport {
	pub fn new(
		handler: impl 'static + Fn(&RequestSpec) -> Result<Response, TransportError> + Send + Sync,
	) -> Arc<Self> {
		Arc::new(Self { handler: Box::new(handler), seen: Default::default() })
	}

	/// Accepts `Bearer <token>` and answers 401 for anything else.
	pub fn accepting(token: &'static str) -> Arc<Self> {
		let expected = format!("Bearer {token}");

		Self::new(move |request| {
			if request.header("Authorization") == Some(expected.as_str()) {
				Ok(Response::new(200, serde_json::json!({ "code": 0, "data": { "url": request.url } })))
			} else {
				Ok(Response::new(401, serde_json::json!({ "code": 401, "msg": "token expired" })))
			}
		})
	}

	/// Answers every request with the same response.
	pub fn always(status: u16, body: Value) -> Arc<Self> {
		Self::new(move |_| Ok(Response::new(status, body.clone())))
	}

	pub fn requests(&self) -> Vec<RequestSpec> {
		self.seen.lock().clone()
	}

	/// `(url, authorization)` pairs in arrival order.
	pub fn calls(&self) -> Vec<(String, Option<String>)> {
		self.seen
			.lock()
			.iter()
			.map(|request| {
				(request.url.clone(), request.header("Authorization").map(str::to_owned))
			})
			.collect()
	}
}
impl Transport for ScriptedTransport {
	fn send<'a>(&'a self, request: &'a RequestSpec) -> TransportFuture<'a> {
		self.seen.lock().push(request.clone());

		Box::pin(async move {
			tokio::task::yield_now().await;

			(self.handler)(request)
		})
	}
}

enum Verdict {
	Grant(TokenGrant),
	Reject,
}

/// Refresher that counts calls and optionally blocks until released.
pub struct GatedRefresher {
	verdict: Verdict,
	gate: Semaphore,
	calls: AtomicUsize,
	tokens: Mutex<Vec<String>>,
}
impl GatedRefresher {
	pub fn granting(grant: TokenGrant) -> Arc<Self> {
		Self::build(Verdict::Grant(grant), 0)
	}

	pub fn rejecting() -> Arc<Self> {
		Self::build(Verdict::Reject, 0)
	}

	pub fn granting_now(grant: TokenGrant) -> Arc<Self> {
		Self::build(Verdict::Grant(grant), 1)
	}

	pub fn rejecting_now() -> Arc<Self> {
		Self::build(Verdict::Reject, 1)
	}

	fn build(verdict: Verdict, permits: usize) -> Arc<Self> {
		Arc::new(Self {
			verdict,
			gate: Semaphore::new(permits),
			calls: AtomicUsize::new(0),
			tokens: Default::default(),
		})
	}

	/// Opens the gate for every pending and future refresh.
	pub fn release(&self) {
		self.gate.add_permits(1);
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	/// Refresh tokens received, in call order.
	pub fn tokens(&self) -> Vec<String> {
		self.tokens.lock().clone()
	}
}
impl TokenRefresher for GatedRefresher {
	fn refresh<'a>(&'a self, refresh_token: &'a str) -> RefreshFuture<'a> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.tokens.lock().push(refresh_token.to_owned());

		Box::pin(async move {
			let _permit = self.gate.acquire().await;

			match &self.verdict {
				Verdict::Grant(grant) => Ok(grant.clone()),
				Verdict::Reject => Err(RefreshError::Rejected {
					status: 401,
					code: Some(401),
					message: "refresh token revoked".into(),
				}),
			}
		})
	}
}

pub struct Harness {
	pub dispatcher: Dispatcher<ScriptedTransport>,
	pub transport: Arc<ScriptedTransport>,
	pub surface: Arc<RecordingSurface>,
	pub clock: Arc<ManualClock>,
	pub store: MemoryStore,
}
impl Harness {
	pub fn new(
		mode: AuthMode,
		transport: Arc<ScriptedTransport>,
		refresher: Arc<dyn TokenRefresher>,
	) -> Self {
		Self::with_config(DispatcherConfig::new(mode), transport, refresher)
	}

	pub fn with_config(
		config: DispatcherConfig,
		transport: Arc<ScriptedTransport>,
		refresher: Arc<dyn TokenRefresher>,
	) -> Self {
		let mode = config.mode;
		let clock = Arc::new(ManualClock::new(START));
		let store = MemoryStore::default();
		let session = Arc::new(Session::new(mode, clock.clone(), Arc::new(store.clone())));
		let surface = Arc::new(RecordingSurface::default());
		let dispatcher = Dispatcher::with_transport(config, session, transport.clone(), refresher)
			.expect("Harness modes always match.")
			.with_surfaces(Surfaces::shared(surface.clone()));

		Self { dispatcher, transport, surface, clock, store }
	}

	/// Dual-mode harness logged in as `old`/`r1`.
	pub fn dual(transport: Arc<ScriptedTransport>, refresher: Arc<dyn TokenRefresher>) -> Self {
		let harness = Self::new(AuthMode::Dual, transport, refresher);

		harness.login(TokenGrant::dual("old", 3_600, "r1", 7_200));

		harness
	}

	/// Single-mode harness logged in as `old`.
	pub fn single(transport: Arc<ScriptedTransport>, refresher: Arc<dyn TokenRefresher>) -> Self {
		let harness = Self::new(AuthMode::Single, transport, refresher);

		harness.login(TokenGrant::single("old", 3_600));

		harness
	}

	pub fn login(&self, grant: TokenGrant) {
		self.dispatcher.session().set_credentials(grant).expect("Fixture grant should be accepted.");
	}

	pub fn session(&self) -> &Session {
		self.dispatcher.session()
	}

	/// Yields until `count` waiters are queued with the coordinator.
	pub async fn wait_for_pending(&self, count: usize) {
		while self.dispatcher.coordinator().pending() < count {
			tokio::task::yield_now().await;
		}
	}
}

/// New credentials handed out by refresh fakes.
pub fn renewed_grant() -> TokenGrant {
	TokenGrant::dual("new", 3_600, "r2", 7_200)
}
