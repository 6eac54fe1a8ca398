//! Walks a dual-token session through an expired access token without touching the network.
//!
//! 1. Implement [`Transport`] with an in-process handler that accepts only `Bearer fresh` and
//!    serves `/auth/refresh`.
//! 2. Reuse the same transport for an [`EndpointRefresher`] and hand both to
//!    [`Dispatcher::with_transport`].
//! 3. Fire three overlapping requests with a stale token; one refresh runs and every request is
//!    replayed with the new credentials.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use time::OffsetDateTime;
// self
use session_dispatch::{
	auth::{Session, TokenGrant},
	clock::SystemClock,
	config::{AuthMode, DispatcherConfig},
	dispatch::Dispatcher,
	error::{Error, TransportError},
	http::{RequestSpec, Response, Transport, TransportFuture},
	refresh::EndpointRefresher,
	store::MemoryStore,
	surface::{RecordingSurface, Surfaces},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let transport = Arc::new(InProcessTransport);
	let session = Arc::new(Session::new(
		AuthMode::Dual,
		Arc::new(SystemClock),
		Arc::new(MemoryStore::default()),
	));

	session.set_credentials(TokenGrant::dual("stale", 3_600, "refresh-1", 86_400))?;

	let refresher = Arc::new(EndpointRefresher::new(transport.clone(), "/auth/refresh"));
	let surface = Arc::new(RecordingSurface::default());
	let dispatcher = Dispatcher::with_transport(
		DispatcherConfig::new(AuthMode::Dual),
		session.clone(),
		transport,
		refresher,
	)?
	.with_surfaces(Surfaces::shared(surface.clone()));
	let (a, b, c) = tokio::join!(
		dispatcher.get("/orders"),
		dispatcher.get("/profile"),
		dispatcher.dispatch(RequestSpec::get("/inbox").hide_loading()),
	);

	for result in [a, b, c] {
		let Err(Error::AuthExpired(failure)) = result else {
			println!("Request was not rejected; nothing to replay.");

			continue;
		};
		let Some(replay) = failure.into_replay() else {
			continue;
		};

		match replay.outcome().await {
			Some(Ok(response)) =>
				println!("Replayed with status {}: {}.", response.status, response.body),
			Some(Err(e)) => println!("Replay failed: {e}."),
			None => println!("Replay was abandoned."),
		}
	}

	println!("Refresh episodes: {}.", dispatcher.coordinator().metrics().attempts());
	println!("Surface events: {:?}.", surface.events());
	println!("Access token now valid: {}.", !session.valid_access_token().is_empty());

	Ok(())
}

struct InProcessTransport;
impl Transport for InProcessTransport {
	fn send<'a>(&'a self, request: &'a RequestSpec) -> TransportFuture<'a> {
		Box::pin(async move {
			tokio::task::yield_now().await;

			if request.url == "/auth/refresh" {
				return Ok::<_, TransportError>(Response::new(
					200,
					serde_json::json!({
						"code": 0,
						"data": {
							"access_token": "fresh",
							"expires_in": 3600,
							"refresh_token": "refresh-2",
							"refresh_token_expires_in": 86400
						}
					}),
				));
			}

			let response = match request.header("Authorization") {
				Some("Bearer fresh") => Response::new(
					200,
					serde_json::json!({
						"code": 0,
						"data": {
							"path": request.url,
							"at": OffsetDateTime::now_utc().unix_timestamp()
						}
					}),
				),
				_ => Response::new(401, serde_json::json!({ "code": 401, "msg": "token expired" })),
			};

			Ok(response)
		})
	}
}
