//! Refresh network operation.

// crates.io
use tracing::debug;
// self
use crate::{
	_prelude::*,
	auth::TokenGrant,
	config::{DEFAULT_SUCCESS_CODES, DispatchOptions},
	error::RefreshError,
	http::{RequestSpec, Transport},
};

/// Boxed future returned by [`TokenRefresher::refresh`].
pub type RefreshFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TokenGrant, RefreshError>> + 'a + Send>>;

/// Exchanges a refresh token for a new grant.
pub trait TokenRefresher
where
	Self: Send + Sync,
{
	/// Calls the refresh endpoint with `refresh_token`.
	fn refresh<'a>(&'a self, refresh_token: &'a str) -> RefreshFuture<'a>;
}

/// Refresher for single-token deployments; every call fails with
/// [`RefreshError::Unsupported`].
#[derive(Clone, Copy, Debug, Default)]
pub struct UnsupportedRefresher;
impl TokenRefresher for UnsupportedRefresher {
	fn refresh<'a>(&'a self, _: &'a str) -> RefreshFuture<'a> {
		Box::pin(async { Err(RefreshError::Unsupported) })
	}
}

/// Posts `{ "<field>": refresh_token }` to a refresh endpoint through any [`Transport`].
///
/// The request bypasses the dispatcher, so it never carries an access token, never touches the
/// loading indicator, and never re-enters auth-failure handling.
pub struct EndpointRefresher<T>
where
	T: ?Sized + Transport,
{
	transport: Arc<T>,
	url: String,
	field: String,
	success_codes: Vec<i64>,
}
impl<T> EndpointRefresher<T>
where
	T: ?Sized + Transport,
{
	/// Creates a refresher posting to `url` with the default `refresh_token` body field.
	pub fn new(transport: Arc<T>, url: impl Into<String>) -> Self {
		Self {
			transport,
			url: url.into(),
			field: "refresh_token".into(),
			success_codes: DEFAULT_SUCCESS_CODES.to_vec(),
		}
	}

	/// Overrides the JSON field carrying the refresh token.
	pub fn with_field(mut self, field: impl Into<String>) -> Self {
		self.field = field.into();

		self
	}

	/// Overrides the business codes accepted as success.
	pub fn with_success_codes(mut self, codes: impl IntoIterator<Item = i64>) -> Self {
		self.success_codes = codes.into_iter().collect();

		self
	}

	fn request(&self, refresh_token: &str) -> RequestSpec {
		let mut body = serde_json::Map::new();

		body.insert(self.field.clone(), Value::String(refresh_token.to_owned()));

		RequestSpec::post(self.url.as_str(), Value::Object(body))
			.with_options(DispatchOptions::silent())
	}
}
impl<T> TokenRefresher for EndpointRefresher<T>
where
	T: ?Sized + Transport,
{
	fn refresh<'a>(&'a self, refresh_token: &'a str) -> RefreshFuture<'a> {
		Box::pin(async move {
			if refresh_token.is_empty() {
				return Err(RefreshError::MissingRefreshToken);
			}

			let request = self.request(refresh_token);
			let response = self.transport.send(&request).await?;
			let envelope = response.envelope();

			debug!(status = response.status, code = ?envelope.code, "Refresh endpoint responded.");

			let rejected_code = envelope.code.filter(|code| !self.success_codes.contains(code));

			if !response.is_success() || rejected_code.is_some() {
				return Err(RefreshError::Rejected {
					status: response.status,
					code: envelope.code,
					message: envelope.text().unwrap_or("refresh was not accepted").to_owned(),
				});
			}

			TokenGrant::from_body(&response.body).map_err(|source| RefreshError::Malformed { source })
		})
	}
}
impl<T> Debug for EndpointRefresher<T>
where
	T: ?Sized + Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EndpointRefresher")
			.field("url", &self.url)
			.field("field", &self.field)
			.field("success_codes", &self.success_codes)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		error::TransportError,
		http::{Response, TransportFuture},
	};

	struct CannedTransport {
		response: Response,
		seen: Mutex<Vec<RequestSpec>>,
	}
	impl CannedTransport {
		fn new(status: u16, body: Value) -> Arc<Self> {
			Arc::new(Self { response: Response::new(status, body), seen: Default::default() })
		}
	}
	impl Transport for CannedTransport {
		fn send<'a>(&'a self, request: &'a RequestSpec) -> TransportFuture<'a> {
			self.seen.lock().push(request.clone());

			let response = self.response.clone();

			Box::pin(async move { Ok::<_, TransportError>(response) })
		}
	}

	#[tokio::test]
	async fn posts_refresh_token_and_parses_enveloped_grant() {
		let transport = CannedTransport::new(
			200,
			serde_json::json!({
				"code": 0,
				"data": {
					"access_token": "new",
					"expires_in": 3600,
					"refresh_token": "r2",
					"refresh_token_expires_in": 7200
				}
			}),
		);
		let refresher = EndpointRefresher::new(transport.clone(), "/auth/refresh");
		let grant = refresher.refresh("r1").await.expect("Refresh should succeed.");

		assert_eq!(grant, TokenGrant::dual("new", 3_600, "r2", 7_200));

		let seen = transport.seen.lock();

		assert_eq!(seen.len(), 1);
		assert_eq!(seen[0].body, Some(serde_json::json!({ "refresh_token": "r1" })));
		assert!(seen[0].header("Authorization").is_none());
		assert_eq!(seen[0].options, DispatchOptions::silent());
	}

	#[tokio::test]
	async fn business_rejection_maps_to_rejected() {
		let transport = CannedTransport::new(
			200,
			serde_json::json!({ "code": 4011, "msg": "refresh token revoked" }),
		);
		let refresher = EndpointRefresher::new(transport, "/auth/refresh").with_field("rt");
		let err = refresher.refresh("r1").await.expect_err("Revoked token must fail.");

		match err {
			RefreshError::Rejected { status, code, message } => {
				assert_eq!(status, 200);
				assert_eq!(code, Some(4011));
				assert_eq!(message, "refresh token revoked");
			},
			other => panic!("Unexpected error: {other:?}."),
		}
	}

	#[tokio::test]
	async fn malformed_grant_reports_path() {
		let transport =
			CannedTransport::new(200, serde_json::json!({ "data": { "access_token": "new" } }));
		let refresher = EndpointRefresher::new(transport, "/auth/refresh");
		let err = refresher.refresh("r1").await.expect_err("Missing expiry must fail.");

		assert!(matches!(err, RefreshError::Malformed { .. }));
	}

	#[tokio::test]
	async fn empty_token_short_circuits() {
		let transport = CannedTransport::new(200, Value::Null);
		let refresher = EndpointRefresher::new(transport.clone(), "/auth/refresh");

		assert!(matches!(refresher.refresh("").await, Err(RefreshError::MissingRefreshToken)));
		assert!(transport.seen.lock().is_empty());
		assert!(matches!(
			UnsupportedRefresher.refresh("r1").await,
			Err(RefreshError::Unsupported)
		));
	}
}
