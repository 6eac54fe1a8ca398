//! Crate-level error types shared across the session, coordinator, and dispatcher.

// self
use crate::{_prelude::*, dispatch::Replay, http::Response};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// No HTTP response was received.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Refresh network operation failed or returned unusable data.
	#[error(transparent)]
	Refresh(#[from] RefreshError),

	/// Server rejected the credential (HTTP 401 or business code 401).
	#[error("Request was rejected as unauthorized (HTTP status {}).", .0.response().status)]
	AuthExpired(AuthFailure),
	/// Server answered with a non-success HTTP status other than 401.
	#[error("Request failed with HTTP status {status}.")]
	Http {
		/// HTTP status code.
		status: u16,
		/// Raw response returned by the transport.
		response: Response,
	},
	/// Response body does not match the requested type.
	#[error("Response body could not be decoded.")]
	Decode {
		/// Structured decoding failure, including the offending JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl Error {
	/// Returns the HTTP response attached to the error, if any.
	pub fn response(&self) -> Option<&Response> {
		match self {
			Self::AuthExpired(failure) => Some(failure.response()),
			Self::Http { response, .. } => Some(response),
			_ => None,
		}
	}
}

/// Auth failure observed by the dispatcher.
///
/// The original call is always rejected with this value. When a refresh was possible, a
/// [`Replay`] handle is attached; it resolves once the transparently replayed request settles.
#[derive(Debug)]
pub struct AuthFailure {
	response: Response,
	replay: Option<Replay>,
}
impl AuthFailure {
	pub(crate) fn new(response: Response, replay: Option<Replay>) -> Self {
		Self { response, replay }
	}

	/// Response that triggered the auth-failure classification.
	pub fn response(&self) -> &Response {
		&self.response
	}

	/// Returns `true` when the request was queued for replay.
	pub fn is_replay_scheduled(&self) -> bool {
		self.replay.is_some()
	}

	/// Consumes the failure and returns the replay handle, if one was scheduled.
	pub fn into_replay(self) -> Option<Replay> {
		self.replay
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Session and dispatcher disagree on the authentication mode.
	#[error("Session runs in {session} mode but the dispatcher is configured for {dispatcher}.")]
	ModeMismatch {
		/// Mode the session was created with.
		session: crate::config::AuthMode,
		/// Mode found in the dispatcher configuration.
		dispatcher: crate::config::AuthMode,
	},
	/// Dual-token mode received a grant without refresh fields.
	#[error("Token grant is missing a refresh token.")]
	MissingRefreshToken,
	/// Grant carries an empty access token.
	#[error("Token grant is missing an access token.")]
	MissingAccessToken,
	/// Grant carries a negative lifetime.
	#[error("The {field} value must not be negative.")]
	NegativeExpiresIn {
		/// Offending field name.
		field: &'static str,
	},
	/// Grant lifetime cannot be represented as an instant.
	#[error("The {field} value exceeds the supported range.")]
	ExpiresInOutOfRange {
		/// Offending field name.
		field: &'static str,
	},
	/// `AUTH_MODE` value is not recognized.
	#[error("Unknown authentication mode `{value}`.")]
	UnknownAuthMode {
		/// Raw value supplied by the environment or configuration.
		value: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures; no HTTP response is available.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[from] std::io::Error),
	/// Request URL could not be resolved.
	#[error("Request URL `{url}` is invalid.")]
	InvalidUrl {
		/// URL as supplied by the caller.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request body could not be encoded.
	#[error("Request body could not be encoded as JSON.")]
	Encode(#[source] serde_json::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Failures raised by the refresh network operation.
#[derive(Debug, ThisError)]
pub enum RefreshError {
	/// Single-token sessions cannot refresh.
	#[error("Token refresh is not supported in single-token mode.")]
	Unsupported,
	/// No usable refresh token is stored.
	#[error("No usable refresh token is available.")]
	MissingRefreshToken,
	/// Refresh endpoint answered with a failure status or business code.
	#[error("Refresh endpoint rejected the request: {message}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
		/// Business code, when present.
		code: Option<i64>,
		/// Server- or crate-supplied message.
		message: String,
	},
	/// Refresh endpoint returned a body that is not a token grant.
	#[error("Refresh endpoint returned a malformed token grant.")]
	Malformed {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Refresh request never produced a response.
	#[error(transparent)]
	Transport(#[from] TransportError),
}
