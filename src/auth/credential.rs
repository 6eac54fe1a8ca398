//! Credential pair variants and the token grants they are derived from.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config::AuthMode,
	error::ConfigError,
};

/// Token issued by a login or refresh endpoint.
///
/// Lifetimes are relative seconds, exactly as the server reports them.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
	/// Access token value.
	pub access_token: String,
	/// Access token lifetime in seconds.
	pub expires_in: i64,
	/// Refresh token value (dual-token servers only).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<String>,
	/// Refresh token lifetime in seconds (dual-token servers only).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token_expires_in: Option<i64>,
}
impl TokenGrant {
	/// Builds a single-token grant.
	pub fn single(access_token: impl Into<String>, expires_in: i64) -> Self {
		Self {
			access_token: access_token.into(),
			expires_in,
			refresh_token: None,
			refresh_token_expires_in: None,
		}
	}

	/// Builds a dual-token grant.
	pub fn dual(
		access_token: impl Into<String>,
		expires_in: i64,
		refresh_token: impl Into<String>,
		refresh_token_expires_in: i64,
	) -> Self {
		Self {
			access_token: access_token.into(),
			expires_in,
			refresh_token: Some(refresh_token.into()),
			refresh_token_expires_in: Some(refresh_token_expires_in),
		}
	}

	/// Parses a grant from a response body.
	///
	/// Both enveloped (`{"code":0,"data":{...}}`) and flat bodies are accepted; an object-valued
	/// `data` field wins when present.
	pub fn from_body(body: &Value) -> Result<Self, serde_path_to_error::Error<serde_json::Error>> {
		let payload = body.get("data").filter(|data| data.is_object()).unwrap_or(body);

		serde_path_to_error::deserialize(payload)
	}
}
impl Debug for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant")
			.field("access_token", &"<redacted>")
			.field("expires_in", &self.expires_in)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("refresh_token_expires_in", &self.refresh_token_expires_in)
			.finish()
	}
}

/// Token value paired with its absolute expiry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpiringToken {
	/// Token value; empty when logged out.
	pub token: TokenSecret,
	/// Absolute expiry; `None` when no expiry was ever stored.
	pub expires_at: Option<OffsetDateTime>,
}
impl ExpiringToken {
	/// Pairs a token with its expiry.
	pub fn new(token: impl Into<String>, expires_at: Option<OffsetDateTime>) -> Self {
		Self { token: TokenSecret::new(token), expires_at }
	}

	/// Returns `true` if no expiry is known or `instant` has reached it.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		match self.expires_at {
			Some(expires_at) => instant >= expires_at,
			None => true,
		}
	}
}

/// Active credential pair; the variant is fixed by the process-wide [`AuthMode`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialPair {
	/// Single-token layout.
	Single {
		/// Access token and expiry.
		access: ExpiringToken,
	},
	/// Access/refresh layout.
	Dual {
		/// Access token and expiry.
		access: ExpiringToken,
		/// Refresh token and expiry.
		refresh: ExpiringToken,
	},
}
impl CredentialPair {
	/// Empty pair for the provided mode.
	pub fn empty(mode: AuthMode) -> Self {
		match mode {
			AuthMode::Single => Self::Single { access: ExpiringToken::default() },
			AuthMode::Dual =>
				Self::Dual { access: ExpiringToken::default(), refresh: ExpiringToken::default() },
		}
	}

	/// Derives a pair from `grant`, stamping expiries relative to `now`.
	///
	/// Single mode ignores refresh fields; dual mode requires them.
	pub fn from_grant(
		mode: AuthMode,
		grant: &TokenGrant,
		now: OffsetDateTime,
	) -> Result<Self, ConfigError> {
		if grant.access_token.is_empty() {
			return Err(ConfigError::MissingAccessToken);
		}

		let access = ExpiringToken::new(
			grant.access_token.as_str(),
			Some(expiry_from(now, grant.expires_in, "expires_in")?),
		);

		match mode {
			AuthMode::Single => Ok(Self::Single { access }),
			AuthMode::Dual => {
				let (Some(refresh_token), Some(refresh_expires_in)) =
					(grant.refresh_token.as_deref(), grant.refresh_token_expires_in)
				else {
					return Err(ConfigError::MissingRefreshToken);
				};

				if refresh_token.is_empty() {
					return Err(ConfigError::MissingRefreshToken);
				}

				let refresh = ExpiringToken::new(
					refresh_token,
					Some(expiry_from(now, refresh_expires_in, "refresh_token_expires_in")?),
				);

				Ok(Self::Dual { access, refresh })
			},
		}
	}

	/// Mode this pair belongs to.
	pub fn mode(&self) -> AuthMode {
		match self {
			Self::Single { .. } => AuthMode::Single,
			Self::Dual { .. } => AuthMode::Dual,
		}
	}

	/// Access half of the pair.
	pub fn access(&self) -> &ExpiringToken {
		match self {
			Self::Single { access } | Self::Dual { access, .. } => access,
		}
	}

	/// Refresh half of the pair, for dual layouts.
	pub fn refresh(&self) -> Option<&ExpiringToken> {
		match self {
			Self::Single { .. } => None,
			Self::Dual { refresh, .. } => Some(refresh),
		}
	}
}

/// Token strings persisted under [`TOKEN_KEY`](crate::store::TOKEN_KEY).
#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct StoredTokens {
	pub(crate) access_token: TokenSecret,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub(crate) refresh_token: Option<TokenSecret>,
}

fn expiry_from(
	now: OffsetDateTime,
	expires_in: i64,
	field: &'static str,
) -> Result<OffsetDateTime, ConfigError> {
	if expires_in < 0 {
		return Err(ConfigError::NegativeExpiresIn { field });
	}

	let millis = expires_in.checked_mul(1_000).ok_or(ConfigError::ExpiresInOutOfRange { field })?;

	now.checked_add(Duration::milliseconds(millis))
		.ok_or(ConfigError::ExpiresInOutOfRange { field })
}
