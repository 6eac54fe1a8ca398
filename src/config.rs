//! Authentication mode, dispatcher configuration, and notification texts.

// self
use crate::{_prelude::*, error::ConfigError};

/// Business codes treated as success when no custom set is configured.
pub const DEFAULT_SUCCESS_CODES: [i64; 2] = [0, 200];

/// Environment variable consulted by [`AuthMode::from_env`].
pub const AUTH_MODE_ENV: &str = "AUTH_MODE";

/// Credential layout used for the whole process lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
	/// One access token; expiry forces a new login.
	#[default]
	Single,
	/// Access + refresh token pair with transparent refresh.
	#[serde(alias = "double")]
	Dual,
}
impl AuthMode {
	/// Reads the mode from `AUTH_MODE`, defaulting to [`AuthMode::Single`] when unset.
	pub fn from_env() -> Result<Self, ConfigError> {
		match std::env::var(AUTH_MODE_ENV) {
			Ok(value) => value.parse(),
			Err(_) => Ok(Self::default()),
		}
	}

	/// Returns `true` for [`AuthMode::Dual`].
	pub const fn is_dual(self) -> bool {
		matches!(self, Self::Dual)
	}

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Single => "single",
			Self::Dual => "dual",
		}
	}
}
impl Display for AuthMode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for AuthMode {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"single" => Ok(Self::Single),
			"dual" | "double" => Ok(Self::Dual),
			_ => Err(ConfigError::UnknownAuthMode { value: s.to_owned() }),
		}
	}
}

/// Per-request switches recognized by the dispatcher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchOptions {
	/// Skips the global loading indicator. Defaults to `false`.
	pub hide_loading: bool,
	/// Suppresses network- and request-error notifications. Defaults to `false`.
	pub hide_error_toast: bool,
}
impl DispatchOptions {
	/// Options that hide both the loading indicator and error notifications.
	pub const fn silent() -> Self {
		Self { hide_loading: true, hide_error_toast: true }
	}
}

/// Loading indicator presentation settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadingConfig {
	/// Text rendered next to the spinner.
	pub title: String,
	/// Whether the indicator blocks touches on the underlying screen.
	pub mask: bool,
}
impl Default for LoadingConfig {
	fn default() -> Self {
		Self { title: "Loading...".into(), mask: true }
	}
}

/// User-visible notification texts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
	/// Shown when the transport produced no response.
	pub network_error: String,
	/// Fallback for failed requests without a server message.
	pub request_error: String,
	/// Shown once after a successful token refresh.
	pub token_refresh_success: String,
	/// Shown once when the refresh failed and the session ended.
	pub login_expired: String,
}
impl Default for Messages {
	fn default() -> Self {
		Self {
			network_error: "Network error, please try again later.".into(),
			request_error: "Request failed.".into(),
			token_refresh_success: "Session renewed.".into(),
			login_expired: "Login expired, please sign in again.".into(),
		}
	}
}

/// Dispatcher-wide settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
	/// Credential layout; must match the session's mode.
	pub mode: AuthMode,
	/// Header that carries the access token.
	pub auth_header: String,
	/// Scheme prefixed to the access token; empty sends the raw token.
	pub auth_scheme: String,
	/// Business codes that count as success inside a 2xx response.
	pub success_codes: Vec<i64>,
	/// Delay between a failed refresh and the login redirect, in milliseconds.
	pub login_redirect_delay_ms: u64,
	/// Notification texts.
	pub messages: Messages,
	/// Loading indicator settings.
	pub loading: LoadingConfig,
}
impl DispatcherConfig {
	const DEFAULT_LOGIN_REDIRECT_DELAY_MS: u64 = 2_000;

	/// Creates the default configuration for the provided mode.
	pub fn new(mode: AuthMode) -> Self {
		Self { mode, ..Default::default() }
	}

	/// Overrides the authorization header name and scheme.
	pub fn with_auth_header(mut self, header: impl Into<String>, scheme: impl Into<String>) -> Self {
		self.auth_header = header.into();
		self.auth_scheme = scheme.into();

		self
	}

	/// Replaces the business success codes.
	pub fn with_success_codes(mut self, codes: impl IntoIterator<Item = i64>) -> Self {
		self.success_codes = codes.into_iter().collect();

		self
	}

	/// Overrides the login redirect delay.
	pub fn with_login_redirect_delay(mut self, delay: std::time::Duration) -> Self {
		self.login_redirect_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);

		self
	}

	/// Replaces the notification texts.
	pub fn with_messages(mut self, messages: Messages) -> Self {
		self.messages = messages;

		self
	}

	/// Replaces the loading indicator settings.
	pub fn with_loading(mut self, loading: LoadingConfig) -> Self {
		self.loading = loading;

		self
	}

	/// Delay before navigating to the login entry after a failed refresh.
	pub fn login_redirect_delay(&self) -> std::time::Duration {
		std::time::Duration::from_millis(self.login_redirect_delay_ms)
	}

	/// Returns `true` when `code` is a recognized business success code.
	pub fn is_success_code(&self, code: i64) -> bool {
		self.success_codes.contains(&code)
	}

	/// Formats the authorization header value for `token`.
	pub fn authorization_value(&self, token: &str) -> String {
		if self.auth_scheme.is_empty() {
			token.to_owned()
		} else {
			format!("{} {token}", self.auth_scheme)
		}
	}
}
impl Default for DispatcherConfig {
	fn default() -> Self {
		Self {
			mode: AuthMode::default(),
			auth_header: "Authorization".into(),
			auth_scheme: "Bearer".into(),
			success_codes: DEFAULT_SUCCESS_CODES.to_vec(),
			login_redirect_delay_ms: Self::DEFAULT_LOGIN_REDIRECT_DELAY_MS,
			messages: Messages::default(),
			loading: LoadingConfig::default(),
		}
	}
}
