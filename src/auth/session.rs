//! Credential state: the active pair, its expiry predicates, and its persistence.

// crates.io
use tracing::{debug, warn};
// self
use crate::{
	_prelude::*,
	auth::{CredentialPair, ExpiringToken, StoredTokens, TokenGrant},
	clock::Clock,
	config::AuthMode,
	store::{
		ACCESS_EXPIRY_KEY, KeyValueStore, REFRESH_EXPIRY_KEY, StoreError, TOKEN_KEY,
	},
};

/// Process-wide credential state.
///
/// `Session` is the only writer of the [`CredentialPair`]: [`Session::set_credentials`] swaps it
/// wholesale and [`Session::clear`] resets it. Every predicate samples the injected [`Clock`] so
/// judgments never rely on a cached instant.
pub struct Session {
	mode: AuthMode,
	clock: Arc<dyn Clock>,
	store: Arc<dyn KeyValueStore>,
	pair: RwLock<CredentialPair>,
	observed_at: Mutex<OffsetDateTime>,
}
impl Session {
	/// Creates an empty session.
	pub fn new(mode: AuthMode, clock: Arc<dyn Clock>, store: Arc<dyn KeyValueStore>) -> Self {
		let observed_at = clock.now();

		Self {
			mode,
			clock,
			store,
			pair: RwLock::new(CredentialPair::empty(mode)),
			observed_at: Mutex::new(observed_at),
		}
	}

	/// Restores a session from persisted state.
	///
	/// A persisted pair whose layout does not match `mode` is ignored and the session starts
	/// empty.
	pub fn restore(
		mode: AuthMode,
		clock: Arc<dyn Clock>,
		store: Arc<dyn KeyValueStore>,
	) -> Result<Self> {
		let session = Self::new(mode, clock, store);
		let Some(raw) = session.store.get(TOKEN_KEY)? else {
			return Ok(session);
		};
		let stored: StoredTokens =
			serde_json::from_str(&raw).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse persisted tokens: {e}"),
			})?;
		let access = ExpiringToken {
			token: stored.access_token,
			expires_at: session.read_instant(ACCESS_EXPIRY_KEY)?,
		};
		let pair = match (mode, stored.refresh_token) {
			(AuthMode::Single, None) => CredentialPair::Single { access },
			(AuthMode::Dual, Some(token)) => CredentialPair::Dual {
				access,
				refresh: ExpiringToken {
					token,
					expires_at: session.read_instant(REFRESH_EXPIRY_KEY)?,
				},
			},
			_ => {
				warn!(mode = mode.as_str(), "Persisted credentials do not match the active mode.");

				return Ok(session);
			},
		};

		*session.pair.write() = pair;

		debug!(mode = mode.as_str(), "Restored persisted credentials.");

		Ok(session)
	}

	/// Authentication mode this session was created with.
	pub fn mode(&self) -> AuthMode {
		self.mode
	}

	/// Resamples the clock and returns `self` for refresh-then-judge chains.
	pub fn refresh_now(&self) -> &Self {
		self.sample();

		self
	}

	/// Instant recorded by the most recent clock sample.
	pub fn observed_at(&self) -> OffsetDateTime {
		*self.observed_at.lock()
	}

	/// Snapshot of the active pair.
	pub fn credentials(&self) -> CredentialPair {
		self.pair.read().clone()
	}

	/// Replaces the active pair with one derived from `grant` and persists it.
	///
	/// The write lock is held across persistence and swap, so readers observe either the old or
	/// the new pair, never a mix.
	pub fn set_credentials(&self, grant: TokenGrant) -> Result<()> {
		let now = self.sample();
		let pair = CredentialPair::from_grant(self.mode, &grant, now)?;
		let mut slot = self.pair.write();

		self.persist(&pair)?;

		*slot = pair;

		debug!(mode = self.mode.as_str(), "Stored new credentials.");

		Ok(())
	}

	/// Returns `true` if no access expiry is stored or it has been reached.
	pub fn is_access_expired(&self) -> bool {
		let now = self.sample();

		self.pair.read().access().is_expired_at(now)
	}

	/// Returns `true` in single mode, or when the refresh expiry is missing or reached.
	pub fn is_refresh_expired(&self) -> bool {
		let now = self.sample();

		match self.pair.read().refresh() {
			Some(refresh) => refresh.is_expired_at(now),
			None => true,
		}
	}

	/// Access token if it is unexpired and well-formed for the mode, else an empty string.
	pub fn valid_access_token(&self) -> String {
		let now = self.sample();
		let pair = self.pair.read();
		let access = pair.access();

		if pair.mode() != self.mode || access.token.is_empty() || access.is_expired_at(now) {
			return String::new();
		}

		access.token.expose().to_owned()
	}

	/// Returns `true` iff a non-empty access token is stored, regardless of expiry.
	pub fn has_stored_credentials(&self) -> bool {
		let pair = self.pair.read();

		pair.mode() == self.mode && !pair.access().token.is_empty()
	}

	/// Returns `true` when credentials are stored and the access token is unexpired.
	pub fn has_valid_login(&self) -> bool {
		self.has_stored_credentials() && !self.is_access_expired()
	}

	/// Refresh token when present and unexpired; always `None` in single mode.
	pub fn refresh_token(&self) -> Option<String> {
		let now = self.sample();
		let pair = self.pair.read();
		let refresh = pair.refresh()?;

		if refresh.token.is_empty() || refresh.is_expired_at(now) {
			return None;
		}

		Some(refresh.token.expose().to_owned())
	}

	/// Resets to the empty pair and removes persisted entries.
	///
	/// Storage failures are logged and otherwise ignored; the in-memory pair is always reset.
	pub fn clear(&self) {
		self.sample();

		let mut slot = self.pair.write();

		*slot = CredentialPair::empty(self.mode);

		for key in [ACCESS_EXPIRY_KEY, REFRESH_EXPIRY_KEY, TOKEN_KEY] {
			if let Err(e) = self.store.remove(key) {
				warn!(key, error = %e, "Failed to remove persisted session entry.");
			}
		}

		debug!(mode = self.mode.as_str(), "Cleared credentials.");
	}

	fn sample(&self) -> OffsetDateTime {
		let now = self.clock.now();

		*self.observed_at.lock() = now;

		now
	}

	fn persist(&self, pair: &CredentialPair) -> Result<(), StoreError> {
		self.write_instant(ACCESS_EXPIRY_KEY, pair.access().expires_at)?;

		match pair.refresh() {
			Some(refresh) => self.write_instant(REFRESH_EXPIRY_KEY, refresh.expires_at)?,
			None => self.store.remove(REFRESH_EXPIRY_KEY)?,
		}

		let stored = StoredTokens {
			access_token: pair.access().token.clone(),
			refresh_token: pair.refresh().map(|refresh| refresh.token.clone()),
		};
		let encoded = serde_json::to_string(&stored).map_err(|e| StoreError::Serialization {
			message: format!("Failed to encode tokens: {e}"),
		})?;

		self.store.set(TOKEN_KEY, encoded)
	}

	fn write_instant(&self, key: &str, instant: Option<OffsetDateTime>) -> Result<(), StoreError> {
		match instant {
			Some(instant) => self.store.set(key, unix_millis(instant).to_string()),
			None => self.store.remove(key),
		}
	}

	fn read_instant(&self, key: &str) -> Result<Option<OffsetDateTime>, StoreError> {
		let Some(raw) = self.store.get(key)? else {
			return Ok(None);
		};
		let millis = raw.trim().parse::<i64>().map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse `{key}` as unix milliseconds: {e}"),
		})?;

		OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
			.map(Some)
			.map_err(|e| StoreError::Serialization {
				message: format!("Stored `{key}` is out of range: {e}"),
			})
	}
}
impl Debug for Session {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session")
			.field("mode", &self.mode)
			.field("credentials", &*self.pair.read())
			.field("observed_at", &self.observed_at())
			.finish()
	}
}

fn unix_millis(instant: OffsetDateTime) -> i64 {
	i64::try_from(instant.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{clock::ManualClock, store::MemoryStore};

	const START: OffsetDateTime = macros::datetime!(2025-01-01 00:00 UTC);

	fn session(mode: AuthMode) -> (Session, Arc<ManualClock>, MemoryStore) {
		let clock = Arc::new(ManualClock::new(START));
		let store = MemoryStore::default();
		let session = Session::new(mode, clock.clone(), Arc::new(store.clone()));

		(session, clock, store)
	}

	#[test]
	fn empty_session_is_expired_and_anonymous() {
		let (session, _, _) = session(AuthMode::Dual);

		assert!(session.is_access_expired());
		assert!(session.is_refresh_expired());
		assert!(!session.has_stored_credentials());
		assert!(session.valid_access_token().is_empty());
		assert!(session.refresh_token().is_none());
	}

	#[test]
	fn set_credentials_persists_expiry_millis() {
		let (session, _, store) = session(AuthMode::Dual);

		session
			.set_credentials(TokenGrant::dual("access", 3_600, "refresh", 7_200))
			.expect("Dual grant should be accepted.");

		let start_ms = unix_millis(START);

		assert_eq!(
			store.get(ACCESS_EXPIRY_KEY).expect("Read should succeed."),
			Some((start_ms + 3_600_000).to_string())
		);
		assert_eq!(
			store.get(REFRESH_EXPIRY_KEY).expect("Read should succeed."),
			Some((start_ms + 7_200_000).to_string())
		);
		assert_eq!(session.valid_access_token(), "access");
		assert_eq!(session.refresh_token().as_deref(), Some("refresh"));
	}

	#[test]
	fn predicates_follow_the_clock() {
		let (session, clock, _) = session(AuthMode::Dual);

		session
			.set_credentials(TokenGrant::dual("access", 60, "refresh", 120))
			.expect("Dual grant should be accepted.");

		assert!(session.has_valid_login());

		clock.advance(Duration::seconds(60));

		assert!(session.is_access_expired());
		assert!(session.has_stored_credentials());
		assert!(!session.refresh_now().has_valid_login());
		assert_eq!(session.observed_at(), START + Duration::seconds(60));
		assert!(session.valid_access_token().is_empty());
		assert!(!session.is_refresh_expired());

		clock.advance(Duration::seconds(60));

		assert!(session.is_refresh_expired());
		assert!(session.refresh_token().is_none());
	}

	#[test]
	fn single_mode_never_offers_refresh() {
		let (session, _, store) = session(AuthMode::Single);

		session
			.set_credentials(TokenGrant::dual("access", 60, "refresh", 120))
			.expect("Single mode should accept and trim the grant.");

		assert!(session.is_refresh_expired());
		assert!(session.refresh_token().is_none());
		assert_eq!(store.get(REFRESH_EXPIRY_KEY).expect("Read should succeed."), None);
	}

	#[test]
	fn clear_resets_pair_and_storage() {
		let (session, _, store) = session(AuthMode::Dual);

		session
			.set_credentials(TokenGrant::dual("access", 60, "refresh", 120))
			.expect("Dual grant should be accepted.");
		session.clear();

		assert_eq!(session.credentials(), CredentialPair::empty(AuthMode::Dual));
		assert!(store.is_empty());
	}

	#[test]
	fn rejected_grant_keeps_previous_pair() {
		let (session, _, _) = session(AuthMode::Dual);

		session
			.set_credentials(TokenGrant::dual("access", 60, "refresh", 120))
			.expect("Dual grant should be accepted.");

		let err = session
			.set_credentials(TokenGrant::single("partial", 60))
			.expect_err("Dual mode must reject grants without refresh fields.");

		assert!(matches!(err, Error::Config(_)));
		assert_eq!(session.valid_access_token(), "access");
	}

	#[test]
	fn restore_round_trips_persisted_state() {
		let (session, clock, store) = session(AuthMode::Dual);

		session
			.set_credentials(TokenGrant::dual("access", 60, "refresh", 120))
			.expect("Dual grant should be accepted.");

		let restored = Session::restore(AuthMode::Dual, clock.clone(), Arc::new(store.clone()))
			.expect("Persisted state should restore.");

		assert_eq!(restored.credentials(), session.credentials());

		let mismatched = Session::restore(AuthMode::Single, clock, Arc::new(store))
			.expect("Mismatched state should restore as empty.");

		assert!(!mismatched.has_stored_credentials());
	}

	#[test]
	fn debug_output_redacts_tokens() {
		let (session, _, _) = session(AuthMode::Single);

		session
			.set_credentials(TokenGrant::single("very-secret", 60))
			.expect("Single grant should be accepted.");

		assert!(!format!("{session:?}").contains("very-secret"));
	}
}
