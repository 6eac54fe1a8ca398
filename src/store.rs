//! Key-value persistence contract and built-in stores for session state.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::_prelude::*;

/// Key holding the access token expiry as unix milliseconds.
pub const ACCESS_EXPIRY_KEY: &str = "accessTokenExpireTime";
/// Key holding the refresh token expiry as unix milliseconds.
pub const REFRESH_EXPIRY_KEY: &str = "refreshTokenExpireTime";
/// Key holding the JSON-encoded token strings.
pub const TOKEN_KEY: &str = "token";

/// Synchronous key-value persistence used by [`Session`](crate::auth::Session).
pub trait KeyValueStore
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`.
	fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

	/// Stores or replaces the value under `key`.
	fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

	/// Removes `key`; removing a missing key is not an error.
	fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Error type produced by [`KeyValueStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
