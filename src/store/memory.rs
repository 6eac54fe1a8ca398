//! Thread-safe in-memory [`KeyValueStore`] for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{KeyValueStore, StoreError},
};

type StoreMap = Arc<RwLock<HashMap<String, String>>>;

/// Storage backend that keeps entries in-process.
///
/// Clones share the same map, so a test can keep a handle and inspect what a session persisted.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Returns the number of stored entries.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl KeyValueStore for MemoryStore {
	fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.0.read().get(key).cloned())
	}

	fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
		self.0.write().insert(key.to_owned(), value);

		Ok(())
	}

	fn remove(&self, key: &str) -> Result<(), StoreError> {
		self.0.write().remove(key);

		Ok(())
	}
}
