// std
use std::{
	env, fs,
	path::PathBuf,
	time::{SystemTime, UNIX_EPOCH},
};
// crates.io
use time::macros;
// self
use session_dispatch::{
	_preludet::*,
	auth::{Session, TokenGrant},
	clock::ManualClock,
	config::AuthMode,
	store::{ACCESS_EXPIRY_KEY, FileStore, KeyValueStore, REFRESH_EXPIRY_KEY, TOKEN_KEY},
};

fn scratch_path(name: &str) -> PathBuf {
	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System clock should be after the epoch.")
		.as_nanos();

	env::temp_dir().join(format!("session-dispatch-{name}-{nanos}")).join("session.json")
}

fn clock() -> Arc<ManualClock> {
	Arc::new(ManualClock::new(macros::datetime!(2025-06-01 08:00 UTC)))
}

#[test]
fn dual_session_survives_restart_through_file_store() {
	let path = scratch_path("restart");
	let clock = clock();
	let store = FileStore::open(&path).expect("Store should open.");
	let session = Session::new(AuthMode::Dual, clock.clone(), Arc::new(store));

	session
		.set_credentials(TokenGrant::dual("access-1", 600, "refresh-1", 86_400))
		.expect("Dual grant should be accepted.");

	drop(session);

	let reopened = FileStore::open(&path).expect("Store should reopen.");

	for key in [ACCESS_EXPIRY_KEY, REFRESH_EXPIRY_KEY, TOKEN_KEY] {
		assert!(reopened.get(key).expect("Read should succeed.").is_some(), "{key} should persist.");
	}

	let restored = Session::restore(AuthMode::Dual, clock.clone(), Arc::new(reopened))
		.expect("Persisted state should restore.");

	assert!(restored.has_valid_login());
	assert_eq!(restored.valid_access_token(), "access-1");
	assert_eq!(restored.refresh_token().as_deref(), Some("refresh-1"));

	clock.advance(Duration::seconds(600));

	assert!(!restored.refresh_now().has_valid_login());
	assert!(restored.has_stored_credentials());
	assert_eq!(restored.refresh_token().as_deref(), Some("refresh-1"));

	restored.clear();

	let cleared = FileStore::open(&path).expect("Store should reopen.");

	assert!(cleared.get(TOKEN_KEY).expect("Read should succeed.").is_none());

	if let Some(dir) = path.parent() {
		let _ = fs::remove_dir_all(dir);
	}
}

#[test]
fn restore_ignores_pairs_from_the_other_mode() {
	let path = scratch_path("mode-switch");
	let clock = clock();
	let single = Session::new(
		AuthMode::Single,
		clock.clone(),
		Arc::new(FileStore::open(&path).expect("Store should open.")),
	);

	single.set_credentials(TokenGrant::single("only-access", 600)).expect("Grant accepted.");

	let restored = Session::restore(
		AuthMode::Dual,
		clock,
		Arc::new(FileStore::open(&path).expect("Store should reopen.")),
	)
	.expect("Mismatched layouts restore as empty.");

	assert!(!restored.has_stored_credentials());
	assert!(restored.refresh_token().is_none());

	if let Some(dir) = path.parent() {
		let _ = fs::remove_dir_all(dir);
	}
}
