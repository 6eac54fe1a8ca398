//! Credential models and the session that owns them.

pub mod credential;
pub mod secret;
pub mod session;

pub use credential::*;
pub use secret::*;
pub use session::*;
