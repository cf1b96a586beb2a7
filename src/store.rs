//! Storage contract and the built-in in-memory implementation for access and refresh tokens.

pub mod memory;

pub use memory::MemoryStore;

// self
use crate::_prelude::*;

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Durable storage for the current access and refresh token strings.
///
/// Reads fail with [`StoreError::Missing`] when nothing is stored; callers never cache the
/// returned values, so every read reflects the latest write.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Loads the current access token.
	fn access_token(&self) -> StoreFuture<'_, String>;

	/// Loads the current refresh token.
	fn refresh_token(&self) -> StoreFuture<'_, String>;

	/// Persists or replaces the access token.
	fn set_access_token(&self, token: String) -> StoreFuture<'_, ()>;

	/// Persists or replaces the refresh token.
	fn set_refresh_token(&self, token: String) -> StoreFuture<'_, ()>;
}

/// Which of the two stored tokens an operation concerns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
	/// Short-lived credential attached to every request.
	Access,
	/// Long-lived credential exchanged for new access tokens.
	Refresh,
}
impl TokenKind {
	/// Returns a stable label suitable for messages and span fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenKind::Access => "access",
			TokenKind::Refresh => "refresh",
		}
	}
}
impl Display for TokenKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// No token of the requested kind is stored.
	#[error("No {kind} token is stored.")]
	Missing {
		/// Token kind that was requested.
		kind: TokenKind,
	},
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
