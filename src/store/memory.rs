//! Thread-safe in-memory [`TokenStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{StoreError, StoreFuture, TokenKind, TokenStore},
};

#[derive(Debug, Default)]
struct Slots {
	access: Option<String>,
	refresh: Option<String>,
}

type SlotMap = Arc<RwLock<Slots>>;

/// Thread-safe storage backend that keeps tokens in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(SlotMap);
impl MemoryStore {
	/// Creates an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a store seeded with the provided tokens.
	pub fn with_tokens(access: Option<&str>, refresh: Option<&str>) -> Self {
		let slots = Slots { access: access.map(str::to_owned), refresh: refresh.map(str::to_owned) };

		Self(Arc::new(RwLock::new(slots)))
	}

	/// Returns the stored access token without going through the async contract.
	pub fn peek_access(&self) -> Option<String> {
		self.0.read().access.clone()
	}

	/// Returns the stored refresh token without going through the async contract.
	pub fn peek_refresh(&self) -> Option<String> {
		self.0.read().refresh.clone()
	}

	/// Overwrites the access token without going through the async contract.
	pub fn replace_access(&self, token: impl Into<String>) {
		Self::save_now(&self.0, TokenKind::Access, token.into());
	}

	/// Removes both tokens.
	pub fn clear(&self) {
		*self.0.write() = Slots::default();
	}

	fn load_now(map: &SlotMap, kind: TokenKind) -> Result<String, StoreError> {
		let guard = map.read();
		let slot = match kind {
			TokenKind::Access => &guard.access,
			TokenKind::Refresh => &guard.refresh,
		};

		slot.clone().ok_or(StoreError::Missing { kind })
	}

	fn save_now(map: &SlotMap, kind: TokenKind, token: String) {
		let mut guard = map.write();

		match kind {
			TokenKind::Access => guard.access = Some(token),
			TokenKind::Refresh => guard.refresh = Some(token),
		}
	}
}
impl TokenStore for MemoryStore {
	fn access_token(&self) -> StoreFuture<'_, String> {
		Box::pin(async move { Self::load_now(&self.0, TokenKind::Access) })
	}

	fn refresh_token(&self) -> StoreFuture<'_, String> {
		Box::pin(async move { Self::load_now(&self.0, TokenKind::Refresh) })
	}

	fn set_access_token(&self, token: String) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			Self::save_now(&self.0, TokenKind::Access, token);

			Ok(())
		})
	}

	fn set_refresh_token(&self, token: String) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			Self::save_now(&self.0, TokenKind::Refresh, token);

			Ok(())
		})
	}
}
