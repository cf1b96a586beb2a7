//! Single-flight access-token refresh layered over any HTTP transport: sign every request,
//! detect expired credentials, refresh exactly once, and retry everyone who was waiting.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod obs;
pub mod provider;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test`
	//! crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		coordinator::{AuthCoordinator, RefreshPolicy},
		provider::TokenProvider,
		store::{MemoryStore, TokenStore},
	};

	/// Builds a coordinator over a fresh [`MemoryStore`] seeded with the provided tokens.
	pub fn memory_coordinator(
		provider: Arc<dyn TokenProvider>,
		access: Option<&str>,
		refresh: Option<&str>,
		policy: RefreshPolicy,
	) -> (AuthCoordinator, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::with_tokens(access, refresh));
		let store: Arc<dyn TokenStore> = store_backend.clone();
		let coordinator = AuthCoordinator::new(provider, store).with_policy(policy);

		(coordinator, store_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::VecDeque,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use oauth2::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::Duration;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
