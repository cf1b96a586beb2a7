//! Token provider boundary (behavior) and error classification (strategy).
//!
//! [`TokenProvider`] is the only thing the coordinator knows about the credential backend:
//! exchange a refresh token for [`Credentials`], or revoke one. Failures come back as a
//! tagged [`ProviderError`] so retry decisions never rely on inspecting error types at
//! runtime. `strategy` maps raw HTTP/OAuth signals into that taxonomy and `oauth` ships a
//! reqwest-backed OAuth 2.0 implementation.

#[cfg(feature = "reqwest")] pub mod oauth;
pub mod strategy;

#[cfg(feature = "reqwest")] pub use oauth::*;
pub use strategy::*;

// self
use crate::{_prelude::*, auth::Credentials};

/// Boxed future returned by [`TokenProvider`] operations.
pub type ProviderFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, ProviderError>> + 'a + Send>>;

/// Backend able to trade a refresh token for new credentials.
pub trait TokenProvider
where
	Self: Send + Sync,
{
	/// Exchanges `refresh_token` for a new access token (and possibly a rotated refresh
	/// token).
	fn exchange_refresh_token<'a>(&'a self, refresh_token: &'a str)
	-> ProviderFuture<'a, Credentials>;

	/// Revokes `refresh_token` upstream.
	///
	/// Providers without a revocation endpoint keep the default, which reports
	/// [`ProviderError::Unknown`].
	fn revoke_refresh_token<'a>(&'a self, refresh_token: &'a str) -> ProviderFuture<'a, ()> {
		let _ = refresh_token;

		Box::pin(async {
			Err(ProviderError::Unknown {
				message: "token revocation is not supported by this provider".into(),
			})
		})
	}
}

/// Classified failure reported by a [`TokenProvider`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ProviderError {
	/// Provider is temporarily unreachable or overloaded; safe to retry.
	#[error("Token provider is unavailable.")]
	ServerUnavailable {
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Client or refresh token is not authorized.
	#[error("Token provider reports the client is unauthorized.")]
	Unauthorized,
	/// Refresh token is invalid, expired, or already used.
	#[error("Token provider rejected the credentials.")]
	InvalidCredentials,
	/// The account behind the refresh token no longer exists.
	#[error("The user behind the refresh token was deleted.")]
	UserDeleted,
	/// The provider denied access for policy reasons.
	#[error("Token provider denied access.")]
	AccessDenied,
	/// Too many refresh attempts; the provider is rate limiting.
	#[error("Too many attempts against the token provider.")]
	TooManyAttempts,
	/// Anything the classifier could not place.
	#[error("Token provider failed: {message}.")]
	Unknown {
		/// Provider- or relay-supplied summary.
		message: String,
	},
}
impl ProviderError {
	/// Builds the error matching a classified kind.
	pub fn from_kind(kind: ProviderErrorKind, retry_after: Option<Duration>, message: String) -> Self {
		match kind {
			ProviderErrorKind::ServerUnavailable => Self::ServerUnavailable { retry_after },
			ProviderErrorKind::Unauthorized => Self::Unauthorized,
			ProviderErrorKind::InvalidCredentials => Self::InvalidCredentials,
			ProviderErrorKind::UserDeleted => Self::UserDeleted,
			ProviderErrorKind::AccessDenied => Self::AccessDenied,
			ProviderErrorKind::TooManyAttempts => Self::TooManyAttempts,
			ProviderErrorKind::Unknown => Self::Unknown { message },
		}
	}

	/// Returns the payload-free classification.
	pub fn kind(&self) -> ProviderErrorKind {
		match self {
			Self::ServerUnavailable { .. } => ProviderErrorKind::ServerUnavailable,
			Self::Unauthorized => ProviderErrorKind::Unauthorized,
			Self::InvalidCredentials => ProviderErrorKind::InvalidCredentials,
			Self::UserDeleted => ProviderErrorKind::UserDeleted,
			Self::AccessDenied => ProviderErrorKind::AccessDenied,
			Self::TooManyAttempts => ProviderErrorKind::TooManyAttempts,
			Self::Unknown { .. } => ProviderErrorKind::Unknown,
		}
	}

	/// Only [`ProviderError::ServerUnavailable`] is worth retrying.
	pub fn is_transient(&self) -> bool {
		self.kind().is_transient()
	}
}

/// Payload-free provider failure categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
	/// Temporary unavailability.
	ServerUnavailable,
	/// Client or token unauthorized.
	Unauthorized,
	/// Refresh token invalid or expired.
	InvalidCredentials,
	/// Account removed.
	UserDeleted,
	/// Access denied by policy.
	AccessDenied,
	/// Rate limited.
	TooManyAttempts,
	/// Unclassified.
	Unknown,
}
impl ProviderErrorKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ProviderErrorKind::ServerUnavailable => "server_unavailable",
			ProviderErrorKind::Unauthorized => "unauthorized",
			ProviderErrorKind::InvalidCredentials => "invalid_credentials",
			ProviderErrorKind::UserDeleted => "user_deleted",
			ProviderErrorKind::AccessDenied => "access_denied",
			ProviderErrorKind::TooManyAttempts => "too_many_attempts",
			ProviderErrorKind::Unknown => "unknown",
		}
	}

	/// Returns `true` for the single retryable category.
	pub const fn is_transient(self) -> bool {
		matches!(self, ProviderErrorKind::ServerUnavailable)
	}
}
impl Display for ProviderErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
