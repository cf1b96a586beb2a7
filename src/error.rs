//! Relay-level error types shared across the client, coordinator, providers, and stores.
//!
//! Every variant is `Clone` so a single refresh failure can be handed to each request that
//! was waiting on it.

// self
use crate::{
	_prelude::*,
	provider::{ProviderError, ProviderErrorKind},
	store::{StoreError, TokenKind},
};

/// Relay-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Canonical relay error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// The token store holds no token of the requested kind.
	#[error("No {0} token is stored.")]
	TokenMissing(TokenKind),
	/// The token store failed to persist or load a token.
	#[error("Token store operation failed.")]
	Persistence(#[source] StoreError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeouts).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The upstream answered with a status that is neither success nor 401.
	#[error("Upstream returned unexpected HTTP status {status}.")]
	UnexpectedStatus {
		/// HTTP status code reported by the transport.
		status: u16,
	},
	/// The transport produced a response without a classifiable HTTP status.
	#[error("Transport response carries no valid HTTP status (got {status}).")]
	TransportResponseInvalid {
		/// Raw status value reported by the transport.
		status: u16,
	},
	/// The token provider is temporarily unavailable and the retry budget is spent.
	#[error("Token provider is temporarily unavailable.")]
	ProviderTransient {
		/// Retry-After hint from the provider, if supplied.
		retry_after: Option<Duration>,
	},
	/// The token provider rejected the refresh; retrying cannot help.
	#[error("Token provider rejected the refresh: {kind}.")]
	ProviderFatal {
		/// Classified rejection reason.
		kind: ProviderErrorKind,
		/// Provider-supplied detail, when available.
		message: Option<String>,
	},
	/// The upstream still answered 401 after a completed refresh.
	#[error("Request remained unauthorized after refreshing the access token.")]
	Unauthorized,
}
impl Error {
	/// Returns `true` when the failure came from a temporarily unavailable provider.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::ProviderTransient { .. })
	}

	/// Returns the classified provider failure kind, if the error came from the provider.
	pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
		match self {
			Self::ProviderTransient { .. } => Some(ProviderErrorKind::ServerUnavailable),
			Self::ProviderFatal { kind, .. } => Some(*kind),
			_ => None,
		}
	}
}
impl From<StoreError> for Error {
	fn from(e: StoreError) -> Self {
		match e {
			StoreError::Missing { kind } => Self::TokenMissing(kind),
			other => Self::Persistence(other),
		}
	}
}
impl From<ProviderError> for Error {
	fn from(e: ProviderError) -> Self {
		match e {
			ProviderError::ServerUnavailable { retry_after } => Self::ProviderTransient { retry_after },
			ProviderError::Unknown { message } =>
				Self::ProviderFatal { kind: ProviderErrorKind::Unknown, message: Some(message) },
			other => Self::ProviderFatal { kind: other.kind(), message: None },
		}
	}
}

/// Configuration and validation failures raised by the relay.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
	/// An outbound HTTP request could not be assembled.
	#[error("HTTP request could not be built: {message}.")]
	HttpRequest {
		/// Builder failure summary.
		message: String,
	},
	/// A configured endpoint cannot be parsed.
	#[error("Endpoint `{endpoint}` is invalid.")]
	InvalidEndpoint {
		/// Which endpoint failed to parse.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// The signing header name is not a valid HTTP header name.
	#[error("`{name}` is not a valid HTTP header name.")]
	InvalidHeaderName {
		/// Rejected header name.
		name: String,
	},
	/// The access token cannot be carried in an HTTP header value.
	#[error("Access token cannot be encoded into the `{header}` header.")]
	InvalidHeaderValue {
		/// Header the token was destined for.
		header: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
impl From<oauth2::http::Error> for ConfigError {
	fn from(e: oauth2::http::Error) -> Self {
		Self::HttpRequest { message: e.to_string() }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// The request did not complete within the transport's deadline.
	#[error("Request timed out.")]
	Timeout,
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Arc::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::Timeout } else { Self::network(e) }
	}
}
