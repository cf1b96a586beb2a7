//! Credentials minted by a token provider.

// self
use crate::{_prelude::*, auth::TokenSecret, provider::ProviderError};

/// Access token (plus an optional rotated refresh token) returned by a refresh exchange.
///
/// The value is immutable once produced. A `None` refresh token means the provider kept
/// the existing refresh token valid and only minted a new access token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
	/// Freshly minted access token.
	pub access_token: TokenSecret,
	/// Rotated refresh token, when the provider issued one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
}
impl Credentials {
	/// Creates access-only credentials.
	pub fn new(access_token: impl Into<TokenSecret>) -> Self {
		Self { access_token: access_token.into(), refresh_token: None }
	}

	/// Attaches a rotated refresh token.
	pub fn with_refresh_token(mut self, refresh_token: impl Into<TokenSecret>) -> Self {
		self.refresh_token = Some(refresh_token.into());

		self
	}

	/// Decodes an OAuth 2.0 token endpoint JSON body (`access_token`, `refresh_token`).
	///
	/// Unknown fields such as `token_type` or `expires_in` are ignored. A malformed body is
	/// reported as [`ProviderError::Unknown`] naming the offending path.
	pub fn from_token_response(body: &[u8]) -> Result<Self, ProviderError> {
		let mut de = serde_json::Deserializer::from_slice(body);

		serde_path_to_error::deserialize(&mut de).map_err(|e| ProviderError::Unknown {
			message: format!("Token response is malformed at `{}`: {}", e.path(), e.inner()),
		})
	}
}
