//! Request signing: how an access token is attached to an outbound request.

// self
use crate::{_prelude::*, error::ConfigError, http::HttpRequest};

/// Attaches an access token to a request without mutating the caller's copy.
///
/// Implement this to plug custom schemes (query parameters, vendor headers) into
/// [`AuthenticatedClient`](crate::client::AuthenticatedClient); [`SigningScheme`] covers
/// the header-based cases.
pub trait RequestSigner
where
	Self: Send + Sync,
{
	/// Returns a signed copy of `request` carrying `access_token`.
	fn sign(&self, request: &HttpRequest, access_token: &str) -> Result<HttpRequest, ConfigError>;
}

/// Header-based signing: `<header>: [<scheme> ]<token>`.
///
/// The default writes the raw token into `Authorization`; use [`SigningScheme::bearer`]
/// for `Authorization: Bearer <token>`. Any existing value of the header is replaced and
/// the new value is marked sensitive so it stays out of debug output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningScheme {
	/// Header that carries the token.
	pub header: String,
	/// Optional prefix written before the token, separated by one space.
	pub scheme: Option<String>,
}
impl SigningScheme {
	/// Header used when none is configured.
	pub const DEFAULT_HEADER: &'static str = "authorization";

	/// `Authorization: Bearer <token>`.
	pub fn bearer() -> Self {
		Self { scheme: Some("Bearer".into()), ..Default::default() }
	}

	/// Replaces the header name.
	pub fn with_header(mut self, header: impl Into<String>) -> Self {
		self.header = header.into();

		self
	}

	/// Replaces the scheme prefix.
	pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
		self.scheme = Some(scheme.into());

		self
	}

	fn header_name(&self) -> Result<HeaderName, ConfigError> {
		HeaderName::from_bytes(self.header.as_bytes())
			.map_err(|_| ConfigError::InvalidHeaderName { name: self.header.clone() })
	}

	fn header_value(&self, access_token: &str) -> Result<HeaderValue, ConfigError> {
		let raw = match self.scheme.as_deref() {
			Some(scheme) => format!("{scheme} {access_token}"),
			None => access_token.to_owned(),
		};
		let mut value = HeaderValue::from_str(&raw)
			.map_err(|_| ConfigError::InvalidHeaderValue { header: self.header.clone() })?;

		value.set_sensitive(true);

		Ok(value)
	}
}
impl Default for SigningScheme {
	fn default() -> Self {
		Self { header: Self::DEFAULT_HEADER.into(), scheme: None }
	}
}
impl RequestSigner for SigningScheme {
	fn sign(&self, request: &HttpRequest, access_token: &str) -> Result<HttpRequest, ConfigError> {
		let name = self.header_name()?;
		let value = self.header_value(access_token)?;
		let mut signed = request.clone();

		signed.headers.insert(name, value);

		Ok(signed)
	}
}
