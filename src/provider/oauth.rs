//! OAuth 2.0 token provider backed by the `oauth2` crate and reqwest.
//!
//! [`OAuthTokenProvider`] performs the `grant_type=refresh_token` exchange against a token
//! endpoint and RFC 7009 revocation against an optional revocation endpoint. Failures are
//! classified through a [`ProviderStrategy`]; the HTTP status and `Retry-After` hint are
//! captured by the instrumented handle below so strategies see the same signals whatever
//! shape the failure took. Token requests never follow redirects.

// crates.io
use oauth2::{
	AsyncHttpClient, AuthType, ClientId, ClientSecret, EndpointMaybeSet, EndpointNotSet,
	EndpointSet, ErrorResponseType, HttpClientError, HttpRequest as OAuthHttpRequest,
	HttpResponse as OAuthHttpResponse, RefreshToken, RequestTokenError, RevocationUrl,
	StandardErrorResponse, StandardRevocableToken, TokenResponse, TokenUrl, basic::BasicClient,
};
use reqwest::{header::RETRY_AFTER, redirect::Policy};
use time::{OffsetDateTime, format_description::well_known::Rfc2822};
// self
use crate::{
	_prelude::*,
	auth::Credentials,
	error::ConfigError,
	provider::{
		DefaultProviderStrategy, ProviderError, ProviderErrorContext, ProviderFuture,
		ProviderStrategy, TokenProvider,
	},
};

type ConfiguredClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointMaybeSet, EndpointSet>;

/// How the client authenticates against the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	/// HTTP Basic authentication with the client id and secret.
	#[default]
	ClientSecretBasic,
	/// Client id and secret sent in the form body.
	ClientSecretPost,
	/// Public client: only the client id is sent.
	Public,
}

/// Endpoints and client credentials for [`OAuthTokenProvider`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthProviderConfig {
	/// Token endpoint receiving `grant_type=refresh_token` requests.
	pub token_endpoint: Url,
	/// RFC 7009 revocation endpoint, if the provider has one.
	#[serde(default)]
	pub revocation_endpoint: Option<Url>,
	/// OAuth client identifier.
	pub client_id: String,
	/// Client secret for confidential clients.
	#[serde(default)]
	pub client_secret: Option<String>,
	/// Client authentication method.
	#[serde(default)]
	pub client_auth: ClientAuthMethod,
}
impl OAuthProviderConfig {
	/// Creates a config for a public client without a revocation endpoint.
	pub fn new(token_endpoint: Url, client_id: impl Into<String>) -> Self {
		Self {
			token_endpoint,
			revocation_endpoint: None,
			client_id: client_id.into(),
			client_secret: None,
			client_auth: ClientAuthMethod::Public,
		}
	}

	/// Sets the revocation endpoint.
	pub fn with_revocation_endpoint(mut self, endpoint: Url) -> Self {
		self.revocation_endpoint = Some(endpoint);

		self
	}

	/// Sets a client secret together with the method used to present it.
	pub fn with_client_secret(mut self, secret: impl Into<String>, method: ClientAuthMethod) -> Self {
		self.client_secret = Some(secret.into());
		self.client_auth = method;

		self
	}

	fn build_client(&self) -> Result<ConfiguredClient, ConfigError> {
		let token_url = TokenUrl::new(self.token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "token", source })?;
		let revocation_url = self
			.revocation_endpoint
			.as_ref()
			.map(|url| RevocationUrl::new(url.to_string()))
			.transpose()
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "revocation", source })?;
		let mut client = BasicClient::new(ClientId::new(self.client_id.clone()))
			.set_token_uri(token_url)
			.set_revocation_url_option(revocation_url);

		let secret = if matches!(self.client_auth, ClientAuthMethod::Public) {
			None
		} else {
			self.client_secret.as_deref()
		};

		if let Some(secret) = secret {
			client = client.set_client_secret(ClientSecret::new(secret.to_owned()));
		}
		if matches!(self.client_auth, ClientAuthMethod::ClientSecretPost | ClientAuthMethod::Public) {
			client = client.set_auth_type(AuthType::RequestBody);
		}

		Ok(client)
	}
}

/// [`TokenProvider`] speaking OAuth 2.0 over reqwest.
#[derive(Clone)]
pub struct OAuthTokenProvider {
	oauth_client: ConfiguredClient,
	http_client: ReqwestClient,
	strategy: Arc<dyn ProviderStrategy>,
}
impl OAuthTokenProvider {
	/// Creates a provider with its own redirect-free reqwest client.
	pub fn new(config: &OAuthProviderConfig) -> Result<Self, ConfigError> {
		let http_client = ReqwestClient::builder().redirect(Policy::none()).build()?;

		Self::with_client(config, http_client)
	}

	/// Creates a provider over an existing reqwest client.
	///
	/// Configure the client not to follow redirects; token endpoints answer directly.
	pub fn with_client(
		config: &OAuthProviderConfig,
		http_client: ReqwestClient,
	) -> Result<Self, ConfigError> {
		Ok(Self {
			oauth_client: config.build_client()?,
			http_client,
			strategy: Arc::new(DefaultProviderStrategy),
		})
	}

	/// Replaces the error classification strategy.
	pub fn with_strategy(mut self, strategy: Arc<dyn ProviderStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	fn handle(&self, slot: ExchangeMetadataSlot) -> ExchangeHandle {
		ExchangeHandle(Arc::new(ExchangeHttpClient { client: self.http_client.clone(), slot }))
	}
}
impl TokenProvider for OAuthTokenProvider {
	fn exchange_refresh_token<'a>(
		&'a self,
		refresh_token: &'a str,
	) -> ProviderFuture<'a, Credentials> {
		let slot = ExchangeMetadataSlot::default();

		Box::pin(async move {
			let handle = self.handle(slot.clone());
			let refresh_secret = RefreshToken::new(refresh_token.to_owned());
			let response = self
				.oauth_client
				.exchange_refresh_token(&refresh_secret)
				.request_async(&handle)
				.await
				.map_err(|e| map_request_error(self.strategy.as_ref(), slot.take(), e))?;
			let mut credentials = Credentials::new(response.access_token().secret().to_owned());

			if let Some(rotated) = response.refresh_token() {
				credentials = credentials.with_refresh_token(rotated.secret().to_owned());
			}

			Ok(credentials)
		})
	}

	fn revoke_refresh_token<'a>(&'a self, refresh_token: &'a str) -> ProviderFuture<'a, ()> {
		let slot = ExchangeMetadataSlot::default();

		Box::pin(async move {
			let handle = self.handle(slot.clone());
			let token = StandardRevocableToken::RefreshToken(RefreshToken::new(refresh_token.to_owned()));
			let request = self.oauth_client.revoke_token(token).map_err(|e| ProviderError::Unknown {
				message: format!("token revocation is not configured: {e}"),
			})?;

			request
				.request_async(&handle)
				.await
				.map_err(|e| map_request_error(self.strategy.as_ref(), slot.take(), e))
		})
	}
}
impl Debug for OAuthTokenProvider {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("OAuthTokenProvider").finish_non_exhaustive()
	}
}

/// Status and retry hint of the latest token endpoint response.
#[derive(Clone, Copy, Debug, Default)]
struct ExchangeMetadata {
	status: Option<u16>,
	retry_after: Option<Duration>,
}

#[derive(Clone, Debug, Default)]
struct ExchangeMetadataSlot(Arc<Mutex<Option<ExchangeMetadata>>>);
impl ExchangeMetadataSlot {
	fn store(&self, meta: ExchangeMetadata) {
		*self.0.lock() = Some(meta);
	}

	fn take(&self) -> ExchangeMetadata {
		self.0.lock().take().unwrap_or_default()
	}
}

struct ExchangeHttpClient {
	client: ReqwestClient,
	slot: ExchangeMetadataSlot,
}

/// [`AsyncHttpClient`] that records response metadata before handing the body to `oauth2`.
#[derive(Clone)]
struct ExchangeHandle(Arc<ExchangeHttpClient>);
impl<'c> AsyncHttpClient<'c> for ExchangeHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<OAuthHttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: OAuthHttpRequest) -> Self::Future {
		let inner = Arc::clone(&self.0);

		Box::pin(async move {
			inner.slot.take();

			let response = inner
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let retry_after = parse_retry_after(&headers);

			inner.slot.store(ExchangeMetadata { status: Some(status.as_u16()), retry_after });

			let mut converted =
				OAuthHttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*converted.status_mut() = status;
			*converted.headers_mut() = headers;

			Ok(converted)
		})
	}
}

fn map_request_error<T>(
	strategy: &dyn ProviderStrategy,
	meta: ExchangeMetadata,
	err: RequestTokenError<HttpClientError<ReqwestError>, StandardErrorResponse<T>>,
) -> ProviderError
where
	T: 'static + ErrorResponseType + Display,
{
	let mut ctx = ProviderErrorContext::new();

	if let Some(status) = meta.status {
		ctx = ctx.with_http_status(status);
	}

	match err {
		RequestTokenError::ServerResponse(response) => {
			if let Some(code) = error_code(response.error()) {
				ctx = ctx.with_oauth_error(code);
			}
			if let Some(description) = response.error_description() {
				ctx = ctx.with_error_description(description.clone());
			}
		},
		RequestTokenError::Request(HttpClientError::Http(e)) =>
			return ProviderError::Unknown {
				message: format!("token request could not be built: {e}"),
			},
		RequestTokenError::Request(e) => {
			ctx = ctx.with_network_error(true).with_body_preview(e.to_string());
		},
		RequestTokenError::Parse(_, body) => {
			ctx = ctx.with_body_preview(String::from_utf8_lossy(&body).into_owned());
		},
		RequestTokenError::Other(message) => {
			ctx = ctx.with_body_preview(message);
		},
	}

	let kind = strategy.classify_token_error(&ctx);

	ProviderError::from_kind(kind, meta.retry_after, ctx.summary())
}

fn error_code<T>(error: &T) -> Option<String>
where
	T: ErrorResponseType,
{
	serde_json::to_value(error).ok()?.as_str().map(str::to_owned)
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(secs.into()));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
