//! Authenticated request decorator over any [`HttpTransport`].
//!
//! [`AuthenticatedClient::send`] signs a copy of every request with the stored access
//! token, sends it, and treats `401 Unauthorized` as an expired token. The first request
//! to see a 401 leads a refresh through [`AuthCoordinator::refresh_credentials`] and
//! persists the result. Requests that hit 401 while that refresh is running are queued;
//! once it lands they are woken in arrival order and each retries on its own, so neither
//! the leader nor any queued request waits on another's retry. When the refresh fails
//! every queued request receives the same error. Each request is retried at most once
//! after a refresh, so a second 401 surfaces as [`Error::Unauthorized`].

mod gate;
mod signing;

pub use signing::*;

// self
use crate::{
	_prelude::*,
	client::gate::{GateTicket, RefreshGate},
	coordinator::AuthCoordinator,
	http::{HttpRequest, HttpResponse, HttpTransport, ResponseMetadata},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

/// Client specialized for the crate's default reqwest transport.
#[cfg(feature = "reqwest")]
pub type ReqwestAuthenticatedClient = AuthenticatedClient<ReqwestTransport>;

/// Successful response of an authenticated request.
#[derive(Clone, Debug)]
pub struct AuthenticatedResponse {
	/// Raw response body.
	pub body: Vec<u8>,
	/// Status and headers.
	pub metadata: ResponseMetadata,
}
impl AuthenticatedResponse {
	/// Success status reported by the upstream.
	pub fn status(&self) -> StatusCode {
		self.metadata.status
	}

	/// Response headers.
	pub fn headers(&self) -> &HeaderMap {
		&self.metadata.headers
	}
}

/// HTTP client decorator that signs requests and recovers from expired access tokens.
///
/// Clones share the transport, the coordinator, and the refresh queue, so concurrent
/// requests from any clone collapse into a single refresh.
pub struct AuthenticatedClient<T>
where
	T: ?Sized + HttpTransport,
{
	transport: Arc<T>,
	coordinator: Arc<AuthCoordinator>,
	signer: Arc<dyn RequestSigner>,
	gate: Arc<Mutex<RefreshGate>>,
}
impl<T> AuthenticatedClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Wraps `transport`, signing with the default [`SigningScheme`].
	pub fn new(transport: impl Into<Arc<T>>, coordinator: impl Into<Arc<AuthCoordinator>>) -> Self {
		Self {
			transport: transport.into(),
			coordinator: coordinator.into(),
			signer: Arc::new(SigningScheme::default()),
			gate: Default::default(),
		}
	}

	/// Replaces the request signer.
	pub fn with_signer(mut self, signer: impl 'static + RequestSigner) -> Self {
		self.signer = Arc::new(signer);

		self
	}

	/// Underlying transport.
	pub fn transport(&self) -> &Arc<T> {
		&self.transport
	}

	/// Coordinator that owns the tokens.
	pub fn coordinator(&self) -> &Arc<AuthCoordinator> {
		&self.coordinator
	}

	/// Sends `request` with the current access token, refreshing it once on 401.
	///
	/// `request` itself is never modified; each attempt signs a fresh copy.
	pub async fn send(&self, request: HttpRequest) -> Result<AuthenticatedResponse> {
		const KIND: FlowKind = FlowKind::Send;

		let span = FlowSpan::new(KIND, "send");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.send_inner(request)).await;

		if let Err(e) = &result {
			obs::warn_event(KIND, "authenticated request failed", e);
		}

		obs::record_result(KIND, &result);

		result
	}

	async fn send_inner(&self, request: HttpRequest) -> Result<AuthenticatedResponse> {
		match self.attempt(&request).await? {
			Attempt::Completed(response) => Ok(response),
			Attempt::Expired { signed_with } => self.recover(request, signed_with).await,
		}
	}

	async fn attempt(&self, request: &HttpRequest) -> Result<Attempt> {
		let access_token = self.coordinator.access_token().await?;
		let signed = self.signer.sign(request, &access_token)?;
		let response = self.transport.send(signed).await?;

		classify(response, access_token)
	}

	async fn recover(
		&self,
		request: HttpRequest,
		signed_with: String,
	) -> Result<AuthenticatedResponse> {
		loop {
			match RefreshGate::enter(&self.gate) {
				GateTicket::Leader(lease) => {
					obs::debug_event(FlowKind::Send, "access token rejected, refreshing");

					let refreshed = self.refresh_and_persist(&signed_with).await;

					for pending in lease.release() {
						pending.resolve(refreshed.clone());
					}

					refreshed?;

					return self.retry_once(&request).await;
				},
				GateTicket::Follower(reply) => match reply.await {
					Ok(refreshed) => {
						refreshed?;

						return self.retry_once(&request).await;
					},
					Err(_) => obs::debug_event(FlowKind::Send, "refresh leader went away, taking over"),
				},
			}
		}
	}

	async fn refresh_and_persist(&self, signed_with: &str) -> Result<()> {
		if self.coordinator.access_token().await? != signed_with {
			obs::debug_event(FlowKind::Send, "access token already rotated, skipping refresh");

			return Ok(());
		}

		let credentials = self.coordinator.refresh_credentials().await?;

		if let Some(refresh_token) = credentials.refresh_token {
			self.coordinator.store_refresh_token(refresh_token.into_exposed()).await?;
		}

		self.coordinator.store_access_token(credentials.access_token.into_exposed()).await
	}

	async fn retry_once(&self, request: &HttpRequest) -> Result<AuthenticatedResponse> {
		match self.attempt(request).await? {
			Attempt::Completed(response) => Ok(response),
			Attempt::Expired { .. } => Err(Error::Unauthorized),
		}
	}
}
#[cfg(feature = "reqwest")]
impl AuthenticatedClient<ReqwestTransport> {
	/// Creates a client over a default [`ReqwestTransport`].
	pub fn reqwest(coordinator: impl Into<Arc<AuthCoordinator>>) -> Self {
		Self::new(ReqwestTransport::default(), coordinator)
	}
}
impl<T> Clone for AuthenticatedClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			coordinator: self.coordinator.clone(),
			signer: self.signer.clone(),
			gate: self.gate.clone(),
		}
	}
}
impl<T> Debug for AuthenticatedClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("AuthenticatedClient")
			.field("coordinator", &self.coordinator)
			.finish_non_exhaustive()
	}
}

enum Attempt {
	Completed(AuthenticatedResponse),
	Expired { signed_with: String },
}

fn classify(response: HttpResponse, signed_with: String) -> Result<Attempt> {
	let HttpResponse { status, headers, body } = response;
	let status =
		StatusCode::from_u16(status).map_err(|_| Error::TransportResponseInvalid { status })?;

	if status == StatusCode::UNAUTHORIZED {
		Ok(Attempt::Expired { signed_with })
	} else if status.is_success() {
		Ok(Attempt::Completed(AuthenticatedResponse {
			body,
			metadata: ResponseMetadata { status, headers },
		}))
	} else {
		Err(Error::UnexpectedStatus { status: status.as_u16() })
	}
}
