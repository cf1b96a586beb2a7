//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

// std
use std::{
	collections::{HashSet, VecDeque},
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use parking_lot::Mutex;
// self
use bearer_relay::{
	auth::Credentials,
	coordinator::{AuthCoordinator, RefreshPolicy},
	error::TransportError,
	http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture, header},
	provider::{ProviderError, ProviderFuture, TokenProvider},
	store::MemoryStore,
	url::Url,
};

pub type Reply = Result<Credentials, ProviderError>;

/// Token provider answering from a fixed script, one reply per call.
#[derive(Default)]
pub struct ScriptedProvider {
	replies: Mutex<VecDeque<Reply>>,
	delay: Option<Duration>,
	calls: AtomicUsize,
	exchanged: Mutex<Vec<String>>,
	revoked: Mutex<Vec<String>>,
}
impl ScriptedProvider {
	pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
		Self { replies: Mutex::new(replies.into_iter().collect()), ..Default::default() }
	}

	/// Keeps every exchange pending for `delay` so concurrent callers pile up.
	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);

		self
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn exchanged(&self) -> Vec<String> {
		self.exchanged.lock().clone()
	}

	pub fn revoked(&self) -> Vec<String> {
		self.revoked.lock().clone()
	}
}
impl TokenProvider for ScriptedProvider {
	fn exchange_refresh_token<'a>(&'a self, refresh_token: &'a str) -> ProviderFuture<'a, Credentials> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.exchanged.lock().push(refresh_token.to_owned());

		let reply = self
			.replies
			.lock()
			.pop_front()
			.unwrap_or_else(|| Err(ProviderError::Unknown { message: "script exhausted".into() }));
		let delay = self.delay;

		Box::pin(async move {
			if let Some(delay) = delay {
				tokio::time::sleep(delay).await;
			}

			reply
		})
	}

	fn revoke_refresh_token<'a>(&'a self, refresh_token: &'a str) -> ProviderFuture<'a, ()> {
		self.revoked.lock().push(refresh_token.to_owned());

		Box::pin(async { Ok(()) })
	}
}

type Responder = dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync;
type Latency = dyn Fn(&HttpRequest) -> Option<Duration> + Send + Sync;

/// Transport that records every request it receives and answers through a closure.
pub struct RecordingTransport {
	responder: Box<Responder>,
	latency: Option<Box<Latency>>,
	seen: Mutex<Vec<HttpRequest>>,
}
impl RecordingTransport {
	pub fn new(
		responder: impl Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
	) -> Self {
		Self { responder: Box::new(responder), latency: None, seen: Mutex::new(Vec::new()) }
	}

	/// Holds back the answer to every request for which `latency` returns a delay.
	pub fn with_latency(
		mut self,
		latency: impl Fn(&HttpRequest) -> Option<Duration> + Send + Sync + 'static,
	) -> Self {
		self.latency = Some(Box::new(latency));

		self
	}

	/// Answers 401 to requests carrying one of `rejected` and 200 (echoing the path) otherwise.
	pub fn rejecting<const N: usize>(rejected: [&str; N]) -> Self {
		let rejected: HashSet<String> = rejected.iter().map(|token| (*token).to_owned()).collect();

		Self::new(move |request| {
			let status = match authorization(request) {
				Some(token) if rejected.contains(&token) => 401,
				_ => 200,
			};

			Ok(HttpResponse::new(status, request.url.path().as_bytes().to_vec()))
		})
	}

	/// Answers every request with `status`.
	pub fn fixed(status: u16) -> Self {
		Self::new(move |_| Ok(HttpResponse::new(status, Vec::new())))
	}

	pub fn requests(&self) -> Vec<HttpRequest> {
		self.seen.lock().clone()
	}

	/// `Authorization` header of every request, in arrival order.
	pub fn authorizations(&self) -> Vec<String> {
		self.seen.lock().iter().map(|request| authorization(request).unwrap_or_default()).collect()
	}

	pub fn sent(&self) -> usize {
		self.seen.lock().len()
	}
}
impl HttpTransport for RecordingTransport {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		let reply = (self.responder)(&request);
		let delay = self.latency.as_ref().and_then(|latency| latency(&request));

		self.seen.lock().push(request);

		Box::pin(async move {
			if let Some(delay) = delay {
				tokio::time::sleep(delay).await;
			}

			reply
		})
	}
}

pub fn authorization(request: &HttpRequest) -> Option<String> {
	request
		.headers
		.get(header::AUTHORIZATION)
		.and_then(|value| value.to_str().ok())
		.map(str::to_owned)
}

pub fn url(path: &str) -> Url {
	Url::parse("https://api.example.com/")
		.and_then(|base| base.join(path))
		.expect("Fixture URL should parse.")
}

/// Coordinator over a seeded [`MemoryStore`]; the store handle is returned for assertions.
pub fn coordinator(
	provider: Arc<ScriptedProvider>,
	access: Option<&str>,
	refresh: Option<&str>,
	policy: RefreshPolicy,
) -> (Arc<AuthCoordinator>, Arc<MemoryStore>) {
	let store = Arc::new(MemoryStore::with_tokens(access, refresh));
	let coordinator = AuthCoordinator::new(provider, store.clone()).with_policy(policy);

	(Arc::new(coordinator), store)
}
