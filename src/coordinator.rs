//! Single-flight access-token refresh over a [`TokenProvider`] and a [`TokenStore`].
//!
//! [`AuthCoordinator::refresh_credentials`] guarantees that at most one provider call
//! sequence is outstanding per coordinator. The first caller records a refresh flight
//! synchronously, before any `.await`, and every caller that arrives while it is airborne
//! awaits the same shared outcome. Transient provider failures are retried inside the
//! flight up to [`RefreshPolicy::retry_budget`] extra times, so concurrent callers share a
//! single budget. The provider call sequence belongs to the flight rather than to the
//! caller that started it: whichever waiter is still alive keeps polling the same call,
//! and a flight abandoned by every waiter is resumed by the next caller. The flight slot
//! is cleared as soon as the provider sequence finishes, whatever the outcome, and the
//! coordinator never writes refreshed tokens back to the store: persisting them is the
//! caller's job.

mod metrics;

pub use metrics::RefreshMetrics;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use futures_util::future::{BoxFuture, FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	auth::Credentials,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::TokenProvider,
	store::TokenStore,
};

/// Retry configuration for transient provider failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshPolicy {
	/// Additional provider attempts allowed after a transient failure.
	pub retry_budget: u8,
}
impl RefreshPolicy {
	/// Budget applied when none is configured.
	pub const DEFAULT_RETRY_BUDGET: u8 = 1;

	/// Creates a policy with the provided retry budget.
	pub const fn new(retry_budget: u8) -> Self {
		Self { retry_budget }
	}

	/// Total provider calls a single refresh may make.
	pub const fn max_attempts(&self) -> u32 {
		1 + self.retry_budget as u32
	}
}
impl Default for RefreshPolicy {
	fn default() -> Self {
		Self::new(Self::DEFAULT_RETRY_BUDGET)
	}
}

/// Coordinates token reads, writes, and the shared refresh for one credential set.
pub struct AuthCoordinator {
	provider: Arc<dyn TokenProvider>,
	store: Arc<dyn TokenStore>,
	policy: RefreshPolicy,
	refresh_metrics: Arc<RefreshMetrics>,
	in_flight: Arc<Mutex<Option<RefreshFlight>>>,
	next_flight_id: AtomicU64,
}
impl AuthCoordinator {
	/// Creates a coordinator with the default [`RefreshPolicy`].
	pub fn new(provider: Arc<dyn TokenProvider>, store: Arc<dyn TokenStore>) -> Self {
		Self {
			provider,
			store,
			policy: RefreshPolicy::default(),
			refresh_metrics: Default::default(),
			in_flight: Default::default(),
			next_flight_id: AtomicU64::new(0),
		}
	}

	/// Replaces the retry policy.
	pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Active retry policy.
	pub fn policy(&self) -> RefreshPolicy {
		self.policy
	}

	/// Counters describing refresh activity so far.
	pub fn metrics(&self) -> Arc<RefreshMetrics> {
		self.refresh_metrics.clone()
	}

	/// Returns `true` while a refresh flight is recorded.
	pub fn is_refreshing(&self) -> bool {
		self.in_flight.lock().is_some()
	}

	/// Reads the current access token from the store.
	pub async fn access_token(&self) -> Result<String> {
		self.store.access_token().await.map_err(Error::from)
	}

	/// Reads the current refresh token from the store.
	pub async fn refresh_token(&self) -> Result<String> {
		self.store.refresh_token().await.map_err(Error::from)
	}

	/// Persists a new access token.
	pub async fn store_access_token(&self, token: impl Into<String>) -> Result<()> {
		self.store.set_access_token(token.into()).await.map_err(Error::from)
	}

	/// Persists a new refresh token.
	pub async fn store_refresh_token(&self, token: impl Into<String>) -> Result<()> {
		self.store.set_refresh_token(token.into()).await.map_err(Error::from)
	}

	/// Obtains a new access token through the shared refresh flight.
	///
	/// The returned token is not persisted; see [`AuthCoordinator::store_access_token`].
	pub async fn refresh_access_token(&self) -> Result<String> {
		let credentials = self.refresh_credentials().await?;

		Ok(credentials.access_token.into_exposed())
	}

	/// Joins the in-flight refresh, or starts one, and returns its credentials.
	///
	/// Every caller attached to the same flight receives a clone of the same outcome.
	/// Dropping a caller never cancels the flight for the others, including the caller
	/// that started it: the in-progress provider call is shared and any remaining waiter
	/// keeps driving it.
	pub async fn refresh_credentials(&self) -> Result<Credentials> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh_credentials");
		let (flight, joined) = self.join_or_start();

		if joined {
			self.refresh_metrics.record_join();
			obs::record_flow_outcome(KIND, FlowOutcome::Joined);
			obs::debug_event(KIND, "joining in-flight refresh");
		} else {
			self.refresh_metrics.record_attempt();
			obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		}

		let result = span.instrument(flight.outcome).await;

		obs::record_result(KIND, &result);

		result
	}

	/// Revokes the stored refresh token upstream.
	///
	/// The store is left untouched.
	pub async fn revoke_refresh_token(&self) -> Result<()> {
		const KIND: FlowKind = FlowKind::Revoke;

		let span = FlowSpan::new(KIND, "revoke_refresh_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let refresh_token = self.refresh_token().await?;

				self.provider.revoke_refresh_token(&refresh_token).await.map_err(Error::from)
			})
			.await;

		if let Err(e) = &result {
			obs::warn_event(KIND, "refresh token revocation failed", e);
		}

		obs::record_result(KIND, &result);

		result
	}

	fn join_or_start(&self) -> (RefreshFlight, bool) {
		let mut slot = self.in_flight.lock();

		if let Some(flight) = slot.as_ref() {
			return (flight.clone(), true);
		}

		let id = self.next_flight_id.fetch_add(1, Ordering::Relaxed);
		let flight = RefreshFlight { id, outcome: self.fly(id).boxed().shared() };

		*slot = Some(flight.clone());

		(flight, false)
	}

	fn fly(&self, id: u64) -> impl 'static + Send + Future<Output = Result<Credentials>> {
		let provider = self.provider.clone();
		let store = self.store.clone();
		let policy = self.policy;
		let refresh_metrics = self.refresh_metrics.clone();
		let in_flight = self.in_flight.clone();

		async move {
			let result =
				exchange_with_retries(&*provider, &*store, policy, &refresh_metrics).await;

			land(&in_flight, id);

			match &result {
				Ok(_) => refresh_metrics.record_success(),
				Err(e) => {
					refresh_metrics.record_failure();
					obs::warn_event(FlowKind::Refresh, "access token refresh failed", e);
				},
			}

			result
		}
	}
}
impl Debug for AuthCoordinator {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("AuthCoordinator")
			.field("policy", &self.policy)
			.field("refreshing", &self.is_refreshing())
			.field("refresh_metrics", &self.refresh_metrics)
			.finish_non_exhaustive()
	}
}

/// One shared refresh; every joined caller awaits the same provider call sequence.
#[derive(Clone)]
struct RefreshFlight {
	id: u64,
	outcome: Shared<BoxFuture<'static, Result<Credentials>>>,
}

fn land(in_flight: &Mutex<Option<RefreshFlight>>, id: u64) {
	let mut slot = in_flight.lock();

	if slot.as_ref().is_some_and(|flight| flight.id == id) {
		*slot = None;
	}
}

async fn exchange_with_retries(
	provider: &dyn TokenProvider,
	store: &dyn TokenStore,
	policy: RefreshPolicy,
	refresh_metrics: &RefreshMetrics,
) -> Result<Credentials> {
	let refresh_token = store.refresh_token().await?;
	let max_attempts = policy.max_attempts();
	let mut attempt = 0;

	loop {
		attempt += 1;

		refresh_metrics.record_provider_call();

		match provider.exchange_refresh_token(&refresh_token).await {
			Ok(credentials) => {
				obs::record_provider_call(None);

				return Ok(credentials);
			},
			Err(e) => {
				obs::record_provider_call(Some(e.kind()));

				if e.is_transient() && attempt < max_attempts {
					obs::debug_event(FlowKind::Refresh, "token provider unavailable, retrying");

					continue;
				}

				return Err(e.into());
			},
		}
	}
}
