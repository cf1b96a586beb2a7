//! Provider strategy hooks that classify token endpoint failures.
//!
//! Implementations turn raw HTTP/OAuth signals into a [`ProviderErrorKind`] without tying
//! the coordinator to any particular HTTP client.

// self
use crate::{_prelude::*, provider::ProviderErrorKind};

/// Strategy hook that lets providers customise error classification.
///
/// Implementors are required to be `Send + Sync`, and the hook works on crate-owned data
/// so downstream crates never depend on reqwest-specific structures.
pub trait ProviderStrategy: Send + Sync {
	/// Maps low-level HTTP/JSON errors into the relay taxonomy for a token request.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;
}

/// Context passed to provider strategies when classifying token errors.
///
/// The struct keeps only primitive data (status codes, OAuth fields, body preview) so
/// strategies stay decoupled from any HTTP client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of the response body for non-JSON payloads.
	pub body_preview: Option<String>,
	/// Indicates whether the failure originated from the network/transport layer.
	pub network_error: bool,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates an empty context.
	pub fn new() -> Self {
		Self::default()
	}

	/// Convenience constructor for transport-level/network failures.
	pub fn network_failure() -> Self {
		Self { network_error: true, ..Self::default() }
	}

	/// Adds an HTTP status code (e.g., 400, 401, 503).
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string returned by the provider.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Marks whether the failure happened below HTTP (connect, TLS, timeout).
	pub fn with_network_error(mut self, network_error: bool) -> Self {
		self.network_error = network_error;

		self
	}

	/// Adds a body preview for providers that return non-JSON payloads.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}

	/// Best human-readable summary available in the context.
	pub fn summary(&self) -> String {
		self.error_description
			.clone()
			.or_else(|| self.oauth_error.clone())
			.or_else(|| self.body_preview.clone())
			.or_else(|| self.http_status.map(|status| format!("HTTP {status}")))
			.unwrap_or_else(|| "no detail".into())
	}
}

/// Default strategy applying OAuth and Auth0-style heuristics.
///
/// It prioritises structured OAuth fields (`error`, `error_description`), then falls back
/// to body text hints, and finally the HTTP status code. Network failures are always
/// treated as server unavailability.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl Display for DefaultProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-provider-strategy")
	}
}
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if ctx.network_error {
			return ProviderErrorKind::ServerUnavailable;
		}

		if let Some(kind) =
			classify_oauth_error(ctx.oauth_error.as_deref(), ctx.error_description.as_deref())
		{
			return kind;
		}
		if let Some(kind) = classify_body(ctx.body_preview.as_deref()) {
			return kind;
		}

		classify_status(ctx.http_status)
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ProviderErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf: String = body.chars().take(ProviderErrorContext::BODY_PREVIEW_LIMIT).collect();

	buf.push('…');

	buf
}

fn classify_oauth_error(
	oauth_error: Option<&str>,
	error_description: Option<&str>,
) -> Option<ProviderErrorKind> {
	oauth_error
		.and_then(match_exact_value)
		.or_else(|| error_description.and_then(match_exact_value))
		.or_else(|| classify_body(error_description))
}

fn match_exact_value(value: &str) -> Option<ProviderErrorKind> {
	let value = value.trim();

	if any_of(value, &["invalid_grant", "expired_token", "invalid_token"]) {
		Some(ProviderErrorKind::InvalidCredentials)
	} else if any_of(value, &["invalid_client", "unauthorized_client", "unauthorized"]) {
		Some(ProviderErrorKind::Unauthorized)
	} else if any_of(value, &["access_denied", "consent_required"]) {
		Some(ProviderErrorKind::AccessDenied)
	} else if any_of(value, &["user_deleted", "user_not_found"]) {
		Some(ProviderErrorKind::UserDeleted)
	} else if any_of(value, &["too_many_attempts", "too_many_requests", "slow_down"]) {
		Some(ProviderErrorKind::TooManyAttempts)
	} else if any_of(value, &["temporarily_unavailable", "server_error"]) {
		Some(ProviderErrorKind::ServerUnavailable)
	} else {
		None
	}
}

fn any_of(value: &str, candidates: &[&str]) -> bool {
	candidates.iter().any(|candidate| value.eq_ignore_ascii_case(candidate))
}

fn classify_body(body: Option<&str>) -> Option<ProviderErrorKind> {
	let lowered = body?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") => Some(ProviderErrorKind::InvalidCredentials),
		text if text.contains("invalid_client") || text.contains("unauthorized_client") =>
			Some(ProviderErrorKind::Unauthorized),
		text if text.contains("access_denied") => Some(ProviderErrorKind::AccessDenied),
		text if text.contains("user_deleted") || text.contains("user not found") =>
			Some(ProviderErrorKind::UserDeleted),
		text if text.contains("too_many_attempts") || text.contains("rate limit") =>
			Some(ProviderErrorKind::TooManyAttempts),
		text if text.contains("temporarily_unavailable") || text.contains("unavailable") =>
			Some(ProviderErrorKind::ServerUnavailable),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400) => ProviderErrorKind::InvalidCredentials,
		Some(401) => ProviderErrorKind::Unauthorized,
		Some(403) => ProviderErrorKind::AccessDenied,
		Some(404 | 410) => ProviderErrorKind::UserDeleted,
		Some(429) => ProviderErrorKind::TooManyAttempts,
		Some(code) if code >= 500 => ProviderErrorKind::ServerUnavailable,
		None => ProviderErrorKind::ServerUnavailable,
		Some(_) => ProviderErrorKind::Unknown,
	}
}
