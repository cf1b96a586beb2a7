mod common;

// std
use std::{
	sync::Arc,
	time::{Duration, Instant},
};
// self
use bearer_relay::{
	auth::Credentials,
	client::{AuthenticatedClient, SigningScheme},
	coordinator::RefreshPolicy,
	error::{Error, TransportError},
	http::{HeaderValue, HttpRequest, HttpResponse, header},
	provider::{ProviderError, ProviderErrorKind},
	store::TokenKind,
};
use common::{RecordingTransport, ScriptedProvider, coordinator, url};

#[tokio::test]
async fn valid_token_is_sent_without_refresh() -> color_eyre::Result<()> {
	let provider = Arc::new(ScriptedProvider::default());
	let transport = Arc::new(RecordingTransport::rejecting([]));
	let (coordinator, _) =
		coordinator(provider.clone(), Some("tokA"), Some("tokR"), RefreshPolicy::default());
	let client = AuthenticatedClient::<RecordingTransport>::new(transport.clone(), coordinator);
	let response = client.send(HttpRequest::get(url("profile"))).await?;

	assert!(response.status().is_success());
	assert_eq!(response.body, b"/profile");
	assert_eq!(transport.authorizations(), ["tokA"]);
	assert_eq!(provider.calls(), 0);

	Ok(())
}

#[tokio::test]
async fn expired_token_is_refreshed_persisted_and_retried() -> color_eyre::Result<()> {
	let provider = Arc::new(ScriptedProvider::new([Ok(Credentials::new("tokB"))]));
	let transport = Arc::new(RecordingTransport::rejecting(["expired"]));
	let (coordinator, store) =
		coordinator(provider.clone(), Some("expired"), Some("tokR"), RefreshPolicy::default());
	let client = AuthenticatedClient::<RecordingTransport>::new(transport.clone(), coordinator);
	let response = client.send(HttpRequest::get(url("profile"))).await?;

	assert_eq!(response.status().as_u16(), 200);
	assert_eq!(store.peek_access().as_deref(), Some("tokB"));
	assert_eq!(store.peek_refresh().as_deref(), Some("tokR"));
	assert_eq!(provider.calls(), 1);
	assert_eq!(provider.exchanged(), ["tokR"]);
	assert_eq!(transport.authorizations(), ["expired", "tokB"]);

	Ok(())
}

#[tokio::test]
async fn missing_access_token_never_reaches_transport() {
	let provider = Arc::new(ScriptedProvider::default());
	let transport = Arc::new(RecordingTransport::rejecting([]));
	let (coordinator, _) = coordinator(provider.clone(), None, Some("tokR"), RefreshPolicy::default());
	let client = AuthenticatedClient::<RecordingTransport>::new(transport.clone(), coordinator);
	let err = client
		.send(HttpRequest::get(url("profile")))
		.await
		.expect_err("Missing access token should fail the request.");

	assert!(matches!(err, Error::TokenMissing(TokenKind::Access)));
	assert_eq!(transport.sent(), 0);
	assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn fatal_refresh_fails_every_waiter_and_keeps_store() {
	let provider = Arc::new(
		ScriptedProvider::new([Err(ProviderError::Unauthorized)])
			.with_delay(Duration::from_millis(50)),
	);
	let transport = Arc::new(RecordingTransport::rejecting(["tokA"]));
	let (coordinator, store) =
		coordinator(provider.clone(), Some("tokA"), Some("tokR"), RefreshPolicy::new(3));
	let client = AuthenticatedClient::<RecordingTransport>::new(transport.clone(), coordinator);
	let other = client.clone();
	let (first, second, third) = tokio::join!(
		client.send(HttpRequest::get(url("a"))),
		client.send(HttpRequest::get(url("b"))),
		other.send(HttpRequest::get(url("c"))),
	);

	for result in [first, second, third] {
		assert!(matches!(
			result,
			Err(Error::ProviderFatal { kind: ProviderErrorKind::Unauthorized, .. })
		));
	}

	assert_eq!(provider.calls(), 1);
	assert_eq!(store.peek_access().as_deref(), Some("tokA"));
	assert_eq!(store.peek_refresh().as_deref(), Some("tokR"));
	// Queued requests are never retried after a failed refresh.
	assert_eq!(transport.sent(), 3);
}

#[tokio::test]
async fn concurrent_expiries_share_one_refresh() -> color_eyre::Result<()> {
	let provider = Arc::new(
		ScriptedProvider::new([Ok(Credentials::new("tokB"))]).with_delay(Duration::from_millis(50)),
	);
	let transport = Arc::new(RecordingTransport::rejecting(["tokA"]));
	let (coordinator, store) =
		coordinator(provider.clone(), Some("tokA"), Some("tokR"), RefreshPolicy::default());
	let client = AuthenticatedClient::<RecordingTransport>::new(transport.clone(), coordinator.clone());
	let requests = ["a", "b", "c", "d", "e"].map(|path| {
		let client = client.clone();

		async move { client.send(HttpRequest::get(url(path))).await }
	});
	let [a, b, c, d, e] = requests;
	let results = tokio::join!(a, b, c, d, e);

	for result in [results.0, results.1, results.2, results.3, results.4] {
		assert_eq!(result?.status().as_u16(), 200);
	}

	assert_eq!(provider.calls(), 1);
	assert_eq!(coordinator.metrics().provider_calls(), 1);
	assert_eq!(store.peek_access().as_deref(), Some("tokB"));

	let authorizations = transport.authorizations();

	assert_eq!(authorizations.iter().filter(|token| *token == "tokA").count(), 5);
	assert_eq!(authorizations.iter().filter(|token| *token == "tokB").count(), 5);

	Ok(())
}

#[tokio::test]
async fn queued_requests_are_each_retried_with_the_new_token() -> color_eyre::Result<()> {
	let provider = Arc::new(
		ScriptedProvider::new([Ok(Credentials::new("tokB"))]).with_delay(Duration::from_millis(50)),
	);
	let transport = Arc::new(RecordingTransport::rejecting(["tokA"]));
	let (coordinator, _) =
		coordinator(provider.clone(), Some("tokA"), Some("tokR"), RefreshPolicy::default());
	let client = AuthenticatedClient::<RecordingTransport>::new(transport.clone(), coordinator);
	let (first, second, third) = tokio::join!(
		client.send(HttpRequest::get(url("first"))),
		client.send(HttpRequest::get(url("second"))),
		client.send(HttpRequest::get(url("third"))),
	);

	assert_eq!(first?.body, b"/first");
	assert_eq!(second?.body, b"/second");
	assert_eq!(third?.body, b"/third");

	let requests = transport.requests();
	let rejected: Vec<_> = requests[..3].iter().map(|request| request.url.path().to_owned()).collect();
	let mut retried: Vec<_> =
		requests[3..].iter().map(|request| request.url.path().to_owned()).collect();

	retried.sort();

	assert_eq!(rejected, ["/first", "/second", "/third"]);
	assert_eq!(retried, ["/first", "/second", "/third"]);
	assert_eq!(transport.authorizations()[3..], ["tokB", "tokB", "tokB"]);
	assert_eq!(provider.calls(), 1);

	Ok(())
}

#[tokio::test]
async fn slow_queued_retry_does_not_hold_back_the_leader() -> color_eyre::Result<()> {
	let provider = Arc::new(
		ScriptedProvider::new([Ok(Credentials::new("tokB"))]).with_delay(Duration::from_millis(50)),
	);
	let transport = Arc::new(RecordingTransport::rejecting(["tokA"]).with_latency(|request| {
		let slow_retry = request.url.path() == "/slow"
			&& common::authorization(request).as_deref() == Some("tokB");

		slow_retry.then_some(Duration::from_millis(500))
	}));
	let (coordinator, _) =
		coordinator(provider.clone(), Some("tokA"), Some("tokR"), RefreshPolicy::default());
	let client = AuthenticatedClient::<RecordingTransport>::new(transport.clone(), coordinator);
	let timed = |path: &'static str| {
		let client = client.clone();

		async move {
			let started = Instant::now();
			let result = client.send(HttpRequest::get(url(path))).await;

			(result, started.elapsed())
		}
	};
	let ((fast, fast_elapsed), (slow, slow_elapsed)) = tokio::join!(timed("fast"), timed("slow"));

	assert_eq!(fast?.body, b"/fast");
	assert_eq!(slow?.body, b"/slow");
	assert!(fast_elapsed < Duration::from_millis(300), "leader took {fast_elapsed:?}");
	assert!(slow_elapsed >= Duration::from_millis(500), "queued request took {slow_elapsed:?}");
	assert_eq!(provider.calls(), 1);

	Ok(())
}

#[tokio::test]
async fn followers_take_over_when_the_leading_request_is_dropped() -> color_eyre::Result<()> {
	let provider = Arc::new(
		ScriptedProvider::new([Ok(Credentials::new("tokB")), Ok(Credentials::new("tokC"))])
			.with_delay(Duration::from_millis(50)),
	);
	let transport = Arc::new(RecordingTransport::rejecting(["tokA"]));
	let (coordinator, store) =
		coordinator(provider.clone(), Some("tokA"), Some("tokR"), RefreshPolicy::default());
	let client = AuthenticatedClient::<RecordingTransport>::new(transport.clone(), coordinator);
	let spawn_send = |path: &'static str| {
		let client = client.clone();

		tokio::spawn(async move { client.send(HttpRequest::get(url(path))).await })
	};
	let leader = spawn_send("leader");

	tokio::time::sleep(Duration::from_millis(10)).await;

	let followers = [spawn_send("a"), spawn_send("b")];

	tokio::time::sleep(Duration::from_millis(10)).await;
	leader.abort();

	assert!(leader.await.is_err_and(|e| e.is_cancelled()));

	for (follower, path) in followers.into_iter().zip(["/a", "/b"]) {
		assert_eq!(follower.await??.body, path.as_bytes());
	}

	assert_eq!(provider.calls(), 1);
	assert_eq!(store.peek_access().as_deref(), Some("tokB"));

	Ok(())
}

#[tokio::test]
async fn second_unauthorized_after_refresh_is_surfaced() {
	let provider = Arc::new(ScriptedProvider::new([
		Ok(Credentials::new("tokB")),
		Ok(Credentials::new("tokC")),
	]));
	let transport = Arc::new(RecordingTransport::rejecting(["tokA", "tokB"]));
	let (coordinator, store) =
		coordinator(provider.clone(), Some("tokA"), Some("tokR"), RefreshPolicy::default());
	let client = AuthenticatedClient::<RecordingTransport>::new(transport.clone(), coordinator);
	let err = client
		.send(HttpRequest::get(url("profile")))
		.await
		.expect_err("A 401 after refreshing should not loop.");

	assert!(matches!(err, Error::Unauthorized));
	assert_eq!(provider.calls(), 1);
	assert_eq!(transport.authorizations(), ["tokA", "tokB"]);
	assert_eq!(store.peek_access().as_deref(), Some("tokB"));
}

#[tokio::test]
async fn rotated_refresh_token_is_persisted() -> color_eyre::Result<()> {
	let provider =
		Arc::new(ScriptedProvider::new([Ok(Credentials::new("tokB").with_refresh_token("tokR2"))]));
	let transport = Arc::new(RecordingTransport::rejecting(["tokA"]));
	let (coordinator, store) =
		coordinator(provider.clone(), Some("tokA"), Some("tokR"), RefreshPolicy::default());
	let client = AuthenticatedClient::<RecordingTransport>::new(transport.clone(), coordinator.clone());

	client.send(HttpRequest::get(url("profile"))).await?;

	assert_eq!(store.peek_access().as_deref(), Some("tokB"));
	assert_eq!(store.peek_refresh().as_deref(), Some("tokR2"));
	assert_eq!(coordinator.refresh_token().await?, "tokR2");

	Ok(())
}

#[tokio::test]
async fn rotated_access_token_skips_provider() -> color_eyre::Result<()> {
	let provider = Arc::new(ScriptedProvider::default());
	let (coordinator, store) =
		coordinator(provider.clone(), Some("tokA"), Some("tokR"), RefreshPolicy::default());
	let rotator = store.clone();
	let transport = Arc::new(RecordingTransport::new(move |request| {
		// Another process rotates the token while this request is in flight.
		if common::authorization(request).as_deref() == Some("tokA") {
			rotator.replace_access("tokB");

			return Ok(HttpResponse::new(401, Vec::new()));
		}

		Ok(HttpResponse::new(200, Vec::new()))
	}));
	let client = AuthenticatedClient::<RecordingTransport>::new(transport.clone(), coordinator);

	client.send(HttpRequest::get(url("profile"))).await?;

	assert_eq!(provider.calls(), 0);
	assert_eq!(transport.authorizations(), ["tokA", "tokB"]);
	assert_eq!(store.peek_access().as_deref(), Some("tokB"));

	Ok(())
}

#[tokio::test]
async fn unexpected_statuses_are_reported() {
	let provider = Arc::new(ScriptedProvider::default());

	for (status, expected) in [(403_u16, 403_u16), (500, 500), (302, 302)] {
		let transport = Arc::new(RecordingTransport::fixed(status));
		let (coordinator, _) =
			coordinator(provider.clone(), Some("tokA"), Some("tokR"), RefreshPolicy::default());
		let client = AuthenticatedClient::<RecordingTransport>::new(transport, coordinator);
		let err = client
			.send(HttpRequest::get(url("profile")))
			.await
			.expect_err("Non-success statuses should fail.");

		assert!(matches!(err, Error::UnexpectedStatus { status } if status == expected));
	}

	let transport = Arc::new(RecordingTransport::fixed(42));
	let (coordinator, _) =
		coordinator(provider.clone(), Some("tokA"), Some("tokR"), RefreshPolicy::default());
	let err = AuthenticatedClient::<RecordingTransport>::new(transport, coordinator)
		.send(HttpRequest::get(url("profile")))
		.await
		.expect_err("Unclassifiable statuses should fail.");

	assert!(matches!(err, Error::TransportResponseInvalid { status: 42 }));
	assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn transport_failures_are_not_coerced_to_statuses() {
	let provider = Arc::new(ScriptedProvider::default());
	let transport = Arc::new(RecordingTransport::new(|_| Err(TransportError::Timeout)));
	let (coordinator, _) =
		coordinator(provider.clone(), Some("tokA"), Some("tokR"), RefreshPolicy::default());
	let err = AuthenticatedClient::<RecordingTransport>::new(transport, coordinator)
		.send(HttpRequest::get(url("profile")))
		.await
		.expect_err("Transport failures should surface.");

	assert!(matches!(err, Error::Transport(TransportError::Timeout)));
	assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn bearer_scheme_signs_copies_only() -> color_eyre::Result<()> {
	let provider = Arc::new(ScriptedProvider::default());
	let transport = Arc::new(RecordingTransport::rejecting([]));
	let (coordinator, _) =
		coordinator(provider.clone(), Some("tokA"), Some("tokR"), RefreshPolicy::default());
	let client =
		AuthenticatedClient::<RecordingTransport>::new(transport.clone(), coordinator).with_signer(SigningScheme::bearer());
	let request = HttpRequest::post(url("items"), b"{}".to_vec())
		.with_header(header::AUTHORIZATION, HeaderValue::from_static("caller-supplied"));

	client.send(request.clone()).await?;

	assert_eq!(transport.authorizations(), ["Bearer tokA"]);
	assert_eq!(
		request.headers.get(header::AUTHORIZATION).map(HeaderValue::as_bytes),
		Some(&b"caller-supplied"[..])
	);
	assert_eq!(transport.requests()[0].body.as_deref(), Some(&b"{}"[..]));

	Ok(())
}
