//! Single-target client pipeline: lifecycle states, injection fallbacks,
//! retry behavior, and the auth heuristic.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parley::client::TargetClient;
use parley::config::{ClientConfig, RetryPolicy, StreamTuning};
use parley::locator::Locator;
use parley::session::load_cookies;
use parley::target::{TargetDescriptor, TargetId};
use parley::testing::{InjectionPath, MockFactory, MockPage};
use parley::{ClientError, Cookie};
use tempfile::TempDir;

fn fast_config(data_dir: &Path) -> ClientConfig {
	ClientConfig {
		data_dir: data_dir.to_path_buf(),
		headless: true,
		navigation_timeout: Duration::from_secs(5),
		load_timeout: Duration::from_secs(2),
		input_locate_timeout: Duration::from_secs(2),
		submit_locate_timeout: Duration::from_secs(1),
		tuning: StreamTuning {
			poll_interval: Duration::from_millis(10),
			stable_ticks: 2,
			first_poll_delay: Duration::ZERO,
		},
		retry: RetryPolicy {
			max_attempts: 3,
			base_delay: Duration::from_millis(5),
			max_jitter: Duration::ZERO,
		},
	}
}

fn descriptor() -> TargetDescriptor {
	TargetDescriptor {
		id: TargetId::Claude,
		landing_url: "https://example.test".into(),
		new_chat_url: "https://example.test/new".into(),
		input_locators: vec![Locator::css("#input"), Locator::css(".input-fallback")],
		submit_locators: vec![Locator::css("#send")],
		response_locators: vec![Locator::css(".response")],
		stop_locator: None,
		complete_locator: Some(Locator::css(".done")),
	}
}

/// A page ready for one full submission: input, submit, and a response that
/// streams to completion.
fn ready_page(response_script: &[&str]) -> MockPage {
	let page = MockPage::new();
	page.add_visible_element(Locator::css("#input"));
	page.add_visible_element(Locator::css("#send"));
	page.add_streaming_element(Locator::css(".response"), response_script);
	page.add_completion_indicator(Locator::css(".done"), response_script.len());
	page
}

fn client_over(page: MockPage, temp: &TempDir) -> TargetClient {
	let factory = Arc::new(MockFactory::new());
	factory.insert(TargetId::Claude, page);
	TargetClient::with_descriptor(descriptor(), fast_config(temp.path()), factory)
}

#[tokio::test(start_paused = true)]
async fn send_prompt_runs_the_full_pipeline() {
	let temp = TempDir::new().unwrap();
	let page = ready_page(&["Hi", "Hi there"]);
	let client = client_over(page.clone(), &temp);

	client.start().await.unwrap();
	let text = client
		.send_prompt("What is Rust?", None, Duration::from_secs(30))
		.await
		.unwrap();

	assert_eq!(text, "Hi there");
	assert_eq!(page.navigations(), vec!["https://example.test/new".to_string()]);
	// Focus click on the input plus the submit click.
	assert_eq!(page.click_count(), 2);
	assert_eq!(
		page.injections(),
		vec![("What is Rust?".to_string(), InjectionPath::SetText)]
	);
}

#[tokio::test(start_paused = true)]
async fn injection_falls_back_to_fill_then_keystrokes() {
	let temp = TempDir::new().unwrap();
	let page = ready_page(&["ok"]);
	page.fail_set_text();
	let client = client_over(page.clone(), &temp);

	client.start().await.unwrap();
	client
		.send_prompt("fallback", None, Duration::from_secs(30))
		.await
		.unwrap();
	assert_eq!(
		page.injections(),
		vec![("fallback".to_string(), InjectionPath::Fill)]
	);

	let temp = TempDir::new().unwrap();
	let page = ready_page(&["ok"]);
	page.fail_set_text();
	page.fail_fill();
	let client = client_over(page.clone(), &temp);

	client.start().await.unwrap();
	client
		.send_prompt("fallback", None, Duration::from_secs(30))
		.await
		.unwrap();
	assert_eq!(
		page.injections(),
		vec![("fallback".to_string(), InjectionPath::TypeText)]
	);
}

#[tokio::test]
async fn send_prompt_outside_ready_state_fails() {
	let temp = TempDir::new().unwrap();
	let client = client_over(ready_page(&["ok"]), &temp);

	let err = client
		.send_prompt("too early", None, Duration::from_secs(1))
		.await
		.unwrap_err();
	assert!(matches!(err, ClientError::NotStarted));

	client.start().await.unwrap();
	client.stop().await.unwrap();
	let err = client
		.send_prompt("after stop", None, Duration::from_secs(1))
		.await
		.unwrap_err();
	assert!(matches!(err, ClientError::NotStarted));
}

#[tokio::test]
async fn double_start_is_rejected() {
	let temp = TempDir::new().unwrap();
	let client = client_over(ready_page(&["ok"]), &temp);

	client.start().await.unwrap();
	let err = client.start().await.unwrap_err();
	assert!(matches!(err, ClientError::AlreadyStarted(TargetId::Claude)));

	// stop() then start() is fine again.
	client.stop().await.unwrap();
	client.start().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn missing_input_exhausts_retries_with_reloads() {
	let temp = TempDir::new().unwrap();
	let page = MockPage::new();
	// Submit and response exist; the input chain never matches.
	page.add_visible_element(Locator::css("#send"));
	page.add_streaming_element(Locator::css(".response"), &["ignored"]);
	let client = client_over(page.clone(), &temp);

	client.start().await.unwrap();
	let err = client
		.send_prompt("doomed", None, Duration::from_secs(5))
		.await
		.unwrap_err();

	match err {
		ClientError::RetriesExhausted { attempts, source } => {
			assert_eq!(attempts, 3);
			assert!(matches!(*source, ClientError::ElementNotFound { .. }));
		}
		other => panic!("expected RetriesExhausted, got {other:?}"),
	}
	// One reload between each pair of attempts.
	assert_eq!(page.reload_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn navigation_timeout_is_retried_and_recovers() {
	let temp = TempDir::new().unwrap();
	let page = ready_page(&["recovered"]);
	page.fail_next_navigations(1);
	let client = client_over(page.clone(), &temp);

	client.start().await.unwrap();
	let text = client
		.send_prompt("try again", None, Duration::from_secs(30))
		.await
		.unwrap();

	assert_eq!(text, "recovered");
	assert_eq!(page.reload_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn is_authenticated_is_idempotent() {
	let temp = TempDir::new().unwrap();
	let page = ready_page(&["ok"]);
	let client = client_over(page.clone(), &temp);

	client.start().await.unwrap();
	let first = client.is_authenticated().await;
	let second = client.is_authenticated().await;
	assert!(first);
	assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn auth_check_fails_closed() {
	let temp = TempDir::new().unwrap();

	// Unstarted client: no session, not authenticated.
	let client = client_over(ready_page(&["ok"]), &temp);
	assert!(!client.is_authenticated().await);

	// Login wall: page without any input element.
	let page = MockPage::new();
	let client = client_over(page.clone(), &temp);
	client.start().await.unwrap();
	assert!(!client.is_authenticated().await);

	// Navigation failure also reads as unauthenticated, never an error.
	let page = ready_page(&["ok"]);
	let client = client_over(page.clone(), &temp);
	client.start().await.unwrap();
	page.fail_next_navigations(1);
	assert!(!client.is_authenticated().await);
}

#[tokio::test]
async fn stop_persists_cookies_to_profile_dir() {
	let temp = TempDir::new().unwrap();
	let page = ready_page(&["ok"]);
	page.seed_cookies(vec![Cookie {
		name: "session".into(),
		value: "token".into(),
		domain: ".example.test".into(),
		path: "/".into(),
		expires: Some(-1.0),
		http_only: true,
		secure: true,
		same_site: Some("Lax".into()),
	}]);
	let client = client_over(page, &temp);

	client.start().await.unwrap();
	client.stop().await.unwrap();

	let cookie_path = temp.path().join("claude").join("cookies.json");
	let cookies = load_cookies(&cookie_path);
	assert_eq!(cookies.len(), 1);
	assert_eq!(cookies[0].name, "session");
}
