//! Streaming completion detection against a scripted DOM: chunk emission,
//! completion signals, stability, and timeout behavior.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use parley::config::StreamTuning;
use parley::locator::Locator;
use parley::stream::{OnChunk, stream_response};
use parley::target::{TargetDescriptor, TargetId};
use parley::testing::MockPage;
use parley::ClientError;

fn response_locator() -> Locator {
	Locator::css(".response")
}

fn descriptor(stop: Option<Locator>, complete: Option<Locator>) -> TargetDescriptor {
	TargetDescriptor {
		id: TargetId::Claude,
		landing_url: "https://example.test".into(),
		new_chat_url: "https://example.test/new".into(),
		input_locators: vec![Locator::css("#input")],
		submit_locators: vec![Locator::css("#send")],
		response_locators: vec![response_locator()],
		stop_locator: stop,
		complete_locator: complete,
	}
}

fn tuning(stable_ticks: u32) -> StreamTuning {
	StreamTuning {
		poll_interval: Duration::from_millis(10),
		stable_ticks,
		first_poll_delay: Duration::ZERO,
	}
}

fn collector() -> (Arc<Mutex<String>>, OnChunk) {
	let collected = Arc::new(Mutex::new(String::new()));
	let sink = Arc::clone(&collected);
	let on_chunk: OnChunk = Box::new(move |chunk| sink.lock().unwrap().push_str(chunk));
	(collected, on_chunk)
}

#[tokio::test(start_paused = true)]
async fn completes_via_indicator_with_exact_chunks() {
	let page = MockPage::new();
	let indicator = Locator::css(".done");
	let descriptor = descriptor(None, Some(indicator.clone()));
	page.add_streaming_element(response_locator(), &["Hel", "Hello", "Hello wor", "Hello world"]);
	page.add_completion_indicator(indicator, 4);

	let (collected, on_chunk) = collector();
	let text = stream_response(
		&page,
		&descriptor,
		&tuning(1_000),
		Duration::from_secs(30),
		Some(&on_chunk),
	)
	.await
	.unwrap();

	assert_eq!(text, "Hello world");
	assert_eq!(*collected.lock().unwrap(), "Hello world");
}

#[tokio::test(start_paused = true)]
async fn stability_heuristic_completes_without_signals() {
	let page = MockPage::new();
	let descriptor = descriptor(None, None);
	page.add_streaming_element(response_locator(), &["abc"]);

	let started = tokio::time::Instant::now();
	let text = stream_response(&page, &descriptor, &tuning(3), Duration::from_secs(60), None)
		.await
		.unwrap();

	assert_eq!(text, "abc");
	assert!(started.elapsed() < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn timeout_returns_partial_text() {
	let page = MockPage::new();
	let descriptor = descriptor(None, None);
	page.add_streaming_element(response_locator(), &["abc"]);

	// Stability threshold far beyond what the budget allows; the loop can
	// only exit by timeout, and must hand back what it saw.
	let text = stream_response(
		&page,
		&descriptor,
		&tuning(1_000_000),
		Duration::from_secs(2),
		None,
	)
	.await
	.unwrap();

	assert_eq!(text, "abc");
}

#[tokio::test(start_paused = true)]
async fn timeout_with_no_text_raises() {
	let page = MockPage::new();
	let descriptor = descriptor(None, None);

	let err = stream_response(&page, &descriptor, &tuning(5), Duration::from_secs(2), None)
		.await
		.unwrap_err();

	match err {
		ClientError::ResponseTimeout { ms } => assert_eq!(ms, 2_000),
		other => panic!("expected ResponseTimeout, got {other:?}"),
	}
}

#[tokio::test(start_paused = true)]
async fn visible_stop_control_suppresses_stability() {
	let page = MockPage::new();
	let stop = Locator::css(".stop");
	let descriptor = descriptor(Some(stop.clone()), None);
	page.add_streaming_element(response_locator(), &["done"]);
	// Stop control stays visible long past the stability threshold.
	page.add_stop_control(stop, 1_000_000);

	let started = tokio::time::Instant::now();
	let text = stream_response(&page, &descriptor, &tuning(2), Duration::from_secs(3), None)
		.await
		.unwrap();

	// Only the timeout ends the loop; stability must not fire while the
	// stop control reads as generating.
	assert_eq!(text, "done");
	assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn stop_control_turning_invisible_signals_completion() {
	let page = MockPage::new();
	let stop = Locator::css(".stop");
	let descriptor = descriptor(Some(stop.clone()), None);
	page.add_streaming_element(response_locator(), &["partial", "partial answer"]);
	page.add_stop_control(stop, 3);

	let text = stream_response(
		&page,
		&descriptor,
		&tuning(1_000_000),
		Duration::from_secs(30),
		None,
	)
	.await
	.unwrap();

	assert_eq!(text, "partial answer");
}

#[tokio::test(start_paused = true)]
async fn absent_stop_control_is_inconclusive_not_complete() {
	let page = MockPage::new();
	// Stop locator defined for the target but the node never mounts.
	let descriptor = descriptor(Some(Locator::css(".stop")), None);
	page.add_streaming_element(response_locator(), &["steady"]);

	let started = tokio::time::Instant::now();
	let text = stream_response(&page, &descriptor, &tuning(3), Duration::from_secs(60), None)
		.await
		.unwrap();

	// Completion came from the stability heuristic, well before timeout;
	// the missing control neither completed nor wedged the loop.
	assert_eq!(text, "steady");
	assert!(started.elapsed() < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn shrink_is_new_truth_and_chunks_stay_monotonic() {
	let page = MockPage::new();
	let indicator = Locator::css(".done");
	let descriptor = descriptor(None, Some(indicator.clone()));
	// UI re-render replaces the message mid-stream.
	page.add_streaming_element(response_locator(), &["Hello there", "He", "Hey now"]);
	page.add_completion_indicator(indicator, 3);

	let (collected, on_chunk) = collector();
	let text = stream_response(
		&page,
		&descriptor,
		&tuning(1_000),
		Duration::from_secs(30),
		Some(&on_chunk),
	)
	.await
	.unwrap();

	assert_eq!(text, "Hey now");
	// The shrink emitted nothing; only strictly-growing deltas reached the
	// callback.
	assert_eq!(*collected.lock().unwrap(), "Hello therey now");
}

#[tokio::test(start_paused = true)]
async fn last_matching_node_wins_over_stale_messages() {
	let page = MockPage::new();
	let indicator = Locator::css(".done");
	let descriptor = descriptor(None, Some(indicator.clone()));
	// A stale earlier message matches the same locator; the live message is
	// the last match in document order.
	let stale = page.add_visible_element(response_locator());
	page.set_fixed_text(stale, "old message");
	page.add_streaming_element(response_locator(), &["fresh answer"]);
	page.add_completion_indicator(indicator, 1);

	let text = stream_response(
		&page,
		&descriptor,
		&tuning(1_000),
		Duration::from_secs(30),
		None,
	)
	.await
	.unwrap();

	assert_eq!(text, "fresh answer");
}
