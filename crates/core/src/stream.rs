//! Poll-based streaming completion detection.
//!
//! The target pages push no events; the only way to know a streamed answer
//! has finished is to poll the DOM and decide. Each tick reads the newest
//! response text, emits growth to the chunk callback, and evaluates
//! completion signals in priority order: a dedicated completion indicator,
//! then the stop control's visibility, then a stability heuristic over
//! consecutive no-growth polls.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::StreamTuning;
use crate::error::{ClientError, Result};
use crate::page::PageController;
use crate::target::TargetDescriptor;

/// Callback receiving each strictly-new slice of response text.
pub type OnChunk = Box<dyn Fn(&str) + Send + Sync>;

/// Explicit phases of one in-flight streamed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
	/// No text observed yet.
	AwaitingFirstChunk,
	/// Text observed and still growing.
	Streaming,
	/// Text observed but unchanged on the most recent poll(s).
	Stabilizing,
	/// A completion signal fired.
	Complete,
}

/// Transient per-prompt streaming state. Lives for one `send_prompt` call.
pub(crate) struct StreamState {
	/// Most recently observed text; the truth for stability counting even
	/// when it shrinks (a shrink means the UI replaced the message).
	current: String,
	/// Longest text seen; the return value when the loop exits by timeout.
	longest: String,
	stable_ticks: u32,
	phase: StreamPhase,
}

impl StreamState {
	pub(crate) fn new() -> Self {
		Self {
			current: String::new(),
			longest: String::new(),
			stable_ticks: 0,
			phase: StreamPhase::AwaitingFirstChunk,
		}
	}

	/// Feeds one non-empty polled text value. Returns the suffix delta to
	/// emit when the text strictly grew; any other change updates state
	/// without emitting.
	pub(crate) fn observe(&mut self, text: &str) -> Option<String> {
		if text == self.current {
			self.stable_ticks += 1;
			if self.phase == StreamPhase::Streaming {
				self.phase = StreamPhase::Stabilizing;
			}
			return None;
		}

		let delta = if text.len() > self.current.len() {
			// `get` rather than slicing: a non-prefix rewrite may land the
			// old length off a char boundary.
			text.get(self.current.len()..)
				.filter(|d| !d.is_empty())
				.map(str::to_owned)
		} else {
			None
		};

		self.current = text.to_owned();
		if self.current.len() > self.longest.len() {
			self.longest = self.current.clone();
		}
		self.stable_ticks = 0;
		self.phase = StreamPhase::Streaming;
		delta
	}

	pub(crate) fn phase(&self) -> StreamPhase {
		self.phase
	}

	pub(crate) fn complete(&mut self) {
		self.phase = StreamPhase::Complete;
	}

	fn stable_beyond(&self, threshold: u32) -> bool {
		self.stable_ticks > threshold && !self.current.is_empty()
	}
}

/// Outcome of one completion probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompletionSignal {
	Complete,
	InProgress,
	Inconclusive,
}

/// Checks the target's completion signals, strongest first.
///
/// A stop control that exists but is invisible means generation finished; a
/// visible one means it is still running. A stop control absent from the
/// DOM entirely is inconclusive — some UIs never mount it, so absence alone
/// must not report completion.
pub(crate) async fn probe_completion(
	page: &dyn PageController,
	descriptor: &TargetDescriptor,
) -> CompletionSignal {
	if let Some(indicator) = &descriptor.complete_locator {
		if let Ok(Some(_)) = page.query(indicator).await {
			return CompletionSignal::Complete;
		}
	}

	if let Some(stop) = &descriptor.stop_locator {
		match page.query(stop).await {
			Ok(Some(handle)) => match page.is_visible(&handle).await {
				Ok(true) => return CompletionSignal::InProgress,
				Ok(false) => return CompletionSignal::Complete,
				Err(_) => {}
			},
			Ok(None) | Err(_) => {}
		}
	}

	CompletionSignal::Inconclusive
}

/// Polls the live DOM until the streamed response completes or `timeout`
/// elapses, forwarding growth to `on_chunk`.
///
/// On timeout, any observed text is returned as a partial success; only a
/// completely silent target raises [`ClientError::ResponseTimeout`].
pub async fn stream_response(
	page: &dyn PageController,
	descriptor: &TargetDescriptor,
	tuning: &StreamTuning,
	timeout: Duration,
	on_chunk: Option<&OnChunk>,
) -> Result<String> {
	let started = Instant::now();
	let mut state = StreamState::new();

	tokio::time::sleep(tuning.first_poll_delay).await;

	loop {
		if started.elapsed() > timeout {
			if !state.longest.is_empty() {
				debug!(
					target = "parley",
					site = %descriptor.id,
					chars = state.longest.len(),
					"stream timed out, returning partial text"
				);
				return Ok(state.longest);
			}
			return Err(ClientError::ResponseTimeout {
				ms: timeout.as_millis() as u64,
			});
		}

		let text = poll_text(page, descriptor).await;
		if !text.is_empty() {
			if let Some(delta) = state.observe(&text) {
				trace!(
					target = "parley",
					site = %descriptor.id,
					delta_chars = delta.len(),
					"response grew"
				);
				if let Some(callback) = on_chunk {
					callback(&delta);
				}
			}

			match probe_completion(page, descriptor).await {
				CompletionSignal::Complete => {
					state.complete();
					debug!(
						target = "parley",
						site = %descriptor.id,
						chars = state.current.len(),
						phase = ?state.phase(),
						"response complete via signal"
					);
					return Ok(state.current);
				}
				CompletionSignal::InProgress => {}
				CompletionSignal::Inconclusive => {
					if state.stable_beyond(tuning.stable_ticks) {
						state.complete();
						debug!(
							target = "parley",
							site = %descriptor.id,
							chars = state.current.len(),
							ticks = state.stable_ticks,
							phase = ?state.phase(),
							"response stable, treating as complete"
						);
						return Ok(state.current);
					}
				}
			}
		}

		tokio::time::sleep(tuning.poll_interval).await;
	}
}

/// Reads the newest response text: first locator in the chain that matches
/// anything wins, and the *last* matching node is taken — fallback locators
/// often also match stale earlier messages, while the live message is
/// always the final match in document order.
async fn poll_text(page: &dyn PageController, descriptor: &TargetDescriptor) -> String {
	for locator in &descriptor.response_locators {
		let Ok(elements) = page.query_all(locator).await else {
			continue;
		};
		let Some(last) = elements.last() else {
			continue;
		};
		match page.inner_text(last).await {
			Ok(text) if !text.is_empty() => return text,
			_ => continue,
		}
	}
	String::new()
}
