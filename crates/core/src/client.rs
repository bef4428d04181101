//! Single-target client: session lifecycle plus the locate → fill → submit
//! → stream submission pipeline with retry.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::locator::{ElementRole, LocateMode, locate};
use crate::page::{ElementHandle, LoadState, PageController, PageFactory};
use crate::session::Session;
pub use crate::stream::OnChunk;
use crate::stream::stream_response;
use crate::target::{TargetDescriptor, TargetId};

// Settle delays around navigation and input focus; these UIs keep mutating
// the DOM briefly after load and after focus changes.
const PAGE_SETTLE: Duration = Duration::from_secs(1);
const LOAD_SETTLE: Duration = Duration::from_millis(500);
const FOCUS_SETTLE: Duration = Duration::from_millis(200);
const PRE_SUBMIT_SETTLE: Duration = Duration::from_millis(300);

const AUTH_SETTLE: Duration = Duration::from_secs(2);
const AUTH_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(20);
const AUTH_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

const TYPE_CHAR_DELAY: Duration = Duration::from_millis(10);

/// External human confirmation used by interactive auth setup.
///
/// `confirm` blocks until the operator reports that login is complete. It
/// is intentionally unbounded — the one human-paced wait in the system.
#[async_trait]
pub trait OperatorSignal: Send + Sync {
	async fn confirm(&self, target: TargetId);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
	Stopped,
	Starting,
	Ready,
	Submitting,
	Streaming,
	Stopping,
}

struct Inner {
	state: ClientState,
	session: Option<Session>,
}

/// Owns one target's browser session and submission pipeline.
///
/// `send_prompt` is only valid in the `Ready` state; the internal lock also
/// serializes prompts per target, so one client never has two in-flight
/// submissions.
pub struct TargetClient {
	descriptor: TargetDescriptor,
	config: ClientConfig,
	factory: Arc<dyn PageFactory>,
	inner: Mutex<Inner>,
}

impl TargetClient {
	pub fn new(target: TargetId, config: ClientConfig, factory: Arc<dyn PageFactory>) -> Self {
		Self::with_descriptor(TargetDescriptor::for_target(target), config, factory)
	}

	/// Builds a client over a custom descriptor (tests, selector overrides).
	pub fn with_descriptor(
		descriptor: TargetDescriptor,
		config: ClientConfig,
		factory: Arc<dyn PageFactory>,
	) -> Self {
		Self {
			descriptor,
			config,
			factory,
			inner: Mutex::new(Inner {
				state: ClientState::Stopped,
				session: None,
			}),
		}
	}

	pub fn target(&self) -> TargetId {
		self.descriptor.id
	}

	/// Acquires a session: profile directory, fresh page, persisted cookies.
	/// Calling `start` on a live client is caller error and is rejected.
	pub async fn start(&self) -> Result<()> {
		let mut inner = self.inner.lock().await;
		if inner.state != ClientState::Stopped {
			return Err(ClientError::AlreadyStarted(self.descriptor.id));
		}
		inner.state = ClientState::Starting;

		match self.open_session().await {
			Ok(session) => {
				inner.session = Some(session);
				inner.state = ClientState::Ready;
				info!(target = "parley", site = %self.descriptor.id, "client started");
				Ok(())
			}
			Err(err) => {
				inner.state = ClientState::Stopped;
				Err(err)
			}
		}
	}

	async fn open_session(&self) -> Result<Session> {
		let profile_dir = self.config.data_dir.join(self.descriptor.id.to_string());
		fs::create_dir_all(&profile_dir)?;

		let page = self
			.factory
			.open(self.descriptor.id, &profile_dir, self.config.headless)
			.await?;
		Session::attach(self.descriptor.id, page, profile_dir).await
	}

	/// Persists cookies and tears the session down. Stopping an already
	/// stopped client is a no-op.
	pub async fn stop(&self) -> Result<()> {
		let mut inner = self.inner.lock().await;
		if inner.state == ClientState::Stopped {
			return Ok(());
		}
		inner.state = ClientState::Stopping;
		let session = inner.session.take();
		inner.state = ClientState::Stopped;
		drop(inner);

		if let Some(session) = session {
			session.close().await?;
		}
		info!(target = "parley", site = %self.descriptor.id, "client stopped");
		Ok(())
	}

	/// Heuristic login check: the landing page for an authenticated user
	/// shows a prompt input; unauthenticated users are redirected to a login
	/// screen without one. Never raises — any navigation or wait failure
	/// reads as "not authenticated".
	pub async fn is_authenticated(&self) -> bool {
		let inner = self.inner.lock().await;
		let Some(session) = inner.session.as_ref() else {
			return false;
		};
		self.check_authenticated(session.page()).await
	}

	async fn check_authenticated(&self, page: &dyn PageController) -> bool {
		if page
			.navigate(&self.descriptor.landing_url, AUTH_NAVIGATION_TIMEOUT)
			.await
			.is_err()
		{
			return false;
		}
		tokio::time::sleep(AUTH_SETTLE).await;
		if page
			.wait_for_load(LoadState::DomContentLoaded, AUTH_LOAD_TIMEOUT)
			.await
			.is_err()
		{
			return false;
		}

		for locator in &self.descriptor.input_locators {
			if let Ok(Some(_)) = page.query(locator).await {
				return true;
			}
		}
		false
	}

	/// Interactive login: opens the landing page, blocks on the operator,
	/// re-verifies, and persists cookies. Verification failure re-prompts
	/// once and then degrades to a warning — setup never hard-fails on an
	/// unverifiable login.
	pub async fn setup_auth(&self, operator: &dyn OperatorSignal) -> Result<()> {
		let inner = self.inner.lock().await;
		let Some(session) = inner.session.as_ref() else {
			return Err(ClientError::NotStarted);
		};
		let page = session.page();

		page.navigate(&self.descriptor.landing_url, self.config.navigation_timeout)
			.await?;
		operator.confirm(self.descriptor.id).await;

		if self.check_authenticated(page).await {
			info!(target = "parley", site = %self.descriptor.id, "login verified");
		} else {
			warn!(target = "parley", site = %self.descriptor.id, "could not verify login, prompting once more");
			operator.confirm(self.descriptor.id).await;
			if self.check_authenticated(page).await {
				info!(target = "parley", site = %self.descriptor.id, "login verified");
			} else {
				warn!(target = "parley", site = %self.descriptor.id, "login unverified; session may still have been saved");
			}
		}

		session.persist_cookies().await;
		Ok(())
	}

	/// Submits `prompt` through the live page and streams the response.
	///
	/// Returns the full response text; growth is forwarded to `on_chunk` as
	/// it is observed. Locator exhaustion and navigation timeouts are
	/// retried with a page reload and jittered exponential backoff; any
	/// other failure propagates immediately.
	pub async fn send_prompt(
		&self,
		prompt: &str,
		on_chunk: Option<OnChunk>,
		timeout: Duration,
	) -> Result<String> {
		let mut guard = self.inner.lock().await;
		if guard.state != ClientState::Ready {
			return Err(ClientError::NotStarted);
		}

		let Inner { state, session } = &mut *guard;
		let Some(session) = session.as_ref() else {
			return Err(ClientError::NotStarted);
		};

		let result = self
			.send_with_retry(session.page(), state, prompt, on_chunk.as_ref(), timeout)
			.await;
		guard.state = ClientState::Ready;
		result
	}

	async fn send_with_retry(
		&self,
		page: &dyn PageController,
		state: &mut ClientState,
		prompt: &str,
		on_chunk: Option<&OnChunk>,
		timeout: Duration,
	) -> Result<String> {
		let attempts = self.config.retry.max_attempts.max(1);
		let mut last_error: Option<ClientError> = None;

		for attempt in 0..attempts {
			if attempt > 0 {
				let delay = self.config.retry.delay_for(attempt - 1);
				debug!(
					target = "parley",
					site = %self.descriptor.id,
					attempt,
					delay_ms = delay.as_millis() as u64,
					"retrying submission after reload"
				);
				tokio::time::sleep(delay).await;
				if let Err(err) = page.reload().await {
					debug!(target = "parley", site = %self.descriptor.id, error = %err, "reload before retry failed");
				}
			}

			match self
				.submit_once(page, state, prompt, on_chunk, timeout)
				.await
			{
				Ok(text) => return Ok(text),
				Err(err) if err.is_retryable() => {
					warn!(
						target = "parley",
						site = %self.descriptor.id,
						attempt,
						error = %err,
						"submission attempt failed"
					);
					last_error = Some(err);
				}
				Err(err) => return Err(err),
			}
		}

		Err(ClientError::RetriesExhausted {
			attempts,
			source: Box::new(last_error.expect("at least one attempt ran")),
		})
	}

	async fn submit_once(
		&self,
		page: &dyn PageController,
		state: &mut ClientState,
		prompt: &str,
		on_chunk: Option<&OnChunk>,
		timeout: Duration,
	) -> Result<String> {
		*state = ClientState::Submitting;
		let descriptor = &self.descriptor;

		page.navigate(&descriptor.new_chat_url, self.config.navigation_timeout)
			.await?;
		tokio::time::sleep(PAGE_SETTLE).await;
		page.wait_for_load(LoadState::DomContentLoaded, self.config.load_timeout)
			.await?;
		tokio::time::sleep(LOAD_SETTLE).await;

		let input = locate(
			page,
			descriptor.id,
			ElementRole::Input,
			&descriptor.input_locators,
			self.config.input_locate_timeout,
			LocateMode::MustBeVisible,
		)
		.await?;

		page.click(&input).await?;
		tokio::time::sleep(FOCUS_SETTLE).await;
		self.inject_prompt(page, &input, prompt).await?;
		tokio::time::sleep(PRE_SUBMIT_SETTLE).await;

		let submit = locate(
			page,
			descriptor.id,
			ElementRole::Submit,
			&descriptor.submit_locators,
			self.config.submit_locate_timeout,
			LocateMode::MustBeVisible,
		)
		.await?;
		page.click(&submit).await?;

		debug!(target = "parley", site = %descriptor.id, chars = prompt.len(), "prompt submitted");
		*state = ClientState::Streaming;
		stream_response(page, descriptor, &self.config.tuning, timeout, on_chunk).await
	}

	/// Injects prompt text, preferring the cheapest path that works: one DOM
	/// mutation with a synthetic input event, then a form-control fill, then
	/// per-character keystrokes. Each fallback runs only when the previous
	/// path failed.
	async fn inject_prompt(
		&self,
		page: &dyn PageController,
		input: &ElementHandle,
		prompt: &str,
	) -> Result<()> {
		let set_err = match page.set_text(input, prompt).await {
			Ok(()) => return Ok(()),
			Err(err) => err,
		};
		debug!(target = "parley", site = %self.descriptor.id, error = %set_err, "set_text failed, trying fill");

		let fill_err = match page.fill(input, prompt).await {
			Ok(()) => return Ok(()),
			Err(err) => err,
		};
		debug!(target = "parley", site = %self.descriptor.id, error = %fill_err, "fill failed, typing character by character");

		page.type_text(input, prompt, TYPE_CHAR_DELAY).await?;
		Ok(())
	}
}
