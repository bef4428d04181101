//! Concurrent fan-out across every configured target.
//!
//! Failure isolation is the rule everywhere: one target failing to start,
//! answer, or stop never blocks or aborts the others. A failed prompt is
//! converted into a descriptive placeholder string in its slot rather than
//! an error for the round.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};

use crate::client::{OnChunk, TargetClient};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::page::PageFactory;
use crate::target::TargetId;

/// Final response text (or an error placeholder) per target.
pub type ResponseMap = BTreeMap<TargetId, String>;

/// Authentication state per target.
pub type AuthStatus = BTreeMap<TargetId, bool>;

/// Shared streaming callback receiving `(target, chunk)` pairs from every
/// in-flight prompt.
pub type OnUpdate = Arc<dyn Fn(TargetId, &str) + Send + Sync>;

/// Owns one [`TargetClient`] per configured target and runs every
/// per-target operation concurrently.
pub struct Orchestrator {
	factory: Arc<dyn PageFactory>,
	config: ClientConfig,
	requested: Vec<TargetId>,
	clients: BTreeMap<TargetId, Arc<TargetClient>>,
}

impl Orchestrator {
	pub fn new(factory: Arc<dyn PageFactory>, config: ClientConfig, targets: Vec<TargetId>) -> Self {
		Self {
			factory,
			config,
			requested: targets,
			clients: BTreeMap::new(),
		}
	}

	/// Starts one client per requested target, concurrently. A client that
	/// fails to start is dropped with a warning; the orchestrator proceeds
	/// with the surviving subset. Fails only when nothing started.
	pub async fn start(&mut self) -> Result<()> {
		let config = &self.config;
		let factory = &self.factory;
		let startups = self.requested.iter().map(|&id| async move {
			let client = Arc::new(TargetClient::new(id, config.clone(), Arc::clone(factory)));
			match client.start().await {
				Ok(()) => Some((id, client)),
				Err(err) => {
					warn!(target = "parley", site = %id, error = %err, "failed to start client");
					None
				}
			}
		});
		let started = join_all(startups).await;

		self.clients = started.into_iter().flatten().collect();
		if self.clients.is_empty() {
			return Err(ClientError::NoClients);
		}
		info!(
			target = "parley",
			started = self.clients.len(),
			requested = self.requested.len(),
			"orchestrator started"
		);
		Ok(())
	}

	/// Targets with a live client, in reporting order.
	pub fn targets(&self) -> Vec<TargetId> {
		self.clients.keys().copied().collect()
	}

	/// One owned client, e.g. for the synthesis round.
	pub fn client(&self, id: TargetId) -> Option<Arc<TargetClient>> {
		self.clients.get(&id).cloned()
	}

	/// Checks authentication on every client concurrently.
	pub async fn check_auth(&self) -> AuthStatus {
		let checks = self
			.clients
			.iter()
			.map(|(&id, client)| async move { (id, client.is_authenticated().await) });
		join_all(checks).await.into_iter().collect()
	}

	/// Gate run before any submission: fails with `AuthenticationRequired`
	/// naming the first target that reported unauthenticated.
	pub fn require_authenticated(auth: &AuthStatus) -> Result<()> {
		match auth.iter().find(|(_, authenticated)| !**authenticated) {
			Some((&target, _)) => Err(ClientError::AuthenticationRequired(target)),
			_ => Ok(()),
		}
	}

	/// Sends `prompt` to every client concurrently and waits for all of
	/// them. Per-target failures become placeholder strings in the map;
	/// the round itself never fails.
	pub async fn debate(
		&self,
		prompt: &str,
		on_update: Option<OnUpdate>,
		timeout: Duration,
	) -> ResponseMap {
		let rounds = self.clients.iter().map(|(&id, client)| {
			let on_update = on_update.clone();
			async move {
				let chunk_callback: Option<OnChunk> = on_update.clone().map(|update| {
					Box::new(move |chunk: &str| update(id, chunk)) as OnChunk
				});

				match client.send_prompt(prompt, chunk_callback, timeout).await {
					Ok(text) => (id, text),
					Err(err) => {
						warn!(target = "parley", site = %id, error = %err, "debate round failed for target");
						let placeholder = error_placeholder(&err);
						if let Some(update) = &on_update {
							update(id, &placeholder);
						}
						(id, placeholder)
					}
				}
			}
		});

		join_all(rounds).await.into_iter().collect()
	}

	/// Stops every client concurrently. Per-client failures are warnings;
	/// the rest keep shutting down.
	pub async fn stop(&mut self) {
		let clients = std::mem::take(&mut self.clients);
		let shutdowns = clients.iter().map(|(&id, client)| async move {
			if let Err(err) = client.stop().await {
				warn!(target = "parley", site = %id, error = %err, "failed to stop client");
			}
		});
		join_all(shutdowns).await;
	}
}

/// Renders a failed target's slot value: `[Error: <kind>: <message>]` with
/// the message capped at 100 characters.
pub fn error_placeholder(err: &ClientError) -> String {
	let message = match err {
		ClientError::RetriesExhausted { source, .. } => format!("{err}: {source}"),
		_ => err.to_string(),
	};
	format!("[Error: {}: {}]", err.kind(), truncate_chars(&message, 100))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
	if text.chars().count() <= max_chars {
		return text.to_owned();
	}
	text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::locator::ElementRole;

	#[test]
	fn placeholder_includes_kind_and_message() {
		let err = ClientError::ResponseTimeout { ms: 120_000 };
		let rendered = error_placeholder(&err);
		assert!(rendered.starts_with("[Error: ResponseTimeout:"));
		assert!(rendered.ends_with(']'));
	}

	#[test]
	fn placeholder_surfaces_retry_cause() {
		let err = ClientError::RetriesExhausted {
			attempts: 3,
			source: Box::new(ClientError::ElementNotFound {
				target: TargetId::ChatGpt,
				role: ElementRole::Input,
				tried: 6,
			}),
		};
		let rendered = error_placeholder(&err);
		assert!(rendered.contains("RetriesExhausted"));
		assert!(rendered.contains("input field"));
	}

	#[test]
	fn require_authenticated_names_the_failing_target() {
		let mut auth = AuthStatus::new();
		auth.insert(TargetId::Claude, true);
		auth.insert(TargetId::ChatGpt, false);
		let err = Orchestrator::require_authenticated(&auth).unwrap_err();
		assert!(matches!(
			err,
			ClientError::AuthenticationRequired(TargetId::ChatGpt)
		));

		auth.insert(TargetId::ChatGpt, true);
		assert!(Orchestrator::require_authenticated(&auth).is_ok());
	}

	#[test]
	fn placeholder_truncates_long_messages() {
		let err = ClientError::Page(crate::page::PageError::Backend("x".repeat(500)));
		let rendered = error_placeholder(&err);
		assert!(rendered.chars().count() < 140);
	}
}
