//! WebSocket surface for real-time debate streaming.
//!
//! Accepts `{"action": "debate", "prompt": ...}` and
//! `{"action": "check_auth"}` envelopes and emits the tagged event sequence
//! from `parley-protocol` as JSON messages. One orchestrator serves each
//! debate request; its events flow through a channel so per-target
//! callbacks stay synchronous while the socket writes happen here.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use parley::client::OnChunk;
use parley::config::ClientConfig;
use parley::orchestrator::{OnUpdate, Orchestrator, ResponseMap};
use parley::target::TargetId;
use parley::triage::run_triage;
use parley_protocol::{ClientRequest, DebateEvent, SYNTHESIS_SOURCE, SYSTEM_SOURCE};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};

use crate::backend::{BackendKind, new_factory};

/// Shared server configuration; one orchestrator is built per request.
pub struct ServerState {
	pub backend: BackendKind,
	pub config: ClientConfig,
	pub targets: Vec<TargetId>,
	pub timeout: Duration,
}

pub fn router(state: Arc<ServerState>) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/ws", get(ws_upgrade))
		.with_state(state)
}

async fn health(State(state): State<Arc<ServerState>>) -> axum::Json<serde_json::Value> {
	axum::Json(serde_json::json!({
		"status": "ok",
		"targets": state.targets,
	}))
}

async fn ws_upgrade(State(state): State<Arc<ServerState>>, ws: WebSocketUpgrade) -> Response {
	ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<ServerState>) {
	info!(target = "parley.server", "websocket connected");

	loop {
		let message = match socket.recv().await {
			Some(Ok(message)) => message,
			_ => break,
		};
		let Message::Text(raw) = message else {
			continue;
		};

		let request = match serde_json::from_str::<ClientRequest>(raw.as_str()) {
			Ok(request) => request,
			Err(err) => {
				let event = DebateEvent::Error {
					source: SYSTEM_SOURCE.into(),
					message: format!("invalid request: {err}"),
				};
				if send_event(&mut socket, &event).await.is_err() {
					break;
				}
				continue;
			}
		};

		match request {
			ClientRequest::Debate { prompt } => {
				let prompt = prompt.trim().to_owned();
				if prompt.is_empty() {
					let event = DebateEvent::Error {
						source: SYSTEM_SOURCE.into(),
						message: "empty prompt".into(),
					};
					if send_event(&mut socket, &event).await.is_err() {
						break;
					}
					continue;
				}
				run_streamed(&mut socket, |events| debate_flow(&state, prompt, events)).await;
			}
			ClientRequest::CheckAuth => {
				run_streamed(&mut socket, |events| auth_flow(&state, events)).await;
			}
		}
	}

	info!(target = "parley.server", "websocket closed");
}

/// Runs a flow that emits [`DebateEvent`]s through a channel while this
/// side forwards them to the socket as they arrive.
async fn run_streamed<F, Fut>(socket: &mut WebSocket, flow: F)
where
	F: FnOnce(UnboundedSender<DebateEvent>) -> Fut,
	Fut: Future<Output = ()>,
{
	let (tx, mut rx) = mpsc::unbounded_channel();
	let flow = flow(tx);
	tokio::pin!(flow);
	let mut flow_done = false;

	loop {
		tokio::select! {
			event = rx.recv() => match event {
				Some(event) => {
					if send_event(socket, &event).await.is_err() {
						// Peer went away; let the flow finish on its own so
						// browser sessions still get torn down.
						break;
					}
				}
				None => break,
			},
			_ = &mut flow, if !flow_done => {
				flow_done = true;
			}
		}
	}

	if !flow_done {
		flow.await;
	}
}

async fn send_event(
	socket: &mut WebSocket,
	event: &DebateEvent,
) -> Result<(), axum::Error> {
	let payload = match serde_json::to_string(event) {
		Ok(payload) => payload,
		Err(err) => {
			warn!(target = "parley.server", error = %err, "failed to serialize event");
			return Ok(());
		}
	};
	socket.send(Message::Text(payload.into())).await
}

async fn debate_flow(state: &ServerState, prompt: String, events: UnboundedSender<DebateEvent>) {
	let send = |event: DebateEvent| {
		let _ = events.send(event);
	};

	send(DebateEvent::Status {
		message: "Starting debate session...".into(),
	});

	let factory = match new_factory(state.backend) {
		Ok(factory) => factory,
		Err(err) => {
			send(DebateEvent::Error {
				source: SYSTEM_SOURCE.into(),
				message: format!("backend unavailable: {err}"),
			});
			return;
		}
	};

	let mut orchestrator =
		Orchestrator::new(factory, state.config.clone(), state.targets.clone());
	if let Err(err) = orchestrator.start().await {
		send(DebateEvent::Error {
			source: SYSTEM_SOURCE.into(),
			message: format!("failed to start clients: {err}"),
		});
		return;
	}

	send(DebateEvent::Status {
		message: "Checking authentication...".into(),
	});
	let auth = orchestrator.check_auth().await;
	for (target, authenticated) in &auth {
		send(DebateEvent::AuthStatus {
			source: target.to_string(),
			authenticated: *authenticated,
		});
	}

	if Orchestrator::require_authenticated(&auth).is_err() {
		let missing: Vec<String> = auth
			.iter()
			.filter(|(_, authenticated)| !**authenticated)
			.map(|(target, _)| target.to_string())
			.collect();
		send(DebateEvent::Error {
			source: "auth".into(),
			message: format!(
				"Not authenticated to: {}. Run `parley setup` first.",
				missing.join(", ")
			),
		});
		orchestrator.stop().await;
		return;
	}

	send(DebateEvent::Status {
		message: "Querying all targets in parallel...".into(),
	});

	let chunk_events = events.clone();
	let on_update: OnUpdate = Arc::new(move |target, chunk: &str| {
		let _ = chunk_events.send(DebateEvent::Chunk {
			source: target.to_string(),
			content: chunk.to_owned(),
		});
	});
	let responses = orchestrator
		.debate(&prompt, Some(on_update), state.timeout)
		.await;

	for (target, text) in &responses {
		if text.starts_with("[Error:") {
			send(DebateEvent::Error {
				source: target.to_string(),
				message: text.clone(),
			});
		} else {
			send(DebateEvent::Complete {
				source: target.to_string(),
				content: text.clone(),
			});
		}
	}

	run_synthesis(state, &orchestrator, &prompt, &responses, &send).await;

	send(DebateEvent::Status {
		message: "Debate complete.".into(),
	});
	orchestrator.stop().await;
}

async fn run_synthesis(
	state: &ServerState,
	orchestrator: &Orchestrator,
	prompt: &str,
	responses: &ResponseMap,
	send: &(dyn Fn(DebateEvent) + Send + Sync),
) {
	// Reuse the claude session for synthesis, falling back to any live
	// client when claude is unavailable.
	let client = orchestrator
		.client(TargetId::Claude)
		.or_else(|| {
			orchestrator
				.targets()
				.first()
				.and_then(|&target| orchestrator.client(target))
		});
	let Some(client) = client else {
		send(DebateEvent::Error {
			source: SYNTHESIS_SOURCE.into(),
			message: "no client available for synthesis".into(),
		});
		return;
	};

	send(DebateEvent::Status {
		message: "Running unified analysis...".into(),
	});

	let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<String>();
	let on_chunk: OnChunk = Box::new(move |chunk: &str| {
		let _ = chunk_tx.send(chunk.to_owned());
	});

	let triage = run_triage(
		&client,
		prompt,
		responses,
		&state.targets,
		Some(on_chunk),
		state.timeout,
	);
	tokio::pin!(triage);

	let mut result: Option<Result<String, parley::ClientError>> = None;
	while result.is_none() || !chunk_rx.is_empty() {
		tokio::select! {
			chunk = chunk_rx.recv() => {
				if let Some(chunk) = chunk {
					send(DebateEvent::Chunk {
						source: SYNTHESIS_SOURCE.into(),
						content: chunk,
					});
				}
			}
			outcome = &mut triage, if result.is_none() => {
				result = Some(outcome);
			}
		}
	}

	match result {
		Some(Ok(text)) => {
			debug!(target = "parley.server", chars = text.len(), "synthesis complete");
			send(DebateEvent::Complete {
				source: SYNTHESIS_SOURCE.into(),
				content: text,
			});
		}
		Some(Err(err)) => {
			send(DebateEvent::Error {
				source: SYNTHESIS_SOURCE.into(),
				message: format!("synthesis failed: {err}"),
			});
		}
		_ => {}
	}
}

async fn auth_flow(state: &ServerState, events: UnboundedSender<DebateEvent>) {
	let send = |event: DebateEvent| {
		let _ = events.send(event);
	};

	send(DebateEvent::Status {
		message: "Checking authentication...".into(),
	});

	let factory = match new_factory(state.backend) {
		Ok(factory) => factory,
		Err(err) => {
			send(DebateEvent::Error {
				source: "auth".into(),
				message: format!("backend unavailable: {err}"),
			});
			return;
		}
	};

	let mut orchestrator =
		Orchestrator::new(factory, state.config.clone(), state.targets.clone());
	if let Err(err) = orchestrator.start().await {
		send(DebateEvent::Error {
			source: "auth".into(),
			message: format!("auth check failed: {err}"),
		});
		return;
	}

	let auth = orchestrator.check_auth().await;
	for (target, authenticated) in &auth {
		send(DebateEvent::AuthStatus {
			source: target.to_string(),
			authenticated: *authenticated,
		});
	}

	if auth.values().all(|authenticated| *authenticated) {
		send(DebateEvent::Status {
			message: "All targets authenticated.".into(),
		});
	} else {
		let missing: Vec<String> = auth
			.iter()
			.filter(|(_, authenticated)| !**authenticated)
			.map(|(target, _)| target.to_string())
			.collect();
		send(DebateEvent::Status {
			message: format!("Not authenticated: {}", missing.join(", ")),
		});
	}

	orchestrator.stop().await;
}
