use serde::{Deserialize, Serialize};

/// Event emitted while a debate round (and its synthesis pass) is running.
///
/// For a given source, every `chunk` precedes its single terminal `complete`
/// or `error`; terminal events for different sources may interleave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DebateEvent {
	/// Incremental response text for one source.
	Chunk { source: String, content: String },
	/// Terminal success for one source, carrying the full response text.
	Complete { source: String, content: String },
	/// Terminal failure for one source.
	Error { source: String, message: String },
	/// Human-readable progress note, not tied to any source.
	Status { message: String },
	/// Authentication state for one source.
	AuthStatus { source: String, authenticated: bool },
}

/// Request envelope accepted over the WebSocket surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientRequest {
	/// Run a full debate + synthesis round for `prompt`.
	Debate { prompt: String },
	/// Report authentication state for every configured target.
	CheckAuth,
}
