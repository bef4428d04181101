use thiserror::Error;

use crate::locator::ElementRole;
use crate::page::PageError;
use crate::target::TargetId;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Failures surfaced by a single-target client or the orchestrator.
#[derive(Debug, Error)]
pub enum ClientError {
	/// Operation invoked outside the `Ready` state. Programmer error, never retried.
	#[error("client not started")]
	NotStarted,

	/// `start()` called while a session is already live.
	#[error("client already started for {0}")]
	AlreadyStarted(TargetId),

	/// Every locator in a fallback chain was exhausted.
	#[error("no {role} matched for {target} after trying {tried} locators")]
	ElementNotFound {
		target: TargetId,
		role: ElementRole,
		tried: usize,
	},

	/// Streaming loop exceeded its budget with no observed text.
	#[error("response timeout after {ms}ms with no text observed")]
	ResponseTimeout { ms: u64 },

	/// Target reported unauthenticated; surfaced before any submission.
	#[error("not authenticated to {0}")]
	AuthenticationRequired(TargetId),

	/// Submission retry budget exhausted; carries the last underlying cause.
	#[error("failed after {attempts} attempts")]
	RetriesExhausted {
		attempts: u32,
		#[source]
		source: Box<ClientError>,
	},

	/// No client could be started at all.
	#[error("no clients started")]
	NoClients,

	#[error(transparent)]
	Page(#[from] PageError),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl ClientError {
	/// Short stable name used in error placeholder strings.
	pub fn kind(&self) -> &'static str {
		match self {
			ClientError::NotStarted => "NotStarted",
			ClientError::AlreadyStarted(_) => "AlreadyStarted",
			ClientError::ElementNotFound { .. } => "ElementNotFound",
			ClientError::ResponseTimeout { .. } => "ResponseTimeout",
			ClientError::AuthenticationRequired(_) => "AuthenticationRequired",
			ClientError::RetriesExhausted { .. } => "RetriesExhausted",
			ClientError::NoClients => "NoClients",
			ClientError::Page(_) => "PageError",
			ClientError::Io(_) => "IoError",
			ClientError::Json(_) => "JsonError",
		}
	}

	/// Whether `send_prompt` may retry this failure with a page reload.
	///
	/// Only locator exhaustion and timed-out waits qualify; anything else
	/// propagates immediately.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			ClientError::ElementNotFound { .. } | ClientError::Page(PageError::Timeout { .. })
		)
	}
}
