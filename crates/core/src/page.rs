//! The page-controller capability consumed by the debate core.
//!
//! This is the only seam through which the core touches a browser. Backends
//! (a CDP-driven browser, the scripted test double) implement
//! [`PageController`] and are selected at construction time via
//! [`PageFactory`]; nothing in the core depends on a concrete driver.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::locator::Locator;
use crate::target::TargetId;

pub type PageResult<T> = std::result::Result<T, PageError>;

/// Failures reported by a page-controller backend.
#[derive(Debug, Error)]
pub enum PageError {
	#[error("navigation failed: {url}: {message}")]
	Navigation { url: String, message: String },

	#[error("timeout after {ms}ms waiting for: {condition}")]
	Timeout { ms: u64, condition: String },

	/// Element operation failed (stale handle, detached node, script error).
	#[error("element operation failed: {0}")]
	Element(String),

	/// Driver-level failure (launch, transport, protocol).
	#[error("backend error: {0}")]
	Backend(String),
}

impl PageError {
	pub fn timeout(timeout: Duration, condition: impl Into<String>) -> Self {
		PageError::Timeout {
			ms: timeout.as_millis() as u64,
			condition: condition.into(),
		}
	}
}

/// Opaque token identifying a DOM element resolved by a backend.
///
/// Handles are only meaningful to the backend that produced them and may go
/// stale when the page re-renders; callers re-locate rather than cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(u64);

impl ElementHandle {
	pub fn from_raw(raw: u64) -> Self {
		ElementHandle(raw)
	}

	pub fn raw(&self) -> u64 {
		self.0
	}
}

/// Document lifecycle states a backend can wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
	DomContentLoaded,
	Load,
	NetworkIdle,
}

impl std::fmt::Display for LoadState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			LoadState::DomContentLoaded => write!(f, "domcontentloaded"),
			LoadState::Load => write!(f, "load"),
			LoadState::NetworkIdle => write!(f, "networkidle"),
		}
	}
}

/// One persisted browser cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
	pub name: String,
	pub value: String,
	pub domain: String,
	pub path: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub expires: Option<f64>,
	#[serde(default)]
	pub http_only: bool,
	#[serde(default)]
	pub secure: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub same_site: Option<String>,
}

/// Abstract browser-page capability.
///
/// Mirrors the subset of driver operations the debate pipeline needs:
/// navigation, DOM query, interaction, text extraction, and cookie access.
/// All waits are bounded by their own timeouts; implementations must never
/// block indefinitely.
#[async_trait]
pub trait PageController: Send + Sync {
	async fn navigate(&self, url: &str, timeout: Duration) -> PageResult<()>;

	async fn wait_for_load(&self, state: LoadState, timeout: Duration) -> PageResult<()>;

	async fn reload(&self) -> PageResult<()>;

	/// Returns the first element matching `locator`, visible or not.
	async fn query(&self, locator: &Locator) -> PageResult<Option<ElementHandle>>;

	/// Returns every element matching `locator`, in document order.
	async fn query_all(&self, locator: &Locator) -> PageResult<Vec<ElementHandle>>;

	/// Waits up to `timeout` for a *visible* element matching `locator`.
	async fn wait_for_visible(&self, locator: &Locator, timeout: Duration)
	-> PageResult<ElementHandle>;

	async fn click(&self, element: &ElementHandle) -> PageResult<()>;

	/// Fast injection path: one DOM mutation setting the element's value or
	/// innerText plus a synthetic input event.
	async fn set_text(&self, element: &ElementHandle, text: &str) -> PageResult<()>;

	/// Form-control fill path.
	async fn fill(&self, element: &ElementHandle, text: &str) -> PageResult<()>;

	/// Keystroke simulation path, one character at a time.
	async fn type_text(
		&self,
		element: &ElementHandle,
		text: &str,
		per_char_delay: Duration,
	) -> PageResult<()>;

	async fn inner_text(&self, element: &ElementHandle) -> PageResult<String>;

	async fn is_visible(&self, element: &ElementHandle) -> PageResult<bool>;

	async fn cookies(&self) -> PageResult<Vec<Cookie>>;

	async fn add_cookies(&self, cookies: Vec<Cookie>) -> PageResult<()>;

	/// Tears down the page and any owned driver resources.
	async fn close(&self) -> PageResult<()>;
}

/// Opens pages for clients. One factory serves every target; each call
/// yields an isolated page bound to that target's profile directory.
#[async_trait]
pub trait PageFactory: Send + Sync {
	async fn open(
		&self,
		target: TargetId,
		profile_dir: &Path,
		headless: bool,
	) -> PageResult<Box<dyn PageController>>;
}
