//! Locator model and the resilient fallback search.
//!
//! Target UIs rotate their markup without notice, so every element the
//! pipeline needs is described by an ordered chain of candidate locators
//! rather than a single selector. [`locate`] walks the chain visible-first,
//! then falls back to a bare existence pass; hidden duplicate nodes are
//! common in these UIs and visibility detection itself is unreliable for
//! custom web components, so both passes earn their keep.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::page::{ElementHandle, PageController};
use crate::target::TargetId;

/// A rule identifying a DOM element, swappable per automation backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
	/// Raw CSS selector.
	Css { selector: String },
	/// Accessible role, optionally narrowed by accessible name.
	Role { role: String, name: Option<String> },
	/// Exact visible text match.
	Text { text: String },
}

impl Locator {
	pub fn css(selector: impl Into<String>) -> Self {
		Locator::Css {
			selector: selector.into(),
		}
	}

	pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
		Locator::Role {
			role: role.into(),
			name: Some(name.into()),
		}
	}

	pub fn any_role(role: impl Into<String>) -> Self {
		Locator::Role {
			role: role.into(),
			name: None,
		}
	}

	pub fn text(text: impl Into<String>) -> Self {
		Locator::Text { text: text.into() }
	}
}

impl std::fmt::Display for Locator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Locator::Css { selector } => write!(f, "css={selector}"),
			Locator::Role {
				role,
				name: Some(name),
			} => write!(f, "role={role}[name={name}]"),
			Locator::Role { role, name: _ } => write!(f, "role={role}"),
			Locator::Text { text } => write!(f, "text={text}"),
		}
	}
}

/// Which element of the submission pipeline a locator chain describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRole {
	Input,
	Submit,
	Response,
}

impl std::fmt::Display for ElementRole {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ElementRole::Input => write!(f, "input field"),
			ElementRole::Submit => write!(f, "submit control"),
			ElementRole::Response => write!(f, "response container"),
		}
	}
}

/// Visibility requirement for [`locate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateMode {
	/// Visible-first pass with existence fallback.
	MustBeVisible,
	/// Existence-only pass.
	Any,
}

/// Finds a usable element from an ordered candidate chain.
///
/// The timeout budget is divided evenly across candidates; each candidate
/// gets one bounded wait for a visible match, in priority order. If the
/// whole visible pass comes up empty, one existence-only pass runs over the
/// same chain, returning the first element present in the DOM regardless of
/// visibility. No candidate is probed twice within a pass.
pub async fn locate(
	page: &dyn PageController,
	target: TargetId,
	role: ElementRole,
	candidates: &[Locator],
	total_timeout: Duration,
	mode: LocateMode,
) -> Result<ElementHandle> {
	if candidates.is_empty() {
		return Err(ClientError::ElementNotFound {
			target,
			role,
			tried: 0,
		});
	}

	if mode == LocateMode::MustBeVisible {
		let slice = total_timeout / candidates.len() as u32;
		for locator in candidates {
			match page.wait_for_visible(locator, slice).await {
				Ok(element) => {
					debug!(target = "parley", %locator, %target, "located visible element");
					return Ok(element);
				}
				Err(err) => {
					debug!(target = "parley", %locator, %target, error = %err, "candidate missed, falling back");
				}
			}
		}
	}

	// Existence-only pass: visibility detection is unreliable on custom web
	// components, so a present-but-"invisible" node still counts.
	for locator in candidates {
		if let Ok(Some(element)) = page.query(locator).await {
			debug!(target = "parley", %locator, %target, "located element on existence pass");
			return Ok(element);
		}
	}

	Err(ClientError::ElementNotFound {
		target,
		role,
		tried: candidates.len(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn locator_display_forms() {
		assert_eq!(Locator::css("div.ProseMirror").to_string(), "css=div.ProseMirror");
		assert_eq!(
			Locator::role("button", "Send Message").to_string(),
			"role=button[name=Send Message]"
		);
		assert_eq!(Locator::any_role("textbox").to_string(), "role=textbox");
		assert_eq!(Locator::text("Stop responding").to_string(), "text=Stop responding");
	}

	#[test]
	fn locator_serializes_tagged() {
		let json = serde_json::to_value(Locator::css("#prompt-textarea")).unwrap();
		assert_eq!(
			json,
			serde_json::json!({ "kind": "css", "selector": "#prompt-textarea" })
		);
	}
}
