//! Target identifiers and their DOM locator registries.
//!
//! Selector chains are centralized here for easy updates when the target
//! UIs change. Every chain is ordered by decreasing reliability: the
//! primary locator first, hand-tuned fallbacks after it.

use serde::{Deserialize, Serialize};

use crate::locator::Locator;

/// One external chat web interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetId {
	Claude,
	#[serde(rename = "chatgpt")]
	ChatGpt,
	Gemini,
}

impl TargetId {
	/// Every supported target, in the order they are usually reported.
	pub fn all() -> [TargetId; 3] {
		[TargetId::Claude, TargetId::ChatGpt, TargetId::Gemini]
	}

	/// Human-facing name used in prompts and terminal output.
	pub fn display_name(&self) -> &'static str {
		match self {
			TargetId::Claude => "Claude",
			TargetId::ChatGpt => "ChatGPT",
			TargetId::Gemini => "Gemini",
		}
	}
}

impl std::fmt::Display for TargetId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			TargetId::Claude => write!(f, "claude"),
			TargetId::ChatGpt => write!(f, "chatgpt"),
			TargetId::Gemini => write!(f, "gemini"),
		}
	}
}

impl std::str::FromStr for TargetId {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"claude" => Ok(TargetId::Claude),
			"chatgpt" => Ok(TargetId::ChatGpt),
			"gemini" => Ok(TargetId::Gemini),
			other => Err(format!(
				"unknown target: {other} (expected claude, chatgpt, or gemini)"
			)),
		}
	}
}

/// Static description of one target: URLs plus locator chains for every
/// role the submission pipeline needs.
///
/// Invariant: the three role chains are non-empty and ordered primary-first.
#[derive(Debug, Clone)]
pub struct TargetDescriptor {
	pub id: TargetId,
	/// Landing page; unauthenticated users get redirected to a login screen
	/// here, which is what the auth heuristic relies on.
	pub landing_url: String,
	/// Fresh-conversation entry point used for every prompt.
	pub new_chat_url: String,
	pub input_locators: Vec<Locator>,
	pub submit_locators: Vec<Locator>,
	pub response_locators: Vec<Locator>,
	/// Control visible only while generation is in progress.
	pub stop_locator: Option<Locator>,
	/// Element present once the response has finished streaming.
	pub complete_locator: Option<Locator>,
}

impl TargetDescriptor {
	/// Built-in registry entry for `id`.
	pub fn for_target(id: TargetId) -> Self {
		match id {
			TargetId::Claude => claude(),
			TargetId::ChatGpt => chatgpt(),
			TargetId::Gemini => gemini(),
		}
	}
}

fn claude() -> TargetDescriptor {
	TargetDescriptor {
		id: TargetId::Claude,
		landing_url: "https://claude.ai".into(),
		new_chat_url: "https://claude.ai/new".into(),
		// Primary: the ProseMirror contenteditable editor.
		input_locators: vec![
			Locator::css("div.ProseMirror[contenteditable='true']"),
			Locator::css("[contenteditable='true'].ProseMirror"),
			Locator::css("div[contenteditable='true']"),
			Locator::css("[data-placeholder*='message']"),
			Locator::css("fieldset [contenteditable='true']"),
		],
		submit_locators: vec![
			Locator::role("button", "Send Message"),
			Locator::css("button[type='submit']"),
			Locator::css("button:has(svg[data-icon='send'])"),
			Locator::css("[aria-label*='Send']"),
			Locator::css("button[data-testid='send-button']"),
		],
		response_locators: vec![
			Locator::css("div[data-is-streaming]"),
			Locator::css("[data-message-author='assistant']"),
			Locator::css(".assistant-message"),
			Locator::css("[class*='response']"),
			Locator::css("[class*='message'][class*='assistant']"),
		],
		stop_locator: Some(Locator::role("button", "Stop Response")),
		complete_locator: Some(Locator::css("div[data-is-streaming='false']")),
	}
}

fn chatgpt() -> TargetDescriptor {
	TargetDescriptor {
		id: TargetId::ChatGpt,
		landing_url: "https://chatgpt.com".into(),
		new_chat_url: "https://chatgpt.com/".into(),
		// Contenteditable div, not a textarea.
		input_locators: vec![
			Locator::css("div#prompt-textarea[contenteditable='true']"),
			Locator::css("#prompt-textarea"),
			Locator::css("[contenteditable='true'][data-placeholder]"),
			Locator::css("textarea[placeholder*='message']"),
			Locator::css("[contenteditable='true']"),
			Locator::any_role("textbox"),
		],
		submit_locators: vec![
			Locator::css("button[data-testid='send-button']"),
			Locator::role("button", "Send prompt"),
			Locator::role("button", "Send message"),
			Locator::css("form button[type='submit']"),
			Locator::css("button.send-button"),
		],
		// Target the markdown prose inside the assistant turn, not the wrapper.
		response_locators: vec![
			Locator::css("div[data-message-author-role='assistant'] .markdown.prose"),
			Locator::css("div[data-message-author-role='assistant'] .prose"),
			Locator::css("div[data-message-author-role='assistant'] .markdown"),
			Locator::css("[data-message-author-role='assistant'] div.whitespace-pre-wrap"),
			Locator::css(".agent-turn .markdown"),
		],
		stop_locator: Some(Locator::role("button", "Stop generating")),
		complete_locator: None,
	}
}

fn gemini() -> TargetDescriptor {
	TargetDescriptor {
		id: TargetId::Gemini,
		landing_url: "https://gemini.google.com".into(),
		new_chat_url: "https://gemini.google.com/app".into(),
		// Custom web components; visibility detection is flaky here, which
		// is what the existence-only locate pass is for.
		input_locators: vec![
			Locator::css("rich-textarea div[contenteditable='true']"),
			Locator::css(".ql-editor[contenteditable='true']"),
			Locator::css("[aria-label*='Enter a prompt']"),
			Locator::css("div[contenteditable='true']"),
			Locator::css("rich-textarea [contenteditable='true']"),
		],
		submit_locators: vec![
			Locator::css("button.send-button"),
			Locator::role("button", "Send message"),
			Locator::role("button", "Submit"),
			Locator::css("button[data-test-id='send-button']"),
		],
		response_locators: vec![
			Locator::css(".model-response-text .markdown-main-panel"),
			Locator::css(".response-content"),
			Locator::css("message-content .markdown"),
			Locator::css(".model-response-text"),
			Locator::css(".conversation-container .model-response"),
		],
		stop_locator: Some(Locator::role("button", "Stop responding")),
		complete_locator: None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn every_builtin_has_nonempty_ordered_chains() {
		for id in TargetId::all() {
			let descriptor = TargetDescriptor::for_target(id);
			assert_eq!(descriptor.id, id);
			assert!(!descriptor.input_locators.is_empty(), "{id} inputs");
			assert!(!descriptor.submit_locators.is_empty(), "{id} submits");
			assert!(!descriptor.response_locators.is_empty(), "{id} responses");
			assert!(descriptor.landing_url.starts_with("https://"));
			assert!(descriptor.new_chat_url.starts_with("https://"));
		}
	}

	#[test]
	fn target_id_round_trips_through_serde_and_fromstr() {
		for id in TargetId::all() {
			let json = serde_json::to_string(&id).unwrap();
			let back: TargetId = serde_json::from_str(&json).unwrap();
			assert_eq!(back, id);
			assert_eq!(id.to_string().parse::<TargetId>().unwrap(), id);
		}
		assert_eq!(serde_json::to_string(&TargetId::ChatGpt).unwrap(), "\"chatgpt\"");
	}

	#[test]
	fn unknown_target_is_rejected() {
		assert!("copilot".parse::<TargetId>().is_err());
	}

	#[test]
	fn claude_defines_both_completion_signals() {
		let descriptor = TargetDescriptor::for_target(TargetId::Claude);
		assert!(descriptor.stop_locator.is_some());
		assert!(descriptor.complete_locator.is_some());
	}
}
