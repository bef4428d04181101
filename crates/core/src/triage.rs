//! Second-round synthesis: fold every target's answer into one composite
//! prompt and run it through a single already-started client.

use std::time::Duration;

use tracing::info;

use crate::client::{OnChunk, TargetClient};
use crate::error::Result;
use crate::orchestrator::ResponseMap;
use crate::target::TargetId;

/// Structure instructions embedded in every composite prompt. Unified
/// analysis: consensus, arbitration of disagreements, and a merged answer
/// in one pass.
const ANALYSIS_INSTRUCTIONS: &str = "\
When analyzing the responses below, structure your analysis in exactly this format:

## Consensus Points
List facts and conclusions where the models agree. These represent high-confidence information.

## Key Disagreements
Identify where the models conflict or provide different answers. For each disagreement:
- State the conflicting positions
- Evaluate the reasoning quality
- Indicate which position seems most credible (or mark as \"needs verification\")

## Synthesized Answer
Merge the best insights from all responses into a coherent, comprehensive answer.
- Integrate complementary perspectives
- Attribute unique insights when valuable (e.g., \"As noted by one model...\")
- Remove redundancy while preserving nuance

Be concise but thorough. The goal is to give the user maximum value from consulting multiple AI models.";

/// Renders the composite synthesis prompt.
///
/// Deterministic: same inputs, same string. Every target in `targets` gets
/// a section; a target with no entry in `responses` is rendered as the
/// explicit placeholder `[No response from <target>]` — distinct from an
/// error placeholder, which is a real entry and is embedded verbatim.
pub fn build_composite_prompt(
	original_prompt: &str,
	responses: &ResponseMap,
	targets: &[TargetId],
) -> String {
	let names: Vec<&str> = targets.iter().map(|t| t.display_name()).collect();

	let mut prompt = format!(
		"You are analyzing responses from {} AI models: {}.\n\n{}\n\n---\n\nORIGINAL QUESTION:\n{}",
		targets.len(),
		names.join(", "),
		ANALYSIS_INSTRUCTIONS,
		original_prompt,
	);

	for target in targets {
		prompt.push_str("\n\n---\n\n");
		prompt.push_str(&target.display_name().to_uppercase());
		prompt.push_str("'S RESPONSE:\n");
		match responses.get(target) {
			Some(text) => prompt.push_str(text),
			_ => {
				prompt.push_str("[No response from ");
				prompt.push_str(target.display_name());
				prompt.push(']');
			}
		}
	}

	prompt.push_str("\n\n---\n\nNow provide your unified analysis:");
	prompt
}

/// Runs the synthesis round through one already-started client, reusing its
/// authenticated session. This is an ordinary `send_prompt`, applied
/// sequentially after the debate round.
pub async fn run_triage(
	client: &TargetClient,
	original_prompt: &str,
	responses: &ResponseMap,
	targets: &[TargetId],
	on_chunk: Option<OnChunk>,
	timeout: Duration,
) -> Result<String> {
	let prompt = build_composite_prompt(original_prompt, responses, targets);
	info!(
		target = "parley",
		site = %client.target(),
		prompt_chars = prompt.len(),
		"running synthesis round"
	);
	client.send_prompt(&prompt, on_chunk, timeout).await
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_target_renders_explicit_placeholder() {
		let mut responses = ResponseMap::new();
		responses.insert(TargetId::Claude, "a".into());
		responses.insert(TargetId::ChatGpt, "b".into());

		let prompt = build_composite_prompt("X?", &responses, &TargetId::all());
		assert!(prompt.contains("[No response from Gemini]"));
		assert!(!prompt.contains("None"));
	}

	#[test]
	fn prompt_embeds_question_and_every_response() {
		let mut responses = ResponseMap::new();
		responses.insert(TargetId::Claude, "Rust is great".into());
		responses.insert(TargetId::ChatGpt, "Go is fine".into());
		responses.insert(TargetId::Gemini, "Use both".into());

		let prompt = build_composite_prompt("Rust or Go?", &responses, &TargetId::all());
		assert!(prompt.contains("ORIGINAL QUESTION:\nRust or Go?"));
		assert!(prompt.contains("CLAUDE'S RESPONSE:\nRust is great"));
		assert!(prompt.contains("CHATGPT'S RESPONSE:\nGo is fine"));
		assert!(prompt.contains("GEMINI'S RESPONSE:\nUse both"));
		assert!(prompt.ends_with("Now provide your unified analysis:"));
	}

	#[test]
	fn prompt_requests_all_three_sections() {
		let prompt = build_composite_prompt("Q", &ResponseMap::new(), &TargetId::all());
		assert!(prompt.contains("## Consensus Points"));
		assert!(prompt.contains("## Key Disagreements"));
		assert!(prompt.contains("## Synthesized Answer"));
	}

	#[test]
	fn error_placeholder_entries_are_embedded_verbatim() {
		let mut responses = ResponseMap::new();
		responses.insert(TargetId::Claude, "[Error: ResponseTimeout: ...]".into());

		let prompt = build_composite_prompt("Q", &responses, &[TargetId::Claude]);
		assert!(prompt.contains("CLAUDE'S RESPONSE:\n[Error: ResponseTimeout: ...]"));
		assert!(!prompt.contains("[No response from Claude]"));
	}

	#[test]
	fn rendering_is_deterministic() {
		let mut responses = ResponseMap::new();
		responses.insert(TargetId::Gemini, "z".into());
		let first = build_composite_prompt("Q?", &responses, &TargetId::all());
		let second = build_composite_prompt("Q?", &responses, &TargetId::all());
		assert_eq!(first, second);
	}
}
