use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use parley::target::TargetId;

use crate::backend::BackendKind;

/// Root CLI for parley.
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Cross-model debate driver for browser chat sessions")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Query every target in parallel and synthesize their answers.
	Ask(AskArgs),
	/// Report authentication status for every target.
	Check(SessionArgs),
	/// Interactive login flow for targets that need it.
	Setup(SessionArgs),
	/// Serve the WebSocket streaming interface.
	Serve(ServeArgs),
}

/// Options shared by every command that opens browser sessions.
#[derive(Args, Debug, Clone, Default)]
pub struct SessionArgs {
	/// Targets to operate on, comma separated (defaults to all).
	#[arg(long, value_delimiter = ',', value_parser = parse_target)]
	pub targets: Vec<TargetId>,

	/// Root directory for per-target browser profiles.
	#[arg(long, value_name = "DIR")]
	pub data_dir: Option<PathBuf>,

	/// Run browsers headless.
	#[arg(long)]
	pub headless: bool,

	/// Browser automation backend.
	#[arg(long, value_enum, default_value_t = BackendKind::default())]
	pub backend: BackendKind,
}

#[derive(Args, Debug, Clone)]
pub struct AskArgs {
	/// The prompt to send to every target.
	#[arg(value_name = "PROMPT")]
	pub prompt: String,

	#[command(flatten)]
	pub session: SessionArgs,

	/// Skip the synthesis round.
	#[arg(long)]
	pub no_triage: bool,

	/// Target whose session runs the synthesis round.
	#[arg(long, value_parser = parse_target, default_value = "claude")]
	pub triage_target: TargetId,

	/// Per-target response budget in seconds.
	#[arg(long, default_value_t = 120)]
	pub timeout: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
	#[command(flatten)]
	pub session: SessionArgs,

	/// Listen port.
	#[arg(short, long, default_value_t = 8765)]
	pub port: u16,

	/// Bind address.
	#[arg(long, default_value = "127.0.0.1")]
	pub host: String,

	/// Per-target response budget in seconds.
	#[arg(long, default_value_t = 120)]
	pub timeout: u64,
}

fn parse_target(raw: &str) -> Result<TargetId, String> {
	raw.parse()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ask_parses_targets_and_timeout() {
		let cli = Cli::try_parse_from([
			"parley",
			"ask",
			"Is water wet?",
			"--targets",
			"claude,gemini",
			"--timeout",
			"30",
		])
		.unwrap();
		match cli.command {
			Commands::Ask(args) => {
				assert_eq!(args.prompt, "Is water wet?");
				assert_eq!(args.session.targets, vec![TargetId::Claude, TargetId::Gemini]);
				assert_eq!(args.timeout, 30);
				assert_eq!(args.triage_target, TargetId::Claude);
				assert!(!args.no_triage);
			}
			other => panic!("expected ask, got {other:?}"),
		}
	}

	#[test]
	fn unknown_target_is_a_parse_error() {
		let result = Cli::try_parse_from(["parley", "check", "--targets", "copilot"]);
		assert!(result.is_err());
	}

	#[test]
	fn serve_defaults() {
		let cli = Cli::try_parse_from(["parley", "serve"]).unwrap();
		match cli.command {
			Commands::Serve(args) => {
				assert_eq!(args.port, 8765);
				assert_eq!(args.host, "127.0.0.1");
				assert!(args.session.targets.is_empty());
			}
			other => panic!("expected serve, got {other:?}"),
		}
	}
}
