mod ask;
mod check;
mod serve;
mod setup;

use anyhow::Result;
use parley::config::ClientConfig;
use parley::target::TargetId;

use crate::cli::{Cli, Commands, SessionArgs};

pub async fn dispatch(cli: Cli) -> Result<()> {
	match cli.command {
		Commands::Ask(args) => ask::run(args).await,
		Commands::Check(args) => check::run(args).await,
		Commands::Setup(args) => setup::run(args).await,
		Commands::Serve(args) => serve::run(args).await,
	}
}

/// Builds the core client configuration from shared session flags.
pub(crate) fn client_config(session: &SessionArgs) -> ClientConfig {
	let mut config = ClientConfig::default();
	if let Some(dir) = &session.data_dir {
		config.data_dir = dir.clone();
	}
	config.headless = session.headless;
	config
}

/// Requested targets, defaulting to all three, deduplicated in order.
pub(crate) fn targets_or_all(session: &SessionArgs) -> Vec<TargetId> {
	if session.targets.is_empty() {
		return TargetId::all().to_vec();
	}
	let mut seen = Vec::new();
	for &target in &session.targets {
		if !seen.contains(&target) {
			seen.push(target);
		}
	}
	seen
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use super::*;

	#[test]
	fn empty_target_list_means_all() {
		let session = SessionArgs::default();
		assert_eq!(targets_or_all(&session), TargetId::all().to_vec());
	}

	#[test]
	fn duplicate_targets_collapse_in_order() {
		let session = SessionArgs {
			targets: vec![TargetId::Gemini, TargetId::Claude, TargetId::Gemini],
			..SessionArgs::default()
		};
		assert_eq!(
			targets_or_all(&session),
			vec![TargetId::Gemini, TargetId::Claude]
		);
	}

	#[test]
	fn session_flags_flow_into_config() {
		let session = SessionArgs {
			data_dir: Some(PathBuf::from("/tmp/parley-test")),
			headless: true,
			..SessionArgs::default()
		};
		let config = client_config(&session);
		assert_eq!(config.data_dir, PathBuf::from("/tmp/parley-test"));
		assert!(config.headless);
	}
}
