//! Authentication status table.

use anyhow::Result;
use colored::Colorize;
use parley::orchestrator::Orchestrator;

use crate::backend::new_factory;
use crate::cli::SessionArgs;
use crate::commands::{client_config, targets_or_all};

pub async fn run(args: SessionArgs) -> Result<()> {
	let factory = new_factory(args.backend)?;
	let mut config = client_config(&args);
	// Status checks never need a visible window.
	config.headless = true;
	let targets = targets_or_all(&args);

	println!("{}", "Checking authentication status...".cyan());
	let mut orchestrator = Orchestrator::new(factory, config, targets);
	orchestrator.start().await?;

	let auth = orchestrator.check_auth().await;
	println!();
	for (target, authenticated) in &auth {
		if *authenticated {
			println!("  {} {}: authenticated", "✓".green(), target);
		} else {
			println!("  {} {}: not authenticated", "✗".red(), target);
		}
	}

	if auth.values().any(|authenticated| !authenticated) {
		println!();
		println!("{}", "Run `parley setup` to authenticate.".yellow());
	}

	orchestrator.stop().await;
	Ok(())
}
