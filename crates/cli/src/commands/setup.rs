//! Interactive login flow. The one human-in-the-loop operation: a headed
//! browser opens each unauthenticated target and blocks until the operator
//! confirms login.

use anyhow::Result;
use async_trait::async_trait;
use colored::Colorize;
use parley::client::OperatorSignal;
use parley::orchestrator::Orchestrator;
use parley::target::TargetId;
use tracing::warn;

use crate::backend::new_factory;
use crate::cli::SessionArgs;
use crate::commands::{client_config, targets_or_all};

/// Waits for the operator to press Enter in the terminal.
struct StdinOperator;

#[async_trait]
impl OperatorSignal for StdinOperator {
	async fn confirm(&self, target: TargetId) {
		println!();
		println!("{}", "=".repeat(60).cyan());
		println!(
			"{}",
			format!("[{}] MANUAL LOGIN REQUIRED", target.display_name().to_uppercase()).bold()
		);
		println!("{}", "=".repeat(60).cyan());
		println!("1. Complete any human-verification challenge");
		println!("2. Log in with your credentials");
		println!("3. Make sure you end up on the main chat page");
		println!("4. Press Enter here when done...");
		println!("{}", "=".repeat(60).cyan());

		let _ = tokio::task::spawn_blocking(|| {
			let mut line = String::new();
			let _ = std::io::stdin().read_line(&mut line);
		})
		.await;
	}
}

pub async fn run(args: SessionArgs) -> Result<()> {
	let factory = new_factory(args.backend)?;
	let mut config = client_config(&args);
	// The operator has to see and drive the login pages.
	config.headless = false;
	let targets = targets_or_all(&args);

	println!("{}", "Starting browser sessions for login...".cyan());
	let mut orchestrator = Orchestrator::new(factory, config, targets);
	orchestrator.start().await?;

	let auth = orchestrator.check_auth().await;
	let operator = StdinOperator;

	for (target, authenticated) in &auth {
		if *authenticated {
			println!("  {} {}: already authenticated", "✓".green(), target);
			continue;
		}
		let Some(client) = orchestrator.client(*target) else {
			continue;
		};
		if let Err(err) = client.setup_auth(&operator).await {
			warn!(target = "parley", site = %target, error = %err, "auth setup failed");
			eprintln!("  {} {}: setup failed: {err}", "✗".red(), target);
		}
	}

	println!();
	println!("{}", "Setup complete. You can now run `parley ask`.".green());
	orchestrator.stop().await;
	Ok(())
}
