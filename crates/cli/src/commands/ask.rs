//! One full debate + synthesis round in the terminal.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use parley::client::OnChunk;
use parley::orchestrator::{OnUpdate, Orchestrator};
use parley::triage::run_triage;
use tracing::debug;

use crate::backend::new_factory;
use crate::cli::AskArgs;
use crate::commands::{client_config, targets_or_all};

pub async fn run(args: AskArgs) -> Result<()> {
	let factory = new_factory(args.session.backend)?;
	let config = client_config(&args.session);
	let targets = targets_or_all(&args.session);
	let timeout = Duration::from_secs(args.timeout);

	let mut orchestrator = Orchestrator::new(factory, config, targets.clone());
	println!("{}", "Starting browser sessions...".cyan());
	orchestrator.start().await?;

	println!("{}", "Checking authentication...".cyan());
	let auth = orchestrator.check_auth().await;
	if let Err(err) = Orchestrator::require_authenticated(&auth) {
		let missing: Vec<String> = auth
			.iter()
			.filter(|(_, authenticated)| !**authenticated)
			.map(|(target, _)| target.to_string())
			.collect();
		orchestrator.stop().await;
		return Err(err).with_context(|| {
			format!(
				"not authenticated to: {}. Run `parley setup` first.",
				missing.join(", ")
			)
		});
	}

	println!(
		"{}",
		format!(
			"Querying {} in parallel...",
			orchestrator
				.targets()
				.iter()
				.map(|target| target.display_name())
				.collect::<Vec<_>>()
				.join(", ")
		)
		.cyan()
	);

	let progress: OnUpdate = Arc::new(|target, chunk: &str| {
		debug!(target = "parley", site = %target, chars = chunk.len(), "chunk received");
	});
	let responses = orchestrator
		.debate(&args.prompt, Some(progress), timeout)
		.await;

	for (target, text) in &responses {
		println!();
		println!("{}", format!("── {} ──", target.display_name()).bold().cyan());
		println!("{text}");
	}

	if !args.no_triage {
		match orchestrator.client(args.triage_target) {
			Some(client) => {
				println!();
				println!("{}", "── Synthesis ──".bold().magenta());
				let on_chunk: OnChunk = Box::new(|chunk: &str| {
					print!("{chunk}");
					let _ = std::io::stdout().flush();
				});
				match run_triage(
					&client,
					&args.prompt,
					&responses,
					&targets,
					Some(on_chunk),
					timeout,
				)
				.await
				{
					Ok(_) => println!(),
					Err(err) => {
						eprintln!("{} synthesis failed: {err}", "warning:".yellow())
					}
				}
			}
			_ => eprintln!(
				"{} triage target {} is unavailable, skipping synthesis",
				"warning:".yellow(),
				args.triage_target
			),
		}
	}

	orchestrator.stop().await;
	Ok(())
}
