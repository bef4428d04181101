//! WebSocket streaming server bootstrap.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::info;

use crate::cli::ServeArgs;
use crate::commands::{client_config, targets_or_all};
use crate::server::{self, ServerState};

pub async fn run(args: ServeArgs) -> Result<()> {
	let state = Arc::new(ServerState {
		backend: args.session.backend,
		config: client_config(&args.session),
		targets: targets_or_all(&args.session),
		timeout: Duration::from_secs(args.timeout),
	});

	let app = server::router(state);
	let addr = format!("{}:{}", args.host, args.port);
	let listener = tokio::net::TcpListener::bind(&addr)
		.await
		.with_context(|| format!("failed to bind {addr}"))?;

	info!(target = "parley.server", %addr, "listening");
	println!(
		"{}",
		format!("Serving on http://{addr} (WebSocket at /ws)").cyan()
	);
	axum::serve(listener, app).await.context("server error")?;
	Ok(())
}
