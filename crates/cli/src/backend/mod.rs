//! Concrete page-controller backends.
//!
//! The core only sees the `PageController`/`PageFactory` traits; which
//! driver sits behind them is decided here, at construction time. The
//! chromiumoxide backend is cargo-feature-gated so the CLI can build
//! without the CDP dependency tree.

#[cfg(feature = "chromium")]
pub mod chromium;

use std::sync::Arc;

use anyhow::Result;
use clap::ValueEnum;
use parley::page::PageFactory;

/// Automation backend selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
	/// CDP-driven Chromium via chromiumoxide.
	#[default]
	Chromium,
}

impl std::fmt::Display for BackendKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			BackendKind::Chromium => write!(f, "chromium"),
		}
	}
}

/// Builds the page factory for `kind`.
pub fn new_factory(kind: BackendKind) -> Result<Arc<dyn PageFactory>> {
	match kind {
		BackendKind::Chromium => {
			#[cfg(feature = "chromium")]
			{
				Ok(Arc::new(chromium::ChromiumFactory::new()))
			}
			#[cfg(not(feature = "chromium"))]
			{
				anyhow::bail!("parley was built without the chromium backend feature")
			}
		}
	}
}
