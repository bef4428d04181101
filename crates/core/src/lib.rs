//! Browser-driven cross-model debate core.
//!
//! parley drives real browser sessions against multiple AI-assistant chat
//! sites concurrently, streams each answer by polling the live DOM, and can
//! feed every answer back through one of the assistants for a synthesis
//! round. The target UIs change their markup without notice, so everything
//! here is built to degrade gracefully: ordered selector fallback chains,
//! retry with backoff around submission, and partial results over hard
//! failure.
//!
//! The crate never talks to a browser directly. All DOM access goes through
//! the [`page::PageController`] capability, injected at construction time;
//! production backends and the scripted test double both live behind that
//! one trait.

pub mod client;
pub mod config;
pub mod error;
pub mod locator;
pub mod orchestrator;
pub mod page;
pub mod session;
pub mod stream;
pub mod target;
pub mod testing;
pub mod triage;

pub use client::{OnChunk, OperatorSignal, TargetClient};
pub use config::{ClientConfig, RetryPolicy, StreamTuning};
pub use error::{ClientError, Result};
pub use locator::{ElementRole, LocateMode, Locator, locate};
pub use orchestrator::{AuthStatus, OnUpdate, Orchestrator, ResponseMap};
pub use page::{Cookie, ElementHandle, LoadState, PageController, PageError, PageFactory};
pub use target::{TargetDescriptor, TargetId};
pub use triage::{build_composite_prompt, run_triage};
