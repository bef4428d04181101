//! Wire types shared between the debate core and its hosting surfaces.
//!
//! These are pure data definitions; all behavior lives in `parley` and the
//! CLI/server that consume them.

mod events;

pub use events::{ClientRequest, DebateEvent};

/// Source label used for synthesis-round events.
pub const SYNTHESIS_SOURCE: &str = "synthesis";

/// Source label used for events that concern no single target.
pub const SYSTEM_SOURCE: &str = "system";
