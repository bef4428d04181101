//! parley CLI internals: argument tree, logging bootstrap, command flows,
//! the WebSocket streaming server, and the concrete browser backend.

pub mod backend;
pub mod cli;
pub mod commands;
pub mod logging;
pub mod server;
