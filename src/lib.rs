// ABOUTME: tether operator console: CLI arguments, logging, console parsing and rendering.
// ABOUTME: The session layer itself lives in tether-core.

pub mod cli;
pub mod logging;
pub mod render;
pub mod repl;
