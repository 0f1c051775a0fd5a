//! CLI support for the `shoal` binary.

pub mod args;
pub mod commands;
pub mod context;

pub use context::CommandContext;
