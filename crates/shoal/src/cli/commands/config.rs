//! Implementation of `shoal config`.

use std::process::ExitCode;

use crate::cli::context::CommandContext;

/// Prints the effective configuration as TOML, with warnings on stderr.
pub fn run(ctx: &CommandContext) -> ExitCode {
    let config = &ctx.config;
    match config.settings_to_toml() {
        Ok(toml) => print!("{toml}"),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    }
    for warning in config.validate() {
        eprintln!("warning: {warning}");
    }
    ExitCode::SUCCESS
}
