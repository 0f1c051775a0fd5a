//! Shared context for running CLI commands.

use std::{
    env,
    path::{Path, PathBuf},
    process::ExitCode,
};

use shoal_config::{CONFIG_FILENAME, Config};
use tokio::runtime::{Builder, Runtime};

/// Command execution context built once per CLI invocation.
pub struct CommandContext {
    /// Current working directory.
    pub cwd: PathBuf,
    /// Loaded configuration (default if no config file was found).
    pub config: Config,
    /// Path given with `--config`, if any.
    pub explicit_config: Option<PathBuf>,
}

impl CommandContext {
    /// Loads the current directory and configuration.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ExitCode> {
        let cwd = current_dir_or_failure()?;
        let config = Config::load(explicit, &cwd).map_err(|e| {
            eprintln!("error: failed to load configuration: {e}");
            ExitCode::FAILURE
        })?;
        Ok(Self {
            cwd,
            config,
            explicit_config: explicit.map(Path::to_path_buf),
        })
    }

    /// Loads only the current directory, skipping configuration parsing.
    ///
    /// Used by `init`, which must work even when an existing file is invalid.
    pub fn load_cwd_only(explicit: Option<&Path>) -> Result<Self, ExitCode> {
        Ok(Self {
            cwd: current_dir_or_failure()?,
            config: Config::default(),
            explicit_config: explicit.map(Path::to_path_buf),
        })
    }

    /// Returns where `init` writes the configuration file.
    pub fn config_target(&self) -> PathBuf {
        self.explicit_config
            .clone()
            .unwrap_or_else(|| self.cwd.join(CONFIG_FILENAME))
    }

    /// Builds the async runtime for commands that talk to the network.
    pub fn runtime(&self) -> Result<Runtime, ExitCode> {
        Builder::new_multi_thread().enable_all().build().map_err(|e| {
            eprintln!("error: failed to start async runtime: {e}");
            ExitCode::FAILURE
        })
    }
}

/// Returns the current working directory or exits with a consistent error.
fn current_dir_or_failure() -> Result<PathBuf, ExitCode> {
    env::current_dir().map_err(|e| {
        eprintln!("error: could not determine current directory: {e}");
        ExitCode::FAILURE
    })
}
