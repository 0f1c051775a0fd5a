//! Configuration file discovery.
//!
//! An explicit path always wins. Otherwise `shoal.toml` in the working
//! directory is used, then the per-user file under the platform config dir.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// The configuration filename.
pub const CONFIG_FILENAME: &str = "shoal.toml";

/// Finds the configuration file to load.
///
/// Returns `None` when no explicit path is given and neither the local nor the
/// global file exists, in which case defaults apply.
pub fn discover_config_file(explicit: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let local = cwd.join(CONFIG_FILENAME);
    if local.is_file() {
        return Some(local);
    }

    global_config_path().filter(|path| path.is_file())
}

/// Returns the path of the per-user configuration file.
///
/// Returns `None` if no home directory can be determined.
pub fn global_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "shoal").map(|dirs| dirs.config_dir().join(CONFIG_FILENAME))
}
