use directories::ProjectDirs;
use std::path::PathBuf;

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE: &str = "config.json";

/// Location of the user configuration file (`~/.config/streamctl/config.json`
/// on Linux).
///
/// Returns `None` when no home directory can be determined.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "streamctl").map(|project| project.config_dir().join(CONFIG_FILE))
}
