//! Platform-specific application paths.

use std::{env, path::PathBuf};

/// Name of the configuration file looked up by [`find_config`]
pub const CONFIG_FILE_NAME: &str = "scchain.toml";

/// Find a configuration file from standard paths.
///
/// In GNU/Linux:
///     current directory | $XDG_CONFIG_HOME/scchain | /etc/scchain
///
/// In MacOS:
///     current directory | $HOME/Library/Preferences/scchain
pub fn find_config() -> Option<PathBuf> {
    let mut config_dirs = Vec::with_capacity(3);

    if let Ok(dir) = env::current_dir() {
        config_dirs.push(dir);
    }

    if let Some(dir) = directories_next::ProjectDirs::from("", "scchain", "scchain") {
        config_dirs.push(dir.config_dir().into());
    }

    if cfg!(unix) {
        config_dirs.push("/etc/scchain".into());
    }

    config_dirs
        .into_iter()
        .map(|path| path.join(CONFIG_FILE_NAME))
        .find(|path| path.exists())
}

/// Platform-specific path for storing chain data. Falls back to a relative `.scchain`.
pub fn data_dir() -> PathBuf {
    directories_next::ProjectDirs::from("", "scchain", "scchain")
        .map(|dir| dir.data_local_dir().into())
        .unwrap_or_else(|| PathBuf::from(".scchain"))
}
