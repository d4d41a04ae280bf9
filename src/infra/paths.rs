// src/infra/paths.rs — Config path resolution
//
// CHATKEEP_HOME overrides everything. Otherwise config lives in ~/.chatkeep/.

use std::path::PathBuf;

/// Returns the CHATKEEP_HOME override, if set.
fn chatkeep_home() -> Option<PathBuf> {
    std::env::var_os("CHATKEEP_HOME").map(PathBuf::from)
}

/// Configuration directory: $CHATKEEP_HOME/ or ~/.chatkeep/
pub fn config_dir() -> PathBuf {
    if let Some(home) = chatkeep_home() {
        return home;
    }
    dirs_home().join(".chatkeep")
}

/// Home directory, falling back to the working directory when none is known.
pub fn dirs_home() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}
