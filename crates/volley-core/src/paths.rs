use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const VOLLEY_DIR: &str = ".volley";
pub const CACHE_DIR: &str = ".volley/cache";

pub const CONFIG_FILE: &str = ".volley/config.yaml";
pub const MAP_FILE: &str = ".volley/map.json";
pub const SESSION_FILE: &str = ".volley/session.json";
pub const SNAPSHOT_FILE: &str = ".volley/cache/schedule.json";
pub const SENTINEL_FILE: &str = ".volley/cache/captcha.flag";

/// Default declarative input, relative to the project root.
pub const DEFAULT_INPUT: &str = "attacks.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn volley_dir(root: &Path) -> PathBuf {
    root.join(VOLLEY_DIR)
}

pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn map_path(root: &Path) -> PathBuf {
    root.join(MAP_FILE)
}

pub fn session_path(root: &Path) -> PathBuf {
    root.join(SESSION_FILE)
}

pub fn snapshot_path(root: &Path) -> PathBuf {
    root.join(SNAPSHOT_FILE)
}

pub fn sentinel_path(root: &Path) -> PathBuf {
    root.join(SENTINEL_FILE)
}

pub fn default_input_path(root: &Path) -> PathBuf {
    root.join(DEFAULT_INPUT)
}
