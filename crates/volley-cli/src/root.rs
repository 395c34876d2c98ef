use std::path::{Path, PathBuf};
use volley_core::paths::VOLLEY_DIR;

/// Resolve the project root.
///
/// Priority:
/// 1. `--root` flag / `VOLLEY_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.volley/`
/// 3. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd).unwrap_or(cwd)
}

fn find_upward(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(VOLLEY_DIR).is_dir())
        .map(Path::to_path_buf)
}
