use leadflow_core::paths::LEADFLOW_DIR;
use std::path::{Path, PathBuf};

/// Resolve the project root.
///
/// Priority:
/// 1. `--root` flag / `LEADFLOW_ROOT` env var (passed in as `explicit`)
/// 2. Nearest ancestor of the cwd containing `.leadflow/`
/// 3. The cwd
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_project(&cwd).unwrap_or(cwd)
}

fn find_project(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(LEADFLOW_DIR).is_dir())
        .map(Path::to_path_buf)
}
