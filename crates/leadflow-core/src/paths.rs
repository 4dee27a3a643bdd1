use std::path::{Path, PathBuf};

pub const LEADFLOW_DIR: &str = ".leadflow";
pub const CONFIG_FILE: &str = ".leadflow/config.yaml";
pub const DB_FILE: &str = ".leadflow/leads.redb";

pub fn leadflow_dir(root: &Path) -> PathBuf {
    root.join(LEADFLOW_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn db_path(root: &Path) -> PathBuf {
    root.join(DB_FILE)
}

/// Whether `root` holds an initialized project.
pub fn is_initialized(root: &Path) -> bool {
    config_path(root).is_file()
}
