use crate::output::print_json;
use anyhow::Context;
use leadflow_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path, name: Option<&str>, json: bool) -> anyhow::Result<()> {
    let project_name = name.map(str::to_string).unwrap_or_else(|| {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "leadflow".to_string())
    });

    let config_path = paths::config_path(root);
    let created_config = if config_path.exists() {
        false
    } else {
        Config::new(&project_name)
            .save(root)
            .context("failed to write config.yaml")?;
        true
    };

    let db_path = paths::db_path(root);
    let created_db = !db_path.exists();
    super::open_store(&db_path, super::STORE_LOCK_WAIT)?;

    io::ensure_gitignore_entry(root, paths::DB_FILE).context("failed to update .gitignore")?;

    if json {
        return print_json(&serde_json::json!({
            "root": root.display().to_string(),
            "config_created": created_config,
            "store_created": created_db,
        }));
    }

    println!("Initializing leadflow in: {}", root.display());
    let status = |created: bool| if created { "created:" } else { "exists: " };
    println!("  {} {}", status(created_config), paths::CONFIG_FILE);
    println!("  {} {}", status(created_db), paths::DB_FILE);
    Ok(())
}
