use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use leadflow_core::{
    config::{Config, WarnLevel},
    types::Channel,
};
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show the effective configuration, including the sequence plans in use
    Show,

    /// Validate the config for common mistakes
    Validate,
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let catalog = config.catalog();

    if json {
        let steps: Vec<_> = catalog.all_steps().collect();
        return print_json(&serde_json::json!({
            "config": config,
            "sequences": steps,
        }));
    }

    println!("Project: {}", config.project.name);
    println!(
        "Day boundary: {}",
        match config.utc_offset_minutes {
            Some(m) => format!("UTC{:+03}:{:02}", m / 60, (m % 60).abs()),
            None => "host local time".to_string(),
        }
    );
    println!(
        "Dispatcher: {}",
        config
            .relay
            .as_ref()
            .map(|r| format!("relay {}", r.url))
            .unwrap_or_else(|| "none (tick needs --dry-run)".to_string())
    );
    println!();
    let rows = Channel::all()
        .iter()
        .map(|&ch| {
            vec![
                ch.to_string(),
                config.caps.for_channel(ch).to_string(),
                config.channels.for_channel(ch).min_tier.to_string(),
            ]
        })
        .collect();
    print_table(&["CHANNEL", "DAILY CAP", "MIN TIER"], rows);

    println!();
    let rows = catalog
        .all_steps()
        .map(|s| {
            vec![
                s.vertical.clone(),
                s.channel.to_string(),
                s.step_index.to_string(),
                format!("+{}d", s.delay_days),
                s.subject.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["VERTICAL", "CHANNEL", "STEP", "DELAY", "SUBJECT"], rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
