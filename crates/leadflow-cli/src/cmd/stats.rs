use crate::output::print_json;
use chrono::Utc;
use leadflow_core::stats::pipeline_stats;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let project = super::open(root)?;
    let day = project.config.day_clock()?.day_of(Utc::now());
    let stats = pipeline_stats(&project.store, day, &project.config.caps)?;

    if json {
        return print_json(&stats);
    }

    println!("Pipeline: {}", project.config.project.name);
    println!("  total leads:     {}", stats.total_leads);
    println!("  opted out:       {}", stats.opted_out);
    println!("  conversion rate: {:.1}%", stats.conversion_rate);

    if !stats.by_stage.is_empty() {
        println!();
        println!("By stage:");
        for (stage, n) in &stats.by_stage {
            println!("  {:<10} {n}", stage.to_string());
        }
        println!();
        println!("By tier:");
        for (tier, n) in &stats.by_tier {
            println!("  {:<10} {n}", tier.to_string());
        }
        println!();
        println!("By vertical:");
        for (vertical, n) in &stats.by_vertical {
            println!("  {vertical:<14} {n}");
        }
    }

    println!();
    println!("Today ({day}):");
    for usage in &stats.today {
        println!(
            "  {:<6} {:>4} / {:<4} ({} left)",
            usage.channel.to_string(),
            usage.used,
            usage.cap,
            usage.remaining()
        );
    }
    Ok(())
}
