//! `sysdump` command.

use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use meshctl_core::flags::FlagSet;
use meshctl_core::sysdump::{Collector, SUMMARY_FILE, Summary, TaskStatus};
use meshctl_sdk::host::{Run, Sysdump};

use crate::config::{self, Config};
use crate::flags::{FLAG_JSON, apply_matches};

/// Collect the dump. Failed tasks are reported but do not fail the command.
pub async fn execute(
    mut run: Run<Sysdump>,
    mut flags: FlagSet,
    matches: &ArgMatches,
    config: &Config,
) -> Result<()> {
    apply_matches(matches, &mut flags).context("Invalid sysdump flags")?;
    config::apply(&config.sysdump.flag_values(), &mut flags)?;
    let json = flags.get_bool(FLAG_JSON)?;

    let mut collector = Collector::new(flags).context("Invalid sysdump flags")?;
    collector.add_default_tasks()?;
    run.attach(&mut collector)?;

    if !json {
        println!("{}", "meshctl sysdump".cyan().bold());
        println!("{}", "─".repeat(50));
        println!(
            "  tasks: {}  workers: {}{}",
            collector.task_count(),
            collector.options().worker_count,
            if collector.options().quick { "  (quick)" } else { "" }
        );
        println!();
    }

    let summary = run.execute(collector).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &Summary) {
    for task in &summary.tasks {
        match task.status {
            TaskStatus::Completed => println!("  {} {}", "✓".green(), task.name),
            TaskStatus::Failed => println!(
                "  {} {}: {}",
                "✗".red(),
                task.name,
                task.message.as_deref().unwrap_or("failed").red()
            ),
            TaskStatus::Skipped => println!(
                "  {} {} {}",
                "○".yellow(),
                task.name,
                format!("({})", task.message.as_deref().unwrap_or("skipped")).dimmed()
            ),
        }
    }

    println!();
    if summary.is_complete() {
        println!("{}", "✓ Sysdump collected".green().bold());
    } else {
        println!(
            "{}",
            format!("○ Sysdump collected with {} failed task(s)", summary.failed())
                .yellow()
                .bold()
        );
    }
    println!("  {}", summary.directory.display());
    println!("  {}", summary.directory.join(SUMMARY_FILE).display().to_string().dimmed());
}
