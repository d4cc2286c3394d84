//! `connectivity test` command.

use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use meshctl_core::connectivity::{ConnectivityTest, Report, TestStatus};
use meshctl_core::flags::FlagSet;
use meshctl_sdk::host::{Connectivity, Run};

use crate::config::{self, Config};
use crate::flags::{FLAG_JSON, apply_matches};

pub async fn execute(
    mut run: Run<Connectivity>,
    mut flags: FlagSet,
    matches: &ArgMatches,
    config: &Config,
) -> Result<()> {
    apply_matches(matches, &mut flags).context("Invalid connectivity test flags")?;
    config::apply(&config.connectivity.flag_values(), &mut flags)?;
    let json = flags.get_bool(FLAG_JSON)?;

    let mut ct = ConnectivityTest::new(flags).context("Invalid connectivity test flags")?;
    ct.add_default_tests()?;
    run.attach(&mut ct)?;

    if !json {
        let selected = ct.tests().filter(|t| ct.is_selected(t.name())).count();
        println!("{}", "meshctl connectivity test".cyan().bold());
        println!("{}", "─".repeat(50));
        println!(
            "  namespace: {}  test namespace: {}  tests: {}",
            ct.params().namespace,
            ct.params().test_namespace,
            selected
        );
        println!();
    }

    let report = run.execute(ct).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.is_success() {
        bail!(
            "{} of {} connectivity tests failed",
            report.failed(),
            report.executed()
        );
    }
    Ok(())
}

fn print_report(report: &Report) {
    for result in &report.results {
        match result.status {
            TestStatus::Passed => println!(
                "  {} {} {}",
                "✓".green(),
                result.name,
                format!("({}ms)", result.duration_ms).dimmed()
            ),
            TestStatus::Failed => println!(
                "  {} {}: {}",
                "✗".red(),
                result.name,
                result.message.as_deref().unwrap_or("failed").red()
            ),
            TestStatus::Skipped => println!(
                "  {} {} {}",
                "○".yellow(),
                result.name,
                format!("({})", result.message.as_deref().unwrap_or("skipped")).dimmed()
            ),
        }
    }

    println!();
    let started = report.started_at.with_timezone(&chrono::Local);
    let line = format!(
        "{} passed, {} failed, {} skipped (started {})",
        report.passed(),
        report.failed(),
        report.skipped(),
        started.format("%H:%M:%S")
    );
    if report.is_success() {
        println!("{}", format!("✓ {}", line).green().bold());
    } else {
        println!("{}", format!("✗ {}", line).red().bold());
    }
}
