//! `extensions` command.

use anyhow::Result;
use colored::Colorize;
use meshctl_core::flags::FlagSet;
use meshctl_sdk::ExtensionHost;

pub fn execute(host: &ExtensionHost, connectivity: &FlagSet, sysdump: &FlagSet) -> Result<()> {
    println!("{}", "Extensions".cyan().bold());
    println!("{}", "─".repeat(50));

    let extensions = host.extensions();
    if extensions.is_empty() {
        println!("  {}", "No extensions registered".dimmed());
        return Ok(());
    }

    for ext in &extensions {
        println!("  {}", ext.name.green());
        if ext.connectivity {
            println!(
                "    connectivity test: {} flag(s)",
                connectivity.count_owned_by(&ext.name)
            );
        }
        if ext.sysdump {
            println!("    sysdump: {} flag(s)", sysdump.count_owned_by(&ext.name));
        }
    }
    Ok(())
}
