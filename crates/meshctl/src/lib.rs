//! meshctl - Service Mesh Connectivity Tests and Diagnostics
//!
//! The `meshctl` binary runs [`run`] with no extensions. Downstream
//! distributions build their own binary that registers extensions first:
//!
//! ```rust,no_run
//! use meshctl_sdk::{ExtensionHost, NopHooks};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut host = ExtensionHost::new();
//!     host.register("acme", NopHooks)?;
//!     meshctl::run(host).await
//! }
//! ```

use anyhow::{Context, Result};
use clap::{ArgMatches, Command, CommandFactory, FromArgMatches};
use meshctl_core::connectivity::Parameters;
use meshctl_core::flags::FlagSet;
use meshctl_core::sysdump::Options;
use meshctl_sdk::ExtensionHost;
use std::ffi::OsString;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod cli;
pub mod commands;
pub mod config;
pub mod flags;

use cli::{CONNECTIVITY, CONNECTIVITY_TEST, Cli, Commands, ConnectivityAction, SYSDUMP};
use config::Config;

/// Host flags of `connectivity test`.
pub fn connectivity_flags() -> FlagSet {
    let mut flags = FlagSet::new("connectivity test");
    flags::reserve(&mut flags);
    Parameters::default().declare_flags(&mut flags);
    flags.bool(flags::FLAG_JSON, false, "Print the report as JSON");
    flags
}

/// Host flags of `sysdump`.
pub fn sysdump_flags() -> FlagSet {
    let mut flags = FlagSet::new("sysdump");
    flags::reserve(&mut flags);
    Options::default().declare_flags(&mut flags);
    flags.bool(flags::FLAG_JSON, false, "Print the summary as JSON");
    flags
}

/// The full command tree, workflow flags included.
pub fn command(connectivity: &FlagSet, sysdump: &FlagSet) -> Command {
    Cli::command()
        .mut_subcommand(CONNECTIVITY, |cmd| {
            cmd.mut_subcommand(CONNECTIVITY_TEST, |cmd| flags::augment(cmd, connectivity))
        })
        .mut_subcommand(SYSDUMP, |cmd| flags::augment(cmd, sysdump))
}

fn subcommand_matches<'a>(matches: &'a ArgMatches, path: &[&str]) -> Result<&'a ArgMatches> {
    path.iter().try_fold(matches, |m, name| {
        m.subcommand_matches(name)
            .with_context(|| format!("Missing {} subcommand", name))
    })
}

fn init_tracing(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    // Ignore the error when a subscriber is already installed
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(format!("meshctl={}", level).parse()?))
        .try_init();
    Ok(())
}

/// Parse the process arguments and run the selected command.
pub async fn run(host: ExtensionHost) -> Result<()> {
    run_from(host, std::env::args_os()).await
}

/// Like [`run`], with explicit arguments (the first one is the binary name).
pub async fn run_from<I, T>(host: ExtensionHost, args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    // Extension flags must exist before the command line can be parsed
    let mut connectivity = host.connectivity();
    let mut connectivity_flags = connectivity_flags();
    connectivity.declare_flags(&mut connectivity_flags)?;

    let mut sysdump = host.sysdump();
    let mut sysdump_flags = sysdump_flags();
    sysdump.declare_flags(&mut sysdump_flags)?;

    let matches = command(&connectivity_flags, &sysdump_flags).get_matches_from(args);
    let cli = Cli::from_arg_matches(&matches)?;

    init_tracing(cli.verbose)?;
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Connectivity(cmd) => match cmd.action {
            ConnectivityAction::Test => {
                let matches = subcommand_matches(&matches, &[CONNECTIVITY, CONNECTIVITY_TEST])?;
                commands::connectivity::execute(connectivity, connectivity_flags, matches, &config)
                    .await
            }
        },
        Commands::Sysdump => {
            let matches = subcommand_matches(&matches, &[SYSDUMP])?;
            commands::sysdump::execute(sysdump, sysdump_flags, matches, &config).await
        }
        Commands::Extensions => {
            commands::extensions::execute(&host, &connectivity_flags, &sysdump_flags)
        }
        Commands::Config(cmd) => commands::config::execute(cmd, cli.config.as_deref(), &config),
        Commands::Version => {
            println!("meshctl {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshctl_core::connectivity::{TestFailure, test_fn};
    use meshctl_sdk::{HooksBuilder, SDKError};
    use tempfile::tempdir;

    fn acme() -> ExtensionHost {
        let mut host = ExtensionHost::new();
        host.register(
            "acme",
            HooksBuilder::new()
                .connectivity_flags(|flags| {
                    flags.string("acme-greeting", "hello", "Greeting the ACME test expects");
                })
                .connectivity_tests(|ct| {
                    let greeting = ct.flags().get_string("acme-greeting")?;
                    ct.add_test(test_fn("acme/greeting", move |_ctx| {
                        let greeting = greeting.clone();
                        async move {
                            if greeting == "hi" {
                                Ok(())
                            } else {
                                Err(TestFailure::new(format!("unexpected greeting {:?}", greeting)))
                            }
                        }
                    }))?;
                    Ok(())
                })
                .sysdump_flags(|flags| {
                    flags.bool("acme-verbose", false, "Collect verbose ACME state");
                })
                .build(),
        )
        .unwrap();
        host
    }

    fn empty_config(dir: &std::path::Path) -> String {
        let path = dir.join("config.toml");
        std::fs::write(&path, "").unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_command_includes_extension_flags() {
        let host = acme();
        let mut connectivity_flags = connectivity_flags();
        host.connectivity().declare_flags(&mut connectivity_flags).unwrap();
        let mut sysdump_flags = sysdump_flags();
        host.sysdump().declare_flags(&mut sysdump_flags).unwrap();

        let cmd = command(&connectivity_flags, &sysdump_flags);
        cmd.clone().debug_assert();

        let matches = cmd
            .try_get_matches_from([
                "meshctl",
                "connectivity",
                "test",
                "-n",
                "cilium",
                "--acme-greeting",
                "hi",
            ])
            .unwrap();
        let test = subcommand_matches(&matches, &[CONNECTIVITY, CONNECTIVITY_TEST]).unwrap();

        let applied = flags::apply_matches(test, &mut connectivity_flags).unwrap();
        assert_eq!(applied, vec!["namespace", "acme-greeting"]);
        assert_eq!(connectivity_flags.get_string("acme-greeting").unwrap(), "hi");
    }

    #[test]
    fn test_host_flags_are_declared() {
        let flags = connectivity_flags();
        for name in ["namespace", "test-namespace", "test", "timeout", "target", "fail-fast", "json"] {
            assert!(flags.contains(name), "--{} missing", name);
        }
        assert_eq!(flags.lookup("namespace").unwrap().shorthand(), Some('n'));

        let flags = sysdump_flags();
        for name in ["output-directory", "output-filename", "worker-count", "quick", "task-timeout", "json"] {
            assert!(flags.contains(name), "--{} missing", name);
        }
    }

    #[tokio::test]
    async fn test_collision_fails_before_parsing() {
        let mut host = ExtensionHost::new();
        host.register_connectivity(
            "acme",
            HooksBuilder::new()
                .connectivity_flags(|flags| {
                    flags.string("namespace", "acme", "ACME namespace");
                })
                .build(),
        )
        .unwrap();

        let err = run_from(host, ["meshctl", "version"]).await.unwrap_err();
        let sdk = err.downcast_ref::<SDKError>().unwrap();
        assert!(sdk.is_collision());
    }

    #[tokio::test]
    async fn test_connectivity_runs_extension_tests() {
        let temp = tempdir().unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap().to_string();

        run_from(
            acme(),
            [
                "meshctl",
                "connectivity",
                "test",
                "--config",
                &empty_config(temp.path()),
                "--target",
                &target,
                "--acme-greeting",
                "hi",
                "--json",
            ],
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_connectivity_failure_is_an_error() {
        let temp = tempdir().unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap().to_string();

        // default greeting does not satisfy the ACME test
        let err = run_from(
            acme(),
            [
                "meshctl",
                "connectivity",
                "test",
                "--config",
                &empty_config(temp.path()),
                "--target",
                &target,
            ],
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("1 of 2 connectivity tests failed"));
    }

    #[tokio::test]
    async fn test_sysdump_writes_summary() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("dumps");
        std::fs::create_dir(&out).unwrap();

        run_from(
            acme(),
            [
                "meshctl",
                "sysdump",
                "--config",
                &empty_config(temp.path()),
                "--output-directory",
                out.to_str().unwrap(),
                "--output-filename",
                "dump",
                "--acme-verbose",
            ],
        )
        .await
        .unwrap();

        let dump = out.join("dump");
        assert!(dump.join("summary.json").exists());
        let flags: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dump.join("flags.json")).unwrap()).unwrap();
        assert_eq!(flags["acme-verbose"], true);
        assert!(flags.get("help").is_none());
    }

    #[tokio::test]
    async fn test_config_values_reach_flags() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("dumps");
        std::fs::create_dir(&out).unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(
            &config,
            format!(
                "[sysdump]\noutput_directory = {:?}\noutput_filename = \"from-config\"\n",
                out.display().to_string()
            ),
        )
        .unwrap();

        run_from(
            ExtensionHost::new(),
            ["meshctl", "sysdump", "--config", config.to_str().unwrap(), "--quick"],
        )
        .await
        .unwrap();

        assert!(out.join("from-config").join("summary.json").exists());
    }
}
