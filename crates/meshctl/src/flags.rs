//! Bridge between workflow flag sets and clap.

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};
use meshctl_core::flags::{Flag, FlagKind, FlagSet, FlagValue, HOST_OWNER};

use crate::cli::RESERVED_FLAGS;

/// Host flag shared by both workflows.
pub const FLAG_JSON: &str = "json";

/// Claim the names the static command tree already uses.
///
/// Declared hidden and host-owned so an extension redeclaring one of them
/// is reported as a collision instead of breaking clap.
pub fn reserve(flags: &mut FlagSet) {
    let mut host = flags.owned_by(HOST_OWNER);
    for (name, short) in RESERVED_FLAGS {
        let mut flag = Flag::new(*name, FlagValue::Bool(false), "").hidden();
        if let Some(c) = short {
            flag = flag.short(*c);
        }
        host.add(flag);
    }
}

fn is_reserved(name: &str) -> bool {
    RESERVED_FLAGS.iter().any(|(reserved, _)| *reserved == name)
}

fn to_arg(flag: &Flag) -> Arg {
    let name = flag.name().to_string();
    let help = match flag.default_value() {
        FlagValue::Bool(false) => flag.usage().to_string(),
        FlagValue::String(s) if s.is_empty() => flag.usage().to_string(),
        FlagValue::StringSlice(v) if v.is_empty() => flag.usage().to_string(),
        default => format!("{} [default: {}]", flag.usage(), default),
    };

    let mut arg = Arg::new(name.clone())
        .long(name)
        .help(help)
        .hide(flag.is_hidden());
    if let Some(c) = flag.shorthand() {
        arg = arg.short(c);
    }

    match flag.kind() {
        // `--flag` means true; `--flag=false` can override a config file value
        FlagKind::Bool => arg
            .action(ArgAction::Set)
            .num_args(0..=1)
            .require_equals(true)
            .default_missing_value("true")
            .value_name("BOOL")
            .value_parser(clap::value_parser!(String)),
        FlagKind::StringSlice => arg
            .action(ArgAction::Append)
            .value_name("VALUE")
            .value_parser(clap::value_parser!(String)),
        FlagKind::Int => arg
            .action(ArgAction::Set)
            .value_name("N")
            .value_parser(clap::value_parser!(String)),
        FlagKind::Duration => arg
            .action(ArgAction::Set)
            .value_name("DURATION")
            .value_parser(clap::value_parser!(String)),
        FlagKind::String => arg
            .action(ArgAction::Set)
            .value_name("STRING")
            .value_parser(clap::value_parser!(String)),
    }
}

/// Add every non-reserved flag in `flags` as an argument of `cmd`.
pub fn augment(cmd: Command, flags: &FlagSet) -> Command {
    flags
        .iter()
        .filter(|f| !is_reserved(f.name()))
        .fold(cmd, |cmd, flag| cmd.arg(to_arg(flag)))
}

/// Copy values given on the command line into `flags`.
///
/// Returns the names that were set.
pub fn apply_matches(matches: &ArgMatches, flags: &mut FlagSet) -> meshctl_core::Result<Vec<String>> {
    let declared: Vec<String> = flags
        .iter()
        .filter(|f| !is_reserved(f.name()))
        .map(|f| f.name().to_string())
        .collect();

    let mut applied = Vec::new();
    for name in declared {
        if matches.value_source(&name) != Some(ValueSource::CommandLine) {
            continue;
        }
        if let Some(values) = matches.get_many::<String>(&name) {
            for value in values {
                flags.set(&name, value)?;
            }
        }
        tracing::debug!(flag = %name, "flag set on command line");
        applied.push(name);
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn flags() -> FlagSet {
        let mut flags = FlagSet::new("connectivity test");
        reserve(&mut flags);
        flags
            .add(Flag::new("namespace", FlagValue::String("kube-system".into()), "Agent namespace").short('n'))
            .duration("timeout", Duration::from_secs(15), "Per-test timeout")
            .string_slice("target", ["a.svc:443"], "Targets")
            .bool("fail-fast", false, "Stop early")
            .int("retries", 3, "Retries");
        flags
    }

    fn parse(flags: &FlagSet, args: &[&str]) -> ArgMatches {
        augment(Command::new("test"), flags)
            .try_get_matches_from(std::iter::once("test").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_augment_skips_reserved() {
        let cmd = augment(Command::new("test"), &flags());
        assert!(cmd.get_arguments().any(|a| a.get_id() == "namespace"));
        assert!(!cmd.get_arguments().any(|a| a.get_id() == "verbose"));
        cmd.debug_assert();
    }

    #[test]
    fn test_apply_only_command_line_values() {
        let mut flags = flags();
        let matches = parse(&flags, &["-n", "cilium", "--fail-fast", "--retries", "5"]);

        let applied = apply_matches(&matches, &mut flags).unwrap();

        assert_eq!(applied.len(), 3);
        assert_eq!(flags.get_string("namespace").unwrap(), "cilium");
        assert!(flags.get_bool("fail-fast").unwrap());
        assert_eq!(flags.get_int("retries").unwrap(), 5);
        assert!(!flags.changed("timeout"));
        assert_eq!(flags.get_duration("timeout").unwrap(), Duration::from_secs(15));
    }

    #[test]
    fn test_bool_flag_accepts_explicit_value() {
        let mut flags = flags();
        flags.bool("quick", true, "Quick mode");
        let matches = parse(&flags, &["--quick=false", "--fail-fast"]);

        apply_matches(&matches, &mut flags).unwrap();

        assert!(flags.changed("quick"));
        assert!(!flags.get_bool("quick").unwrap());
        assert!(flags.get_bool("fail-fast").unwrap());
    }

    #[test]
    fn test_bool_flag_rejects_garbage() {
        let mut flags = flags();
        let matches = parse(&flags, &["--fail-fast=maybe"]);

        let err = apply_matches(&matches, &mut flags).unwrap_err();
        assert!(err.to_string().contains("--fail-fast"));
    }

    #[test]
    fn test_repeated_slice_flag_replaces_default() {
        let mut flags = flags();
        let matches = parse(&flags, &["--target", "b:80", "--target", "c:80,d:80"]);

        apply_matches(&matches, &mut flags).unwrap();

        assert_eq!(
            flags.get_string_slice("target").unwrap(),
            vec!["b:80", "c:80", "d:80"]
        );
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let mut flags = flags();
        let matches = parse(&flags, &["--timeout", "soon"]);

        let err = apply_matches(&matches, &mut flags).unwrap_err();
        assert!(err.to_string().contains("--timeout"));
    }

    #[test]
    fn test_reserved_names_collide() {
        let mut flags = flags();
        flags.owned_by("acme").bool("verbose", false, "ACME verbose");
        assert!(flags.check_conflicts().unwrap_err().is_collision());
    }
}
