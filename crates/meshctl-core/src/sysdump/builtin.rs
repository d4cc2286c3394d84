//! Built-in sysdump tasks.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;

use super::task::{Task, TaskContext, TaskFailure};

/// Environment variables with this prefix are captured by [`Environment`].
pub const ENV_PREFIX: &str = "MESHCTL_";

#[derive(Debug, Serialize)]
struct SystemInfoRecord {
    hostname: Option<String>,
    os: &'static str,
    family: &'static str,
    arch: &'static str,
    version: &'static str,
    collected_at: chrono::DateTime<Utc>,
}

/// Host name, platform and tool version.
pub struct SystemInfo;

#[async_trait]
impl Task for SystemInfo {
    fn name(&self) -> &str {
        "system-info"
    }

    fn description(&self) -> &str {
        "Host name, platform and meshctl version"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), TaskFailure> {
        let record = SystemInfoRecord {
            hostname: hostname::get().ok().map(|h| h.to_string_lossy().into_owned()),
            os: std::env::consts::OS,
            family: std::env::consts::FAMILY,
            arch: std::env::consts::ARCH,
            version: env!("CARGO_PKG_VERSION"),
            collected_at: Utc::now(),
        };
        ctx.write_json("system-info.json", &record).await?;
        Ok(())
    }
}

/// `MESHCTL_*` environment variables.
pub struct Environment;

impl Environment {
    fn capture() -> BTreeMap<String, String> {
        std::env::vars()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect()
    }
}

#[async_trait]
impl Task for Environment {
    fn name(&self) -> &str {
        "environment"
    }

    fn description(&self) -> &str {
        "meshctl environment variables"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), TaskFailure> {
        ctx.write_json("environment.json", &Self::capture()).await?;
        Ok(())
    }
}

/// Effective flag values for this collection, extension flags included.
pub struct FlagsSnapshot;

#[async_trait]
impl Task for FlagsSnapshot {
    fn name(&self) -> &str {
        "flags"
    }

    fn description(&self) -> &str {
        "Effective sysdump flag values"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), TaskFailure> {
        ctx.write_json("flags.json", &ctx.flags().snapshot()).await?;
        Ok(())
    }
}
