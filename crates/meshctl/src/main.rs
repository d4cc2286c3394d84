//! meshctl - Service Mesh Connectivity Tests and Diagnostics
//!
//! Stock binary without extensions. Distributions embed [`meshctl::run`]
//! in their own binary to add flags, tests and sysdump tasks.

use anyhow::Result;
use meshctl_sdk::ExtensionHost;

#[tokio::main]
async fn main() -> Result<()> {
    meshctl::run(ExtensionHost::new()).await
}
