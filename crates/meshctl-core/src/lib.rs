//! meshctl Core - Shared Logic Behind the meshctl Workflows
//!
//! This crate owns the objects the meshctl host configures and runs, and
//! that extensions mutate during configuration:
//!
//! - **flags** - typed flag sets with ownership and collision tracking
//! - **connectivity** - the connectivity test orchestrator and its built-in tests
//! - **sysdump** - the diagnostic collector and its built-in tasks
//!
//! # Example
//!
//! ```rust,no_run
//! use meshctl_core::connectivity::{ConnectivityTest, Parameters};
//! use meshctl_core::flags::FlagSet;
//!
//! async fn example() -> meshctl_core::Result<()> {
//!     let mut flags = FlagSet::new("connectivity test");
//!     Parameters::default().declare_flags(&mut flags);
//!     flags.set("target", "example.com:443")?;
//!
//!     let mut ct = ConnectivityTest::new(flags)?;
//!     ct.add_default_tests()?;
//!
//!     let report = ct.run().await?;
//!     println!("{} passed, {} failed", report.passed(), report.failed());
//!     Ok(())
//! }
//! ```

pub mod connectivity;
pub mod error;
pub mod flags;
pub mod sysdump;

pub use connectivity::ConnectivityTest;
pub use error::{Error, Result};
pub use flags::{Flag, FlagKind, FlagSet, FlagValue};
pub use sysdump::Collector;
