//! meshctl SDK - Extending the meshctl Workflows
//!
//! Downstream distributions add flags, connectivity tests and sysdump tasks
//! to meshctl by implementing the hook traits and registering them with an
//! [`ExtensionHost`]. The host then drives every extension through each run:
//! flags first, then registration, then execution.
//!
//! # Example
//!
//! ```rust,no_run
//! use meshctl_core::connectivity::{ConnectivityTest, TcpConnect};
//! use meshctl_core::flags::FlagSet;
//! use meshctl_sdk::prelude::*;
//!
//! struct Acme;
//!
//! impl ConnectivityTestHooks for Acme {
//!     fn add_connectivity_test_flags(&self, flags: &mut FlagSet) {
//!         flags.string("acme-gateway", "gw.acme.internal:8443", "ACME gateway");
//!     }
//!
//!     fn add_connectivity_tests(&self, ct: &mut ConnectivityTest) -> Result<(), HookError> {
//!         let gateway = ct.flags().get_string("acme-gateway")?;
//!         ct.add_test(TcpConnect::new(gateway))?;
//!         Ok(())
//!     }
//! }
//!
//! fn host() -> SDKResult<ExtensionHost> {
//!     let mut host = ExtensionHost::new();
//!     host.register_connectivity("acme", Acme)?;
//!     Ok(host)
//! }
//! ```

pub mod builders;
pub mod error;
pub mod hooks;
pub mod host;

pub use builders::{ClosureHooks, HooksBuilder};
pub use error::{SDKError, SDKResult};
pub use hooks::{ConnectivityTestHooks, HookError, Hooks, NopHooks, SysdumpHooks};
pub use host::{Connectivity, ExtensionHost, ExtensionInfo, Phase, Run, Sysdump, Workflow};

/// Prelude for extension authors.
pub mod prelude {
    pub use crate::builders::HooksBuilder;
    pub use crate::error::{SDKError, SDKResult};
    pub use crate::hooks::{ConnectivityTestHooks, HookError, Hooks, NopHooks, SysdumpHooks};
    pub use crate::host::ExtensionHost;
}
