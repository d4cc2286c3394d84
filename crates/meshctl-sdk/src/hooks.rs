//! Extension Hooks
//!
//! The contract an extension implements to add flags and behavior to the
//! meshctl workflows. Each workflow has its own trait so an extension can
//! take part in one without stubbing the other:
//!
//! - [`ConnectivityTestHooks`]: flags and tests for `connectivity test`
//! - [`SysdumpHooks`]: flags and tasks for `sysdump`
//!
//! [`Hooks`] is implemented for every type that implements both.
//!
//! The host calls the flag methods of every extension first, parses the
//! command line, then calls the attach methods, and only then runs the
//! workflow. Flag values are therefore final when an attach method reads
//! them from the orchestrator or collector.
//!
//! # Example
//!
//! ```rust
//! use meshctl_core::connectivity::{ConnectivityTest, TcpConnect};
//! use meshctl_core::flags::FlagSet;
//! use meshctl_sdk::hooks::{ConnectivityTestHooks, HookError};
//!
//! struct Registry;
//!
//! impl ConnectivityTestHooks for Registry {
//!     fn add_connectivity_test_flags(&self, flags: &mut FlagSet) {
//!         flags.string("registry", "", "Container registry to probe");
//!     }
//!
//!     fn add_connectivity_tests(&self, ct: &mut ConnectivityTest) -> Result<(), HookError> {
//!         let registry = ct.flags().get_string("registry")?;
//!         if !registry.is_empty() {
//!             ct.add_test(TcpConnect::new(format!("{}:443", registry)))?;
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use std::fmt;

use meshctl_core::connectivity::ConnectivityTest;
use meshctl_core::flags::FlagSet;
use meshctl_core::sysdump::Collector;

// ─────────────────────────────────────────────────────────────────────────────
// Hook Error
// ─────────────────────────────────────────────────────────────────────────────

/// Failure reported by an attach hook. Aborts the workflow before it runs.
#[derive(Debug)]
pub struct HookError {
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl HookError {
    /// Create a hook error with a description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create a hook error that wraps its cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HookError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<meshctl_core::Error> for HookError {
    fn from(e: meshctl_core::Error) -> Self {
        HookError::with_source(e.to_string(), e)
    }
}

impl From<anyhow::Error> for HookError {
    fn from(e: anyhow::Error) -> Self {
        HookError::new(format!("{:#}", e))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hook Traits
// ─────────────────────────────────────────────────────────────────────────────

/// Hooks into `connectivity test`.
pub trait ConnectivityTestHooks: Send + Sync {
    /// Declare extra flags. Must not touch flags the extension does not own.
    fn add_connectivity_test_flags(&self, flags: &mut FlagSet);

    /// Register extra tests. Runs after flags are parsed, before any test runs.
    fn add_connectivity_tests(&self, ct: &mut ConnectivityTest) -> Result<(), HookError>;
}

/// Hooks into `sysdump`.
pub trait SysdumpHooks: Send + Sync {
    /// Declare extra flags. Must not touch flags the extension does not own.
    fn add_sysdump_flags(&self, flags: &mut FlagSet);

    /// Register extra collection tasks. Runs after flags are parsed, before collection.
    fn add_sysdump_tasks(&self, collector: &mut Collector) -> Result<(), HookError>;
}

/// Hooks into every workflow.
pub trait Hooks: ConnectivityTestHooks + SysdumpHooks {}

impl<T: ConnectivityTestHooks + SysdumpHooks + ?Sized> Hooks for T {}

/// Hooks that add nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopHooks;

impl ConnectivityTestHooks for NopHooks {
    fn add_connectivity_test_flags(&self, _flags: &mut FlagSet) {}

    fn add_connectivity_tests(&self, _ct: &mut ConnectivityTest) -> Result<(), HookError> {
        Ok(())
    }
}

impl SysdumpHooks for NopHooks {
    fn add_sysdump_flags(&self, _flags: &mut FlagSet) {}

    fn add_sysdump_tasks(&self, _collector: &mut Collector) -> Result<(), HookError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    fn assert_hooks<H: Hooks>(_: &H) {}

    #[test]
    fn test_nop_hooks_implement_everything() {
        assert_hooks(&NopHooks);

        let mut flags = FlagSet::new("connectivity test");
        NopHooks.add_connectivity_test_flags(&mut flags);
        NopHooks.add_sysdump_flags(&mut flags);
        assert!(flags.is_empty());
    }

    #[test]
    fn test_hook_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "kubeconfig missing");
        let err = HookError::with_source("cannot load cluster credentials", io);

        assert_eq!(err.to_string(), "cannot load cluster credentials");
        assert_eq!(err.source().unwrap().to_string(), "kubeconfig missing");
    }

    #[test]
    fn test_hook_error_from_core_error() {
        let err: HookError = meshctl_core::Error::DuplicateTest("dns".into()).into();
        assert!(err.message().contains("dns"));

        let source = err.source().unwrap();
        assert!(matches!(
            source.downcast_ref::<meshctl_core::Error>(),
            Some(meshctl_core::Error::DuplicateTest(name)) if name == "dns"
        ));
    }

    #[test]
    fn test_hook_error_from_anyhow_keeps_chain() {
        let err: HookError = anyhow::anyhow!("inner")
            .context("outer")
            .into();
        assert_eq!(err.message(), "outer: inner");
    }
}
