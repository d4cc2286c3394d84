//! Closure-based hooks.
//!
//! For small extensions that do not need their own type:
//!
//! ```rust
//! use meshctl_core::sysdump::{TaskFailure, task_fn};
//! use meshctl_sdk::builders::HooksBuilder;
//!
//! let hooks = HooksBuilder::new()
//!     .sysdump_flags(|flags| {
//!         flags.bool("acme-audit-log", false, "Collect the ACME audit log");
//!     })
//!     .sysdump_tasks(|collector| {
//!         if collector.flags().get_bool("acme-audit-log")? {
//!             collector.add_task(task_fn("acme-audit-log", |ctx| async move {
//!                 ctx.write_file("acme/audit.log", "").await?;
//!                 Ok::<(), TaskFailure>(())
//!             }))?;
//!         }
//!         Ok(())
//!     })
//!     .build();
//! # let _ = hooks;
//! ```

use meshctl_core::connectivity::ConnectivityTest;
use meshctl_core::flags::FlagSet;
use meshctl_core::sysdump::Collector;

use crate::hooks::{ConnectivityTestHooks, HookError, SysdumpHooks};

type FlagsFn = Box<dyn Fn(&mut FlagSet) + Send + Sync>;
type AttachFn<T> = Box<dyn Fn(&mut T) -> Result<(), HookError> + Send + Sync>;

/// Builder for [`ClosureHooks`]. Unset hooks do nothing.
#[derive(Default)]
pub struct HooksBuilder {
    connectivity_flags: Option<FlagsFn>,
    connectivity_tests: Option<AttachFn<ConnectivityTest>>,
    sysdump_flags: Option<FlagsFn>,
    sysdump_tasks: Option<AttachFn<Collector>>,
}

impl HooksBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connectivity_flags<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut FlagSet) + Send + Sync + 'static,
    {
        self.connectivity_flags = Some(Box::new(f));
        self
    }

    pub fn connectivity_tests<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ConnectivityTest) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.connectivity_tests = Some(Box::new(f));
        self
    }

    pub fn sysdump_flags<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut FlagSet) + Send + Sync + 'static,
    {
        self.sysdump_flags = Some(Box::new(f));
        self
    }

    pub fn sysdump_tasks<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Collector) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.sysdump_tasks = Some(Box::new(f));
        self
    }

    pub fn build(self) -> ClosureHooks {
        ClosureHooks {
            connectivity_flags: self.connectivity_flags,
            connectivity_tests: self.connectivity_tests,
            sysdump_flags: self.sysdump_flags,
            sysdump_tasks: self.sysdump_tasks,
        }
    }
}

/// Hooks implemented by closures.
pub struct ClosureHooks {
    connectivity_flags: Option<FlagsFn>,
    connectivity_tests: Option<AttachFn<ConnectivityTest>>,
    sysdump_flags: Option<FlagsFn>,
    sysdump_tasks: Option<AttachFn<Collector>>,
}

impl ConnectivityTestHooks for ClosureHooks {
    fn add_connectivity_test_flags(&self, flags: &mut FlagSet) {
        if let Some(f) = &self.connectivity_flags {
            f(flags);
        }
    }

    fn add_connectivity_tests(&self, ct: &mut ConnectivityTest) -> Result<(), HookError> {
        match &self.connectivity_tests {
            Some(f) => f(ct),
            None => Ok(()),
        }
    }
}

impl SysdumpHooks for ClosureHooks {
    fn add_sysdump_flags(&self, flags: &mut FlagSet) {
        if let Some(f) = &self.sysdump_flags {
            f(flags);
        }
    }

    fn add_sysdump_tasks(&self, collector: &mut Collector) -> Result<(), HookError> {
        match &self.sysdump_tasks {
            Some(f) => f(collector),
            None => Ok(()),
        }
    }
}
