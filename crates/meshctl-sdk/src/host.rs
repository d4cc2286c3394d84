//! Extension Host
//!
//! Holds registered extensions and drives them through a workflow run:
//!
//! ```text
//! Unconfigured -> FlagsDeclared -> Attached -> Executing -> Done
//!       |               |              |            |
//!       +---------------+--------------+------------+---> Failed
//! ```
//!
//! A [`Run`] only moves forward. The host declares its own flags on the
//! [`FlagSet`] before calling [`Run::declare_flags`], parses the command line,
//! builds the orchestrator or collector, calls [`Run::attach`], and finally
//! [`Run::execute`]. Execution consumes the target, so nothing can be added
//! once it has started.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use meshctl_core::connectivity::{ConnectivityTest, Report};
use meshctl_core::flags::{FlagSet, HOST_OWNER};
use meshctl_core::sysdump::{Collector, Summary};
use tracing::{debug, error, info};

use crate::error::{SDKError, SDKResult};
use crate::hooks::{ConnectivityTestHooks, HookError, Hooks, SysdumpHooks};

// ─────────────────────────────────────────────────────────────────────────────
// Workflows
// ─────────────────────────────────────────────────────────────────────────────

/// A command extensions can hook into.
pub trait Workflow: Send + Sync + 'static {
    /// Name used in logs and errors.
    const NAME: &'static str;

    /// Hook trait object for this workflow.
    type Hooks: ?Sized + Send + Sync;

    /// Object extensions mutate during the attach phase.
    type Target;

    fn declare(hooks: &Self::Hooks, flags: &mut FlagSet);

    fn attach(hooks: &Self::Hooks, target: &mut Self::Target) -> Result<(), HookError>;

    /// Number of tests or tasks currently registered on the target.
    fn registered(target: &Self::Target) -> usize;
}

/// `connectivity test`
#[derive(Debug)]
pub struct Connectivity;

impl Workflow for Connectivity {
    const NAME: &'static str = "connectivity test";
    type Hooks = dyn ConnectivityTestHooks;
    type Target = ConnectivityTest;

    fn declare(hooks: &Self::Hooks, flags: &mut FlagSet) {
        hooks.add_connectivity_test_flags(flags);
    }

    fn attach(hooks: &Self::Hooks, target: &mut ConnectivityTest) -> Result<(), HookError> {
        hooks.add_connectivity_tests(target)
    }

    fn registered(target: &ConnectivityTest) -> usize {
        target.test_count()
    }
}

/// `sysdump`
#[derive(Debug)]
pub struct Sysdump;

impl Workflow for Sysdump {
    const NAME: &'static str = "sysdump";
    type Hooks = dyn SysdumpHooks;
    type Target = Collector;

    fn declare(hooks: &Self::Hooks, flags: &mut FlagSet) {
        hooks.add_sysdump_flags(flags);
    }

    fn attach(hooks: &Self::Hooks, target: &mut Collector) -> Result<(), HookError> {
        hooks.add_sysdump_tasks(target)
    }

    fn registered(target: &Collector) -> usize {
        target.task_count()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

struct Registered<H: ?Sized> {
    name: String,
    hooks: Arc<H>,
}

impl<H: ?Sized> Clone for Registered<H> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            hooks: Arc::clone(&self.hooks),
        }
    }
}

/// What a registered extension hooks into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionInfo {
    pub name: String,
    pub connectivity: bool,
    pub sysdump: bool,
}

/// Registered extensions, kept in registration order.
#[derive(Default, Clone)]
pub struct ExtensionHost {
    names: Vec<String>,
    connectivity: Vec<Registered<dyn ConnectivityTestHooks>>,
    sysdump: Vec<Registered<dyn SysdumpHooks>>,
}

impl ExtensionHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension for every workflow.
    pub fn register<H: Hooks + 'static>(
        &mut self,
        name: impl Into<String>,
        hooks: H,
    ) -> SDKResult<&mut Self> {
        let name = self.claim(name.into())?;
        let hooks = Arc::new(hooks);
        self.connectivity.push(Registered {
            name: name.clone(),
            hooks: hooks.clone(),
        });
        self.sysdump.push(Registered { name, hooks });
        Ok(self)
    }

    /// Register an extension for `connectivity test` only.
    pub fn register_connectivity<H: ConnectivityTestHooks + 'static>(
        &mut self,
        name: impl Into<String>,
        hooks: H,
    ) -> SDKResult<&mut Self> {
        let name = self.claim(name.into())?;
        self.connectivity.push(Registered {
            name,
            hooks: Arc::new(hooks),
        });
        Ok(self)
    }

    /// Register an extension for `sysdump` only.
    pub fn register_sysdump<H: SysdumpHooks + 'static>(
        &mut self,
        name: impl Into<String>,
        hooks: H,
    ) -> SDKResult<&mut Self> {
        let name = self.claim(name.into())?;
        self.sysdump.push(Registered {
            name,
            hooks: Arc::new(hooks),
        });
        Ok(self)
    }

    fn claim(&mut self, name: String) -> SDKResult<String> {
        if name.trim().is_empty() || name == HOST_OWNER {
            return Err(SDKError::InvalidExtensionName { name });
        }
        if self.names.contains(&name) {
            return Err(SDKError::DuplicateExtension { name });
        }
        debug!(extension = %name, "extension registered");
        self.names.push(name.clone());
        Ok(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Registered extensions in registration order.
    pub fn extensions(&self) -> Vec<ExtensionInfo> {
        self.names
            .iter()
            .map(|name| ExtensionInfo {
                name: name.clone(),
                connectivity: self.connectivity.iter().any(|r| &r.name == name),
                sysdump: self.sysdump.iter().any(|r| &r.name == name),
            })
            .collect()
    }

    /// Start a `connectivity test` run.
    pub fn connectivity(&self) -> Run<Connectivity> {
        Run::new(self.connectivity.clone())
    }

    /// Start a `sysdump` run.
    pub fn sysdump(&self) -> Run<Sysdump> {
        Run::new(self.sysdump.clone())
    }
}

impl fmt::Debug for ExtensionHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionHost")
            .field("extensions", &self.names)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Run
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle position of a [`Run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unconfigured,
    FlagsDeclared,
    Attached,
    Executing,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Unconfigured => "unconfigured",
            Phase::FlagsDeclared => "flags declared",
            Phase::Attached => "attached",
            Phase::Executing => "executing",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One pass of a workflow through its extensions.
pub struct Run<W: Workflow> {
    phase: Phase,
    extensions: Vec<Registered<W::Hooks>>,
    _workflow: PhantomData<W>,
}

impl<W: Workflow> Run<W> {
    fn new(extensions: Vec<Registered<W::Hooks>>) -> Self {
        Self {
            phase: Phase::Unconfigured,
            extensions,
            _workflow: PhantomData,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Names of the extensions taking part, in call order.
    pub fn extension_names(&self) -> Vec<&str> {
        self.extensions.iter().map(|r| r.name.as_str()).collect()
    }

    fn enter(&self, expected: Phase, action: &'static str) -> SDKResult<()> {
        if self.phase != expected {
            return Err(SDKError::InvalidPhase {
                workflow: W::NAME,
                action,
                phase: self.phase,
            });
        }
        Ok(())
    }

    /// Let every extension declare its flags, then reject collisions.
    ///
    /// Host flags must already be on `flags`; they win any collision.
    pub fn declare_flags(&mut self, flags: &mut FlagSet) -> SDKResult<()> {
        self.enter(Phase::Unconfigured, "declare flags")?;

        for ext in &self.extensions {
            let before = flags.count_owned_by(&ext.name);
            W::declare(&ext.hooks, &mut flags.owned_by(ext.name.as_str()));
            debug!(
                workflow = W::NAME,
                extension = %ext.name,
                flags = flags.count_owned_by(&ext.name) - before,
                "extension declared flags"
            );
        }

        if let Err(source) = flags.check_conflicts() {
            error!(workflow = W::NAME, error = %source, "flag declaration failed");
            self.phase = Phase::Failed;
            return Err(SDKError::Flags {
                workflow: W::NAME,
                source,
            });
        }

        self.phase = Phase::FlagsDeclared;
        Ok(())
    }

    /// Let every extension add to the target. Stops at the first failure.
    pub fn attach(&mut self, target: &mut W::Target) -> SDKResult<()> {
        self.enter(Phase::FlagsDeclared, "attach extensions")?;

        for ext in &self.extensions {
            let before = W::registered(target);
            if let Err(source) = W::attach(&ext.hooks, target) {
                error!(
                    workflow = W::NAME,
                    extension = %ext.name,
                    error = %source,
                    "extension registration failed"
                );
                self.phase = Phase::Failed;
                return Err(SDKError::Registration {
                    workflow: W::NAME,
                    extension: ext.name.clone(),
                    source,
                });
            }
            debug!(
                workflow = W::NAME,
                extension = %ext.name,
                added = W::registered(target).saturating_sub(before),
                "extension attached"
            );
        }

        self.phase = Phase::Attached;
        Ok(())
    }

    /// Run the workflow on `target` with a custom executor.
    pub async fn execute_with<F, Fut, T>(&mut self, target: W::Target, run: F) -> SDKResult<T>
    where
        F: FnOnce(W::Target) -> Fut,
        Fut: Future<Output = meshctl_core::Result<T>>,
    {
        self.enter(Phase::Attached, "execute")?;
        self.phase = Phase::Executing;
        info!(workflow = W::NAME, "executing");

        match run(target).await {
            Ok(output) => {
                self.phase = Phase::Done;
                Ok(output)
            }
            Err(source) => {
                self.phase = Phase::Failed;
                Err(SDKError::Execution {
                    workflow: W::NAME,
                    source,
                })
            }
        }
    }
}

impl Run<Connectivity> {
    pub async fn execute(&mut self, ct: ConnectivityTest) -> SDKResult<Report> {
        self.execute_with(ct, ConnectivityTest::run).await
    }
}

impl Run<Sysdump> {
    pub async fn execute(&mut self, collector: Collector) -> SDKResult<Summary> {
        self.execute_with(collector, Collector::run).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::HooksBuilder;
    use crate::hooks::NopHooks;
    use meshctl_core::connectivity::{Parameters, Test, TestFailure, test_fn};
    use meshctl_core::sysdump::{Options, TaskFailure, task_fn};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn connectivity_flags() -> FlagSet {
        let mut flags = FlagSet::new("connectivity test");
        Parameters::default().declare_flags(&mut flags);
        flags
    }

    fn sysdump_flags(dir: &std::path::Path) -> FlagSet {
        let mut flags = FlagSet::new("sysdump");
        Options::default().declare_flags(&mut flags);
        flags
            .set("output-directory", dir.to_str().unwrap())
            .unwrap();
        flags
    }

    /// Orchestrator with three counting tests and no network targets.
    fn orchestrator(flags: FlagSet, executed: &Arc<AtomicUsize>) -> ConnectivityTest {
        let mut ct = ConnectivityTest::new(flags).unwrap();
        for name in ["pod-to-pod", "pod-to-service", "pod-to-world"] {
            ct.add_shared_test(counting_test(name, executed)).unwrap();
        }
        ct
    }

    fn counting_test(name: &str, executed: &Arc<AtomicUsize>) -> Arc<dyn Test> {
        let executed = executed.clone();
        Arc::new(test_fn(name, move |_ctx| {
            executed.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok::<(), TestFailure>(()))
        }))
    }

    fn no_targets(mut flags: FlagSet) -> FlagSet {
        flags.set("target", "").unwrap();
        flags
    }

    #[tokio::test]
    async fn test_extension_tests_run_alongside_builtin() {
        let executed = Arc::new(AtomicUsize::new(0));
        let counter = executed.clone();

        let mut host = ExtensionHost::new();
        host.register(
            "acme",
            HooksBuilder::new()
                .connectivity_tests(move |ct| {
                    ct.add_shared_test(counting_test("acme/ingress", &counter))?;
                    ct.add_shared_test(counting_test("acme/egress", &counter))?;
                    Ok(())
                })
                .build(),
        )
        .unwrap();

        let mut run = host.connectivity();
        let mut flags = connectivity_flags();
        run.declare_flags(&mut flags).unwrap();
        let flags = no_targets(flags);

        let mut ct = orchestrator(flags, &executed);
        run.attach(&mut ct).unwrap();
        assert_eq!(ct.test_count(), 5);

        let report = run.execute(ct).await.unwrap();
        assert_eq!(run.phase(), Phase::Done);
        assert_eq!(report.executed(), 5);
        assert_eq!(executed.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_failed_attach_runs_nothing() {
        let executed = Arc::new(AtomicUsize::new(0));
        let second_called = Arc::new(AtomicUsize::new(0));
        let called = second_called.clone();

        let mut host = ExtensionHost::new();
        host.register_connectivity(
            "broken",
            HooksBuilder::new()
                .connectivity_tests(|_ct| Err(HookError::new("missing credentials")))
                .build(),
        )
        .unwrap()
        .register_connectivity(
            "after",
            HooksBuilder::new()
                .connectivity_tests(move |_ct| {
                    called.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .build(),
        )
        .unwrap();

        let mut run = host.connectivity();
        let mut flags = connectivity_flags();
        run.declare_flags(&mut flags).unwrap();

        let mut ct = orchestrator(no_targets(flags), &executed);
        let err = run.attach(&mut ct).unwrap_err();

        assert!(err.is_registration());
        assert!(err.to_string().contains("broken"));
        assert_eq!(run.phase(), Phase::Failed);
        assert_eq!(second_called.load(Ordering::SeqCst), 0);

        let err = run.execute(ct).await.unwrap_err();
        assert!(matches!(err, SDKError::InvalidPhase { phase: Phase::Failed, .. }));
        assert_eq!(executed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_disjoint_flags_both_declared() {
        let mut host = ExtensionHost::new();
        host.register_connectivity(
            "a",
            HooksBuilder::new()
                .connectivity_flags(|flags| {
                    flags.string("foo", "", "Extension A");
                })
                .build(),
        )
        .unwrap()
        .register_connectivity(
            "b",
            HooksBuilder::new()
                .connectivity_flags(|flags| {
                    flags.bool("bar", false, "Extension B");
                })
                .build(),
        )
        .unwrap();

        let mut run = host.connectivity();
        let mut flags = connectivity_flags();
        let host_flags = flags.len();
        run.declare_flags(&mut flags).unwrap();

        assert_eq!(flags.len(), host_flags + 2);
        assert_eq!(flags.lookup("foo").unwrap().owner(), "a");
        assert_eq!(flags.lookup("bar").unwrap().owner(), "b");
        assert_eq!(flags.lookup("namespace").unwrap().owner(), HOST_OWNER);
        assert_eq!(flags.owner(), HOST_OWNER);
        assert_eq!(run.phase(), Phase::FlagsDeclared);
    }

    #[test]
    fn test_colliding_flag_is_rejected() {
        let mut host = ExtensionHost::new();
        host.register_connectivity(
            "acme",
            HooksBuilder::new()
                .connectivity_flags(|flags| {
                    flags.string("namespace", "acme-system", "ACME namespace");
                })
                .build(),
        )
        .unwrap();

        let mut run = host.connectivity();
        let mut flags = connectivity_flags();
        let err = run.declare_flags(&mut flags).unwrap_err();

        assert!(err.is_collision());
        let msg = err.to_string();
        assert!(msg.contains("namespace"));
        assert!(msg.contains("acme"));
        assert_eq!(run.phase(), Phase::Failed);

        // host definition is untouched
        assert_eq!(flags.lookup("namespace").unwrap().owner(), HOST_OWNER);
        assert_eq!(flags.get_string("namespace").unwrap(), "kube-system");
    }

    #[test]
    fn test_extensions_called_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut host = ExtensionHost::new();
        for name in ["first", "second", "third"] {
            let order = order.clone();
            host.register_connectivity(
                name,
                HooksBuilder::new()
                    .connectivity_flags(move |_flags| order.lock().unwrap().push(name))
                    .build(),
            )
            .unwrap();
        }

        let mut run = host.connectivity();
        assert_eq!(run.extension_names(), vec!["first", "second", "third"]);
        run.declare_flags(&mut connectivity_flags()).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_register_rejects_duplicate_and_reserved_names() {
        let mut host = ExtensionHost::new();
        host.register("acme", NopHooks).unwrap();

        assert!(matches!(
            host.register_sysdump("acme", NopHooks),
            Err(SDKError::DuplicateExtension { .. })
        ));
        assert!(matches!(
            host.register("meshctl", NopHooks),
            Err(SDKError::InvalidExtensionName { .. })
        ));
        assert!(matches!(
            host.register_connectivity("  ", NopHooks),
            Err(SDKError::InvalidExtensionName { .. })
        ));
        assert_eq!(host.len(), 1);
    }

    #[test]
    fn test_extensions_lists_workflows() {
        let mut host = ExtensionHost::new();
        host.register("both", NopHooks)
            .unwrap()
            .register_sysdump("dump-only", NopHooks)
            .unwrap();

        let info = host.extensions();
        assert_eq!(info.len(), 2);
        assert!(info[0].connectivity && info[0].sysdump);
        assert_eq!(info[1].name, "dump-only");
        assert!(!info[1].connectivity && info[1].sysdump);
        assert_eq!(host.connectivity().extension_names(), vec!["both"]);
    }

    #[test]
    fn test_steps_out_of_order_are_rejected() {
        let host = ExtensionHost::new();
        let mut run = host.connectivity();
        let mut ct = ConnectivityTest::new(no_targets(connectivity_flags())).unwrap();

        let err = run.attach(&mut ct).unwrap_err();
        assert!(matches!(
            err,
            SDKError::InvalidPhase {
                phase: Phase::Unconfigured,
                ..
            }
        ));
        assert_eq!(run.phase(), Phase::Unconfigured);

        let mut flags = connectivity_flags();
        run.declare_flags(&mut flags).unwrap();
        assert!(run.declare_flags(&mut flags).is_err());
    }

    #[tokio::test]
    async fn test_sysdump_extension_task_writes_into_dump() {
        let temp = tempfile::tempdir().unwrap();

        let mut host = ExtensionHost::new();
        host.register_sysdump(
            "acme",
            HooksBuilder::new()
                .sysdump_flags(|flags| {
                    flags.string("acme-tenant", "default", "ACME tenant to dump");
                })
                .sysdump_tasks(|collector| {
                    let tenant = collector.flags().get_string("acme-tenant")?;
                    collector.add_task(task_fn("acme-tenant", move |ctx| {
                        let tenant = tenant.clone();
                        async move {
                            ctx.write_file("acme/tenant.txt", tenant).await?;
                            Ok::<(), TaskFailure>(())
                        }
                    }))?;
                    Ok(())
                })
                .build(),
        )
        .unwrap();

        let mut run = host.sysdump();
        let mut flags = sysdump_flags(temp.path());
        run.declare_flags(&mut flags).unwrap();
        flags.set("acme-tenant", "blue").unwrap();

        let mut collector = Collector::new(flags).unwrap();
        run.attach(&mut collector).unwrap();
        assert_eq!(collector.task_count(), 1);

        let summary = run.execute(collector).await.unwrap();
        assert!(summary.is_complete());
        let written = std::fs::read_to_string(summary.directory.join("acme/tenant.txt")).unwrap();
        assert_eq!(written, "blue");
    }

    #[test]
    fn test_sysdump_attach_failure_names_workflow() {
        let temp = tempfile::tempdir().unwrap();

        let mut host = ExtensionHost::new();
        host.register_sysdump(
            "acme",
            HooksBuilder::new()
                .sysdump_tasks(|_collector| Err(HookError::new("no access")))
                .build(),
        )
        .unwrap();

        let mut run = host.sysdump();
        let mut flags = sysdump_flags(temp.path());
        run.declare_flags(&mut flags).unwrap();

        let mut collector = Collector::new(flags).unwrap();
        let err = run.attach(&mut collector).unwrap_err();
        assert_eq!(err.workflow(), Some("sysdump"));
        assert_eq!(collector.task_count(), 0);
    }
}
