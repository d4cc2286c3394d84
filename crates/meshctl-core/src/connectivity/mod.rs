//! Connectivity Tests
//!
//! [`ConnectivityTest`] is the orchestrator for one connectivity run. The
//! host builds it from a parsed [`FlagSet`], registers its default tests,
//! lets extensions register theirs, and then calls
//! [`ConnectivityTest::run`], which consumes the orchestrator so no test
//! can be added once execution has started.
//!
//! # Test selection
//!
//! Every `--test` value is a regular expression. Values prefixed with `!`
//! exclude matching tests; the rest include them. Without any include
//! filter every test is selected. Tests that are not selected are reported
//! as skipped.

mod builtin;
mod report;

pub use builtin::{DnsLookup, TcpConnect, is_ip_literal, split_target};
pub use report::{Report, TestResult, TestStatus};
pub use test::{FnTest, Test, TestContext, TestFailure, test_fn};

use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::flags::{Flag, FlagSet, FlagValue, format_duration};

pub const FLAG_NAMESPACE: &str = "namespace";
pub const FLAG_TEST_NAMESPACE: &str = "test-namespace";
pub const FLAG_TEST: &str = "test";
pub const FLAG_TIMEOUT: &str = "timeout";
pub const FLAG_TARGET: &str = "target";
pub const FLAG_FAIL_FAST: &str = "fail-fast";

/// Settings of a connectivity run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameters {
    /// Namespace the networking agent runs in.
    pub namespace: String,
    /// Namespace test workloads belong to.
    pub test_namespace: String,
    /// Per-test timeout; zero disables it.
    pub timeout: Duration,
    /// `host:port` endpoints probed by the default tests.
    pub targets: Vec<String>,
    /// Raw `--test` filters.
    pub filters: Vec<String>,
    /// Skip remaining tests after the first failure.
    pub fail_fast: bool,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            namespace: "kube-system".to_string(),
            test_namespace: "meshctl-test".to_string(),
            timeout: Duration::from_secs(15),
            targets: vec!["kubernetes.default.svc:443".to_string()],
            filters: Vec::new(),
            fail_fast: false,
        }
    }
}

impl Parameters {
    /// Declare the host's connectivity flags, using `self` for the defaults.
    pub fn declare_flags(&self, flags: &mut FlagSet) {
        flags
            .add(
                Flag::new(
                    FLAG_NAMESPACE,
                    FlagValue::String(self.namespace.clone()),
                    "Namespace the networking agent runs in",
                )
                .short('n'),
            )
            .string(
                FLAG_TEST_NAMESPACE,
                self.test_namespace.clone(),
                "Namespace to perform the connectivity tests in",
            )
            .string_slice(
                FLAG_TEST,
                self.filters.clone(),
                "Run tests matching a regex; prefix with '!' to exclude (repeatable)",
            )
            .duration(FLAG_TIMEOUT, self.timeout, "Maximum time a single test may take")
            .string_slice(FLAG_TARGET, self.targets.clone(), "host:port endpoint to probe (repeatable)")
            .bool(FLAG_FAIL_FAST, self.fail_fast, "Stop after the first failing test");
    }

    /// Read parameters back from a parsed flag set.
    pub fn from_flags(flags: &FlagSet) -> Result<Self> {
        let params = Self {
            namespace: flags.get_string(FLAG_NAMESPACE)?,
            test_namespace: flags.get_string(FLAG_TEST_NAMESPACE)?,
            timeout: flags.get_duration(FLAG_TIMEOUT)?,
            targets: flags.get_string_slice(FLAG_TARGET)?,
            filters: flags.get_string_slice(FLAG_TEST)?,
            fail_fast: flags.get_bool(FLAG_FAIL_FAST)?,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(Error::invalid_value(FLAG_NAMESPACE, "must not be empty"));
        }
        for target in &self.targets {
            if split_target(target).is_none() {
                return Err(Error::invalid_value(
                    FLAG_TARGET,
                    format!("{:?} is not a host:port pair", target),
                ));
            }
        }
        Ok(())
    }
}

/// Compiled `--test` filters.
#[derive(Debug, Clone, Default)]
struct Selection {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl Selection {
    fn compile(filters: &[String]) -> Result<Self> {
        let mut selection = Self::default();
        for raw in filters {
            let (pattern, excluded) = match raw.strip_prefix('!') {
                Some(rest) => (rest, true),
                None => (raw.as_str(), false),
            };
            let regex = Regex::new(pattern).map_err(|source| Error::InvalidFilter {
                pattern: raw.clone(),
                source,
            })?;
            if excluded {
                selection.exclude.push(regex);
            } else {
                selection.include.push(regex);
            }
        }
        Ok(selection)
    }

    fn selects(&self, name: &str) -> bool {
        if self.exclude.iter().any(|r| r.is_match(name)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|r| r.is_match(name))
    }
}

/// A configured, not-yet-run set of connectivity tests.
pub struct ConnectivityTest {
    params: Parameters,
    flags: FlagSet,
    selection: Selection,
    tests: Vec<Arc<dyn Test>>,
}

impl ConnectivityTest {
    /// Build the orchestrator from a parsed flag set.
    pub fn new(flags: FlagSet) -> Result<Self> {
        let params = Parameters::from_flags(&flags)?;
        Self::with_parameters(params, flags)
    }

    /// Build the orchestrator from explicit parameters.
    pub fn with_parameters(params: Parameters, flags: FlagSet) -> Result<Self> {
        params.validate()?;
        let selection = Selection::compile(&params.filters)?;
        Ok(Self {
            params,
            flags,
            selection,
            tests: Vec::new(),
        })
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Parsed flags for this run.
    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    /// Register a test. Names must be unique.
    pub fn add_test<T: Test + 'static>(&mut self, test: T) -> Result<&mut Self> {
        self.add_shared_test(Arc::new(test))
    }

    /// Register a test that is shared with the caller.
    pub fn add_shared_test(&mut self, test: Arc<dyn Test>) -> Result<&mut Self> {
        if self.contains(test.name()) {
            return Err(Error::DuplicateTest(test.name().to_string()));
        }
        tracing::trace!(test = %test.name(), "connectivity test registered");
        self.tests.push(test);
        Ok(self)
    }

    /// Register a DNS lookup (for named hosts) and a TCP connect test per target.
    pub fn add_default_tests(&mut self) -> Result<()> {
        let mut hosts = HashSet::new();
        for target in self.params.targets.clone() {
            if let Some((host, _)) = split_target(&target) {
                if !is_ip_literal(host) && hosts.insert(host.to_string()) {
                    self.add_test(DnsLookup::new(host))?;
                }
            }
            if !self.contains(&format!("tcp-connect/{}", target)) {
                self.add_test(TcpConnect::new(target))?;
            }
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tests.iter().any(|t| t.name() == name)
    }

    pub fn tests(&self) -> impl Iterator<Item = &dyn Test> {
        self.tests.iter().map(|t| t.as_ref())
    }

    pub fn test_names(&self) -> Vec<String> {
        self.tests.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn test_count(&self) -> usize {
        self.tests.len()
    }

    /// Whether `--test` filters select the named test.
    pub fn is_selected(&self, name: &str) -> bool {
        self.selection.selects(name)
    }

    /// Execute every selected test in registration order.
    pub async fn run(self) -> Result<Report> {
        let ConnectivityTest {
            params,
            flags,
            selection,
            tests,
        } = self;
        let timeout = params.timeout;
        let fail_fast = params.fail_fast;
        let ctx = TestContext::new(params, flags);

        tracing::info!(tests = tests.len(), "running connectivity tests");
        let mut report = Report::new();
        let mut failed = false;

        for test in &tests {
            let name = test.name().to_string();
            if !selection.selects(&name) {
                report.push(TestResult::skipped(name, "not selected by --test filters"));
                continue;
            }
            if failed && fail_fast {
                report.push(TestResult::skipped(name, "skipped after earlier failure (--fail-fast)"));
                continue;
            }

            let started = Instant::now();
            let outcome = if timeout.is_zero() {
                Ok(test.run(&ctx).await)
            } else {
                tokio::time::timeout(timeout, test.run(&ctx)).await
            };
            let elapsed = started.elapsed();

            let result = match outcome {
                Ok(Ok(())) => {
                    tracing::info!(test = %name, elapsed_ms = elapsed.as_millis() as u64, "test passed");
                    TestResult::passed(name, elapsed)
                }
                Ok(Err(failure)) => {
                    tracing::warn!(test = %name, error = %failure, "test failed");
                    failed = true;
                    TestResult::failed(name, elapsed, failure.to_string())
                }
                Err(_) => {
                    tracing::warn!(test = %name, "test timed out");
                    failed = true;
                    TestResult::failed(
                        name,
                        elapsed,
                        format!("timed out after {}", format_duration(timeout)),
                    )
                }
            };
            report.push(result);
        }

        report.finish();
        Ok(report)
    }
}

impl fmt::Debug for ConnectivityTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivityTest")
            .field("params", &self.params)
            .field("tests", &self.test_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn parsed_flags(args: &[(&str, &str)]) -> FlagSet {
        let mut flags = FlagSet::new("connectivity test");
        Parameters::default().declare_flags(&mut flags);
        for (name, value) in args {
            flags.set(name, value).unwrap();
        }
        flags
    }

    struct Fixed {
        name: String,
        outcome: std::result::Result<(), TestFailure>,
    }

    #[async_trait::async_trait]
    impl Test for Fixed {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, _ctx: &TestContext) -> std::result::Result<(), TestFailure> {
            self.outcome.clone()
        }
    }

    fn passing(name: &str) -> Fixed {
        Fixed {
            name: name.to_string(),
            outcome: Ok(()),
        }
    }

    fn failing(name: &str) -> Fixed {
        Fixed {
            name: name.to_string(),
            outcome: Err(TestFailure::new("boom")),
        }
    }

    #[test]
    fn test_parameters_from_flags() {
        let flags = parsed_flags(&[
            ("namespace", "cilium"),
            ("timeout", "2s"),
            ("target", "a:80,b:443"),
            ("fail-fast", "true"),
        ]);
        let params = Parameters::from_flags(&flags).unwrap();

        assert_eq!(params.namespace, "cilium");
        assert_eq!(params.test_namespace, "meshctl-test");
        assert_eq!(params.timeout, Duration::from_secs(2));
        assert_eq!(params.targets, vec!["a:80", "b:443"]);
        assert!(params.fail_fast);
    }

    #[test]
    fn test_invalid_target_rejected() {
        let flags = parsed_flags(&[("target", "no-port")]);
        assert!(matches!(
            ConnectivityTest::new(flags),
            Err(Error::InvalidFlagValue { .. })
        ));
    }

    #[test]
    fn test_invalid_filter_rejected_before_run() {
        let flags = parsed_flags(&[("test", "(unclosed")]);
        assert!(matches!(
            ConnectivityTest::new(flags),
            Err(Error::InvalidFilter { .. })
        ));
    }

    #[test]
    fn test_default_tests_per_target() {
        let flags = parsed_flags(&[("target", "db.internal:5432,db.internal:5433,10.0.0.1:53")]);
        let mut ct = ConnectivityTest::new(flags).unwrap();
        ct.add_default_tests().unwrap();

        assert_eq!(
            ct.test_names(),
            vec![
                "dns-lookup/db.internal",
                "tcp-connect/db.internal:5432",
                "tcp-connect/db.internal:5433",
                "tcp-connect/10.0.0.1:53",
            ]
        );
    }

    #[test]
    fn test_added_tests_extend_count() {
        let flags = parsed_flags(&[("target", "a.svc:80,10.0.0.2:80")]);
        let mut ct = ConnectivityTest::new(flags).unwrap();
        ct.add_default_tests().unwrap();
        assert_eq!(ct.test_count(), 3);

        ct.add_test(passing("ext/one")).unwrap();
        ct.add_test(passing("ext/two")).unwrap();
        assert_eq!(ct.test_count(), 5);
        assert!(format!("{:?}", ct).contains("ext/two"));
    }

    #[test]
    fn test_duplicate_test_rejected() {
        let mut ct = ConnectivityTest::new(parsed_flags(&[])).unwrap();
        ct.add_test(passing("same")).unwrap();
        let err = ct.add_test(passing("same")).unwrap_err();
        assert!(matches!(err, Error::DuplicateTest(name) if name == "same"));
        assert_eq!(ct.test_count(), 1);
    }

    #[tokio::test]
    async fn test_run_reports_each_test() {
        let mut ct = ConnectivityTest::new(parsed_flags(&[])).unwrap();
        ct.add_test(passing("ok")).unwrap();
        ct.add_test(failing("broken")).unwrap();
        ct.add_test(passing("after")).unwrap();

        let report = ct.run().await.unwrap();
        assert_eq!(report.passed(), 2);
        assert_eq!(report.failed(), 1);
        assert!(!report.is_success());
        assert_eq!(report.results[1].message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_fail_fast_skips_remaining() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let mut ct = ConnectivityTest::new(parsed_flags(&[("fail-fast", "true")])).unwrap();
        ct.add_test(failing("first")).unwrap();
        ct.add_test(test_fn("second", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(()))
        }))
        .unwrap();

        let report = ct.run().await.unwrap();
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_filters_select_tests() {
        let flags = parsed_flags(&[("test", "^ext/"), ("test", "!slow")]);
        let mut ct = ConnectivityTest::new(flags).unwrap();
        ct.add_test(passing("ext/fast")).unwrap();
        ct.add_test(passing("ext/slow")).unwrap();
        ct.add_test(passing("core/other")).unwrap();

        assert!(ct.is_selected("ext/fast"));
        assert!(!ct.is_selected("ext/slow"));
        assert!(!ct.is_selected("core/other"));

        let report = ct.run().await.unwrap();
        assert_eq!(report.passed(), 1);
        assert_eq!(report.skipped(), 2);
    }

    #[tokio::test]
    async fn test_timeout_fails_test() {
        let flags = parsed_flags(&[("timeout", "50ms")]);
        let mut ct = ConnectivityTest::new(flags).unwrap();
        ct.add_test(test_fn("hangs", |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }))
        .unwrap();

        let report = ct.run().await.unwrap();
        assert_eq!(report.failed(), 1);
        assert_eq!(report.results[0].message.as_deref(), Some("timed out after 50ms"));
    }
}
