//! Sysdump Collection
//!
//! [`Collector`] gathers diagnostic data into a dump directory. The host
//! builds it from a parsed [`FlagSet`], registers the default tasks, lets
//! extensions add theirs, then calls [`Collector::run`], which consumes the
//! collector.
//!
//! Tasks run concurrently, at most `--worker-count` at a time, each bounded
//! by `--task-timeout`. A failing task does not stop the collection; it is
//! recorded in `summary.json` next to the collected files.

mod builtin;
mod summary;
mod task;

pub use builtin::{ENV_PREFIX, Environment, FlagsSnapshot, SystemInfo};
pub use summary::{SUMMARY_FILE, Summary, TaskResult, TaskStatus};
pub use task::{FnTask, Task, TaskContext, TaskFailure, task_fn};

use chrono::{DateTime, Utc};
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{Error, Result};
use crate::flags::{FlagSet, format_duration};

pub const FLAG_OUTPUT_DIRECTORY: &str = "output-directory";
pub const FLAG_OUTPUT_FILENAME: &str = "output-filename";
pub const FLAG_WORKER_COUNT: &str = "worker-count";
pub const FLAG_QUICK: &str = "quick";
pub const FLAG_TASK_TIMEOUT: &str = "task-timeout";

/// Placeholder in the output file name replaced by the collection time.
pub const TIMESTAMP_PLACEHOLDER: &str = "<ts>";

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Settings of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Directory the dump directory is created in.
    pub output_directory: PathBuf,
    /// Name of the dump directory; `<ts>` is replaced by the start time.
    pub output_filename: String,
    /// Maximum number of tasks running at once.
    pub worker_count: usize,
    /// Only run tasks marked as quick.
    pub quick: bool,
    /// Per-task timeout; zero disables it.
    pub task_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("."),
            output_filename: format!("meshctl-sysdump-{}", TIMESTAMP_PLACEHOLDER),
            worker_count: default_worker_count(),
            quick: false,
            task_timeout: Duration::from_secs(60),
        }
    }
}

impl Options {
    /// Declare the host's sysdump flags, using `self` for the defaults.
    pub fn declare_flags(&self, flags: &mut FlagSet) {
        flags
            .string(
                FLAG_OUTPUT_DIRECTORY,
                self.output_directory.display().to_string(),
                "Directory the sysdump is written to",
            )
            .string(
                FLAG_OUTPUT_FILENAME,
                self.output_filename.clone(),
                "Name of the sysdump directory; '<ts>' is replaced by a timestamp",
            )
            .int(
                FLAG_WORKER_COUNT,
                self.worker_count as i64,
                "Number of tasks collected in parallel",
            )
            .bool(FLAG_QUICK, self.quick, "Only collect quick tasks")
            .duration(FLAG_TASK_TIMEOUT, self.task_timeout, "Maximum time a single task may take");
    }

    /// Read options back from a parsed flag set.
    pub fn from_flags(flags: &FlagSet) -> Result<Self> {
        let worker_count = flags.get_int(FLAG_WORKER_COUNT)?;
        if worker_count < 1 {
            return Err(Error::invalid_value(FLAG_WORKER_COUNT, "must be at least 1"));
        }
        let worker_count = usize::try_from(worker_count)
            .map_err(|_| Error::invalid_value(FLAG_WORKER_COUNT, format!("{} is too large", worker_count)))?;
        let options = Self {
            output_directory: PathBuf::from(flags.get_string(FLAG_OUTPUT_DIRECTORY)?),
            output_filename: flags.get_string(FLAG_OUTPUT_FILENAME)?,
            worker_count,
            quick: flags.get_bool(FLAG_QUICK)?,
            task_timeout: flags.get_duration(FLAG_TASK_TIMEOUT)?,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::invalid_value(FLAG_WORKER_COUNT, "must be at least 1"));
        }
        if self.worker_count > Semaphore::MAX_PERMITS {
            return Err(Error::invalid_value(
                FLAG_WORKER_COUNT,
                format!("must be at most {}", Semaphore::MAX_PERMITS),
            ));
        }
        let name = self.output_filename.trim();
        if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
            return Err(Error::invalid_value(
                FLAG_OUTPUT_FILENAME,
                format!("{:?} is not a plain directory name", self.output_filename),
            ));
        }
        Ok(())
    }

    /// Dump directory for a collection started at `now`.
    pub fn dump_path(&self, now: DateTime<Utc>) -> PathBuf {
        let stamp = now.format("%Y%m%d-%H%M%S%.3f").to_string();
        let name = self.output_filename.replace(TIMESTAMP_PLACEHOLDER, &stamp);
        self.output_directory.join(name)
    }
}

/// A configured, not-yet-run set of collection tasks.
pub struct Collector {
    options: Options,
    flags: FlagSet,
    tasks: Vec<Arc<dyn Task>>,
}

impl Collector {
    /// Build the collector from a parsed flag set.
    pub fn new(flags: FlagSet) -> Result<Self> {
        let options = Options::from_flags(&flags)?;
        Self::with_options(options, flags)
    }

    /// Build the collector from explicit options.
    pub fn with_options(options: Options, flags: FlagSet) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            flags,
            tasks: Vec::new(),
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Parsed flags for this collection.
    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    /// Register a task. Names must be unique.
    pub fn add_task<T: Task + 'static>(&mut self, task: T) -> Result<&mut Self> {
        self.add_shared_task(Arc::new(task))
    }

    /// Register a task that is shared with the caller.
    pub fn add_shared_task(&mut self, task: Arc<dyn Task>) -> Result<&mut Self> {
        if self.contains(task.name()) {
            return Err(Error::DuplicateTask(task.name().to_string()));
        }
        tracing::trace!(task = %task.name(), "sysdump task registered");
        self.tasks.push(task);
        Ok(self)
    }

    /// Register the built-in tasks.
    pub fn add_default_tasks(&mut self) -> Result<()> {
        self.add_task(SystemInfo)?;
        self.add_task(Environment)?;
        self.add_task(FlagsSnapshot)?;
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.iter().any(|t| t.name() == name)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &dyn Task> {
        self.tasks.iter().map(|t| t.as_ref())
    }

    pub fn task_names(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Create the dump directory. An existing one is never reused.
    async fn create_dump_dir(&self, now: DateTime<Utc>) -> Result<PathBuf> {
        let dir = self.options.dump_path(now);
        tokio::fs::create_dir_all(&self.options.output_directory).await?;
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => Ok(dir),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::DumpExists(dir)),
            Err(e) => Err(e.into()),
        }
    }

    /// Run every task and write `summary.json`.
    pub async fn run(self) -> Result<Summary> {
        let started_at = Utc::now();
        let dir = self.create_dump_dir(started_at).await?;
        let mut summary = Summary::new(dir.clone());
        summary.started_at = started_at;

        let Collector {
            options,
            flags,
            tasks,
        } = self;
        tracing::info!(directory = %dir.display(), tasks = tasks.len(), workers = options.worker_count, "collecting sysdump");

        let quick = options.quick;
        let timeout = options.task_timeout;
        let semaphore = Arc::new(Semaphore::new(options.worker_count));
        let ctx = TaskContext::new(dir.clone(), options, flags);

        let names: Vec<String> = tasks.iter().map(|t| t.name().to_string()).collect();
        let mut slots: Vec<Option<TaskResult>> = vec![None; tasks.len()];
        let mut workers = JoinSet::new();

        for (index, task) in tasks.into_iter().enumerate() {
            if quick && !task.quick() {
                slots[index] = Some(TaskResult::skipped(task.name(), "not collected with --quick"));
                continue;
            }

            let semaphore = semaphore.clone();
            let ctx = ctx.clone();
            workers.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let name = task.name().to_string();
                let started = Instant::now();
                let outcome = if timeout.is_zero() {
                    Ok(task.run(&ctx).await)
                } else {
                    tokio::time::timeout(timeout, task.run(&ctx)).await
                };
                let elapsed = started.elapsed();

                let result = match outcome {
                    Ok(Ok(())) => {
                        tracing::debug!(task = %name, elapsed_ms = elapsed.as_millis() as u64, "task completed");
                        TaskResult::completed(name, elapsed)
                    }
                    Ok(Err(failure)) => {
                        tracing::warn!(task = %name, error = %failure, "task failed");
                        TaskResult::failed(name, elapsed, failure.to_string())
                    }
                    Err(_) => {
                        tracing::warn!(task = %name, "task timed out");
                        TaskResult::failed(name, elapsed, format!("timed out after {}", format_duration(timeout)))
                    }
                };
                (index, result)
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => tracing::error!(error = %e, "sysdump task aborted"),
            }
        }

        summary.tasks = slots
            .into_iter()
            .zip(names)
            .map(|(slot, name)| {
                slot.unwrap_or_else(|| TaskResult::failed(name, Duration::ZERO, "task panicked"))
            })
            .collect();
        summary.finish(&dir).await?;

        tracing::info!(
            completed = summary.completed(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            "sysdump collected"
        );
        Ok(summary)
    }
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("options", &self.options)
            .field("tasks", &self.task_names())
            .finish()
    }
}
