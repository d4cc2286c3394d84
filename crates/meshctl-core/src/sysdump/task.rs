//! Sysdump task definitions.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::Options;
use crate::error::{Error, Result};
use crate::flags::FlagSet;

/// Why a task did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    message: String,
}

impl TaskFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TaskFailure {}

impl From<Error> for TaskFailure {
    fn from(e: Error) -> Self {
        TaskFailure::new(e.to_string())
    }
}

impl From<std::io::Error> for TaskFailure {
    fn from(e: std::io::Error) -> Self {
        TaskFailure::new(e.to_string())
    }
}

/// Handle a running task uses to write into the dump directory.
#[derive(Debug, Clone)]
pub struct TaskContext {
    dir: PathBuf,
    options: Arc<Options>,
    flags: Arc<FlagSet>,
}

impl TaskContext {
    pub fn new(dir: impl Into<PathBuf>, options: Options, flags: FlagSet) -> Self {
        Self {
            dir: dir.into(),
            options: Arc::new(options),
            flags: Arc::new(flags),
        }
    }

    /// Root of this dump.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Parsed flags, including any an extension declared for itself.
    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    /// Resolve a relative path inside the dump directory.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        let relative = relative.as_ref();
        let escapes = relative.as_os_str().is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(Error::PathEscapesDump(relative.display().to_string()));
        }
        Ok(self.dir.join(relative))
    }

    /// Write raw bytes to a file in the dump, creating parent directories.
    pub async fn write_file(&self, relative: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }

    /// Write a value as pretty-printed JSON.
    pub async fn write_json<T: Serialize + ?Sized>(&self, relative: impl AsRef<Path>, value: &T) -> Result<PathBuf> {
        let contents = serde_json::to_vec_pretty(value)?;
        self.write_file(relative, contents).await
    }
}

/// A single collection task.
#[async_trait]
pub trait Task: Send + Sync {
    /// Unique name.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Whether the task also runs with `--quick`.
    fn quick(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &TaskContext) -> std::result::Result<(), TaskFailure>;
}

/// Task implementation using a closure.
pub struct FnTask<F> {
    name: String,
    description: String,
    quick: bool,
    handler: F,
}

impl<F> FnTask<F> {
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Skip this task with `--quick`.
    pub fn full_only(mut self) -> Self {
        self.quick = false;
        self
    }
}

/// Build a task from an async closure.
pub fn task_fn<F, Fut>(name: impl Into<String>, handler: F) -> FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), TaskFailure>> + Send + 'static,
{
    FnTask {
        name: name.into(),
        description: String::new(),
        quick: true,
        handler,
    }
}

#[async_trait]
impl<F, Fut> Task for FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), TaskFailure>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn quick(&self) -> bool {
        self.quick
    }

    async fn run(&self, ctx: &TaskContext) -> std::result::Result<(), TaskFailure> {
        (self.handler)(ctx.clone()).await
    }
}
