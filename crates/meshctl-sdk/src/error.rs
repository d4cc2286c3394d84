//! SDK Error Types
//!
//! Errors raised while the host drives extensions through a workflow.

use thiserror::Error;

use crate::hooks::HookError;
use crate::host::Phase;

/// SDK Result type alias
pub type SDKResult<T> = Result<T, SDKError>;

/// SDK errors
#[derive(Debug, Error)]
pub enum SDKError {
    /// Two extensions registered under the same name
    #[error("extension already registered: {name}")]
    DuplicateExtension { name: String },

    /// Extension name is empty or reserved
    #[error("invalid extension name: {name:?}")]
    InvalidExtensionName { name: String },

    /// Lifecycle step called out of order
    #[error("{workflow}: cannot {action} while {phase}")]
    InvalidPhase {
        workflow: &'static str,
        action: &'static str,
        phase: Phase,
    },

    /// Flag declaration failed, usually a collision
    #[error("{workflow}: {source}")]
    Flags {
        workflow: &'static str,
        #[source]
        source: meshctl_core::Error,
    },

    /// An extension's attach hook failed
    #[error("{workflow}: extension {extension} failed to register: {source}")]
    Registration {
        workflow: &'static str,
        extension: String,
        #[source]
        source: HookError,
    },

    /// The workflow itself failed to run
    #[error("{workflow}: {source}")]
    Execution {
        workflow: &'static str,
        #[source]
        source: meshctl_core::Error,
    },
}

impl SDKError {
    /// Workflow the error belongs to, if any.
    pub fn workflow(&self) -> Option<&'static str> {
        match self {
            Self::InvalidPhase { workflow, .. }
            | Self::Flags { workflow, .. }
            | Self::Registration { workflow, .. }
            | Self::Execution { workflow, .. } => Some(workflow),
            Self::DuplicateExtension { .. } | Self::InvalidExtensionName { .. } => None,
        }
    }

    /// Check if this is a flag collision
    pub fn is_collision(&self) -> bool {
        matches!(self, Self::Flags { source, .. } if source.is_collision())
    }

    /// Check if an extension rejected the registration phase
    pub fn is_registration(&self) -> bool {
        matches!(self, Self::Registration { .. })
    }
}
