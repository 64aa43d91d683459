//! Error types for the JavaScript sandbox.
//!
//! Two layers of failure exist. [`SandboxError`] covers host-side problems:
//! bad configuration, engine bootstrap failures, and misuse of a disposed
//! runtime. Anything that goes wrong *inside* the sandbox is never a
//! `SandboxError`; it is reported as an [`EvaluationError`] carried by a
//! failed [`EvaluationResult`](crate::EvaluationResult).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while constructing or driving a sandbox runtime.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Failed to initialize the QuickJS runtime.
    #[error("failed to initialize runtime: {0}")]
    RuntimeInit(#[source] anyhow::Error),

    /// Configuration error, including malformed mounted file trees.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error on the host side.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The runtime was disposed and can no longer evaluate code.
    #[error("runtime has been disposed")]
    Disposed,

    /// A blocking evaluation task failed to complete.
    #[error("evaluation task failed: {0}")]
    TaskFailed(String),
}

impl SandboxError {
    /// Check if this error is caused by using a disposed runtime.
    pub fn is_disposed(&self) -> bool {
        matches!(self, SandboxError::Disposed)
    }

    /// Check if this error is a configuration problem.
    pub fn is_config(&self) -> bool {
        matches!(self, SandboxError::Config(_))
    }
}

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Stable discriminator for a failed evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FaultKind {
    /// The timeout fired or the host interrupted the evaluation.
    Interrupted,
    /// Any uncaught throw or rejection, including syntax errors and denied
    /// capabilities.
    Exception,
    /// An import named a module that is not present in the virtual tree.
    ModuleNotFound,
    /// The default export could not be converted to a host value.
    MarshalFault,
}

impl FaultKind {
    /// Wire name of the kind, as it appears in serialized results.
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::Interrupted => "interrupted",
            FaultKind::Exception => "exception",
            FaultKind::ModuleNotFound => "moduleNotFound",
            FaultKind::MarshalFault => "marshalFault",
        }
    }
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of a fault raised while evaluating sandboxed code.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct EvaluationError {
    /// What class of fault occurred.
    pub kind: FaultKind,
    /// Human-readable description.
    pub message: String,
    /// Script stack trace, when the engine provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl EvaluationError {
    /// Create a fault without a stack trace.
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: None,
        }
    }

    /// Attach a stack trace.
    pub fn with_stack(mut self, stack: Option<String>) -> Self {
        self.stack = stack.filter(|s| !s.trim().is_empty());
        self
    }

    /// Check if this fault was caused by the interrupt policy.
    pub fn is_interrupted(&self) -> bool {
        self.kind == FaultKind::Interrupted
    }

    /// Check if this fault was an unresolved import.
    pub fn is_module_not_found(&self) -> bool {
        self.kind == FaultKind::ModuleNotFound
    }
}
