//! Prelude module for convenient imports.

pub use crate::error::{EvaluationError, FaultKind, Result, SandboxError};
pub use crate::sandbox::{
    config::{EvalOptions, RuntimeConfig},
    executor::JsSandbox,
    fs::{FsBridge, HostFs, MemoryFs},
    result::EvaluationResult,
    vfs::FileTree,
};
