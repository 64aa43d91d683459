//! Runtime configuration with builder pattern.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::sandbox::fs::FsBridge;
use crate::sandbox::io::DEFAULT_MAX_CONSOLE_BYTES;
use crate::sandbox::vfs::FileTree;

/// Configuration for a sandbox runtime. Immutable once the runtime exists.
///
/// Every field defaults to the most restrictive setting: no filesystem, no
/// test utilities, no extra modules.
#[derive(Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Expose the filesystem bridge to the `fs` shims.
    #[serde(alias = "allowFilesystem")]
    pub allow_fs: bool,
    /// Install the `test` diagnostics package.
    #[serde(alias = "enableTestUtilities")]
    pub enable_test_utils: bool,
    /// Package name to file tree, installed under `/node_modules`.
    pub node_modules: BTreeMap<String, FileTree>,
    /// Top-level path to file tree, mounted at `/`.
    pub mount_fs: BTreeMap<String, FileTree>,
    /// Engine heap limit in bytes.
    pub max_memory: usize,
    /// Engine stack limit in bytes.
    pub max_stack_size: Option<usize>,
    /// Cap on console text captured per evaluation, in bytes.
    pub max_console_bytes: usize,
    /// Host filesystem backend; required when `allow_fs` is set.
    #[serde(skip)]
    pub fs_bridge: Option<Arc<dyn FsBridge>>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            allow_fs: false,
            enable_test_utils: false,
            node_modules: BTreeMap::new(),
            mount_fs: BTreeMap::new(),
            max_memory: 64 * 1024 * 1024, // 64MB
            max_stack_size: None,
            max_console_bytes: DEFAULT_MAX_CONSOLE_BYTES,
            fs_bridge: None,
        }
    }
}

impl std::fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("allow_fs", &self.allow_fs)
            .field("enable_test_utils", &self.enable_test_utils)
            .field("node_modules", &self.node_modules.keys().collect::<Vec<_>>())
            .field("mount_fs", &self.mount_fs.keys().collect::<Vec<_>>())
            .field("max_memory", &self.max_memory)
            .field("max_stack_size", &self.max_stack_size)
            .field("max_console_bytes", &self.max_console_bytes)
            .field("fs_bridge", &self.fs_bridge.as_ref().map(|_| "<dyn FsBridge>"))
            .finish()
    }
}

impl RuntimeConfig {
    /// Create a new builder for RuntimeConfig.
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }
}

/// Builder for creating RuntimeConfig instances.
#[derive(Default)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    /// Enable filesystem access through the given bridge.
    pub fn filesystem(mut self, bridge: Arc<dyn FsBridge>) -> Self {
        self.config.allow_fs = true;
        self.config.fs_bridge = Some(bridge);
        self
    }

    /// Toggle filesystem access. Enabling it without a bridge fails at
    /// runtime construction.
    pub fn allow_fs(mut self, allow: bool) -> Self {
        self.config.allow_fs = allow;
        self
    }

    /// Toggle the `test` diagnostics package.
    pub fn enable_test_utils(mut self, enable: bool) -> Self {
        self.config.enable_test_utils = enable;
        self
    }

    /// Inject a package under `/node_modules/<name>`.
    pub fn node_module(mut self, name: impl Into<String>, tree: impl Into<FileTree>) -> Self {
        self.config.node_modules.insert(name.into(), tree.into());
        self
    }

    /// Mount a tree at `/<path>`.
    pub fn mount(mut self, path: impl Into<String>, tree: impl Into<FileTree>) -> Self {
        self.config.mount_fs.insert(path.into(), tree.into());
        self
    }

    /// Set the engine heap limit in bytes.
    pub fn max_memory(mut self, bytes: usize) -> Self {
        self.config.max_memory = bytes;
        self
    }

    /// Set the engine stack limit in bytes.
    pub fn max_stack_size(mut self, bytes: usize) -> Self {
        self.config.max_stack_size = Some(bytes);
        self
    }

    /// Set the cap on console text captured per evaluation.
    pub fn max_console_bytes(mut self, bytes: usize) -> Self {
        self.config.max_console_bytes = bytes;
        self
    }

    /// Build the RuntimeConfig.
    pub fn build(self) -> RuntimeConfig {
        self.config
    }
}

/// Per-call options for `evaluate`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalOptions {
    /// Wall-clock budget for the call. `None` is unbounded.
    pub execution_timeout: Option<Duration>,
}

impl EvalOptions {
    /// Options with a timeout. A zero duration means unbounded.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            execution_timeout: Some(timeout).filter(|t| !t.is_zero()),
        }
    }

    /// Options from a millisecond budget. Non-positive means unbounded.
    pub fn from_millis(millis: i64) -> Self {
        match u64::try_from(millis) {
            Ok(ms) if ms > 0 => Self::with_timeout(Duration::from_millis(ms)),
            _ => Self::default(),
        }
    }
}
