//! Built-in capability shim packages.
//!
//! Each package is plain module source placed under `/node_modules`. Only
//! the `fs` packages reach the host, and only through the reserved
//! [`BRIDGE_SPECIFIER`] module.

use crate::sandbox::vfs::{FileTree, NODE_MODULES};

/// Specifier of the module that carries the host filesystem bridge.
pub const BRIDGE_SPECIFIER: &str = "sandbox:fs";

/// Global the host sets while the bridge module evaluates. It is removed
/// before any sandboxed code runs.
pub const BRIDGE_GLOBAL: &str = "__sandboxFsBridge";

/// Source of the bridge module. `raw` is read once, from the host-set
/// global, and is a read-only binding for every importer.
pub const BRIDGE_SOURCE: &str = "export const raw = globalThis.__sandboxFsBridge ?? null\n";

pub const PATH: &str = include_str!("js/path.js");
pub const UTIL: &str = include_str!("js/util.js");
pub const ASSERT: &str = include_str!("js/assert.js");
pub const FS: &str = include_str!("js/fs.js");
pub const FS_ADAPTER: &str = include_str!("js/fs_adapter.js");
pub const FS_PROMISES: &str = include_str!("js/fs_promises.js");
pub const TEST_UTILS: &str = include_str!("js/test.js");

/// The built-in packages, rooted at `/`.
///
/// The `test` package is only present with `enable_test_utils`.
pub fn builtin_tree(enable_test_utils: bool) -> FileTree {
    let mut packages = FileTree::dir()
        .with("path", FileTree::dir().with("index.js", PATH))
        .with("util", FileTree::dir().with("index.js", UTIL))
        .with("assert", FileTree::dir().with("index.js", ASSERT))
        .with(
            "fs",
            FileTree::dir()
                .with("index.js", FS)
                .with("adapter.js", FS_ADAPTER)
                .with("promises", FileTree::dir().with("index.js", FS_PROMISES)),
        );

    if enable_test_utils {
        packages = packages.with("test", FileTree::dir().with("index.js", TEST_UTILS));
    }

    FileTree::dir().with(NODE_MODULES, packages)
}
