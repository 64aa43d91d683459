//! # QuickJS Sandbox
//!
//! A sandbox for running untrusted JavaScript modules.
//!
//! Each [`JsSandbox`] owns an embedded QuickJS engine whose module loader
//! only sees a virtual file tree assembled from built-in capability shims,
//! host-provided packages and host-mounted sources. Nothing else is
//! reachable from inside:
//!
//! - **Module isolation**: imports resolve against the virtual tree only
//! - **Capability gating**: `fs` reaches the host only through an explicit
//!   [`FsBridge`] and only when `allow_fs` is set
//! - **Timeout protection**: an interrupt handler stops runaway loops
//! - **Memory limits**: configurable engine heap and stack ceilings
//! - **Uniform results**: every evaluation returns `{ ok, data }` or
//!   `{ ok: false, error: { message, kind } }`
//!
//! ## Example
//!
//! ```rust,ignore
//! use quickjs_sandbox_rs::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let config = RuntimeConfig::builder()
//!         .node_module("greeting", FileTree::dir().with("index.js", "export default 'hi'"))
//!         .build();
//!
//!     let sandbox = JsSandbox::new(config)?;
//!     let result = sandbox.evaluate(
//!         "import g from 'greeting'; export default g",
//!         EvalOptions::from_millis(1000),
//!     )?;
//!
//!     assert_eq!(result.data(), Some(&serde_json::json!("hi")));
//!     Ok(())
//! }
//! ```
//!
//! ## Security Model
//!
//! 1. **No ambient authority**: no `process`, `require` or host globals exist
//! 2. **Reserved bridge module**: the host filesystem object is installed
//!    into a module only the `fs` shims import, once per evaluation
//! 3. **Fresh context per call**: globals do not leak between evaluations
//! 4. **Interrupt handler**: polled by the bytecode loop, so tight loops stop

pub mod error;
pub mod prelude;
pub mod sandbox;

// Re-export main types at crate root for convenience
pub use error::{EvaluationError, FaultKind, Result, SandboxError};
pub use sandbox::config::{EvalOptions, RuntimeConfig, RuntimeConfigBuilder};
pub use sandbox::executor::JsSandbox;
pub use sandbox::fs::{FileStat, FsBridge, HostFs, MemoryFs};
pub use sandbox::io::{ConsoleLevel, ConsoleLine, ConsoleOutput};
pub use sandbox::limits::InterruptHandle;
pub use sandbox::resolver::{ModuleNotFound, ModuleResolver, ENTRY_MODULE};
pub use sandbox::result::EvaluationResult;
pub use sandbox::vfs::{FileTree, VirtualFs};
