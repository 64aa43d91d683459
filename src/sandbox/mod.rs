//! Sandbox module containing all execution-related components.

pub mod bridge;
pub mod config;
pub mod executor;
pub mod fs;
pub mod io;
pub mod limits;
pub mod marshal;
pub mod resolver;
pub mod result;
pub mod shims;
pub mod vfs;
