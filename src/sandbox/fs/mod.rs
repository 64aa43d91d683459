//! Host filesystem backends reachable from the `fs` shims.
//!
//! A backend is a capability: the sandbox can only touch a filesystem when
//! the host hands one to [`RuntimeConfigBuilder::filesystem`]. All paths
//! arrive absolute and `/`-separated, already resolved by the `path` shim.
//!
//! [`RuntimeConfigBuilder::filesystem`]: crate::RuntimeConfigBuilder::filesystem

mod host;
mod memory;

pub use host::HostFs;
pub use memory::MemoryFs;

use std::io;

/// Metadata returned by [`FsBridge::metadata`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FileStat {
    /// Size in bytes (zero for directories).
    pub size: u64,
    /// The path names a regular file.
    pub is_file: bool,
    /// The path names a directory.
    pub is_dir: bool,
    /// Last modification time, milliseconds since the Unix epoch.
    pub modified_ms: f64,
}

/// Raw filesystem primitives the shim layer delegates to.
///
/// Implementations must be cheap to call from the engine thread; every
/// call blocks script execution until it returns.
pub trait FsBridge: Send + Sync {
    /// Read a whole file.
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Create or truncate a file and write `data`.
    fn write_file(&self, path: &str, data: &[u8]) -> io::Result<()>;

    /// Append to a file, creating it if needed.
    fn append_file(&self, path: &str, data: &[u8]) -> io::Result<()>;

    /// Create a directory, and its parents when `recursive`.
    fn create_dir(&self, path: &str, recursive: bool) -> io::Result<()>;

    /// List entry names of a directory, sorted.
    fn read_dir(&self, path: &str) -> io::Result<Vec<String>>;

    /// Stat a path.
    fn metadata(&self, path: &str) -> io::Result<FileStat>;

    /// Remove a file.
    fn remove_file(&self, path: &str) -> io::Result<()>;

    /// Remove a directory, with its contents when `recursive`.
    fn remove_dir(&self, path: &str, recursive: bool) -> io::Result<()>;

    /// Move a file or directory.
    fn rename(&self, from: &str, to: &str) -> io::Result<()>;

    /// Copy a file.
    fn copy_file(&self, from: &str, to: &str) -> io::Result<()>;

    /// Check if a path exists.
    fn exists(&self, path: &str) -> bool {
        self.metadata(path).is_ok()
    }
}

/// Node-style error code for an I/O error, e.g. `ENOENT`.
pub fn error_code(err: &io::Error) -> &'static str {
    use io::ErrorKind;

    match err.kind() {
        ErrorKind::NotFound => "ENOENT",
        ErrorKind::PermissionDenied => "EACCES",
        ErrorKind::AlreadyExists => "EEXIST",
        ErrorKind::InvalidInput => "EINVAL",
        ErrorKind::Interrupted => "EINTR",
        ErrorKind::NotADirectory => "ENOTDIR",
        ErrorKind::IsADirectory => "EISDIR",
        ErrorKind::DirectoryNotEmpty => "ENOTEMPTY",
        _ => "EIO",
    }
}

/// Split an absolute virtual path into its segments, refusing `..`.
pub(crate) fn segments(path: &str) -> io::Result<Vec<&str>> {
    if !path.starts_with('/') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path must be absolute: {path}"),
        ));
    }
    let mut out = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("path escapes the filesystem root: {path}"),
                ))
            }
            other => out.push(other),
        }
    }
    Ok(out)
}
