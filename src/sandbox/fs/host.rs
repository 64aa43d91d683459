//! Real filesystem backend confined to a root directory.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use super::{segments, FileStat, FsBridge};
use crate::error::{Result, SandboxError};

/// Backend that maps virtual `/` onto a host directory.
///
/// Paths containing `..` are refused, so sandboxed code cannot name
/// anything outside `root`. Symlinks are followed only while they resolve
/// to somewhere under `root`; any other path fails with `EACCES`.
#[derive(Debug, Clone)]
pub struct HostFs {
    /// Canonical, so resolved paths can be compared against it.
    root: PathBuf,
}

impl HostFs {
    /// Create a backend rooted at an existing directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = fs::canonicalize(root.as_ref())?;
        if !root.is_dir() {
            return Err(SandboxError::Config(format!(
                "filesystem root {} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// The host directory backing `/`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, path: &str) -> io::Result<PathBuf> {
        let mut host = self.root.clone();
        host.extend(segments(path)?);
        self.confine(&host)?;
        Ok(host)
    }

    /// Check that the deepest existing ancestor of `host` resolves under
    /// the root. A link that cannot be resolved is refused as well, since
    /// writing through it would create its target.
    fn confine(&self, host: &Path) -> io::Result<()> {
        for ancestor in host.ancestors() {
            match fs::canonicalize(ancestor) {
                Ok(real) if real.starts_with(&self.root) => return Ok(()),
                Ok(_) => break,
                Err(_) if ancestor.symlink_metadata().is_ok() => break,
                Err(_) => continue,
            }
        }
        tracing::warn!(path = %host.display(), "refusing path that leaves the filesystem root");
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "path resolves outside the filesystem root",
        ))
    }
}

impl FsBridge for HostFs {
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.host_path(path)?)
    }

    fn write_file(&self, path: &str, data: &[u8]) -> io::Result<()> {
        fs::write(self.host_path(path)?, data)
    }

    fn append_file(&self, path: &str, data: &[u8]) -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.host_path(path)?)?;
        file.write_all(data)
    }

    fn create_dir(&self, path: &str, recursive: bool) -> io::Result<()> {
        let host = self.host_path(path)?;
        if recursive {
            fs::create_dir_all(host)
        } else {
            fs::create_dir(host)
        }
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<String>> {
        let mut names = fs::read_dir(self.host_path(path)?)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<io::Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }

    fn metadata(&self, path: &str) -> io::Result<FileStat> {
        let meta = fs::metadata(self.host_path(path)?)?;
        let modified_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as f64)
            .unwrap_or_default();
        Ok(FileStat {
            size: if meta.is_file() { meta.len() } else { 0 },
            is_file: meta.is_file(),
            is_dir: meta.is_dir(),
            modified_ms,
        })
    }

    fn remove_file(&self, path: &str) -> io::Result<()> {
        fs::remove_file(self.host_path(path)?)
    }

    fn remove_dir(&self, path: &str, recursive: bool) -> io::Result<()> {
        let host = self.host_path(path)?;
        if host == self.root {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "refusing to remove the filesystem root",
            ));
        }
        if recursive {
            fs::remove_dir_all(host)
        } else {
            fs::remove_dir(host)
        }
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        fs::rename(self.host_path(from)?, self.host_path(to)?)
    }

    fn copy_file(&self, from: &str, to: &str) -> io::Result<()> {
        fs::copy(self.host_path(from)?, self.host_path(to)?).map(|_| ())
    }
}
