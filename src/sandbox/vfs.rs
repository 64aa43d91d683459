//! In-memory file tree used to answer module imports.
//!
//! A [`VirtualFs`] is assembled once per runtime from three layers, lowest
//! precedence first: the built-in shim packages, host-injected
//! `node_modules`, and host-mounted trees. It is never mutated afterwards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SandboxError};

/// Root directory for package-style modules.
pub const NODE_MODULES: &str = "node_modules";

/// A node of the virtual file tree: either module source or a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileTree {
    /// Source text of a module.
    File(String),
    /// Named children.
    Dir(BTreeMap<String, FileTree>),
}

impl Default for FileTree {
    fn default() -> Self {
        FileTree::Dir(BTreeMap::new())
    }
}

impl From<&str> for FileTree {
    fn from(source: &str) -> Self {
        FileTree::File(source.to_string())
    }
}

impl From<String> for FileTree {
    fn from(source: String) -> Self {
        FileTree::File(source)
    }
}

impl<K: Into<String>, V: Into<FileTree>> FromIterator<(K, V)> for FileTree {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        FileTree::Dir(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl FileTree {
    /// Create an empty directory.
    pub fn dir() -> Self {
        FileTree::default()
    }

    /// Create a leaf holding module source.
    pub fn file(source: impl Into<String>) -> Self {
        FileTree::File(source.into())
    }

    /// Add a child, builder style. Only meaningful on directories; a leaf is
    /// replaced by a directory holding the child.
    pub fn with(mut self, name: impl Into<String>, child: impl Into<FileTree>) -> Self {
        match &mut self {
            FileTree::Dir(children) => {
                children.insert(name.into(), child.into());
                self
            }
            FileTree::File(_) => FileTree::dir().with(name, child),
        }
    }

    /// Check if this node is a leaf.
    pub fn is_file(&self) -> bool {
        matches!(self, FileTree::File(_))
    }

    /// Overlay `other` onto `self`. Directories merge recursively; wherever
    /// either side is a leaf, `other` replaces `self`.
    pub fn merge(self, other: FileTree) -> FileTree {
        match (self, other) {
            (FileTree::Dir(mut base), FileTree::Dir(overlay)) => {
                for (name, child) in overlay {
                    let merged = match base.remove(&name) {
                        Some(existing) => existing.merge(child),
                        None => child,
                    };
                    base.insert(name, merged);
                }
                FileTree::Dir(base)
            }
            (_, overlay) => overlay,
        }
    }

    /// Expand `/`-separated keys into nested directories and reject keys
    /// that cannot name a path segment.
    pub fn normalized(self) -> Result<FileTree> {
        match self {
            FileTree::File(source) => Ok(FileTree::File(source)),
            FileTree::Dir(children) => {
                let mut out = FileTree::dir();
                for (key, child) in children {
                    let segments = key_segments(&key)?;
                    let mut node = child.normalized()?;
                    for segment in segments.iter().rev() {
                        node = FileTree::dir().with(*segment, node);
                    }
                    out = out.merge(node);
                }
                Ok(out)
            }
        }
    }

    fn lookup(&self, path: &str) -> Option<&FileTree> {
        let mut node = self;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            match node {
                FileTree::Dir(children) => node = children.get(segment)?,
                FileTree::File(_) => return None,
            }
        }
        Some(node)
    }
}

fn key_segments(key: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(SandboxError::Config(format!(
            "file tree key {key:?} does not name a path"
        )));
    }
    if let Some(bad) = segments.iter().find(|s| **s == "." || **s == "..") {
        return Err(SandboxError::Config(format!(
            "file tree key {key:?} contains illegal segment {bad:?}"
        )));
    }
    Ok(segments)
}

/// The merged, immutable module tree of one runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFs {
    root: FileTree,
}

impl VirtualFs {
    /// Merge the three layers in precedence order.
    ///
    /// Built-ins sit at `/`, `node_modules` injections under
    /// `/node_modules`, and mounts at `/`. Fails if any injected tree has a
    /// malformed key.
    pub fn build(
        builtins: FileTree,
        node_modules: &BTreeMap<String, FileTree>,
        mount_fs: &BTreeMap<String, FileTree>,
    ) -> Result<Self> {
        let packages = FileTree::Dir(node_modules.clone()).normalized()?;
        let mounts = FileTree::Dir(mount_fs.clone()).normalized()?;

        let root = builtins
            .normalized()?
            .merge(FileTree::dir().with(NODE_MODULES, packages))
            .merge(mounts);

        tracing::debug!(
            packages = node_modules.len(),
            mounts = mount_fs.len(),
            "virtual filesystem built"
        );

        Ok(Self { root })
    }

    /// Get the node at an absolute virtual path.
    pub fn get(&self, path: &str) -> Option<&FileTree> {
        self.root.lookup(path)
    }

    /// Read module source at a path. Directories and missing paths yield
    /// `None`.
    pub fn read(&self, path: &str) -> Option<&str> {
        match self.get(path)? {
            FileTree::File(source) => Some(source),
            FileTree::Dir(_) => None,
        }
    }

    /// Check if a path names a leaf.
    pub fn is_file(&self, path: &str) -> bool {
        self.read(path).is_some()
    }

    /// The root of the tree.
    pub fn root(&self) -> &FileTree {
        &self.root
    }
}
