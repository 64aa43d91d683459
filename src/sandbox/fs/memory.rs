//! In-memory filesystem backend.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use super::{segments, FileStat, FsBridge};

#[derive(Debug, Clone)]
enum Node {
    File { data: Vec<u8>, modified_ms: f64 },
    Dir,
}

/// Backend holding files in a map keyed by normalized path.
///
/// Useful for tests and for hosts that want a scratch filesystem per
/// runtime. The root directory always exists.
#[derive(Debug, Default)]
pub struct MemoryFs {
    nodes: Mutex<BTreeMap<String, Node>>,
}

fn key(path: &str) -> io::Result<String> {
    Ok(format!("/{}", segments(path)?.join("/")))
}

fn parent(key: &str) -> Option<&str> {
    if key == "/" {
        return None;
    }
    match key.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&key[..idx]),
        None => None,
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {path}"),
    )
}

fn now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or_default()
}

impl MemoryFs {
    /// Create an empty filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file, creating parent directories.
    pub fn with_file(self, path: &str, data: impl AsRef<[u8]>) -> io::Result<Self> {
        if let Some(dir) = parent(&key(path)?) {
            self.create_dir(dir, true)?;
        }
        self.write_file(path, data.as_ref())?;
        Ok(self)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Node>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_dir(nodes: &BTreeMap<String, Node>, key: &str) -> bool {
        key == "/" || matches!(nodes.get(key), Some(Node::Dir))
    }

    fn children<'a>(
        nodes: &'a BTreeMap<String, Node>,
        key: &'a str,
    ) -> impl Iterator<Item = &'a String> + 'a {
        let prefix = if key == "/" { "/".to_string() } else { format!("{key}/") };
        nodes
            .keys()
            .filter(move |k| k.starts_with(&prefix) && !k[prefix.len()..].contains('/'))
    }

    fn ensure_parent(nodes: &BTreeMap<String, Node>, key: &str, path: &str) -> io::Result<()> {
        match parent(key) {
            Some(dir) if Self::is_dir(nodes, dir) => Ok(()),
            Some(dir) if nodes.contains_key(dir) => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("not a directory: {path}"),
            )),
            _ => Err(not_found(path)),
        }
    }

    fn put_file(&self, path: &str, data: &[u8], append: bool) -> io::Result<()> {
        let key = key(path)?;
        let mut nodes = self.lock();
        Self::ensure_parent(&nodes, &key, path)?;
        match nodes.get_mut(&key) {
            Some(Node::Dir) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {path}"),
            )),
            Some(Node::File { data: existing, modified_ms }) if append => {
                existing.extend_from_slice(data);
                *modified_ms = now_ms();
                Ok(())
            }
            _ => {
                nodes.insert(
                    key,
                    Node::File {
                        data: data.to_vec(),
                        modified_ms: now_ms(),
                    },
                );
                Ok(())
            }
        }
    }
}

impl FsBridge for MemoryFs {
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        let key = key(path)?;
        match self.lock().get(&key) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            Some(Node::Dir) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {path}"),
            )),
            None if key == "/" => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {path}"),
            )),
            None => Err(not_found(path)),
        }
    }

    fn write_file(&self, path: &str, data: &[u8]) -> io::Result<()> {
        self.put_file(path, data, false)
    }

    fn append_file(&self, path: &str, data: &[u8]) -> io::Result<()> {
        self.put_file(path, data, true)
    }

    fn create_dir(&self, path: &str, recursive: bool) -> io::Result<()> {
        let key = key(path)?;
        let mut nodes = self.lock();
        if recursive {
            let mut current = String::new();
            for segment in segments(path)? {
                current.push('/');
                current.push_str(segment);
                match nodes.get(&current) {
                    Some(Node::Dir) => {}
                    Some(Node::File { .. }) => {
                        return Err(io::Error::new(
                            io::ErrorKind::NotADirectory,
                            format!("not a directory: {current}"),
                        ))
                    }
                    None => {
                        nodes.insert(current.clone(), Node::Dir);
                    }
                }
            }
            return Ok(());
        }
        if Self::is_dir(&nodes, &key) || nodes.contains_key(&key) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("file already exists: {path}"),
            ));
        }
        Self::ensure_parent(&nodes, &key, path)?;
        nodes.insert(key, Node::Dir);
        Ok(())
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<String>> {
        let key = key(path)?;
        let nodes = self.lock();
        if !Self::is_dir(&nodes, &key) {
            return match nodes.get(&key) {
                Some(_) => Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("not a directory: {path}"),
                )),
                None => Err(not_found(path)),
            };
        }
        Ok(Self::children(&nodes, &key)
            .filter_map(|k| k.rsplit('/').next().map(str::to_string))
            .collect())
    }

    fn metadata(&self, path: &str) -> io::Result<FileStat> {
        let key = key(path)?;
        let nodes = self.lock();
        match nodes.get(&key) {
            Some(Node::File { data, modified_ms }) => Ok(FileStat {
                size: data.len() as u64,
                is_file: true,
                is_dir: false,
                modified_ms: *modified_ms,
            }),
            Some(Node::Dir) => Ok(FileStat {
                is_dir: true,
                ..FileStat::default()
            }),
            None if key == "/" => Ok(FileStat {
                is_dir: true,
                ..FileStat::default()
            }),
            None => Err(not_found(path)),
        }
    }

    fn remove_file(&self, path: &str) -> io::Result<()> {
        let key = key(path)?;
        let mut nodes = self.lock();
        match nodes.get(&key) {
            Some(Node::File { .. }) => {
                nodes.remove(&key);
                Ok(())
            }
            Some(Node::Dir) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {path}"),
            )),
            None => Err(not_found(path)),
        }
    }

    fn remove_dir(&self, path: &str, recursive: bool) -> io::Result<()> {
        let key = key(path)?;
        if key == "/" {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "refusing to remove the filesystem root",
            ));
        }
        let mut nodes = self.lock();
        match nodes.get(&key) {
            Some(Node::Dir) => {}
            Some(Node::File { .. }) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("not a directory: {path}"),
                ))
            }
            None => return Err(not_found(path)),
        }
        let prefix = format!("{key}/");
        let nested: Vec<String> = nodes
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        if !nested.is_empty() && !recursive {
            return Err(io::Error::new(
                io::ErrorKind::DirectoryNotEmpty,
                format!("directory not empty: {path}"),
            ));
        }
        for k in nested {
            nodes.remove(&k);
        }
        nodes.remove(&key);
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let from_key = key(from)?;
        let to_key = key(to)?;
        let mut nodes = self.lock();
        if !nodes.contains_key(&from_key) {
            return Err(not_found(from));
        }
        Self::ensure_parent(&nodes, &to_key, to)?;
        let prefix = format!("{from_key}/");
        let moved: Vec<String> = nodes
            .keys()
            .filter(|k| **k == from_key || k.starts_with(&prefix))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = nodes.remove(&old) {
                let new = format!("{to_key}{}", &old[from_key.len()..]);
                nodes.insert(new, node);
            }
        }
        Ok(())
    }

    fn copy_file(&self, from: &str, to: &str) -> io::Result<()> {
        let data = self.read_file(from)?;
        self.write_file(to, &data)
    }
}
